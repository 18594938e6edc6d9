//! Schema-driven binary serialization for netplay message payloads.
//!
//! A [`Schema`] lists a record's fields by index; the wire order is ascending
//! index regardless of declaration order. Each field is written as a presence
//! byte (0 = null, 1 = present) followed by its big-endian value.
//!
//! Typed messages implement [`NetworkRecord`]; dynamic callers can work with
//! [`Record`] and [`Value`] directly.

pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

pub use decoder::decode;
pub use encoder::{encode, encode_into};
pub use envelope::{from_envelope, to_compressed_envelope, to_envelope};
pub use error::{CodecError, Result};
pub use record::{decode_record_list, encode_record_list, NetworkRecord};
pub use schema::{Field, FieldKind, Schema, SchemaBuilder};
pub use value::{FromValue, Record, Value};
