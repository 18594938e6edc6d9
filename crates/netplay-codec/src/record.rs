use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::decoder::{decode, Reader};
use crate::encoder::{checked_len, encode};
use crate::error::Result;
use crate::schema::Schema;
use crate::value::Record;

/// A message type with a fixed field list.
///
/// Implementors map their fields to a [`Record`] by hand and back; the
/// provided methods handle the wire encoding.
///
/// ```
/// use std::sync::{Arc, OnceLock};
/// use netplay_codec::{FieldKind, NetworkRecord, Record, Result, Schema};
///
/// #[derive(Debug, PartialEq)]
/// struct Chat {
///     sender: String,
///     message: String,
/// }
///
/// impl NetworkRecord for Chat {
///     fn schema() -> Arc<Schema> {
///         static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();
///         SCHEMA
///             .get_or_init(|| {
///                 Arc::new(
///                     Schema::builder("Chat")
///                         .field(0, "sender", FieldKind::Str)
///                         .field(1, "message", FieldKind::Str)
///                         .build()
///                         .expect("valid schema"),
///                 )
///             })
///             .clone()
///     }
///
///     fn to_record(&self) -> Record {
///         Record::new()
///             .with(0, self.sender.as_str())
///             .with(1, self.message.as_str())
///     }
///
///     fn from_record(record: &Record) -> Result<Self> {
///         Ok(Self {
///             sender: record.require(0)?,
///             message: record.require(1)?,
///         })
///     }
/// }
///
/// let chat = Chat { sender: "al".into(), message: "hi".into() };
/// let bytes = chat.to_bytes().unwrap();
/// assert_eq!(Chat::from_bytes(&bytes).unwrap(), chat);
/// ```
pub trait NetworkRecord: Sized {
    fn schema() -> Arc<Schema>;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self>;

    fn to_bytes(&self) -> Result<Bytes> {
        encode(&self.to_record(), &Self::schema())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_record(&decode(bytes, &Self::schema())?)
    }
}

/// Encode a list of records as `u16 count`, then `u16 length + bytes` per item.
pub fn encode_record_list<T: NetworkRecord>(items: &[T]) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    dst.put_u16(checked_len(0, items.len())?);
    for (i, item) in items.iter().enumerate() {
        let bytes = item.to_bytes()?;
        dst.put_u16(checked_len(i as u16, bytes.len())?);
        dst.put_slice(&bytes);
    }
    Ok(dst.freeze())
}

/// Inverse of [`encode_record_list`].
pub fn decode_record_list<T: NetworkRecord>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut reader = Reader::new(bytes);
    let count = reader.u16()? as usize;
    let mut items = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        let len = reader.u16()? as usize;
        items.push(T::from_bytes(reader.take(len)?)?);
    }
    reader.finish()?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;
    use crate::error::CodecError;
    use crate::schema::FieldKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Notification {
        text: String,
        level: i8,
    }

    impl NetworkRecord for Notification {
        fn schema() -> Arc<Schema> {
            static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();
            SCHEMA
                .get_or_init(|| {
                    Arc::new(
                        Schema::builder("Notification")
                            .field(0, "text", FieldKind::Str)
                            .field(1, "level", FieldKind::Byte)
                            .build()
                            .unwrap(),
                    )
                })
                .clone()
        }

        fn to_record(&self) -> Record {
            Record::new()
                .with(0, self.text.as_str())
                .with(1, self.level)
        }

        fn from_record(record: &Record) -> Result<Self> {
            Ok(Self {
                text: record.require(0)?,
                level: record.require(1)?,
            })
        }
    }

    fn note(text: &str, level: i8) -> Notification {
        Notification {
            text: text.to_string(),
            level,
        }
    }

    #[test]
    fn typed_roundtrip() {
        let original = note("server restarting", 2);
        let bytes = original.to_bytes().unwrap();
        assert_eq!(Notification::from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn missing_required_field_fails() {
        let bytes = encode(&Record::new().with(0, "x"), &Notification::schema()).unwrap();
        let err = Notification::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::MissingField { index: 1 }));
    }

    #[test]
    fn record_list_roundtrip() {
        let items = vec![note("a", 0), note("", -1), note("ccc", 7)];
        let bytes = encode_record_list(&items).unwrap();
        assert_eq!(&bytes[..2], &[0x00, 0x03]);

        let decoded: Vec<Notification> = decode_record_list(&bytes).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn empty_record_list() {
        let bytes = encode_record_list::<Notification>(&[]).unwrap();
        assert_eq!(bytes.as_ref(), &[0x00, 0x00]);
        assert!(decode_record_list::<Notification>(&bytes).unwrap().is_empty());
    }

    #[test]
    fn truncated_record_list() {
        let bytes = encode_record_list(&[note("abc", 1)]).unwrap();
        let result = decode_record_list::<Notification>(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(CodecError::ShortInput { .. })));
    }
}
