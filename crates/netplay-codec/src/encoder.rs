use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::schema::{FieldKind, Schema};
use crate::value::{Record, Value};

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;

/// Encode `record` in the field order of `schema`.
///
/// Every field is written as a presence byte followed, when present, by its
/// big-endian value. Fails without partial output if a value does not match
/// its declared kind.
pub fn encode(record: &Record, schema: &Schema) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(record, schema, &mut dst)?;
    Ok(dst.freeze())
}

/// Append the encoding of `record` to `dst`.
///
/// On error `dst` is restored to its original length.
pub fn encode_into(record: &Record, schema: &Schema, dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    write_record(record, schema, dst).inspect_err(|_| dst.truncate(start))
}

fn write_record(record: &Record, schema: &Schema, dst: &mut BytesMut) -> Result<()> {
    if let Some(index) = record.indices().find(|index| schema.field(*index).is_none()) {
        return Err(CodecError::UnknownField {
            schema: schema.name().to_string(),
            index,
        });
    }

    for field in schema.fields() {
        let value = record.get(field.index()).unwrap_or(&Value::Null);
        write_field(field.index(), field.kind(), value, dst)?;
    }
    Ok(())
}

fn write_field(index: u16, kind: &FieldKind, value: &Value, dst: &mut BytesMut) -> Result<()> {
    if value.is_null() {
        dst.put_u8(ABSENT);
        return Ok(());
    }
    dst.put_u8(PRESENT);
    write_value(index, kind, value, dst)
}

fn write_value(index: u16, kind: &FieldKind, value: &Value, dst: &mut BytesMut) -> Result<()> {
    match (kind, value) {
        (FieldKind::Byte, Value::Byte(v)) => dst.put_i8(*v),
        (FieldKind::Short, Value::Short(v)) => dst.put_i16(*v),
        (FieldKind::Int, Value::Int(v)) => dst.put_i32(*v),
        (FieldKind::Long, Value::Long(v)) => dst.put_i64(*v),
        (FieldKind::Float, Value::Float(v)) => dst.put_f32(*v),
        (FieldKind::Double, Value::Double(v)) => dst.put_f64(*v),
        (FieldKind::Bool, Value::Bool(v)) => dst.put_u8(u8::from(*v)),
        (FieldKind::Str, Value::Str(s)) => {
            dst.put_u16(checked_len(index, s.len())?);
            dst.put_slice(s.as_bytes());
        }
        (FieldKind::Record(schema), Value::Record(nested)) => {
            let len_at = dst.len();
            dst.put_u16(0);
            write_record(nested, schema, dst)?;
            let len = checked_len(index, dst.len() - len_at - 2)?;
            dst[len_at..len_at + 2].copy_from_slice(&len.to_be_bytes());
        }
        (FieldKind::Array(item), Value::Array(items)) => {
            dst.put_u16(checked_len(index, items.len())?);
            for element in items {
                write_field(index, item, element, dst)?;
            }
        }
        (expected, found) => {
            return Err(CodecError::KindMismatch {
                index,
                expected: expected.name(),
                found: found.kind_name(),
            })
        }
    }
    Ok(())
}

pub(crate) fn checked_len(index: u16, len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| CodecError::LengthOverflow { index, len })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn login_schema() -> Schema {
        Schema::builder("Login")
            .field(1, "password", FieldKind::Str)
            .field(0, "username", FieldKind::Str)
            .build()
            .unwrap()
    }

    #[test]
    fn writes_fields_in_index_order() {
        let record = Record::new().with(1, "pw").with(0, "al");
        let bytes = encode(&record, &login_schema()).unwrap();

        assert_eq!(
            bytes.as_ref(),
            &[1, 0x00, 0x02, b'a', b'l', 1, 0x00, 0x02, b'p', b'w']
        );
    }

    #[test]
    fn null_fields_write_only_the_flag() {
        let record = Record::new().with(0, "al");
        let bytes = encode(&record, &login_schema()).unwrap();
        assert_eq!(bytes.as_ref(), &[1, 0x00, 0x02, b'a', b'l', 0]);
    }

    #[test]
    fn scalars_are_big_endian() {
        let schema = Schema::builder("Scalars")
            .field(0, "b", FieldKind::Byte)
            .field(1, "s", FieldKind::Short)
            .field(2, "i", FieldKind::Int)
            .field(3, "f", FieldKind::Bool)
            .build()
            .unwrap();
        let record = Record::new()
            .with(0, -1i8)
            .with(1, 0x0102i16)
            .with(2, 0x01020304i32)
            .with(3, true);

        let bytes = encode(&record, &schema).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[1, 0xFF, 1, 0x01, 0x02, 1, 0x01, 0x02, 0x03, 0x04, 1, 1]
        );
    }

    #[test]
    fn nested_record_is_length_prefixed() {
        let inner = Arc::new(
            Schema::builder("Point")
                .field(0, "x", FieldKind::Short)
                .build()
                .unwrap(),
        );
        let outer = Schema::builder("Shape")
            .field(0, "origin", FieldKind::Record(inner))
            .build()
            .unwrap();
        let record = Record::new().with(0, Record::new().with(0, 7i16));

        let bytes = encode(&record, &outer).unwrap();
        assert_eq!(bytes.as_ref(), &[1, 0x00, 0x03, 1, 0x00, 0x07]);
    }

    #[test]
    fn array_elements_carry_flags() {
        let schema = Schema::builder("Tags")
            .field(0, "tags", FieldKind::array_of(FieldKind::Byte))
            .build()
            .unwrap();
        let record = Record::new().with(0, Value::Array(vec![Value::Byte(5), Value::Null]));

        let bytes = encode(&record, &schema).unwrap();
        assert_eq!(bytes.as_ref(), &[1, 0x00, 0x02, 1, 5, 0]);
    }

    #[test]
    fn kind_mismatch_leaves_no_partial_output() {
        let record = Record::new().with(0, "al").with(1, 99i32);
        let mut dst = BytesMut::from(&b"keep"[..]);

        let err = encode_into(&record, &login_schema(), &mut dst).unwrap_err();
        assert!(matches!(
            err,
            CodecError::KindMismatch {
                index: 1,
                expected: "string",
                found: "int"
            }
        ));
        assert_eq!(dst.as_ref(), b"keep");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let record = Record::new().with(9, 1i32);
        let err = encode(&record, &login_schema()).unwrap_err();
        assert!(matches!(err, CodecError::UnknownField { index: 9, .. }));
    }

    #[test]
    fn oversized_string_is_rejected() {
        let record = Record::new().with(0, "x".repeat(u16::MAX as usize + 1));
        let err = encode(&record, &login_schema()).unwrap_err();
        assert!(matches!(err, CodecError::LengthOverflow { index: 0, .. }));
    }
}
