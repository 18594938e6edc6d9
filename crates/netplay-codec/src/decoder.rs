use crate::error::{CodecError, Result};
use crate::schema::{FieldKind, Schema};
use crate::value::{Record, Value};

/// Decode a record encoded with [`encode`](crate::encode) under the same schema.
///
/// The whole input must be consumed; leftovers are a `TrailingBytes` error.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<Record> {
    let mut reader = Reader::new(bytes);
    let record = read_record(&mut reader, schema)?;
    reader.finish()?;
    Ok(record)
}

/// Bounds-checked big-endian cursor.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(CodecError::ShortInput {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_be_bytes)
    }

    pub(crate) fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(CodecError::TrailingBytes { count }),
        }
    }
}

fn read_record(reader: &mut Reader<'_>, schema: &Schema) -> Result<Record> {
    let mut record = Record::new();
    for field in schema.fields() {
        let value = read_field(reader, field.index(), field.kind())?;
        record.set(field.index(), value);
    }
    Ok(record)
}

fn read_field(reader: &mut Reader<'_>, index: u16, kind: &FieldKind) -> Result<Value> {
    match reader.u8()? {
        0 => Ok(Value::Null),
        1 => read_value(reader, index, kind),
        value => Err(CodecError::InvalidFlag { index, value }),
    }
}

fn read_value(reader: &mut Reader<'_>, index: u16, kind: &FieldKind) -> Result<Value> {
    let value = match kind {
        FieldKind::Byte => Value::Byte(i8::from_be_bytes(reader.array()?)),
        FieldKind::Short => Value::Short(i16::from_be_bytes(reader.array()?)),
        FieldKind::Int => Value::Int(i32::from_be_bytes(reader.array()?)),
        FieldKind::Long => Value::Long(i64::from_be_bytes(reader.array()?)),
        FieldKind::Float => Value::Float(f32::from_be_bytes(reader.array()?)),
        FieldKind::Double => Value::Double(f64::from_be_bytes(reader.array()?)),
        FieldKind::Bool => match reader.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            value => return Err(CodecError::InvalidFlag { index, value }),
        },
        FieldKind::Str => {
            let len = reader.u16()? as usize;
            let bytes = reader.take(len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { index })?;
            Value::Str(s.to_string())
        }
        FieldKind::Record(schema) => {
            let len = reader.u16()? as usize;
            let mut nested = Reader::new(reader.take(len)?);
            let record = read_record(&mut nested, schema)?;
            nested.finish()?;
            Value::Record(record)
        }
        FieldKind::Array(item) => {
            let count = reader.u16()? as usize;
            let mut items = Vec::with_capacity(count.min(reader.remaining()));
            for _ in 0..count {
                items.push(read_field(reader, index, item)?);
            }
            Value::Array(items)
        }
    };
    Ok(value)
}
