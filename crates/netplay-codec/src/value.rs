use std::collections::BTreeMap;

use crate::error::{CodecError, Result};

/// Dynamically typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(String),
    Record(Record),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Kind name matching [`FieldKind::name`](crate::FieldKind::name).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident ($kind:literal)),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }

            impl FromValue for $ty {
                const KIND: &'static str = $kind;

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(inner) => Some(inner.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

value_from! {
    i8 => Byte("byte"),
    i16 => Short("short"),
    i32 => Int("int"),
    i64 => Long("long"),
    f32 => Float("float"),
    f64 => Double("double"),
    bool => Bool("bool"),
    String => Str("string"),
    Record => Record("record"),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Typed extraction from a [`Value`].
pub trait FromValue: Sized {
    /// Name reported in kind mismatch errors.
    const KIND: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

impl<T: FromValue> FromValue for Vec<T> {
    const KIND: &'static str = "array";

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: &'static str = T::KIND;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Field values of one record, keyed by schema index.
///
/// Absent and null are the same thing: storing [`Value::Null`] removes the
/// entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<u16, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set field `index`. Null clears it.
    pub fn set(&mut self, index: u16, value: impl Into<Value>) -> &mut Self {
        match value.into() {
            Value::Null => {
                self.fields.remove(&index);
            }
            value => {
                self.fields.insert(index, value);
            }
        }
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, index: u16, value: impl Into<Value>) -> Self {
        self.set(index, value);
        self
    }

    pub fn get(&self, index: u16) -> Option<&Value> {
        self.fields.get(&index)
    }

    /// Remove and return field `index`, or [`Value::Null`] if unset.
    pub fn take(&mut self, index: u16) -> Value {
        self.fields.remove(&index).unwrap_or(Value::Null)
    }

    /// Typed read of a field that must be present.
    pub fn require<T: FromValue>(&self, index: u16) -> Result<T> {
        let value = self
            .fields
            .get(&index)
            .ok_or(CodecError::MissingField { index })?;
        T::from_value(value).ok_or(CodecError::KindMismatch {
            index,
            expected: T::KIND,
            found: value.kind_name(),
        })
    }

    /// Typed read of a nullable field.
    pub fn optional<T: FromValue>(&self, index: u16) -> Result<Option<T>> {
        match self.fields.get(&index) {
            None => Ok(None),
            Some(value) => T::from_value(value)
                .map(Some)
                .ok_or(CodecError::KindMismatch {
                    index,
                    expected: T::KIND,
                    found: value.kind_name(),
                }),
        }
    }

    /// Set field indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.fields.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Value)> {
        self.fields.iter().map(|(index, value)| (*index, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
