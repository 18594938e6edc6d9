use std::sync::Arc;

use crate::error::{CodecError, Result};

/// Wire kind of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    Str,
    /// Nested record, written as `u16 length + bytes`.
    Record(Arc<Schema>),
    /// `u16 count`, then each element as a flagged value of the inner kind.
    Array(Box<FieldKind>),
}

impl FieldKind {
    /// Array of `item`.
    pub fn array_of(item: FieldKind) -> Self {
        FieldKind::Array(Box::new(item))
    }

    /// Human-readable kind name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Byte => "byte",
            FieldKind::Short => "short",
            FieldKind::Int => "int",
            FieldKind::Long => "long",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::Bool => "bool",
            FieldKind::Str => "string",
            FieldKind::Record(_) => "record",
            FieldKind::Array(_) => "array",
        }
    }
}

/// One declared field: wire position, name and kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    index: u16,
    name: String,
    kind: FieldKind,
}

impl Field {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }
}

/// Ordered field list of one record type.
///
/// Fields are kept sorted by index, which is also the wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
}

impl Schema {
    /// Start building a schema named `name`.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in wire order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: u16) -> Option<&Field> {
        self.fields
            .binary_search_by_key(&index, |field| field.index)
            .ok()
            .map(|pos| &self.fields[pos])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Collects fields in any order and validates them on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn field(mut self, index: u16, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            index,
            name: name.into(),
            kind,
        });
        self
    }

    /// Sort fields by index and reject duplicate indices.
    pub fn build(mut self) -> Result<Schema> {
        self.fields.sort_by_key(|field| field.index);
        if let Some(pair) = self.fields.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(CodecError::DuplicateIndex {
                schema: self.name,
                index: pair[0].index,
            });
        }
        Ok(Schema {
            name: self.name,
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_sorted_by_index() {
        let schema = Schema::builder("Chat")
            .field(2, "message", FieldKind::Str)
            .field(0, "sender", FieldKind::Str)
            .field(1, "channel", FieldKind::Short)
            .build()
            .unwrap();

        let order: Vec<_> = schema.fields().iter().map(Field::name).collect();
        assert_eq!(order, ["sender", "channel", "message"]);
        assert_eq!(schema.field(1).unwrap().kind(), &FieldKind::Short);
        assert!(schema.field(3).is_none());
        assert_eq!(schema.field_by_name("message").unwrap().index(), 2);
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let result = Schema::builder("Broken")
            .field(1, "a", FieldKind::Int)
            .field(1, "b", FieldKind::Str)
            .build();

        assert!(matches!(
            result,
            Err(CodecError::DuplicateIndex { ref schema, index: 1 }) if schema == "Broken"
        ));
    }

    #[test]
    fn empty_schema_is_valid() {
        let schema = Schema::builder("Ping").build().unwrap();
        assert!(schema.is_empty());
        assert_eq!(schema.name(), "Ping");
    }

    #[test]
    fn kind_names() {
        assert_eq!(FieldKind::array_of(FieldKind::Bool).name(), "array");
        assert_eq!(FieldKind::Double.name(), "double");
    }
}
