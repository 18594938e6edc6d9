use std::sync::Arc;

use netplay_codec::{decode, encode, FieldKind, Record, Schema, Value};
use proptest::prelude::*;

fn item_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("Item")
            .field(0, "id", FieldKind::Int)
            .field(1, "label", FieldKind::Str)
            .build()
            .unwrap(),
    )
}

fn inventory_schema() -> Schema {
    Schema::builder("Inventory")
        .field(0, "slot", FieldKind::Byte)
        .field(1, "count", FieldKind::Short)
        .field(2, "owner", FieldKind::Long)
        .field(3, "weight", FieldKind::Float)
        .field(4, "value", FieldKind::Double)
        .field(5, "locked", FieldKind::Bool)
        .field(6, "name", FieldKind::Str)
        .field(7, "main", FieldKind::Record(item_schema()))
        .field(8, "items", FieldKind::array_of(FieldKind::Record(item_schema())))
        .field(9, "tags", FieldKind::array_of(FieldKind::Str))
        .build()
        .unwrap()
}

fn item() -> impl Strategy<Value = Record> {
    (proptest::option::of(any::<i32>()), proptest::option::of(".{0,12}")).prop_map(
        |(id, label)| Record::new().with(0, id).with(1, label),
    )
}

fn inventory() -> impl Strategy<Value = Record> {
    (
        proptest::option::of(any::<i8>()),
        proptest::option::of(any::<i16>()),
        proptest::option::of(any::<i64>()),
        proptest::option::of(-1.0e6f32..1.0e6f32),
        proptest::option::of(-1.0e12f64..1.0e12f64),
        proptest::option::of(any::<bool>()),
        proptest::option::of(".{0,24}"),
        proptest::option::of(item()),
        proptest::option::of(proptest::collection::vec(item(), 0..4)),
        proptest::option::of(proptest::collection::vec(
            proptest::option::of("[a-z]{0,6}"),
            0..5,
        )),
    )
        .prop_map(
            |(slot, count, owner, weight, value, locked, name, main, items, tags)| {
                let tags = tags.map(|tags| {
                    Value::Array(tags.into_iter().map(Value::from).collect::<Vec<_>>())
                });
                Record::new()
                    .with(0, slot)
                    .with(1, count)
                    .with(2, owner)
                    .with(3, weight)
                    .with(4, value)
                    .with(5, locked)
                    .with(6, name)
                    .with(7, main)
                    .with(8, items)
                    .with(9, tags)
            },
        )
}

proptest! {
    #[test]
    fn decode_inverts_encode(record in inventory()) {
        let schema = inventory_schema();
        let bytes = encode(&record, &schema).unwrap();
        prop_assert_eq!(decode(&bytes, &schema).unwrap(), record);
    }

    #[test]
    fn decode_never_panics_on_garbage(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = decode(&bytes, &inventory_schema());
    }
}
