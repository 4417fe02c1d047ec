//! Byte-exact wire conformance matrix.

use protopack::{decode, encode, MapKey, SchemaRegistry, Value};

fn scalars_registry() -> SchemaRegistry {
    SchemaRegistry::parse(&[r#"
        syntax = "proto3";
        message Scalars {
            double f_double = 1;
            float f_float = 2;
            int32 f_int32 = 3;
            int64 f_int64 = 4;
            uint32 f_uint32 = 5;
            uint64 f_uint64 = 6;
            sint32 f_sint32 = 7;
            sint64 f_sint64 = 8;
            fixed32 f_fixed32 = 9;
            fixed64 f_fixed64 = 10;
            sfixed32 f_sfixed32 = 11;
            sfixed64 f_sfixed64 = 12;
            bool f_bool = 13;
            string f_string = 14;
            bytes f_bytes = 15;
        }
    "#])
    .unwrap()
}

fn one(name: &str, value: Value) -> Value {
    Value::record([(name, value)])
}

#[test]
fn scalar_encodings() {
    let registry = scalars_registry();
    let cases: Vec<(&str, Value, Vec<u8>)> = vec![
        (
            "f_double",
            Value::Float(1.0),
            b"\x09\x00\x00\x00\x00\x00\x00\xf0\x3f".to_vec(),
        ),
        (
            "f_float",
            Value::Float(1.5),
            b"\x15\x00\x00\xc0\x3f".to_vec(),
        ),
        ("f_int32", Value::Int(150), b"\x18\x96\x01".to_vec()),
        (
            "f_int64",
            Value::Int(-2),
            b"\x20\xfe\xff\xff\xff\xff\xff\xff\xff\xff\x01".to_vec(),
        ),
        ("f_uint32", Value::UInt(300), b"\x28\xac\x02".to_vec()),
        (
            "f_uint64",
            Value::UInt(u64::MAX),
            b"\x30\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01".to_vec(),
        ),
        ("f_sint32", Value::Int(-1), b"\x38\x01".to_vec()),
        ("f_sint32", Value::Int(1), b"\x38\x02".to_vec()),
        ("f_sint64", Value::Int(-2), b"\x40\x03".to_vec()),
        (
            "f_fixed32",
            Value::UInt(1),
            b"\x4d\x01\x00\x00\x00".to_vec(),
        ),
        (
            "f_fixed64",
            Value::UInt(1),
            b"\x51\x01\x00\x00\x00\x00\x00\x00\x00".to_vec(),
        ),
        (
            "f_sfixed32",
            Value::Int(-1),
            b"\x5d\xff\xff\xff\xff".to_vec(),
        ),
        (
            "f_sfixed64",
            Value::Int(-1),
            b"\x61\xff\xff\xff\xff\xff\xff\xff\xff".to_vec(),
        ),
        ("f_bool", Value::Bool(true), b"\x68\x01".to_vec()),
        ("f_string", Value::str("hi"), b"\x72\x02hi".to_vec()),
        (
            "f_bytes",
            Value::Bytes(vec![0, 1]),
            b"\x7a\x02\x00\x01".to_vec(),
        ),
    ];
    for (name, value, expected) in cases {
        let bytes = encode(&registry, "Scalars", &one(name, value.clone())).unwrap();
        assert_eq!(bytes, expected, "encoding {name}");
        let record = decode(&registry, "Scalars", &bytes).unwrap();
        assert_eq!(record.as_record().unwrap()[name], value, "decoding {name}");
    }
}

#[test]
fn negative_int32_occupies_ten_bytes() {
    let registry = scalars_registry();
    let bytes = encode(&registry, "Scalars", &one("f_int32", Value::Int(-1))).unwrap();
    assert_eq!(bytes, b"\x18\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01");
    let record = decode(&registry, "Scalars", &bytes).unwrap();
    assert_eq!(record.as_record().unwrap()["f_int32"], Value::Int(-1));
}

#[test]
fn fields_encode_in_ascending_number_order() {
    let registry = scalars_registry();
    // Record insertion order deliberately reversed.
    let value = Value::record([
        ("f_bool", Value::Bool(true)),
        ("f_int32", Value::Int(1)),
    ]);
    assert_eq!(
        encode(&registry, "Scalars", &value).unwrap(),
        b"\x18\x01\x68\x01"
    );
}

#[test]
fn nested_message_length_prefix_is_reserved_and_patched() {
    let registry = SchemaRegistry::parse(&[r#"
        syntax = "proto3";
        message Inner { int32 x = 1; }
        message Outer { Inner inner = 1; }
    "#])
    .unwrap();
    let value = Value::record([("inner", one("x", Value::Int(5)))]);
    let bytes = encode(&registry, "Outer", &value).unwrap();
    // The submessage length is a fixed-width four-byte varint with
    // continuation bits forced on.
    assert_eq!(bytes, b"\x0a\x82\x80\x80\x00\x08\x05");

    // Minimal and non-minimal prefixes decode identically.
    let padded = decode(&registry, "Outer", &bytes).unwrap();
    let minimal = decode(&registry, "Outer", b"\x0a\x02\x08\x05").unwrap();
    assert_eq!(padded, minimal);
}

#[test]
fn packed_run_bytes() {
    let registry = SchemaRegistry::parse(&[r#"
        syntax = "proto3";
        message M { repeated sint32 values = 1; }
    "#])
    .unwrap();
    let value = Value::record([(
        "values",
        Value::List(vec![Value::Int(0), Value::Int(-1), Value::Int(1)]),
    )]);
    assert_eq!(
        encode(&registry, "M", &value).unwrap(),
        b"\x0a\x83\x80\x80\x00\x00\x01\x02"
    );
}

#[test]
fn unpacked_repeated_bytes() {
    let registry = SchemaRegistry::parse(&[r#"
        syntax = "proto2";
        message M { repeated int32 values = 1; }
    "#])
    .unwrap();
    let value = Value::record([(
        "values",
        Value::List(vec![Value::Int(1), Value::Int(2)]),
    )]);
    assert_eq!(encode(&registry, "M", &value).unwrap(), b"\x08\x01\x08\x02");
}

#[test]
fn map_entry_bytes() {
    let registry = SchemaRegistry::parse(&[r#"
        syntax = "proto3";
        message M { map<int32, string> names = 1; }
    "#])
    .unwrap();
    let value = Value::record([(
        "names",
        Value::map([(MapKey::Int(2), Value::str("two"))]),
    )]);
    assert_eq!(
        encode(&registry, "M", &value).unwrap(),
        b"\x0a\x87\x80\x80\x00\x08\x02\x12\x03two"
    );
}

#[test]
fn zero_valued_map_entry_elides_entry_fields() {
    let registry = SchemaRegistry::parse(&[r#"
        syntax = "proto3";
        message M { map<int32, int32> pairs = 1; }
    "#])
    .unwrap();
    let value = Value::record([("pairs", Value::map([(MapKey::Int(0), Value::Int(0))]))]);
    // Both entry fields are default-valued, leaving an empty entry body.
    let bytes = encode(&registry, "M", &value).unwrap();
    assert_eq!(bytes, b"\x0a\x80\x80\x80\x00");
    let decoded = decode(&registry, "M", &bytes).unwrap();
    assert_eq!(
        decoded.as_record().unwrap()["pairs"],
        Value::map([(MapKey::Int(0), Value::Int(0))])
    );
}

#[test]
fn enum_fields_use_int32_semantics() {
    let registry = SchemaRegistry::parse(&[r#"
        syntax = "proto3";
        enum Mood { UNKNOWN = 0; HAPPY = 1; }
        message M { Mood mood = 1; }
    "#])
    .unwrap();
    let bytes = encode(&registry, "M", &one("mood", Value::Int(1))).unwrap();
    assert_eq!(bytes, b"\x08\x01");
    let negative = encode(&registry, "M", &one("mood", Value::Int(-1))).unwrap();
    assert_eq!(negative, b"\x08\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01");
}
