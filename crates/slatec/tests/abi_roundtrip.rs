use slatec::abi::{decode_value, encode_value, TypeSpec, Value};

fn u64spec() -> TypeSpec {
    TypeSpec::Uint { bits: 64 }
}

fn round_trip(spec: &TypeSpec, value: &Value) {
    let enc = encode_value(spec, value)
        .unwrap_or_else(|e| panic!("encode {} failed: {e}", spec.canonical()));
    let dec = decode_value(spec, &enc)
        .unwrap_or_else(|e| panic!("decode {} failed: {e}", spec.canonical()));
    assert_eq!(&dec, value, "round trip for {}", spec.canonical());
}

#[test]
fn static_specs_round_trip() {
    round_trip(&u64spec(), &Value::Uint(u64::MAX));
    round_trip(&TypeSpec::Uint { bits: 8 }, &Value::Uint(0));
    round_trip(&TypeSpec::Bool, &Value::Bool(true));
    round_trip(&TypeSpec::Byte, &Value::Byte(0x5a));
    round_trip(&TypeSpec::Address, &Value::Address([7u8; 20]));
    round_trip(
        &TypeSpec::static_array(u64spec(), 3),
        &Value::Array(vec![Value::Uint(1), Value::Uint(2), Value::Uint(3)]),
    );
    round_trip(
        &TypeSpec::Tuple(vec![
            u64spec(),
            TypeSpec::Bool,
            TypeSpec::Bool,
            TypeSpec::Address,
        ]),
        &Value::Array(vec![
            Value::Uint(9),
            Value::Bool(false),
            Value::Bool(true),
            Value::Address([1u8; 20]),
        ]),
    );
}

#[test]
fn dynamic_specs_round_trip() {
    round_trip(&TypeSpec::String, &Value::Str("hello".to_string()));
    round_trip(&TypeSpec::String, &Value::Str(String::new()));
    round_trip(
        &TypeSpec::dynamic_array(u64spec()),
        &Value::Array(vec![Value::Uint(10), Value::Uint(20)]),
    );
    round_trip(&TypeSpec::dynamic_array(u64spec()), &Value::Array(vec![]));
    round_trip(
        &TypeSpec::dynamic_array(TypeSpec::Bool),
        &Value::Array(vec![Value::Bool(true); 11]),
    );
    round_trip(
        &TypeSpec::Tuple(vec![
            TypeSpec::String,
            u64spec(),
            TypeSpec::dynamic_array(TypeSpec::String),
        ]),
        &Value::Array(vec![
            Value::Str("head".to_string()),
            Value::Uint(4),
            Value::Array(vec![
                Value::Str("a".to_string()),
                Value::Str("bc".to_string()),
            ]),
        ]),
    );
    // Static array of dynamic members still uses offset-table encoding.
    round_trip(
        &TypeSpec::static_array(TypeSpec::String, 2),
        &Value::Array(vec![
            Value::Str("x".to_string()),
            Value::Str("yz".to_string()),
        ]),
    );
}

#[test]
fn head_region_length_equals_sum_of_slot_sizes() {
    // Each dynamic top-level field contributes a 2-byte offset slot; static
    // fields contribute their fixed width. The first dynamic offset marks
    // the head boundary.
    let cases: Vec<(TypeSpec, Value, usize)> = vec![
        (
            TypeSpec::Tuple(vec![u64spec(), TypeSpec::String]),
            Value::Array(vec![Value::Uint(1), Value::Str("abc".to_string())]),
            8 + 2,
        ),
        (
            TypeSpec::Tuple(vec![
                TypeSpec::String,
                TypeSpec::Address,
                TypeSpec::dynamic_array(u64spec()),
            ]),
            Value::Array(vec![
                Value::Str("s".to_string()),
                Value::Address([0u8; 20]),
                Value::Array(vec![Value::Uint(5)]),
            ]),
            2 + 20 + 2,
        ),
    ];
    for (spec, value, head) in cases {
        let enc = encode_value(&spec, &value).expect("encode");
        let first_offset = match &spec {
            TypeSpec::Tuple(members) => {
                // Locate the first dynamic member's offset slot.
                let mut off = 0usize;
                let mut slot = None;
                for m in members {
                    if m.is_dynamic() {
                        slot = Some(off);
                        break;
                    }
                    off += m.static_size().expect("static member");
                }
                let slot = slot.expect("case has a dynamic member");
                usize::from(u16::from_be_bytes([enc[slot], enc[slot + 1]]))
            }
            _ => unreachable!(),
        };
        assert_eq!(first_offset, head, "head size for {}", spec.canonical());
    }
}

#[test]
fn nine_bool_tuple_occupies_two_bytes() {
    let spec = TypeSpec::Tuple(vec![TypeSpec::Bool; 9]);
    let mut vals = vec![Value::Bool(false); 9];
    vals[8] = Value::Bool(true);
    let enc = encode_value(&spec, &Value::Array(vals.clone())).expect("encode");
    assert_eq!(enc.len(), 2);
    assert_eq!(enc[1] & 0x80, 0x80, "9th bool sits in the high bit of byte 1");
    assert_eq!(
        decode_value(&spec, &enc).expect("decode"),
        Value::Array(vals)
    );
}
