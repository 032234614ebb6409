//! Literal codec: bidirectional mapping between a [`Value`] and the flat byte
//! encoding of its [`TypeSpec`].
//!
//! Layout rules: static fields concatenate in declaration order; each dynamic
//! field occupies a 2-byte big-endian offset slot in the head, pointing into
//! the trailing tail region; dynamic arrays and strings prefix their payload
//! with a 2-byte big-endian count; consecutive bools inside a tuple or array
//! pack eight to a byte, most significant bit first, as a single run.

use crate::abi::typespec::{sequence_head_size, TypeSpec, ADDRESS_LEN, OFFSET_WIDTH};
use crate::abi::value::Value;
use crate::error::Error;

pub fn encode_value(spec: &TypeSpec, value: &Value) -> Result<Vec<u8>, Error> {
    spec.validate()?;
    enc(spec, value, "value")
}

pub fn decode_value(spec: &TypeSpec, bytes: &[u8]) -> Result<Value, Error> {
    spec.validate()?;
    dec(spec, bytes, "value")
}

fn shape_err(spec: &TypeSpec, value: &Value, path: &str) -> Error {
    Error::ty(format!(
        "{path}: expected {}, got {} literal",
        spec.canonical(),
        value.kind()
    ))
}

fn enc(spec: &TypeSpec, value: &Value, path: &str) -> Result<Vec<u8>, Error> {
    match (spec, value) {
        (TypeSpec::Uint { bits }, Value::Uint(n)) => {
            let nbytes = usize::from(*bits) / 8;
            if *bits < 64 && *n >= (1u64 << *bits) {
                return Err(Error::ty(format!(
                    "{path}: {n} does not fit in uint{bits}"
                )));
            }
            let wide = n.to_be_bytes();
            let mut out = vec![0u8; nbytes];
            if nbytes >= 8 {
                out[nbytes - 8..].copy_from_slice(&wide);
            } else {
                out.copy_from_slice(&wide[8 - nbytes..]);
            }
            Ok(out)
        }
        (TypeSpec::Bool, Value::Bool(b)) => Ok(vec![if *b { 0x80 } else { 0x00 }]),
        (TypeSpec::Byte, Value::Byte(b)) => Ok(vec![*b]),
        (TypeSpec::Address, Value::Address(a)) => Ok(a.to_vec()),
        (TypeSpec::String, Value::Str(s)) => {
            let bytes = s.as_bytes();
            let count = u16::try_from(bytes.len()).map_err(|_| {
                Error::ty(format!("{path}: string length {} exceeds u16", bytes.len()))
            })?;
            let mut out = count.to_be_bytes().to_vec();
            out.extend_from_slice(bytes);
            Ok(out)
        }
        (TypeSpec::StaticArray { elem, len }, Value::Array(items)) => {
            if items.len() != usize::from(*len) {
                return Err(Error::ty(format!(
                    "{path}: static array expects {len} elements, got {}",
                    items.len()
                )));
            }
            enc_sequence_uniform(elem, items, path)
        }
        (TypeSpec::DynamicArray { elem }, Value::Array(items)) => {
            let count = u16::try_from(items.len()).map_err(|_| {
                Error::ty(format!("{path}: array length {} exceeds u16", items.len()))
            })?;
            let mut out = count.to_be_bytes().to_vec();
            out.extend(enc_sequence_uniform(elem, items, path)?);
            Ok(out)
        }
        (TypeSpec::Tuple(members), Value::Array(items)) => {
            if items.len() != members.len() {
                return Err(Error::ty(format!(
                    "{path}: tuple expects {} members, got {}",
                    members.len(),
                    items.len()
                )));
            }
            let pairs: Vec<(&TypeSpec, &Value)> = members.iter().zip(items.iter()).collect();
            enc_sequence(&pairs, path)
        }
        _ => Err(shape_err(spec, value, path)),
    }
}

fn enc_sequence_uniform(elem: &TypeSpec, items: &[Value], path: &str) -> Result<Vec<u8>, Error> {
    let pairs: Vec<(&TypeSpec, &Value)> = items.iter().map(|v| (elem, v)).collect();
    enc_sequence(&pairs, path)
}

/// Encode a member sequence with head/tail layout and bool-run packing.
fn enc_sequence(pairs: &[(&TypeSpec, &Value)], path: &str) -> Result<Vec<u8>, Error> {
    let specs: Vec<TypeSpec> = pairs.iter().map(|(s, _)| (*s).clone()).collect();
    let head_size = sequence_head_size(&specs);

    let mut head: Vec<u8> = Vec::with_capacity(head_size);
    let mut tails: Vec<Vec<u8>> = Vec::new();
    // Positions in `head` where a 2-byte offset must be patched, paired with
    // the index of the tail entry it points at.
    let mut offset_slots: Vec<(usize, usize)> = Vec::new();

    let mut i = 0usize;
    while i < pairs.len() {
        let (spec, value) = pairs[i];
        if *spec == TypeSpec::Bool {
            let run_start = i;
            let mut packed: Vec<u8> = Vec::new();
            let mut bit = 0usize;
            while i < pairs.len() && *pairs[i].0 == TypeSpec::Bool {
                let on = match pairs[i].1 {
                    Value::Bool(b) => *b,
                    other => {
                        return Err(shape_err(
                            &TypeSpec::Bool,
                            other,
                            &format!("{path}[{i}]"),
                        ))
                    }
                };
                if bit % 8 == 0 {
                    packed.push(0);
                }
                if on {
                    let byte = packed.last_mut().expect("run byte exists");
                    *byte |= 0x80 >> (bit % 8);
                }
                bit += 1;
                i += 1;
            }
            debug_assert_eq!(packed.len(), (i - run_start).div_ceil(8));
            head.extend(packed);
        } else if spec.is_dynamic() {
            let encoded = enc(spec, value, &format!("{path}[{i}]"))?;
            offset_slots.push((head.len(), tails.len()));
            head.extend([0u8, 0u8]);
            tails.push(encoded);
            i += 1;
        } else {
            head.extend(enc(spec, value, &format!("{path}[{i}]"))?);
            i += 1;
        }
    }

    if head.len() != head_size {
        return Err(Error::internal(format!(
            "{path}: head layout mismatch, expected {head_size} bytes, built {}",
            head.len()
        )));
    }

    // Offset of tail k is head_size plus the lengths of tails 0..k.
    for (slot, tail_idx) in &offset_slots {
        let offset = head_size + tails[..*tail_idx].iter().map(Vec::len).sum::<usize>();
        let offset = u16::try_from(offset).map_err(|_| {
            Error::ty(format!("{path}: encoding exceeds 16-bit offset range"))
        })?;
        head[*slot..*slot + OFFSET_WIDTH].copy_from_slice(&offset.to_be_bytes());
    }

    let mut out = head;
    for tail in tails {
        out.extend(tail);
    }
    Ok(out)
}

fn dec(spec: &TypeSpec, bytes: &[u8], path: &str) -> Result<Value, Error> {
    match spec {
        TypeSpec::Uint { bits } => {
            let nbytes = usize::from(*bits) / 8;
            if bytes.len() != nbytes {
                return Err(Error::ty(format!(
                    "{path}: uint{bits} expects {nbytes} bytes, got {}",
                    bytes.len()
                )));
            }
            if nbytes > 8 && bytes[..nbytes - 8].iter().any(|b| *b != 0) {
                return Err(Error::ty(format!(
                    "{path}: uint{bits} value exceeds the 64-bit literal range"
                )));
            }
            let tail = &bytes[nbytes.saturating_sub(8)..];
            let mut wide = [0u8; 8];
            wide[8 - tail.len()..].copy_from_slice(tail);
            Ok(Value::Uint(u64::from_be_bytes(wide)))
        }
        TypeSpec::Bool => match bytes {
            [0x80] => Ok(Value::Bool(true)),
            [0x00] => Ok(Value::Bool(false)),
            _ => Err(Error::ty(format!(
                "{path}: bool expects one byte 0x80 or 0x00"
            ))),
        },
        TypeSpec::Byte => {
            if let [b] = bytes {
                Ok(Value::Byte(*b))
            } else {
                Err(Error::ty(format!(
                    "{path}: byte expects 1 byte, got {}",
                    bytes.len()
                )))
            }
        }
        TypeSpec::Address => {
            let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
                Error::ty(format!(
                    "{path}: address expects {ADDRESS_LEN} bytes, got {}",
                    bytes.len()
                ))
            })?;
            Ok(Value::Address(arr))
        }
        TypeSpec::String => {
            let (count, payload) = split_count(bytes, path)?;
            if payload.len() != count {
                return Err(Error::ty(format!(
                    "{path}: string length prefix {count} disagrees with payload {}",
                    payload.len()
                )));
            }
            let s = std::str::from_utf8(payload)
                .map_err(|_| Error::ty(format!("{path}: string payload is not UTF-8")))?;
            Ok(Value::Str(s.to_string()))
        }
        TypeSpec::StaticArray { elem, len } => {
            let specs = vec![(**elem).clone(); usize::from(*len)];
            Ok(Value::Array(dec_sequence(&specs, bytes, path)?))
        }
        TypeSpec::DynamicArray { elem } => {
            let (count, payload) = split_count(bytes, path)?;
            let specs = vec![(**elem).clone(); count];
            Ok(Value::Array(dec_sequence(&specs, payload, path)?))
        }
        TypeSpec::Tuple(members) => Ok(Value::Array(dec_sequence(members, bytes, path)?)),
    }
}

fn split_count<'a>(bytes: &'a [u8], path: &str) -> Result<(usize, &'a [u8]), Error> {
    if bytes.len() < OFFSET_WIDTH {
        return Err(Error::ty(format!(
            "{path}: missing 2-byte length prefix"
        )));
    }
    let count = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
    Ok((count, &bytes[OFFSET_WIDTH..]))
}

/// Layout of a member sequence: per-member positions plus head size. Shared
/// between the literal codec and the expression codec in `gen`.
pub(crate) struct SequenceLayout {
    positions: Vec<FieldPosKind>,
    pub(crate) head_size: usize,
    pub(crate) dynamic_count: usize,
}

/// Member position in a sequence encoding.
pub(crate) enum FieldPosKind {
    Static { off: usize, size: usize },
    PackedBool { byte: usize, bit: usize },
    /// `slot` is the head offset of the 2-byte offset slot; `rank` is the
    /// member's index among the sequence's dynamic members.
    Dynamic { slot: usize, rank: usize },
}

pub(crate) fn sequence_layout(specs: &[TypeSpec]) -> SequenceLayout {
    let mut positions = Vec::with_capacity(specs.len());
    let mut off = 0usize;
    let mut rank = 0usize;
    let mut i = 0usize;
    while i < specs.len() {
        if specs[i] == TypeSpec::Bool {
            let run_start = i;
            while i < specs.len() && specs[i] == TypeSpec::Bool {
                let k = i - run_start;
                positions.push(FieldPosKind::PackedBool {
                    byte: off + k / 8,
                    bit: k % 8,
                });
                i += 1;
            }
            off += (i - run_start).div_ceil(8);
        } else if specs[i].is_dynamic() {
            positions.push(FieldPosKind::Dynamic { slot: off, rank });
            off += OFFSET_WIDTH;
            rank += 1;
            i += 1;
        } else {
            let size = specs[i].static_size().expect("static member has a size");
            positions.push(FieldPosKind::Static { off, size });
            off += size;
            i += 1;
        }
    }
    SequenceLayout {
        positions,
        head_size: off,
        dynamic_count: rank,
    }
}

impl SequenceLayout {
    pub(crate) fn position(&self, index: usize) -> &FieldPosKind {
        &self.positions[index]
    }
}

fn dec_sequence(specs: &[TypeSpec], bytes: &[u8], path: &str) -> Result<Vec<Value>, Error> {
    let layout = sequence_layout(specs);
    if bytes.len() < layout.head_size {
        return Err(Error::ty(format!(
            "{path}: encoding shorter than its {}-byte head",
            layout.head_size
        )));
    }
    if layout.dynamic_count == 0 && bytes.len() != layout.head_size {
        return Err(Error::ty(format!(
            "{path}: static encoding expects exactly {} bytes, got {}",
            layout.head_size,
            bytes.len()
        )));
    }

    // Offsets must start at the head boundary and never go backwards.
    let mut offsets = Vec::with_capacity(layout.dynamic_count);
    for pos in &layout.positions {
        if let FieldPosKind::Dynamic { slot, .. } = pos {
            let off = usize::from(u16::from_be_bytes([bytes[*slot], bytes[*slot + 1]]));
            offsets.push(off);
        }
    }
    for (k, off) in offsets.iter().enumerate() {
        let lo = if k == 0 { layout.head_size } else { offsets[k - 1] };
        if *off < lo || *off > bytes.len() {
            return Err(Error::ty(format!(
                "{path}: dynamic field offset {off} out of range"
            )));
        }
    }
    if let Some(first) = offsets.first() {
        if *first != layout.head_size {
            return Err(Error::ty(format!(
                "{path}: first dynamic field offset {first} does not sit at the head boundary"
            )));
        }
    }

    let mut out = Vec::with_capacity(specs.len());
    for (i, spec) in specs.iter().enumerate() {
        let member_path = format!("{path}[{i}]");
        let value = match layout.position(i) {
            FieldPosKind::Static { off, size } => {
                dec(spec, &bytes[*off..*off + *size], &member_path)?
            }
            FieldPosKind::PackedBool { byte, bit } => {
                Value::Bool(bytes[*byte] & (0x80 >> bit) != 0)
            }
            FieldPosKind::Dynamic { rank, .. } => {
                let start = offsets[*rank];
                let end = offsets.get(*rank + 1).copied().unwrap_or(bytes.len());
                dec(spec, &bytes[start..end], &member_path)?
            }
        };
        out.push(value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u64spec() -> TypeSpec {
        TypeSpec::Uint { bits: 64 }
    }

    #[test]
    fn uint_encodes_big_endian_at_declared_width() {
        let spec = TypeSpec::Uint { bits: 32 };
        let enc = encode_value(&spec, &Value::Uint(0x0102_0304)).expect("encode");
        assert_eq!(enc, vec![1, 2, 3, 4]);
        assert_eq!(decode_value(&spec, &enc).expect("decode"), Value::Uint(0x0102_0304));

        let wide = TypeSpec::Uint { bits: 128 };
        let enc = encode_value(&wide, &Value::Uint(5)).expect("encode");
        assert_eq!(enc.len(), 16);
        assert_eq!(enc[15], 5);
        assert!(enc[..15].iter().all(|b| *b == 0));
    }

    #[test]
    fn uint_range_is_checked() {
        let spec = TypeSpec::Uint { bits: 8 };
        assert!(encode_value(&spec, &Value::Uint(256)).is_err());
        assert!(encode_value(&spec, &Value::Uint(255)).is_ok());
    }

    #[test]
    fn nine_bools_pack_into_two_bytes() {
        let spec = TypeSpec::Tuple(vec![TypeSpec::Bool; 9]);
        let mut vals = vec![Value::Bool(false); 9];
        vals[0] = Value::Bool(true);
        vals[8] = Value::Bool(true);
        let enc = encode_value(&spec, &Value::Array(vals.clone())).expect("encode");
        assert_eq!(enc, vec![0b1000_0000, 0b1000_0000]);
        assert_eq!(
            decode_value(&spec, &enc).expect("decode"),
            Value::Array(vals)
        );
    }

    #[test]
    fn bool_runs_break_at_non_bool_members() {
        let spec = TypeSpec::Tuple(vec![
            TypeSpec::Bool,
            TypeSpec::Bool,
            TypeSpec::Byte,
            TypeSpec::Bool,
        ]);
        let v = Value::Array(vec![
            Value::Bool(true),
            Value::Bool(true),
            Value::Byte(0xaa),
            Value::Bool(true),
        ]);
        let enc = encode_value(&spec, &v).expect("encode");
        assert_eq!(enc, vec![0b1100_0000, 0xaa, 0b1000_0000]);
        assert_eq!(decode_value(&spec, &enc).expect("decode"), v);
    }

    #[test]
    fn dynamic_tuple_head_offsets_point_into_tail() {
        // (uint64, string, bool[]) — head is 8 + 2 + 2 bytes.
        let spec = TypeSpec::Tuple(vec![
            u64spec(),
            TypeSpec::String,
            TypeSpec::dynamic_array(TypeSpec::Bool),
        ]);
        let v = Value::Array(vec![
            Value::Uint(7),
            Value::Str("hi".to_string()),
            Value::Array(vec![Value::Bool(true), Value::Bool(false), Value::Bool(true)]),
        ]);
        let enc = encode_value(&spec, &v).expect("encode");

        assert_eq!(u16::from_be_bytes([enc[8], enc[9]]), 12);
        // "hi" tail entry: 2-byte count + 2 bytes.
        assert_eq!(u16::from_be_bytes([enc[10], enc[11]]), 16);
        assert_eq!(&enc[12..16], &[0, 2, b'h', b'i']);
        assert_eq!(&enc[16..19], &[0, 3, 0b1010_0000]);
        assert_eq!(enc.len(), 19);

        assert_eq!(decode_value(&spec, &enc).expect("decode"), v);
    }

    #[test]
    fn static_array_length_mismatch_is_a_type_error() {
        let spec = TypeSpec::static_array(u64spec(), 3);
        let v = Value::Array(vec![Value::Uint(1), Value::Uint(2)]);
        let err = encode_value(&spec, &v).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Type);
    }

    #[test]
    fn decode_rejects_corrupt_offsets() {
        let spec = TypeSpec::Tuple(vec![u64spec(), TypeSpec::String]);
        let v = Value::Array(vec![Value::Uint(1), Value::Str("x".to_string())]);
        let mut enc = encode_value(&spec, &v).expect("encode");
        enc[9] = 0xff;
        assert!(decode_value(&spec, &enc).is_err());
    }

    #[test]
    fn nested_dynamic_round_trip() {
        // string[] — array of dynamic members exercises nested offset tables.
        let spec = TypeSpec::dynamic_array(TypeSpec::String);
        let v = Value::Array(vec![
            Value::Str("a".to_string()),
            Value::Str("".to_string()),
            Value::Str("abc".to_string()),
        ]);
        let enc = encode_value(&spec, &v).expect("encode");
        assert_eq!(decode_value(&spec, &enc).expect("decode"), v);
    }
}
