use std::fmt;

use crate::error::Error;

/// Description of an ABI type. A spec is *static* when its encoded byte
/// length is computable without a value, i.e. it contains no dynamic array,
/// string, or tuple with a dynamic member, transitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    Uint { bits: u16 },
    Bool,
    Byte,
    Address,
    StaticArray { elem: Box<TypeSpec>, len: u16 },
    DynamicArray { elem: Box<TypeSpec> },
    Tuple(Vec<TypeSpec>),
    String,
}

/// Byte width of a dynamic-field offset slot in the head region.
pub const OFFSET_WIDTH: usize = 2;

/// Fixed byte width of an address.
pub const ADDRESS_LEN: usize = 20;

impl TypeSpec {
    pub fn uint(bits: u16) -> Result<TypeSpec, Error> {
        let spec = TypeSpec::Uint { bits };
        spec.validate()?;
        Ok(spec)
    }

    pub fn static_array(elem: TypeSpec, len: u16) -> TypeSpec {
        TypeSpec::StaticArray {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn dynamic_array(elem: TypeSpec) -> TypeSpec {
        TypeSpec::DynamicArray {
            elem: Box::new(elem),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            TypeSpec::Uint { bits } => {
                if *bits == 0 || *bits > 512 || *bits % 8 != 0 {
                    return Err(Error::ty(format!(
                        "uint bit width must be a multiple of 8 in 8..=512, got {bits}"
                    )));
                }
                Ok(())
            }
            TypeSpec::Bool | TypeSpec::Byte | TypeSpec::Address | TypeSpec::String => Ok(()),
            TypeSpec::StaticArray { elem, .. } | TypeSpec::DynamicArray { elem } => {
                elem.validate()
            }
            TypeSpec::Tuple(members) => {
                for m in members {
                    m.validate()?;
                }
                Ok(())
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        match self {
            TypeSpec::DynamicArray { .. } | TypeSpec::String => true,
            TypeSpec::StaticArray { elem, .. } => elem.is_dynamic(),
            TypeSpec::Tuple(members) => members.iter().any(TypeSpec::is_dynamic),
            _ => false,
        }
    }

    /// Encoded byte length, or `None` for dynamic specs. Accounts for
    /// bool-run packing inside arrays and tuples; a standalone bool is one
    /// byte.
    pub fn static_size(&self) -> Option<usize> {
        match self {
            TypeSpec::Uint { bits } => Some(usize::from(*bits) / 8),
            TypeSpec::Bool | TypeSpec::Byte => Some(1),
            TypeSpec::Address => Some(ADDRESS_LEN),
            TypeSpec::String | TypeSpec::DynamicArray { .. } => None,
            TypeSpec::StaticArray { elem, len } => {
                let len = usize::from(*len);
                if **elem == TypeSpec::Bool {
                    Some(len.div_ceil(8))
                } else {
                    elem.static_size().map(|s| s * len)
                }
            }
            TypeSpec::Tuple(members) => {
                if self.is_dynamic() {
                    None
                } else {
                    Some(sequence_head_size(members))
                }
            }
        }
    }

    /// Bytes this spec occupies in an enclosing head region: its static size,
    /// or an offset slot when dynamic. Bool is reported as 1 here; run
    /// packing is applied by the sequence-level layout, not per member.
    pub(crate) fn head_slot_size(&self) -> usize {
        match self.static_size() {
            Some(n) => n,
            None => OFFSET_WIDTH,
        }
    }

    /// Canonical type string as it appears in method signatures.
    pub fn canonical(&self) -> String {
        match self {
            TypeSpec::Uint { bits } => format!("uint{bits}"),
            TypeSpec::Bool => "bool".to_string(),
            TypeSpec::Byte => "byte".to_string(),
            TypeSpec::Address => "address".to_string(),
            TypeSpec::String => "string".to_string(),
            TypeSpec::StaticArray { elem, len } => format!("{}[{len}]", elem.canonical()),
            TypeSpec::DynamicArray { elem } => format!("{}[]", elem.canonical()),
            TypeSpec::Tuple(members) => {
                let inner: Vec<String> = members.iter().map(TypeSpec::canonical).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    /// Parse a canonical type string. Exact inverse of [`TypeSpec::canonical`];
    /// whitespace is not tolerated.
    pub fn parse(s: &str) -> Result<TypeSpec, Error> {
        let (spec, rest) = parse_prefix(s)?;
        if !rest.is_empty() {
            return Err(Error::signature(format!(
                "trailing input {rest:?} after type {:?}",
                spec.canonical()
            )));
        }
        spec.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Head-region size of a member sequence, with consecutive bool members
/// packed 8-to-a-byte and each dynamic member occupying an offset slot.
pub(crate) fn sequence_head_size(members: &[TypeSpec]) -> usize {
    let mut size = 0usize;
    let mut i = 0usize;
    while i < members.len() {
        if members[i] == TypeSpec::Bool {
            let run_start = i;
            while i < members.len() && members[i] == TypeSpec::Bool {
                i += 1;
            }
            size += (i - run_start).div_ceil(8);
        } else {
            size += members[i].head_slot_size();
            i += 1;
        }
    }
    size
}

fn parse_prefix(s: &str) -> Result<(TypeSpec, &str), Error> {
    if s.is_empty() {
        return Err(Error::signature("empty type string"));
    }
    let (base, mut rest) = if let Some(inner_start) = s.strip_prefix('(') {
        let close = matching_paren(inner_start)
            .ok_or_else(|| Error::signature(format!("unbalanced parentheses in {s:?}")))?;
        let inner = &inner_start[..close];
        let members = if inner.is_empty() {
            Vec::new()
        } else {
            split_top_level(inner)
                .into_iter()
                .map(|m| TypeSpec::parse(m))
                .collect::<Result<Vec<_>, _>>()?
        };
        (TypeSpec::Tuple(members), &inner_start[close + 1..])
    } else {
        let token_end = s.find('[').unwrap_or(s.len());
        let token = &s[..token_end];
        let base = parse_base(token)?;
        (base, &s[token_end..])
    };

    let mut spec = base;
    while let Some(after_open) = rest.strip_prefix('[') {
        let close = after_open
            .find(']')
            .ok_or_else(|| Error::signature(format!("unterminated array suffix in {s:?}")))?;
        let dims = &after_open[..close];
        spec = if dims.is_empty() {
            TypeSpec::dynamic_array(spec)
        } else {
            let len: u16 = dims.parse().map_err(|_| {
                Error::signature(format!("invalid static array length {dims:?} in {s:?}"))
            })?;
            TypeSpec::static_array(spec, len)
        };
        rest = &after_open[close + 1..];
    }
    Ok((spec, rest))
}

fn parse_base(token: &str) -> Result<TypeSpec, Error> {
    match token {
        "bool" => Ok(TypeSpec::Bool),
        "byte" => Ok(TypeSpec::Byte),
        "address" => Ok(TypeSpec::Address),
        "string" => Ok(TypeSpec::String),
        _ => {
            if let Some(bits) = token.strip_prefix("uint") {
                let bits: u16 = bits.parse().map_err(|_| {
                    Error::signature(format!("invalid uint bit width in {token:?}"))
                })?;
                TypeSpec::uint(bits).map_err(|e| Error::signature(e.message))
            } else {
                Err(Error::signature(format!("unknown type {token:?}")))
            }
        }
    }
}

/// Index of the `)` matching an already-consumed `(`, scanning `s`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Split on commas not nested inside parentheses.
pub(crate) fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}
