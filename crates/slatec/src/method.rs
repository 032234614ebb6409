use sha2::{Digest, Sha512_256};

use crate::abi::typespec::{split_top_level, TypeSpec};
use crate::error::Error;

/// Most positional arguments a method call may carry inline; arguments past
/// the limit travel regrouped in one trailing tuple.
pub const METHOD_ARG_LIMIT: usize = 15;

/// Canonicalized method signature: argument and return types plus the
/// deterministic 4-byte selector the dispatcher matches at run time.
///
/// The selector always reflects the *original* ungrouped signature; the
/// grouped view only drives call-data decoding. The two views must never be
/// confused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    arg_types: Vec<TypeSpec>,
    grouped_arg_types: Vec<TypeSpec>,
    return_type: Option<TypeSpec>,
    selector: [u8; 4],
}

impl MethodDescriptor {
    /// Parse `name(type,...,type)return`, where `return` is a type or
    /// `void`. Signatures carry no argument names and no whitespace.
    pub fn from_signature(signature: &str) -> Result<MethodDescriptor, Error> {
        let open = signature.find('(').ok_or_else(|| {
            Error::signature(format!("{signature:?}: missing argument list"))
        })?;
        let name = &signature[..open];
        validate_method_name(name, signature)?;

        let rest = &signature[open + 1..];
        let close = matching_close(rest).ok_or_else(|| {
            Error::signature(format!("{signature:?}: unbalanced argument list"))
        })?;
        let args_str = &rest[..close];
        let ret_str = &rest[close + 1..];

        let arg_types = if args_str.is_empty() {
            Vec::new()
        } else {
            split_top_level(args_str)
                .into_iter()
                .map(|a| {
                    TypeSpec::parse(a).map_err(|e| {
                        Error::signature(format!("{signature:?}: argument {a:?}: {}", e.message))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let return_type = match ret_str {
            "void" => None,
            "" => {
                return Err(Error::signature(format!(
                    "{signature:?}: missing return type (use \"void\")"
                )))
            }
            other => Some(TypeSpec::parse(other).map_err(|e| {
                Error::signature(format!("{signature:?}: return type: {}", e.message))
            })?),
        };

        let grouped_arg_types = group_args(&arg_types)?;
        let selector = selector_of(&canonical_signature(name, &arg_types, return_type.as_ref()));

        Ok(MethodDescriptor {
            name: name.to_string(),
            arg_types,
            grouped_arg_types,
            return_type,
            selector,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Original argument types, as declared.
    pub fn arg_types(&self) -> &[TypeSpec] {
        &self.arg_types
    }

    /// Argument types as they travel in call data: identical to
    /// [`Self::arg_types`] up to the limit, with arguments 15..N collapsed
    /// into one trailing tuple beyond it.
    pub fn grouped_arg_types(&self) -> &[TypeSpec] {
        &self.grouped_arg_types
    }

    pub fn return_type(&self) -> Option<&TypeSpec> {
        self.return_type.as_ref()
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    /// The canonical ungrouped signature the selector is derived from.
    pub fn signature(&self) -> String {
        canonical_signature(&self.name, &self.arg_types, self.return_type.as_ref())
    }

    /// Call-data argument count at run time: the selector plus one slot per
    /// grouped argument.
    pub fn call_data_args(&self) -> usize {
        1 + self.grouped_arg_types.len()
    }
}

fn canonical_signature(name: &str, args: &[TypeSpec], ret: Option<&TypeSpec>) -> String {
    let args: Vec<String> = args.iter().map(TypeSpec::canonical).collect();
    let ret = ret.map_or_else(|| "void".to_string(), TypeSpec::canonical);
    format!("{name}({}){ret}", args.join(","))
}

/// First 4 bytes of SHA-512/256 over the canonical signature.
fn selector_of(signature: &str) -> [u8; 4] {
    let mut h = Sha512_256::new();
    h.update(signature.as_bytes());
    let digest = h.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

fn group_args(args: &[TypeSpec]) -> Result<Vec<TypeSpec>, Error> {
    if args.len() <= METHOD_ARG_LIMIT {
        return Ok(args.to_vec());
    }
    let mut grouped: Vec<TypeSpec> = args[..METHOD_ARG_LIMIT - 1].to_vec();
    grouped.push(TypeSpec::Tuple(args[METHOD_ARG_LIMIT - 1..].to_vec()));
    if grouped.len() > METHOD_ARG_LIMIT {
        return Err(Error::internal(format!(
            "argument grouping produced {} call-data arguments",
            grouped.len()
        )));
    }
    Ok(grouped)
}

fn validate_method_name(name: &str, signature: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let first = chars.next().ok_or_else(|| {
        Error::signature(format!("{signature:?}: empty method name"))
    })?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(Error::signature(format!(
            "{signature:?}: method name must start with [A-Za-z_]"
        )));
    }
    for c in chars {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::signature(format!(
                "{signature:?}: invalid character {c:?} in method name"
            )));
        }
    }
    Ok(())
}

/// Index of the `)` closing an already-consumed `(`.
fn matching_close(s: &str) -> Option<usize> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_signatures_yield_identical_selectors() {
        let a = MethodDescriptor::from_signature("add(uint64,uint64)uint64").expect("parse");
        let b = MethodDescriptor::from_signature("add(uint64,uint64)uint64").expect("parse");
        assert_eq!(a.selector(), b.selector());
        assert_eq!(a.signature(), "add(uint64,uint64)uint64");
    }

    #[test]
    fn selector_depends_on_types_and_name() {
        let a = MethodDescriptor::from_signature("add(uint64,uint64)uint64").expect("parse");
        let b = MethodDescriptor::from_signature("add(uint64,uint32)uint64").expect("parse");
        let c = MethodDescriptor::from_signature("sub(uint64,uint64)uint64").expect("parse");
        assert_ne!(a.selector(), b.selector());
        assert_ne!(a.selector(), c.selector());
    }

    #[test]
    fn argument_names_are_rejected() {
        for bad in [
            "add(uint64 a,uint64 b)uint64",
            "add(uint64,uint64)",
            "add(uint64;uint64)void",
            "(uint64)void",
            "9add(uint64)void",
        ] {
            assert!(MethodDescriptor::from_signature(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn void_and_tuple_returns_parse() {
        let void = MethodDescriptor::from_signature("ping()void").expect("parse");
        assert_eq!(void.return_type(), None);
        assert_eq!(void.call_data_args(), 1);

        let pair = MethodDescriptor::from_signature("pair()(uint64,bool)").expect("parse");
        assert_eq!(
            pair.return_type(),
            Some(&TypeSpec::Tuple(vec![
                TypeSpec::Uint { bits: 64 },
                TypeSpec::Bool
            ]))
        );
    }

    #[test]
    fn seventeen_arguments_group_into_fifteen_slots() {
        let args: Vec<String> = (0..17).map(|_| "uint64".to_string()).collect();
        let sig = format!("many({})void", args.join(","));
        let d = MethodDescriptor::from_signature(&sig).expect("parse");

        assert_eq!(d.arg_types().len(), 17);
        assert_eq!(d.grouped_arg_types().len(), 15);
        assert_eq!(
            d.grouped_arg_types()[14],
            TypeSpec::Tuple(vec![TypeSpec::Uint { bits: 64 }; 3])
        );
        assert_eq!(d.call_data_args(), 16);
        // Selector still reflects all 17 original types.
        assert_eq!(d.signature(), sig);

        let ungrouped: Vec<String> = (0..15).map(|_| "uint64".to_string()).collect();
        let short = MethodDescriptor::from_signature(&format!(
            "many({})void",
            ungrouped.join(",")
        ))
        .expect("parse");
        assert_ne!(d.selector(), short.selector());
    }

    #[test]
    fn fifteen_arguments_stay_ungrouped() {
        let args: Vec<String> = (0..15).map(|_| "bool".to_string()).collect();
        let sig = format!("flags({})void", args.join(","));
        let d = MethodDescriptor::from_signature(&sig).expect("parse");
        assert_eq!(d.grouped_arg_types(), d.arg_types());
        assert_eq!(d.call_data_args(), 16);
    }
}
