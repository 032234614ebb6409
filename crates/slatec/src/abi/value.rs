use crate::abi::typespec::ADDRESS_LEN;

/// A concrete literal for the ABI codec. Arrays, tuples, and static arrays
/// all carry their members as [`Value::Array`]; the paired [`TypeSpec`]
/// decides the interpretation.
///
/// [`TypeSpec`]: crate::abi::TypeSpec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unsigned integer, widened to the declared bit width at encode time.
    Uint(u64),
    Bool(bool),
    Byte(u8),
    Address([u8; ADDRESS_LEN]),
    Array(Vec<Value>),
    Str(String),
}

impl Value {
    /// Short noun for error messages.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Address(_) => "address",
            Value::Array(_) => "array",
            Value::Str(_) => "string",
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Uint(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
