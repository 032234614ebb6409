//! ABI type model and codec.

pub mod codec;
pub mod gen;
pub mod typespec;
pub mod value;

pub use codec::{decode_value, encode_value};
pub use gen::{AbiValue, CodecGen, OffsetReadMode};
pub use typespec::TypeSpec;
pub use value::Value;
