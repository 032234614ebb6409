//! Embedded compiler for the slate ledger VM.
//!
//! Builds expression trees, lowers them to stack-machine assembly with
//! per-op version gating, encodes and decodes ABI values, and compiles a set
//! of typed contract method handlers into one validation program pair plus a
//! machine-readable interface descriptor.

pub mod abi;
pub mod ast;
pub mod contract;
pub mod emit;
pub mod error;
pub mod method;
pub mod ops;
pub mod router;
pub mod version;

pub use abi::{AbiValue, CodecGen, OffsetReadMode, TypeSpec, Value};
pub use ast::Expr;
pub use contract::ContractDoc;
pub use emit::{assemble, Program};
pub use error::{Error, ErrorKind};
pub use method::{MethodDescriptor, METHOD_ARG_LIMIT};
pub use router::{BareHandler, CompletionAction, MethodBody, Router, RouterArtifact};
pub use version::VmVersion;
