//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings
//! and wire-level markers that appear in machine-readable I/O produced by the
//! slate toolchain.

/// Schema version of the contract interface descriptor JSON emitted by
/// `slatec`'s router build.
pub const CONTRACT_DOC_SCHEMA_VERSION: &str = "slate.contract@0.1.0";

/// Four-byte event marker prefixed to every logged method return value, so
/// off-ledger observers can distinguish method returns from arbitrary log
/// output.
pub const RETURN_EVENT_MARKER: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];
