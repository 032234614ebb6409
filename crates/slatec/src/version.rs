use std::fmt;

/// Target version of the ledger VM. Opcodes carry the lowest version that
/// supports them; assembly refuses to emit an op above the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmVersion(pub u8);

impl VmVersion {
    /// Lowest version the assembler targets at all.
    pub const MIN: VmVersion = VmVersion(2);

    /// Default target when the caller expresses no preference. High enough
    /// for every construct the router can emit.
    pub const DEFAULT: VmVersion = VmVersion(8);
}

impl fmt::Display for VmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
