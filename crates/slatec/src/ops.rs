use crate::version::VmVersion;

/// Opcode table for the ledger VM's assembly surface, reduced to the ops the
/// compiler core emits. Each op knows the lowest VM version that supports it;
/// the assembler refuses to emit an op above the requested target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Int,
    Byte,
    Txn,
    Txna,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    And,
    Or,
    Len,
    Itob,
    Btoi,
    Concat,
    Substring3,
    Extract3,
    ExtractUint16,
    ExtractUint64,
    GetBit,
    SetBit,
    Load,
    Store,
    Log,
    Bnz,
    Branch,
    Err,
    Return,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Int => "int",
            Op::Byte => "byte",
            Op::Txn => "txn",
            Op::Txna => "txna",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Eq => "==",
            Op::Neq => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Not => "!",
            Op::And => "&&",
            Op::Or => "||",
            Op::Len => "len",
            Op::Itob => "itob",
            Op::Btoi => "btoi",
            Op::Concat => "concat",
            Op::Substring3 => "substring3",
            Op::Extract3 => "extract3",
            Op::ExtractUint16 => "extract_uint16",
            Op::ExtractUint64 => "extract_uint64",
            Op::GetBit => "getbit",
            Op::SetBit => "setbit",
            Op::Load => "load",
            Op::Store => "store",
            Op::Log => "log",
            Op::Bnz => "bnz",
            Op::Branch => "b",
            Op::Err => "err",
            Op::Return => "return",
        }
    }

    pub fn min_version(self) -> VmVersion {
        match self {
            Op::GetBit | Op::SetBit => VmVersion(3),
            Op::Extract3 | Op::ExtractUint16 | Op::ExtractUint64 | Op::Log => VmVersion(5),
            _ => VmVersion::MIN,
        }
    }
}
