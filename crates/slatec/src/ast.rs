use crate::ops::Op;
use crate::version::VmVersion;

/// Stack type of an expression's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackTy {
    Uint,
    Bytes,
    /// Produces nothing on the stack.
    Void,
}

/// Scalar transaction fields the dispatch layer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnField {
    /// Zero for the creation invocation of a program instance.
    AppId,
    /// Completion-action tag of the incoming call.
    OnCompletion,
    /// Number of call-data arguments supplied.
    NumAppArgs,
}

impl TxnField {
    pub fn mnemonic(self) -> &'static str {
        match self {
            TxnField::AppId => "ApplicationId",
            TxnField::OnCompletion => "OnCompletion",
            TxnField::NumAppArgs => "NumAppArgs",
        }
    }

    pub fn ty(self) -> StackTy {
        StackTy::Uint
    }
}

/// Indexed transaction fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnArrayField {
    /// Raw call-data argument bytes by positional index.
    AppArgs,
}

impl TxnArrayField {
    pub fn mnemonic(self) -> &'static str {
        match self {
            TxnArrayField::AppArgs => "ApplicationArgs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Len,
    Itob,
    Btoi,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaryOp {
    And,
    Or,
    Concat,
}

/// Width selector for the extract-uint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UintWidth {
    U16,
    U64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondArm {
    pub test: Expr,
    pub body: Expr,
}

/// Expression tree lowered by [`crate::emit::assemble`] into linear assembly
/// for the stack VM.
///
/// Scratch slots are referred to by name; the assembler resolves names to
/// numeric slots deterministically in first-use order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Int(u64),
    Bytes(Vec<u8>),
    Txn(TxnField),
    Txna(TxnArrayField, u8),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Nary(NaryOp, Vec<Expr>),
    /// `source, start, end` — byte slice with stack operands.
    Substring3(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `source, start, len` — byte slice with stack operands.
    Extract3(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `source, start` — big-endian uint read of the given width.
    ExtractUint(UintWidth, Box<Expr>, Box<Expr>),
    /// `source, bit_index` — for byte sources, bit 0 is the most significant
    /// bit of the first byte.
    GetBit(Box<Expr>, Box<Expr>),
    /// `target, bit_index, bit_value`.
    SetBit(Box<Expr>, Box<Expr>, Box<Expr>),
    Load { slot: String, ty: StackTy },
    Store { slot: String, value: Box<Expr> },
    /// All elements but the last must be void-typed.
    Seq(Vec<Expr>),
    /// Multi-way conditional: first arm whose test is nonzero runs; falls
    /// into the VM's failure op when no arm matches.
    Cond(Vec<CondArm>),
    Log(Box<Expr>),
    Approve,
    Reject,
}

impl Expr {
    pub fn int(n: u64) -> Expr {
        Expr::Int(n)
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Expr {
        Expr::Bytes(b.into())
    }

    pub fn load(slot: impl Into<String>, ty: StackTy) -> Expr {
        Expr::Load {
            slot: slot.into(),
            ty,
        }
    }

    pub fn store(slot: impl Into<String>, value: Expr) -> Expr {
        Expr::Store {
            slot: slot.into(),
            value: Box::new(value),
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(BinaryOp::Eq, Box::new(lhs), Box::new(rhs))
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(BinaryOp::Add, Box::new(lhs), Box::new(rhs))
    }

    /// N-ary logical and. A single operand collapses to itself.
    pub fn and(mut operands: Vec<Expr>) -> Expr {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Nary(NaryOp::And, operands)
        }
    }

    pub fn or(mut operands: Vec<Expr>) -> Expr {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Nary(NaryOp::Or, operands)
        }
    }

    pub fn concat(mut operands: Vec<Expr>) -> Expr {
        if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Nary(NaryOp::Concat, operands)
        }
    }

    pub fn len(source: Expr) -> Expr {
        Expr::Unary(UnaryOp::Len, Box::new(source))
    }

    pub fn itob(value: Expr) -> Expr {
        Expr::Unary(UnaryOp::Itob, Box::new(value))
    }

    pub fn btoi(source: Expr) -> Expr {
        Expr::Unary(UnaryOp::Btoi, Box::new(source))
    }

    pub fn seq(exprs: Vec<Expr>) -> Expr {
        Expr::Seq(exprs)
    }

    pub fn type_of(&self) -> StackTy {
        match self {
            Expr::Int(_) => StackTy::Uint,
            Expr::Bytes(_) => StackTy::Bytes,
            Expr::Txn(f) => f.ty(),
            Expr::Txna(..) => StackTy::Bytes,
            Expr::Unary(op, _) => match op {
                UnaryOp::Len | UnaryOp::Btoi | UnaryOp::Not => StackTy::Uint,
                UnaryOp::Itob => StackTy::Bytes,
            },
            Expr::Binary(..) => StackTy::Uint,
            Expr::Nary(op, _) => match op {
                NaryOp::And | NaryOp::Or => StackTy::Uint,
                NaryOp::Concat => StackTy::Bytes,
            },
            Expr::Substring3(..) | Expr::Extract3(..) => StackTy::Bytes,
            Expr::ExtractUint(..) | Expr::GetBit(..) => StackTy::Uint,
            Expr::SetBit(target, _, _) => target.type_of(),
            Expr::Load { ty, .. } => *ty,
            Expr::Store { .. } | Expr::Log(_) | Expr::Cond(_) => StackTy::Void,
            Expr::Seq(items) => items.last().map_or(StackTy::Void, Expr::type_of),
            Expr::Approve | Expr::Reject => StackTy::Void,
        }
    }

    /// True when every execution path through this expression terminates the
    /// program.
    pub fn has_return(&self) -> bool {
        match self {
            Expr::Approve | Expr::Reject => true,
            Expr::Seq(items) => items.last().is_some_and(Expr::has_return),
            Expr::Cond(arms) => !arms.is_empty() && arms.iter().all(|a| a.body.has_return()),
            _ => false,
        }
    }

    /// Lowest VM version able to run this expression, from the ops it uses.
    pub fn min_version(&self) -> VmVersion {
        fn max_v(a: VmVersion, b: VmVersion) -> VmVersion {
            if a >= b {
                a
            } else {
                b
            }
        }
        match self {
            Expr::Int(_) | Expr::Bytes(_) | Expr::Txn(_) | Expr::Txna(..) => VmVersion::MIN,
            Expr::Load { .. } => VmVersion::MIN,
            Expr::Unary(_, a) => a.min_version(),
            Expr::Binary(_, a, b) => max_v(a.min_version(), b.min_version()),
            Expr::Nary(_, items) | Expr::Seq(items) => items
                .iter()
                .map(Expr::min_version)
                .fold(VmVersion::MIN, max_v),
            Expr::Substring3(a, b, c) => {
                max_v(a.min_version(), max_v(b.min_version(), c.min_version()))
            }
            Expr::Extract3(a, b, c) => max_v(
                Op::Extract3.min_version(),
                max_v(a.min_version(), max_v(b.min_version(), c.min_version())),
            ),
            Expr::SetBit(a, b, c) => max_v(
                Op::SetBit.min_version(),
                max_v(a.min_version(), max_v(b.min_version(), c.min_version())),
            ),
            Expr::ExtractUint(w, a, b) => {
                let op = match w {
                    UintWidth::U16 => Op::ExtractUint16,
                    UintWidth::U64 => Op::ExtractUint64,
                };
                max_v(op.min_version(), max_v(a.min_version(), b.min_version()))
            }
            Expr::GetBit(a, b) => max_v(
                Op::GetBit.min_version(),
                max_v(a.min_version(), b.min_version()),
            ),
            Expr::Store { value, .. } => value.min_version(),
            Expr::Cond(arms) => arms
                .iter()
                .map(|a| max_v(a.test.min_version(), a.body.min_version()))
                .fold(VmVersion::MIN, max_v),
            Expr::Log(a) => max_v(Op::Log.min_version(), a.min_version()),
            Expr::Approve | Expr::Reject => VmVersion::MIN,
        }
    }
}
