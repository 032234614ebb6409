use crate::ast::{BinaryOp, Expr, NaryOp, StackTy, UintWidth, UnaryOp};
use crate::error::Error;
use crate::ops::Op;
use crate::version::VmVersion;

/// Assembled program: linear assembly text plus the version it targets and a
/// short content fingerprint for reproducible-build checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub version: VmVersion,
    pub lines: Vec<String>,
    pub fingerprint: String,
}

impl Program {
    pub fn source(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Lower an expression tree to linear assembly for the given target version.
///
/// Fails with a version error when the tree uses an op the target does not
/// support, naming the op. Scratch-slot names resolve to numeric slots in
/// first-use order; label numbering is per-assembly and deterministic.
pub fn assemble(expr: &Expr, version: VmVersion) -> Result<Program, Error> {
    if version < VmVersion::MIN {
        return Err(Error::version(format!(
            "target {version} is below the assembler minimum {}",
            VmVersion::MIN
        )));
    }
    let mut asm = Assembler {
        version,
        lines: vec![format!("#pragma version {}", version.0)],
        slots: Vec::new(),
        label_seq: 0,
    };
    asm.emit(expr)?;
    let fingerprint = source_fingerprint(&asm.lines);
    Ok(Program {
        version,
        lines: asm.lines,
        fingerprint,
    })
}

fn source_fingerprint(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    let digest = blake3::hash(text.as_bytes());
    let b = digest.as_bytes();
    format!("{:02x}{:02x}{:02x}{:02x}", b[0], b[1], b[2], b[3])
}

struct Assembler {
    version: VmVersion,
    lines: Vec<String>,
    slots: Vec<String>,
    label_seq: usize,
}

impl Assembler {
    fn slot(&mut self, name: &str) -> Result<u8, Error> {
        if let Some(idx) = self.slots.iter().position(|s| s == name) {
            return Ok(idx as u8);
        }
        if self.slots.len() >= 256 {
            return Err(Error::build(format!(
                "scratch space exhausted: more than 256 named slots (at {name:?})"
            )));
        }
        self.slots.push(name.to_string());
        Ok((self.slots.len() - 1) as u8)
    }

    fn push_op(&mut self, op: Op, line: String) -> Result<(), Error> {
        if op.min_version() > self.version {
            return Err(Error::version(format!(
                "op {:?} requires VM {}, target is {}",
                op.mnemonic(),
                op.min_version(),
                self.version
            )));
        }
        self.lines.push(line);
        Ok(())
    }

    fn push_simple(&mut self, op: Op) -> Result<(), Error> {
        self.push_op(op, op.mnemonic().to_string())
    }

    fn emit(&mut self, expr: &Expr) -> Result<(), Error> {
        match expr {
            Expr::Int(n) => self.push_op(Op::Int, format!("int {n}")),
            Expr::Bytes(b) => {
                let line = if b.is_empty() {
                    "byte \"\"".to_string()
                } else {
                    let mut hex = String::with_capacity(2 + b.len() * 2);
                    hex.push_str("0x");
                    for byte in b {
                        hex.push_str(&format!("{byte:02x}"));
                    }
                    format!("byte {hex}")
                };
                self.push_op(Op::Byte, line)
            }
            Expr::Txn(f) => self.push_op(Op::Txn, format!("txn {}", f.mnemonic())),
            Expr::Txna(f, i) => self.push_op(Op::Txna, format!("txna {} {i}", f.mnemonic())),
            Expr::Unary(op, a) => {
                self.emit(a)?;
                let op = match op {
                    UnaryOp::Len => Op::Len,
                    UnaryOp::Itob => Op::Itob,
                    UnaryOp::Btoi => Op::Btoi,
                    UnaryOp::Not => Op::Not,
                };
                self.push_simple(op)
            }
            Expr::Binary(op, a, b) => {
                self.emit(a)?;
                self.emit(b)?;
                let op = match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Mod => Op::Mod,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::Neq => Op::Neq,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Le => Op::Le,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Ge => Op::Ge,
                };
                self.push_simple(op)
            }
            Expr::Nary(op, items) => {
                if items.is_empty() {
                    return Err(Error::internal("n-ary op with no operands"));
                }
                let op = match op {
                    NaryOp::And => Op::And,
                    NaryOp::Or => Op::Or,
                    NaryOp::Concat => Op::Concat,
                };
                self.emit(&items[0])?;
                for item in &items[1..] {
                    self.emit(item)?;
                    self.push_simple(op)?;
                }
                Ok(())
            }
            Expr::Substring3(a, b, c) => {
                self.emit(a)?;
                self.emit(b)?;
                self.emit(c)?;
                self.push_simple(Op::Substring3)
            }
            Expr::Extract3(a, b, c) => {
                self.emit(a)?;
                self.emit(b)?;
                self.emit(c)?;
                self.push_simple(Op::Extract3)
            }
            Expr::ExtractUint(w, a, b) => {
                self.emit(a)?;
                self.emit(b)?;
                let op = match w {
                    UintWidth::U16 => Op::ExtractUint16,
                    UintWidth::U64 => Op::ExtractUint64,
                };
                self.push_simple(op)
            }
            Expr::GetBit(a, b) => {
                self.emit(a)?;
                self.emit(b)?;
                self.push_simple(Op::GetBit)
            }
            Expr::SetBit(a, b, c) => {
                self.emit(a)?;
                self.emit(b)?;
                self.emit(c)?;
                self.push_simple(Op::SetBit)
            }
            Expr::Load { slot, .. } => {
                let idx = self.slot(slot)?;
                self.push_op(Op::Load, format!("load {idx}"))
            }
            Expr::Store { slot, value } => {
                self.emit(value)?;
                let idx = self.slot(slot)?;
                self.push_op(Op::Store, format!("store {idx}"))
            }
            Expr::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i + 1 < items.len() && item.type_of() != StackTy::Void {
                        return Err(Error::internal(
                            "non-final sequence element leaves a value on the stack",
                        ));
                    }
                    self.emit(item)?;
                }
                Ok(())
            }
            Expr::Cond(arms) => self.emit_cond(arms),
            Expr::Log(a) => {
                self.emit(a)?;
                self.push_simple(Op::Log)
            }
            Expr::Approve => {
                self.push_op(Op::Int, "int 1".to_string())?;
                self.push_simple(Op::Return)
            }
            Expr::Reject => {
                self.push_op(Op::Int, "int 0".to_string())?;
                self.push_simple(Op::Return)
            }
        }
    }

    fn emit_cond(&mut self, arms: &[crate::ast::CondArm]) -> Result<(), Error> {
        if arms.is_empty() {
            return Err(Error::internal("conditional with no arms"));
        }
        let group = self.label_seq;
        self.label_seq += 1;

        for (i, arm) in arms.iter().enumerate() {
            if arm.test.type_of() != StackTy::Uint {
                return Err(Error::internal("conditional test is not uint-typed"));
            }
            self.emit(&arm.test)?;
            self.push_op(Op::Bnz, format!("bnz cond{group}_arm{i}"))?;
        }
        // No arm matched: the program fails outright.
        self.push_simple(Op::Err)?;

        let mut needs_end = false;
        for (i, arm) in arms.iter().enumerate() {
            let falls_through = !arm.body.has_return();
            needs_end = needs_end || falls_through;
            self.lines.push(format!("cond{group}_arm{i}:"));
            self.emit(&arm.body)?;
            if falls_through {
                self.push_op(Op::Branch, format!("b cond{group}_end"))?;
            }
        }
        if needs_end {
            self.lines.push(format!("cond{group}_end:"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CondArm, TxnField};

    #[test]
    fn assembles_simple_comparison() {
        let e = Expr::seq(vec![Expr::Cond(vec![CondArm {
            test: Expr::eq(Expr::Txn(TxnField::NumAppArgs), Expr::int(0)),
            body: Expr::Approve,
        }])]);
        let p = assemble(&e, VmVersion(2)).expect("assemble");
        assert_eq!(p.lines[0], "#pragma version 2");
        assert!(p.lines.contains(&"txn NumAppArgs".to_string()));
        assert!(p.lines.contains(&"bnz cond0_arm0".to_string()));
        assert!(p.lines.contains(&"err".to_string()));
    }

    #[test]
    fn version_gate_names_the_op() {
        let e = Expr::Log(Box::new(Expr::bytes(vec![0x01])));
        let err = assemble(&e, VmVersion(2)).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Version);
        assert!(err.message.contains("log"), "message: {}", err.message);
    }

    #[test]
    fn slots_allocate_in_first_use_order() {
        let e = Expr::seq(vec![
            Expr::store("b_slot", Expr::int(1)),
            Expr::store("a_slot", Expr::int(2)),
            Expr::store("b_slot", Expr::int(3)),
        ]);
        let p = assemble(&e, VmVersion(2)).expect("assemble");
        let stores: Vec<&String> = p
            .lines
            .iter()
            .filter(|l| l.starts_with("store"))
            .collect();
        assert_eq!(stores, vec!["store 0", "store 1", "store 0"]);
    }

    #[test]
    fn identical_input_yields_identical_fingerprint() {
        let e = Expr::seq(vec![Expr::Approve]);
        let a = assemble(&e, VmVersion(4)).expect("assemble");
        let b = assemble(&e, VmVersion(4)).expect("assemble");
        assert_eq!(a.lines, b.lines);
        assert_eq!(a.fingerprint, b.fingerprint);
    }
}
