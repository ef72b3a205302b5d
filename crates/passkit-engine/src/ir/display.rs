//! Pretty-printing for IR
//!
//! Emits the same LLVM-flavoured text the parser reads, so printed modules
//! can be fed back in. Unnamed value-producing instructions print as `%v<N>`.

use std::fmt;

use super::function::Function;
use super::instr::{InstId, Opcode, Operand};
use super::module::Module;
use super::types::Type;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for func in self.functions() {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define {} @{}(", self.ret, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} %{}", param.ty, param.name)?;
        }
        writeln!(f, ") {{")?;

        for (i, block) in self.blocks().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", block.name)?;
            for &id in block.insts() {
                writeln!(f, "  {}", self.display_inst(id))?;
            }
        }

        writeln!(f, "}}")
    }
}

/// Display adapter for one instruction in the context of its function
pub struct DisplayInst<'a> {
    func: &'a Function,
    id: InstId,
}

impl Function {
    /// Display an instruction with operand names resolved
    pub fn display_inst(&self, id: InstId) -> DisplayInst<'_> {
        DisplayInst { func: self, id }
    }

    /// Display an operand with names resolved
    pub fn display_operand(&self, operand: Operand) -> DisplayOperand<'_> {
        DisplayOperand { func: self, operand }
    }

    fn value_name(&self, id: InstId) -> String {
        match self.try_inst(id).and_then(|i| i.name()) {
            Some(name) => format!("%{}", name),
            None => format!("%{}", id),
        }
    }
}

/// Display adapter for an operand in the context of its function
pub struct DisplayOperand<'a> {
    func: &'a Function,
    operand: Operand,
}

impl fmt::Display for DisplayOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::Inst(id) => write!(f, "{}", self.func.value_name(id)),
            Operand::Arg(idx) => match self.func.params.get(idx as usize) {
                Some(param) => write!(f, "%{}", param.name),
                None => write!(f, "%arg{}", idx),
            },
            Operand::Const { ty: Type::I1, value } => {
                write!(f, "{}", if value != 0 { "true" } else { "false" })
            }
            Operand::Const { value, .. } => write!(f, "{}", value),
        }
    }
}

impl fmt::Display for DisplayInst<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        let inst = func.inst(self.id);
        let ops = inst.operands();
        let op = |i: usize| func.display_operand(ops[i]);
        let op_ty = |i: usize| func.operand_type(&ops[i]).unwrap_or(Type::I32);

        if inst.ty().is_value() {
            write!(f, "{} = ", func.value_name(self.id))?;
        }

        match inst.opcode() {
            opcode if opcode.is_binary() => {
                write!(f, "{} {} {}, {}", opcode.mnemonic(), inst.ty(), op(0), op(1))
            }
            Opcode::ICmp(pred) => {
                write!(f, "icmp {} {} {}, {}", pred.keyword(), op_ty(0), op(0), op(1))
            }
            Opcode::Select => write!(
                f,
                "select i1 {}, {} {}, {} {}",
                op(0),
                inst.ty(),
                op(1),
                inst.ty(),
                op(2)
            ),
            Opcode::Call => {
                write!(f, "call {} @{}(", inst.ty(), inst.callee().unwrap_or("?"))?;
                for i in 0..ops.len() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", op_ty(i), op(i))?;
                }
                write!(f, ")")
            }
            Opcode::Br => {
                let label = |i: usize| {
                    let target = inst.targets()[i];
                    func.blocks()
                        .get(target.0 as usize)
                        .map(|b| b.name.clone())
                        .unwrap_or_else(|| target.to_string())
                };
                if ops.is_empty() {
                    write!(f, "br label %{}", label(0))
                } else {
                    write!(f, "br i1 {}, label %{}, label %{}", op(0), label(0), label(1))
                }
            }
            Opcode::Ret => {
                if ops.is_empty() {
                    write!(f, "ret void")
                } else {
                    write!(f, "ret {} {}", op_ty(0), op(0))
                }
            }
            // Every binary opcode is handled by the guard above
            other => write!(f, "<{}>", other.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::builder::IrBuilder;
    use crate::ir::function::{Function, Param};
    use crate::ir::instr::IntPredicate;
    use crate::ir::module::Module;
    use crate::ir::types::Type;

    #[test]
    fn test_print_simple_add() {
        let mut func = Function::new(
            "simple_add",
            vec![
                Param { name: "a".into(), ty: Type::I32 },
                Param { name: "b".into(), ty: Type::I32 },
            ],
            Type::I32,
        );
        {
            let mut b = IrBuilder::new(&mut func);
            let (a0, a1) = (b.arg(0), b.arg(1));
            let sum = b.add(Type::I32, a0, a1);
            b.ret(Some(sum));
        }
        let mut module = Module::new("demo");
        module.add_function(func).unwrap();

        let text = module.to_string();
        assert_eq!(
            text,
            "; ModuleID = 'demo'\n\
             \n\
             define i32 @simple_add(i32 %a, i32 %b) {\n\
             entry:\n  \
             %v0 = add i32 %a, %b\n  \
             ret i32 %v0\n\
             }\n"
        );
    }

    #[test]
    fn test_print_control_flow() {
        let mut func = Function::new(
            "max",
            vec![
                Param { name: "x".into(), ty: Type::I64 },
                Param { name: "y".into(), ty: Type::I64 },
            ],
            Type::I64,
        );
        {
            let mut b = IrBuilder::new(&mut func);
            let left = b.create_block("left");
            let right = b.create_block("right");
            let (x, y) = (b.arg(0), b.arg(1));
            let c = b.icmp(IntPredicate::Sgt, x, y);
            b.cond_br(c, left, right);
            b.switch_to_block(left);
            b.ret(Some(x));
            b.switch_to_block(right);
            b.ret(Some(y));
        }

        let text = func.to_string();
        assert!(text.contains("%v0 = icmp sgt i64 %x, %y"));
        assert!(text.contains("br i1 %v0, label %left, label %right"));
        assert!(text.contains("left:\n  ret i64 %x"));
    }
}
