//! IR → Cranelift IR lowering
//!
//! Each value-producing instruction becomes a Cranelift `Variable`; the
//! frontend's SSA construction takes care of values flowing between blocks.
//! Arguments are the entry block's parameters.
//!
//! `i1` values live in a byte as 0 or 1. Signed operations see them as 0 or
//! -1, so their operands are negated first.

use cranelift_codegen::ir::{self, condcodes::IntCC, InstBuilder};
use cranelift_frontend::{FunctionBuilder, Variable};
use rustc_hash::FxHashMap;

use super::abi::{clif_type, const_bits};
use crate::ir::{Function, InstId, IntPredicate, Opcode, Operand, Type};

/// Error during Cranelift lowering
#[derive(Debug, thiserror::Error)]
pub enum LowerError {
    #[error("unsupported instruction in '{function}': {detail}")]
    UnsupportedInstruction { function: String, detail: String },
    #[error("block '{block}' of '{function}' does not end with a single terminator")]
    MissingTerminator { function: String, block: String },
    #[error("'{function}' calls undeclared function @{callee}")]
    UnknownCallee { function: String, callee: String },
    #[error("operand of {inst} in '{function}' does not name a value")]
    UnresolvedOperand { function: String, inst: InstId },
    #[error("function '{0}' has no body")]
    EmptyFunction(String),
}

/// State maintained during lowering of a single function
pub struct FunctionLowering<'a> {
    func: &'a Function,
    /// Callee name → reference imported into the function being built
    callees: &'a FxHashMap<String, ir::FuncRef>,
    vars: FxHashMap<InstId, Variable>,
    blocks: Vec<ir::Block>,
    params: Vec<ir::Value>,
}

impl<'a> FunctionLowering<'a> {
    /// Lower `func` into the function owned by `builder`.
    /// Takes ownership of the builder since `finalize()` consumes it.
    pub fn lower(
        func: &'a Function,
        callees: &'a FxHashMap<String, ir::FuncRef>,
        mut builder: FunctionBuilder<'_>,
    ) -> Result<(), LowerError> {
        if func.blocks().is_empty() {
            return Err(LowerError::EmptyFunction(func.name.clone()));
        }
        if let Some(param) = func.params.iter().find(|p| p.ty == Type::Void) {
            return Err(LowerError::UnsupportedInstruction {
                function: func.name.clone(),
                detail: format!("void parameter %{}", param.name),
            });
        }
        for block in func.blocks() {
            let terminators = block.insts().iter().filter(|&&id| func.inst(id).is_terminator()).count();
            if terminators != 1 || func.terminator(block.id).is_none() {
                return Err(LowerError::MissingTerminator {
                    function: func.name.clone(),
                    block: block.name.clone(),
                });
            }
        }

        let blocks: Vec<ir::Block> = func.blocks().iter().map(|_| builder.create_block()).collect();
        let entry = blocks[0];
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();

        let mut ctx = FunctionLowering {
            func,
            callees,
            vars: FxHashMap::default(),
            blocks,
            params,
        };
        ctx.declare_vars(&mut builder);

        for (idx, block) in func.blocks().iter().enumerate() {
            if idx > 0 {
                builder.switch_to_block(ctx.blocks[idx]);
            }
            for &id in block.insts() {
                ctx.lower_inst(id, &mut builder)?;
            }
        }

        // No phis: every predecessor is known once all blocks are emitted
        builder.seal_all_blocks();
        builder.finalize();
        Ok(())
    }

    fn declare_vars(&mut self, builder: &mut FunctionBuilder<'_>) {
        for id in self.func.instructions() {
            if let Some(ty) = clif_type(self.func.inst(id).ty()) {
                let var = builder.declare_var(ty);
                self.vars.insert(id, var);
            }
        }
    }

    fn value(
        &self,
        builder: &mut FunctionBuilder<'_>,
        user: InstId,
        operand: Operand,
    ) -> Result<ir::Value, LowerError> {
        let unresolved = || LowerError::UnresolvedOperand {
            function: self.func.name.clone(),
            inst: user,
        };
        match operand {
            Operand::Inst(id) => match self.vars.get(&id) {
                Some(&var) => Ok(builder.use_var(var)),
                None => Err(unresolved()),
            },
            Operand::Arg(idx) => self.params.get(idx as usize).copied().ok_or_else(unresolved),
            Operand::Const { ty, value } => match clif_type(ty) {
                Some(cty) => Ok(builder.ins().iconst(cty, const_bits(ty, value))),
                None => Err(unresolved()),
            },
        }
    }

    fn operands(
        &self,
        builder: &mut FunctionBuilder<'_>,
        id: InstId,
    ) -> Result<Vec<ir::Value>, LowerError> {
        let ops = self.func.inst(id).operands();
        let mut values = Vec::with_capacity(ops.len());
        for &op in ops {
            values.push(self.value(builder, id, op)?);
        }
        Ok(values)
    }

    fn define(&self, builder: &mut FunctionBuilder<'_>, id: InstId, val: ir::Value) {
        if let Some(&var) = self.vars.get(&id) {
            builder.def_var(var, val);
        }
    }

    fn lower_inst(&self, id: InstId, builder: &mut FunctionBuilder<'_>) -> Result<(), LowerError> {
        let inst = self.func.inst(id);
        let unsupported = |detail: &str| LowerError::UnsupportedInstruction {
            function: self.func.name.clone(),
            detail: format!("{}: {}", self.func.display_inst(id), detail),
        };
        let ops = self.operands(builder, id)?;
        let bool_operands = inst
            .operands()
            .first()
            .and_then(|op| self.func.operand_type(op))
            == Some(Type::I1);

        match inst.opcode() {
            // ===== Integer Arithmetic / Bitwise =====
            op if op.is_binary() => {
                let [mut l, mut r] = ops[..] else {
                    return Err(unsupported("expected two operands"));
                };
                if inst.ty() == Type::I1 {
                    match op {
                        Opcode::SDiv | Opcode::SRem => {
                            l = builder.ins().ineg(l);
                            r = builder.ins().ineg(r);
                        }
                        Opcode::AShr => l = builder.ins().ineg(l),
                        _ => {}
                    }
                }
                let ins = builder.ins();
                let val = match op {
                    Opcode::Add => ins.iadd(l, r),
                    Opcode::Sub => ins.isub(l, r),
                    Opcode::Mul => ins.imul(l, r),
                    Opcode::SDiv => ins.sdiv(l, r),
                    Opcode::SRem => ins.srem(l, r),
                    Opcode::And => ins.band(l, r),
                    Opcode::Or => ins.bor(l, r),
                    Opcode::Xor => ins.bxor(l, r),
                    Opcode::Shl => ins.ishl(l, r),
                    Opcode::AShr => ins.sshr(l, r),
                    Opcode::LShr => ins.ushr(l, r),
                    _ => return Err(unsupported("not a binary opcode")),
                };
                let val = if inst.ty() == Type::I1 { builder.ins().band_imm(val, 1) } else { val };
                self.define(builder, id, val);
            }

            // ===== Comparison / Selection =====
            Opcode::ICmp(pred) => {
                let [mut l, mut r] = ops[..] else {
                    return Err(unsupported("expected two operands"));
                };
                if bool_operands && pred.is_signed() {
                    l = builder.ins().ineg(l);
                    r = builder.ins().ineg(r);
                }
                let val = builder.ins().icmp(int_cc(pred), l, r);
                self.define(builder, id, val);
            }
            Opcode::Select => {
                let [c, a, b] = ops[..] else {
                    return Err(unsupported("expected three operands"));
                };
                let val = builder.ins().select(c, a, b);
                self.define(builder, id, val);
            }

            // ===== Calls =====
            Opcode::Call => {
                let callee = inst.callee().unwrap_or_default();
                let func_ref = *self.callees.get(callee).ok_or_else(|| LowerError::UnknownCallee {
                    function: self.func.name.clone(),
                    callee: callee.to_string(),
                })?;
                let call = builder.ins().call(func_ref, &ops);
                let result = builder.inst_results(call).first().copied();
                if let Some(val) = result {
                    self.define(builder, id, val);
                }
            }

            // ===== Terminators =====
            Opcode::Br => match (&ops[..], inst.targets()) {
                ([], &[target]) => {
                    builder.ins().jump(self.blocks[target.0 as usize], &[]);
                }
                (&[cond], &[then_block, else_block]) => {
                    builder.ins().brif(
                        cond,
                        self.blocks[then_block.0 as usize],
                        &[],
                        self.blocks[else_block.0 as usize],
                        &[],
                    );
                }
                _ => return Err(unsupported("malformed branch")),
            },
            Opcode::Ret => {
                builder.ins().return_(&ops);
            }

            _ => return Err(unsupported("no lowering")),
        }
        Ok(())
    }
}

fn int_cc(pred: IntPredicate) -> IntCC {
    match pred {
        IntPredicate::Eq => IntCC::Equal,
        IntPredicate::Ne => IntCC::NotEqual,
        IntPredicate::Slt => IntCC::SignedLessThan,
        IntPredicate::Sle => IntCC::SignedLessThanOrEqual,
        IntPredicate::Sgt => IntCC::SignedGreaterThan,
        IntPredicate::Sge => IntCC::SignedGreaterThanOrEqual,
        IntPredicate::Ult => IntCC::UnsignedLessThan,
        IntPredicate::Ule => IntCC::UnsignedLessThanOrEqual,
        IntPredicate::Ugt => IntCC::UnsignedGreaterThan,
        IntPredicate::Uge => IntCC::UnsignedGreaterThanOrEqual,
    }
}
