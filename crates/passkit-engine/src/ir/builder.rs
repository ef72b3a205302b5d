//! IR builder helpers
//!
//! Utilities for constructing functions programmatically (tests, front-ends).

use super::function::Function;
use super::instr::{BlockId, InstData, InstId, IntPredicate, Opcode, Operand};
use super::types::Type;

/// Builder that simplifies IR construction
pub struct IrBuilder<'a> {
    func: &'a mut Function,
    current_block: BlockId,
}

impl<'a> IrBuilder<'a> {
    /// Create a builder targeting an existing function.
    ///
    /// Creates an `entry` block if the function has none yet.
    pub fn new(func: &'a mut Function) -> Self {
        let entry = match func.entry_block() {
            Some(entry) => entry,
            None => func.add_block("entry"),
        };
        IrBuilder {
            func,
            current_block: entry,
        }
    }

    /// Switch to emitting into a different block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    /// Get the current block ID
    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Create a new basic block
    pub fn create_block(&mut self, name: impl Into<String>) -> BlockId {
        self.func.add_block(name)
    }

    /// Emit an instruction into the current block
    pub fn emit(&mut self, data: InstData) -> InstId {
        self.func.append_inst(self.current_block, data)
    }

    /// Operand referring to argument `index`
    pub fn arg(&self, index: u32) -> Operand {
        Operand::Arg(index)
    }

    /// Constant operand of the given type
    pub fn iconst(&self, ty: Type, value: i64) -> Operand {
        Operand::constant(ty, value)
    }

    /// Emit a two-operand arithmetic/bitwise instruction
    pub fn binary(&mut self, op: Opcode, ty: Type, lhs: Operand, rhs: Operand) -> Operand {
        Operand::Inst(self.emit(InstData::binary(op, ty, lhs, rhs)))
    }

    /// Emit `add`
    pub fn add(&mut self, ty: Type, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(Opcode::Add, ty, lhs, rhs)
    }

    /// Emit `sub`
    pub fn sub(&mut self, ty: Type, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(Opcode::Sub, ty, lhs, rhs)
    }

    /// Emit `mul`
    pub fn mul(&mut self, ty: Type, lhs: Operand, rhs: Operand) -> Operand {
        self.binary(Opcode::Mul, ty, lhs, rhs)
    }

    /// Emit an integer comparison
    pub fn icmp(&mut self, pred: IntPredicate, lhs: Operand, rhs: Operand) -> Operand {
        Operand::Inst(self.emit(InstData::icmp(pred, lhs, rhs)))
    }

    /// Emit `select`
    pub fn select(&mut self, ty: Type, cond: Operand, a: Operand, b: Operand) -> Operand {
        Operand::Inst(self.emit(InstData::select(ty, cond, a, b)))
    }

    /// Emit a direct call
    pub fn call(&mut self, ret: Type, callee: &str, args: Vec<Operand>) -> InstId {
        self.emit(InstData::call(ret, callee, args))
    }

    /// Terminate the current block with an unconditional branch
    pub fn br(&mut self, target: BlockId) -> InstId {
        self.emit(InstData::jump(target))
    }

    /// Terminate the current block with a conditional branch
    pub fn cond_br(&mut self, cond: Operand, then_block: BlockId, else_block: BlockId) -> InstId {
        self.emit(InstData::branch(cond, then_block, else_block))
    }

    /// Terminate the current block with a return
    pub fn ret(&mut self, value: Option<Operand>) -> InstId {
        self.emit(InstData::ret(value))
    }

    /// Access the underlying function
    pub fn func(&self) -> &Function {
        self.func
    }

    /// Access the underlying function mutably
    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }
}
