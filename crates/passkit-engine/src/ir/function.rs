//! Functions, basic blocks, and the instruction arena
//!
//! A `Function` owns its blocks and an arena of instructions. Blocks hold
//! instruction identifiers in positional order; the arena holds the
//! instructions themselves. Removing an instruction leaves a tombstone in the
//! arena, so identifiers stay stable and are never reused.
//!
//! Every mutation primitive here keeps operand lists and use lists in sync:
//! `P.users` contains `I` once for every operand slot of `I` that reads `P`.

use super::instr::{BlockId, InstData, InstId, Instruction, Operand};
use super::types::Type;

/// Errors raised by IR mutation and verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("function '{0}' is already defined in the module")]
    DuplicateFunction(String),
    #[error("cannot remove {inst} in '{function}': it still has {uses} use(s)")]
    InstructionHasUses { function: String, inst: InstId, uses: usize },
    #[error("malformed function '{function}': {reason}")]
    Malformed { function: String, reason: String },
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A basic block: ordered instruction identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub name: String,
    pub(crate) insts: Vec<InstId>,
}

impl BasicBlock {
    /// Instructions of this block in order
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Number of instructions in this block
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    /// Whether the block has no instructions
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

/// A function definition
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) arena: Vec<Option<Instruction>>,
}

impl Function {
    /// Create a function with no blocks
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: Type) -> Self {
        Function {
            name: name.into(),
            params,
            ret,
            blocks: vec![],
            arena: vec![],
        }
    }

    /// Append a new, empty block and return its ID
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock {
            id,
            name: name.into(),
            insts: vec![],
        });
        id
    }

    /// The entry block (first block), if the function has a body
    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    /// All blocks in layout order
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Get a block by ID
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    /// Find a block by its label
    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks.iter().find(|b| b.name == name).map(|b| b.id)
    }

    /// Get a live instruction.
    ///
    /// Panics if `id` was removed or never existed; holding a removed ID is
    /// a use-list invariant violation.
    pub fn inst(&self, id: InstId) -> &Instruction {
        match self.try_inst(id) {
            Some(inst) => inst,
            None => panic!("{} in '{}' is not a live instruction", id, self.name),
        }
    }

    /// Get an instruction if it is still live
    pub fn try_inst(&self, id: InstId) -> Option<&Instruction> {
        self.arena.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Whether `id` names a live instruction
    pub fn is_live(&self, id: InstId) -> bool {
        self.try_inst(id).is_some()
    }

    /// Consumers of `id`'s result (one entry per use)
    pub fn users(&self, id: InstId) -> &[InstId] {
        &self.inst(id).users
    }

    /// Every live instruction, block order then intra-block order
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.blocks.iter().flat_map(|b| b.insts.iter().copied())
    }

    /// Total number of instructions across all blocks
    pub fn instr_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Size of the arena, including tombstones
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    /// Type of an operand as seen by a consumer
    pub fn operand_type(&self, operand: &Operand) -> Option<Type> {
        match operand {
            Operand::Inst(id) => self.try_inst(*id).map(|i| i.ty()),
            Operand::Arg(idx) => self.params.get(*idx as usize).map(|p| p.ty),
            Operand::Const { ty, .. } => Some(*ty),
        }
    }

    /// Append an instruction at the end of `block`
    pub fn append_inst(&mut self, block: BlockId, data: InstData) -> InstId {
        let id = self.alloc(block, data);
        self.blocks[block.0 as usize].insts.push(id);
        id
    }

    /// Insert an instruction immediately before `anchor`, in `anchor`'s block
    pub fn insert_before(&mut self, anchor: InstId, data: InstData) -> InstId {
        let block = self.inst(anchor).parent;
        let pos = self.position(anchor);
        let id = self.alloc(block, data);
        self.blocks[block.0 as usize].insts.insert(pos, id);
        id
    }

    /// Rewire every consumer of `old` to read `new` instead.
    ///
    /// After this call `old` has no users.
    pub fn replace_all_uses_with(&mut self, old: InstId, new: InstId) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.inst_mut(old).users);
        for &user in &users {
            for operand in self.inst_mut(user).data.operands.iter_mut() {
                if *operand == Operand::Inst(old) {
                    *operand = Operand::Inst(new);
                }
            }
        }
        // A user with several slots reading `old` appears several times in
        // `users` but had all its slots rewritten on the first visit; the
        // multiplicity carries over unchanged.
        self.inst_mut(new).users.extend(users);
    }

    /// Replace operand `index` of `inst`, keeping use lists consistent
    pub fn set_operand(&mut self, inst: InstId, index: usize, operand: Operand) {
        let previous = self.inst(inst).data.operands[index];
        if let Operand::Inst(producer) = previous {
            self.remove_use(producer, inst);
        }
        if let Operand::Inst(producer) = operand {
            self.inst_mut(producer).users.push(inst);
        }
        self.inst_mut(inst).data.operands[index] = operand;
    }

    /// Unlink and return an instruction.
    ///
    /// Refused while anything still consumes its result: rewire consumers
    /// first (`replace_all_uses_with`).
    pub fn remove_inst(&mut self, id: InstId) -> Result<Instruction, IrError> {
        let uses = self.inst(id).users.len();
        if uses > 0 {
            return Err(IrError::InstructionHasUses {
                function: self.name.clone(),
                inst: id,
                uses,
            });
        }

        let pos = self.position(id);
        let block = self.inst(id).parent;
        self.blocks[block.0 as usize].insts.remove(pos);

        let inst = match self.arena[id.0 as usize].take() {
            Some(inst) => inst,
            None => unreachable!("{} was checked live above", id),
        };
        for producer in inst.data.operands.iter().filter_map(Operand::as_inst) {
            self.remove_use(producer, id);
        }
        Ok(inst)
    }

    /// Index of `id` inside its block
    pub fn position(&self, id: InstId) -> usize {
        let block = self.inst(id).parent;
        match self.blocks[block.0 as usize].insts.iter().position(|&i| i == id) {
            Some(pos) => pos,
            None => panic!("{} is not listed in its parent block {}", id, block),
        }
    }

    /// The last instruction of `block`, if it is a terminator
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        self.block(block)
            .insts
            .last()
            .copied()
            .filter(|&id| self.inst(id).is_terminator())
    }

    fn alloc(&mut self, block: BlockId, data: InstData) -> InstId {
        let id = InstId(self.arena.len() as u32);
        for producer in data.operands.iter().filter_map(Operand::as_inst) {
            self.inst_mut(producer).users.push(id);
        }
        self.arena.push(Some(Instruction {
            data,
            parent: block,
            users: vec![],
        }));
        id
    }

    fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        let name = &self.name;
        match self.arena.get_mut(id.0 as usize).and_then(|slot| slot.as_mut()) {
            Some(inst) => inst,
            None => panic!("{} in '{}' is not a live instruction", id, name),
        }
    }

    fn remove_use(&mut self, producer: InstId, user: InstId) {
        // The producer may already be gone when tearing down a dead chain
        if let Some(Some(inst)) = self.arena.get_mut(producer.0 as usize) {
            if let Some(pos) = inst.users.iter().position(|&u| u == user) {
                inst.users.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::Opcode;

    fn two_arg_func() -> (Function, BlockId) {
        let mut func = Function::new(
            "f",
            vec![
                Param { name: "a".into(), ty: Type::I32 },
                Param { name: "b".into(), ty: Type::I32 },
            ],
            Type::I32,
        );
        let entry = func.add_block("entry");
        (func, entry)
    }

    #[test]
    fn test_append_tracks_users() {
        let (mut func, entry) = two_arg_func();
        let x = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        let y = func.append_inst(
            entry,
            InstData::binary(Opcode::Mul, Type::I32, Operand::Inst(x), Operand::Inst(x)),
        );
        func.append_inst(entry, InstData::ret(Some(Operand::Inst(y))));

        assert_eq!(func.users(x), &[y, y]);
        assert_eq!(func.users(y).len(), 1);
        assert_eq!(func.instr_count(), 3);
    }

    #[test]
    fn test_insert_before_position() {
        let (mut func, entry) = two_arg_func();
        let x = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        let ret = func.append_inst(entry, InstData::ret(Some(Operand::Inst(x))));
        let y = func.insert_before(
            x,
            InstData::binary(Opcode::Sub, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );

        assert_eq!(func.block(entry).insts(), &[y, x, ret]);
        assert_eq!(func.position(x), 1);
        assert_eq!(func.inst(y).parent(), entry);
    }

    #[test]
    fn test_rauw_then_remove() {
        let (mut func, entry) = two_arg_func();
        let x = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        let y = func.append_inst(
            entry,
            InstData::binary(Opcode::Mul, Type::I32, Operand::Inst(x), Operand::Inst(x)),
        );
        func.append_inst(entry, InstData::ret(Some(Operand::Inst(y))));
        let z = func.insert_before(
            x,
            InstData::binary(Opcode::Sub, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );

        func.replace_all_uses_with(x, z);
        assert!(func.users(x).is_empty());
        assert_eq!(func.users(z), &[y, y]);
        assert_eq!(func.inst(y).operands(), &[Operand::Inst(z), Operand::Inst(z)]);

        let removed = func.remove_inst(x).unwrap();
        assert_eq!(removed.opcode(), Opcode::Add);
        assert!(!func.is_live(x));
        assert_eq!(func.instr_count(), 3);
    }

    #[test]
    fn test_remove_with_uses_is_refused() {
        let (mut func, entry) = two_arg_func();
        let x = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        func.append_inst(entry, InstData::ret(Some(Operand::Inst(x))));

        let err = func.remove_inst(x).unwrap_err();
        assert!(matches!(err, IrError::InstructionHasUses { uses: 1, .. }));
        assert!(func.is_live(x));
        assert_eq!(func.instr_count(), 2);
    }

    #[test]
    fn test_remove_drops_operand_uses() {
        let (mut func, entry) = two_arg_func();
        let x = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        let dead = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Inst(x), Operand::Arg(1)),
        );
        func.append_inst(entry, InstData::ret(Some(Operand::Inst(x))));

        func.remove_inst(dead).unwrap();
        assert_eq!(func.users(x).len(), 1);
    }

    #[test]
    fn test_set_operand_moves_use() {
        let (mut func, entry) = two_arg_func();
        let x = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        let y = func.append_inst(
            entry,
            InstData::binary(Opcode::Add, Type::I32, Operand::Arg(0), Operand::Arg(1)),
        );
        let ret = func.append_inst(entry, InstData::ret(Some(Operand::Inst(x))));

        func.set_operand(ret, 0, Operand::Inst(y));
        assert!(func.users(x).is_empty());
        assert_eq!(func.users(y), &[ret]);
    }
}
