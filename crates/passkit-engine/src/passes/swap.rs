//! Opcode rewriting (`add2sub`)
//!
//! Replaces every instruction with one binary opcode by an instruction with
//! another, keeping operands, type, and name. The replacement is inserted
//! in front of the original, takes over all of its uses, and the original
//! is then removed.

use super::{FunctionPass, PassKind};
use crate::ir::{Function, InstData, Opcode};

/// Swap one binary opcode for another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOpSwap {
    from: Opcode,
    to: Opcode,
    name: String,
}

impl BinaryOpSwap {
    /// Rewrite `from` instructions into `to` instructions.
    ///
    /// Both opcodes must be two-operand arithmetic or bitwise operations.
    pub fn new(from: Opcode, to: Opcode) -> Self {
        assert!(
            from.is_binary() && to.is_binary(),
            "opcode swap needs binary opcodes, got {} -> {}",
            from.mnemonic(),
            to.mnemonic()
        );
        BinaryOpSwap { from, to, name: format!("{}2{}", from.mnemonic(), to.mnemonic()) }
    }

    /// The `add2sub` pass: every `add` becomes a `sub`
    pub fn add_to_sub() -> Self {
        Self::new(Opcode::Add, Opcode::Sub)
    }
}

impl FunctionPass for BinaryOpSwap {
    /// `<from>2<to>`, e.g. `add2sub` or `mul2shl`
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &'static str {
        match (self.from, self.to) {
            (Opcode::Add, Opcode::Sub) => "Replace every add with a sub of the same operands",
            _ => "Replace one binary opcode with another",
        }
    }

    fn kind(&self) -> PassKind {
        PassKind::Transform
    }

    fn run(&self, func: &mut Function) -> bool {
        let mut changed = false;

        for block_index in 0..func.blocks().len() {
            // Snapshot: insertion and removal below shift positions in the
            // live list, but never invalidate identifiers.
            let snapshot = func.blocks()[block_index].insts().to_vec();

            for id in snapshot {
                if func.inst(id).opcode() != self.from {
                    continue;
                }

                let mut data: InstData = func.inst(id).data().clone();
                data.opcode = self.to;
                let replacement = func.insert_before(id, data);
                func.replace_all_uses_with(id, replacement);
                if let Err(e) = func.remove_inst(id) {
                    panic!("use list out of sync after rewiring {}: {}", id, e);
                }

                log::trace!(
                    "{}: {} {} -> {} {}",
                    func.name,
                    self.from.mnemonic(),
                    id,
                    self.to.mnemonic(),
                    replacement
                );
                changed = true;
            }
        }

        changed
    }
}
