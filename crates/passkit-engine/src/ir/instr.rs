//! IR instructions, operands, and identifiers
//!
//! Instructions live in a per-function arena and are referred to by `InstId`.
//! Operands and use lists store identifiers, never references, so the
//! producer/consumer graph has no ownership cycles.

use super::types::Type;

/// Stable identifier of an instruction inside its function's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(pub u32);

impl std::fmt::Display for InstId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Basic block identifier (index into `Function::blocks`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Integer comparison predicate for `icmp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IntPredicate {
    /// LLVM keyword for this predicate
    pub fn keyword(&self) -> &'static str {
        match self {
            IntPredicate::Eq => "eq",
            IntPredicate::Ne => "ne",
            IntPredicate::Slt => "slt",
            IntPredicate::Sle => "sle",
            IntPredicate::Sgt => "sgt",
            IntPredicate::Sge => "sge",
            IntPredicate::Ult => "ult",
            IntPredicate::Ule => "ule",
            IntPredicate::Ugt => "ugt",
            IntPredicate::Uge => "uge",
        }
    }

    /// Whether the comparison reads its operands as signed
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            IntPredicate::Slt | IntPredicate::Sle | IntPredicate::Sgt | IntPredicate::Sge
        )
    }

    /// Parse a predicate keyword
    pub fn from_keyword(s: &str) -> Option<Self> {
        let pred = match s {
            "eq" => IntPredicate::Eq,
            "ne" => IntPredicate::Ne,
            "slt" => IntPredicate::Slt,
            "sle" => IntPredicate::Sle,
            "sgt" => IntPredicate::Sgt,
            "sge" => IntPredicate::Sge,
            "ult" => IntPredicate::Ult,
            "ule" => IntPredicate::Ule,
            "ugt" => IntPredicate::Ugt,
            "uge" => IntPredicate::Uge,
            _ => return None,
        };
        Some(pred)
    }
}

/// Instruction opcode (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Integer Arithmetic =====
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,

    // ===== Bitwise =====
    And,
    Or,
    Xor,
    Shl,
    AShr,
    LShr,

    // ===== Comparison / Selection =====
    ICmp(IntPredicate),
    Select,

    // ===== Calls =====
    Call,

    // ===== Terminators =====
    Br,
    Ret,
}

impl Opcode {
    /// Mnemonic used by the text format
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::SDiv => "sdiv",
            Opcode::SRem => "srem",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::AShr => "ashr",
            Opcode::LShr => "lshr",
            Opcode::ICmp(_) => "icmp",
            Opcode::Select => "select",
            Opcode::Call => "call",
            Opcode::Br => "br",
            Opcode::Ret => "ret",
        }
    }

    /// Look up a two-operand arithmetic/bitwise opcode by mnemonic
    pub fn binary_from_mnemonic(s: &str) -> Option<Opcode> {
        let op = match s {
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "mul" => Opcode::Mul,
            "sdiv" => Opcode::SDiv,
            "srem" => Opcode::SRem,
            "and" => Opcode::And,
            "or" => Opcode::Or,
            "xor" => Opcode::Xor,
            "shl" => Opcode::Shl,
            "ashr" => Opcode::AShr,
            "lshr" => Opcode::LShr,
            _ => return None,
        };
        Some(op)
    }

    /// Whether this is a two-operand arithmetic or bitwise operation
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::SDiv
                | Opcode::SRem
                | Opcode::And
                | Opcode::Or
                | Opcode::Xor
                | Opcode::Shl
                | Opcode::AShr
                | Opcode::LShr
        )
    }

    /// Whether this opcode ends a basic block
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Br | Opcode::Ret)
    }
}

/// An instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Result of another instruction in the same function
    Inst(InstId),
    /// Function argument by position
    Arg(u32),
    /// Literal integer constant
    Const { ty: Type, value: i64 },
}

impl Operand {
    /// Build a constant operand, normalizing the value to the type's width
    pub fn constant(ty: Type, value: i64) -> Self {
        Operand::Const { ty, value: ty.normalize(value) }
    }

    /// The producing instruction, if this operand references one
    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Operand::Inst(id) => Some(*id),
            _ => None,
        }
    }
}

/// Everything needed to create an instruction.
///
/// The use list and the parent block are owned by the function and are
/// filled in when the data is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstData {
    pub opcode: Opcode,
    /// Result type (`Void` when the instruction produces nothing)
    pub ty: Type,
    pub operands: Vec<Operand>,
    /// Successor blocks (`br` only)
    pub targets: Vec<BlockId>,
    /// Called function name (`call` only)
    pub callee: Option<String>,
    /// Result name without the `%` sigil
    pub name: Option<String>,
}

impl InstData {
    /// Two-operand arithmetic/bitwise instruction
    pub fn binary(opcode: Opcode, ty: Type, lhs: Operand, rhs: Operand) -> Self {
        InstData {
            opcode,
            ty,
            operands: vec![lhs, rhs],
            targets: vec![],
            callee: None,
            name: None,
        }
    }

    /// Integer comparison producing `i1`
    pub fn icmp(pred: IntPredicate, lhs: Operand, rhs: Operand) -> Self {
        InstData {
            opcode: Opcode::ICmp(pred),
            ty: Type::I1,
            operands: vec![lhs, rhs],
            targets: vec![],
            callee: None,
            name: None,
        }
    }

    /// `select i1 cond, ty a, ty b`
    pub fn select(ty: Type, cond: Operand, if_true: Operand, if_false: Operand) -> Self {
        InstData {
            opcode: Opcode::Select,
            ty,
            operands: vec![cond, if_true, if_false],
            targets: vec![],
            callee: None,
            name: None,
        }
    }

    /// Direct call by function name
    pub fn call(ret: Type, callee: impl Into<String>, args: Vec<Operand>) -> Self {
        InstData {
            opcode: Opcode::Call,
            ty: ret,
            operands: args,
            targets: vec![],
            callee: Some(callee.into()),
            name: None,
        }
    }

    /// Unconditional branch
    pub fn jump(target: BlockId) -> Self {
        InstData {
            opcode: Opcode::Br,
            ty: Type::Void,
            operands: vec![],
            targets: vec![target],
            callee: None,
            name: None,
        }
    }

    /// Conditional branch on an `i1`
    pub fn branch(cond: Operand, then_block: BlockId, else_block: BlockId) -> Self {
        InstData {
            opcode: Opcode::Br,
            ty: Type::Void,
            operands: vec![cond],
            targets: vec![then_block, else_block],
            callee: None,
            name: None,
        }
    }

    /// Return, with or without a value
    pub fn ret(value: Option<Operand>) -> Self {
        InstData {
            opcode: Opcode::Ret,
            ty: Type::Void,
            operands: value.into_iter().collect(),
            targets: vec![],
            callee: None,
            name: None,
        }
    }

    /// Attach a result name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// An instruction placed in a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub(crate) data: InstData,
    pub(crate) parent: BlockId,
    /// One entry per operand slot (anywhere in the function) that reads this result
    pub(crate) users: Vec<InstId>,
}

impl Instruction {
    /// Opcode tag
    pub fn opcode(&self) -> Opcode {
        self.data.opcode
    }

    /// Result type
    pub fn ty(&self) -> Type {
        self.data.ty
    }

    /// Operands in order
    pub fn operands(&self) -> &[Operand] {
        &self.data.operands
    }

    /// Branch successors
    pub fn targets(&self) -> &[BlockId] {
        &self.data.targets
    }

    /// Callee name for calls
    pub fn callee(&self) -> Option<&str> {
        self.data.callee.as_deref()
    }

    /// Result name, if any
    pub fn name(&self) -> Option<&str> {
        self.data.name.as_deref()
    }

    /// Containing block
    pub fn parent(&self) -> BlockId {
        self.parent
    }

    /// Consumers of this instruction's result (one entry per use)
    pub fn users(&self) -> &[InstId] {
        &self.users
    }

    /// Construction payload (opcode, operands, ...)
    pub fn data(&self) -> &InstData {
        &self.data
    }

    /// Whether this instruction terminates its block
    pub fn is_terminator(&self) -> bool {
        self.data.opcode.is_terminator()
    }
}
