//! IR: an LLVM-style SSA representation with explicit use lists

pub mod types;
pub mod instr;
pub mod function;
pub mod module;
pub mod builder;
pub mod display;
pub mod verify;
pub mod lexer;
pub mod parser;

pub use types::Type;
pub use instr::{BlockId, InstData, InstId, Instruction, IntPredicate, Opcode, Operand};
pub use function::{BasicBlock, Function, IrError, Param};
pub use module::Module;
pub use builder::IrBuilder;
pub use verify::{verify_function, verify_module};
pub use parser::{parse_module, ParseError};
