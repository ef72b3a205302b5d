//! In-process native execution through Cranelift
//!
//! This module provides:
//! - Lowering from the IR to Cranelift IR
//! - Entry trampolines that marshal `i64` arguments into native calls
//! - `JitEngine`, which compiles a whole module and runs an entry function

pub mod abi;
pub mod lowering;

mod engine;
pub use engine::{CompiledModule, JitConfig, JitEngine, OptLevel};
pub use lowering::LowerError;

use crate::ir::IrError;

/// Error during code generation
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("host ISA: {0}")]
    Isa(String),
    #[error("lowering failed: {0}")]
    Lowering(#[from] LowerError),
    #[error("module error: {0}")]
    Module(String),
}

/// Error while compiling or executing a module
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("function '{0}' not found in module")]
    FunctionNotFound(String),
    #[error("failed to create execution engine: {0}")]
    EngineCreationFailed(#[from] CodegenError),
    #[error("'{function}' takes {expected} argument(s), {given} given")]
    ArgumentCount { function: String, expected: usize, given: usize },
    #[error(transparent)]
    Malformed(#[from] IrError),
}
