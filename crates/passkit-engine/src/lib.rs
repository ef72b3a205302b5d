//! Passkit Engine
//!
//! A small compiler middle-end:
//! - **IR**: LLVM-style SSA functions with explicit use lists, a text parser and printer (`ir` module)
//! - **Passes**: function passes and the pass driver (`passes` module)
//! - **JIT**: Cranelift-backed in-process execution (`jit` module, `jit` feature)
//!
//! # Example
//!
//! ```rust,ignore
//! use passkit_engine::{parse_module, JitEngine, PassManager};
//!
//! let source = r#"
//! define i32 @simple_add(i32 %a, i32 %b) {
//! entry:
//!   %add = add nsw i32 %a, %b
//!   ret i32 %add
//! }
//! "#;
//!
//! let mut module = parse_module("demo", source).unwrap();
//! PassManager::default_pipeline().run(&mut module);
//! let result = JitEngine::default().run(module, "simple_add", &[10, 5]).unwrap();
//! assert_eq!(result, 5);
//! ```

#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// IR model, builder, printer, verifier, and text parser
pub mod ir;

/// Function passes, pass driver, and registry
pub mod passes;

/// Native code generation and execution
#[cfg(feature = "jit")]
pub mod jit;

// ============================================================================
// Re-exports
// ============================================================================

pub use ir::{parse_module, Function, IrBuilder, IrError, Module, ParseError};
pub use passes::{FunctionPass, PassError, PassManager, PassRegistry, RunSummary};

#[cfg(feature = "jit")]
pub use jit::{CompiledModule, ExecError, JitConfig, JitEngine};
