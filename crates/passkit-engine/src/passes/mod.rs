//! Function passes over the IR
//!
//! Each pass implements the `FunctionPass` trait and inspects or transforms a
//! `Function` in place. `PassManager` runs an ordered pipeline over a module;
//! `PassRegistry` maps command-line names to pass instances.

pub mod instcount;
pub mod swap;
pub mod manager;
pub mod registry;

pub use instcount::{CollectingSink, InstructionCount, InstructionCounter, LogSink, MetricSink};
pub use manager::{PassManager, RunSummary};
pub use registry::{PassError, PassRegistry};
pub use swap::BinaryOpSwap;

use crate::ir::Function;

/// Whether a pass only inspects or may also rewrite a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Reads the function, never mutates it
    Analysis,
    /// May rewrite the function
    Transform,
}

/// A pass over a single function
pub trait FunctionPass: Send + Sync {
    /// Registry name of this pass, unique among registered passes
    fn name(&self) -> &str;
    /// One-line human-readable description
    fn description(&self) -> &'static str;
    /// Analysis or transform
    fn kind(&self) -> PassKind;
    /// Run the pass; returns whether the function was modified
    fn run(&self, func: &mut Function) -> bool;
}
