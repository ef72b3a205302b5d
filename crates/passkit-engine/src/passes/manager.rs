//! Pass driver: runs an ordered pipeline over every function of a module

use std::sync::Arc;

use super::{BinaryOpSwap, FunctionPass, InstructionCounter, PassKind};
use crate::ir::{Function, Module};

/// Outcome of running a pipeline over a module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Whether any transform pass changed any function
    pub modified: bool,
    /// `(function, pass)` pairs that reported a change, in execution order
    pub changed: Vec<(String, String)>,
}

/// Ordered sequence of function passes
#[derive(Clone, Default)]
pub struct PassManager {
    passes: Vec<Arc<dyn FunctionPass>>,
}

impl PassManager {
    /// Create an empty pipeline
    pub fn new() -> Self {
        PassManager { passes: vec![] }
    }

    /// `instcount` (logging its reports) followed by `add2sub`
    pub fn default_pipeline() -> Self {
        PassManager {
            passes: vec![
                Arc::new(InstructionCounter::default()),
                Arc::new(BinaryOpSwap::add_to_sub()),
            ],
        }
    }

    /// Append a pass to the pipeline
    pub fn add_pass(&mut self, pass: Arc<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    /// Names of the configured passes, in order
    pub fn pass_names(&self) -> Vec<String> {
        self.passes.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run every pass over every function, functions in declaration order
    pub fn run(&self, module: &mut Module) -> RunSummary {
        let mut summary = RunSummary::default();
        for func in module.functions_mut() {
            for pass in self.run_function(func) {
                summary.modified = true;
                summary.changed.push((func.name.clone(), pass));
            }
        }
        summary
    }

    /// Run every pass over one function; returns the passes that changed it
    pub fn run_function(&self, func: &mut Function) -> Vec<String> {
        let mut changed = vec![];
        for pass in &self.passes {
            log::debug!("running {} on {}", pass.name(), func.name);
            let modified = pass.run(func);
            match (pass.kind(), modified) {
                (PassKind::Transform, true) => changed.push(pass.name().to_string()),
                (PassKind::Analysis, true) => {
                    log::warn!("analysis pass {} reported a change to {}; ignored", pass.name(), func.name);
                }
                (_, false) => {}
            }
        }
        changed
    }
}

impl std::fmt::Debug for PassManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassManager").field("passes", &self.pass_names()).finish()
    }
}
