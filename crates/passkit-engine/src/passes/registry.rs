//! Name-to-pass registry

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{BinaryOpSwap, FunctionPass, InstructionCounter, MetricSink, PassManager};

/// Pass lookup and pipeline construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PassError {
    #[error("unknown pass '{name}' (available: {available})")]
    UnknownPass { name: String, available: String },
    #[error("pass pipeline is empty")]
    EmptyPipeline,
}

/// Passes addressable by name
#[derive(Default)]
pub struct PassRegistry {
    passes: FxHashMap<String, Arc<dyn FunctionPass>>,
}

impl PassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `instcount` (reporting to `sink`) and `add2sub`
    pub fn with_builtin(sink: Arc<dyn MetricSink>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InstructionCounter::new(sink)));
        registry.register(Arc::new(BinaryOpSwap::add_to_sub()));
        registry
    }

    /// Register a pass under its own name.
    ///
    /// Registering a name twice keeps the first pass.
    pub fn register(&mut self, pass: Arc<dyn FunctionPass>) -> bool {
        let name = pass.name().to_string();
        if self.passes.contains_key(&name) {
            log::debug!("pass {} already registered", name);
            return false;
        }
        self.passes.insert(name, pass);
        true
    }

    /// Find a pass by name
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn FunctionPass>, PassError> {
        self.passes.get(name).cloned().ok_or_else(|| PassError::UnknownPass {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    /// Build a pipeline from a comma-separated list such as `instcount,add2sub`
    pub fn build_pipeline(&self, pipeline: &str) -> Result<PassManager, PassError> {
        let mut pm = PassManager::new();
        for name in pipeline.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            pm.add_pass(self.lookup(name)?);
        }
        if pm.is_empty() {
            return Err(PassError::EmptyPipeline);
        }
        Ok(pm)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.passes.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// `(name, description)` for every registered pass, sorted by name
    pub fn describe(&self) -> Vec<(String, &'static str)> {
        self.names()
            .into_iter()
            .filter_map(|name| {
                let description = self.passes.get(&name)?.description();
                Some((name, description))
            })
            .collect()
    }
}
