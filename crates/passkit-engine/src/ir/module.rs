//! IR module: an ordered collection of functions
//!
//! A module is plain owned data and is `Send`, but it is not meant for
//! concurrent pass execution: passes take `&mut Function`, so two passes can
//! never mutate the same module at the same time.

use super::function::{Function, IrError};

/// A compilation unit
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Module identifier (usually the input file name)
    pub name: String,
    functions: Vec<Function>,
}

impl Module {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            functions: vec![],
        }
    }

    /// Add a function; names must be unique within the module
    pub fn add_function(&mut self, func: Function) -> Result<usize, IrError> {
        if self.function(&func.name).is_some() {
            return Err(IrError::DuplicateFunction(func.name));
        }
        self.functions.push(func);
        Ok(self.functions.len() - 1)
    }

    /// Functions in declaration order
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Mutable access to the functions in declaration order
    pub fn functions_mut(&mut self) -> &mut [Function] {
        &mut self.functions
    }

    /// Look up a function by name
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Look up a function by name, mutably
    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// Index of a function in declaration order
    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    /// Total instruction count across all functions
    pub fn instr_count(&self) -> usize {
        self.functions.iter().map(Function::instr_count).sum()
    }
}
