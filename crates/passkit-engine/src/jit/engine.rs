//! JIT engine: compiles a whole module in-process and calls into it

use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module as _};
use rustc_hash::FxHashMap;
use target_lexicon::Triple;

use super::abi::{self, EntryFn};
use super::lowering::FunctionLowering;
use super::{CodegenError, ExecError};
use crate::ir::{verify_module, Module, Opcode};

/// Cranelift optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn setting(&self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Configuration for the JIT engine
#[derive(Debug, Clone)]
pub struct JitConfig {
    /// Cranelift optimization level (default: speed)
    pub opt_level: OptLevel,
    /// Verify the IR and the generated Cranelift IR before compiling (default: true)
    pub verify: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        JitConfig {
            opt_level: OptLevel::Speed,
            verify: true,
        }
    }
}

/// Compiles modules for the host machine
#[derive(Debug, Clone, Default)]
pub struct JitEngine {
    config: JitConfig,
}

impl JitEngine {
    /// Create an engine with the given configuration
    pub fn new(config: JitConfig) -> Self {
        JitEngine { config }
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Compile `module` and call `entry` with `args`.
    ///
    /// The entry function is looked up before anything is compiled.
    pub fn run(&self, module: Module, entry: &str, args: &[i64]) -> Result<i64, ExecError> {
        if module.function(entry).is_none() {
            return Err(ExecError::FunctionNotFound(entry.to_string()));
        }
        let compiled = self.compile(module)?;
        compiled.call(entry, args)
    }

    /// Compile every function of `module` to native code
    pub fn compile(&self, module: Module) -> Result<CompiledModule, ExecError> {
        if self.config.verify {
            verify_module(&module)?;
        }

        let isa = self.host_isa()?;
        let triple = isa.triple().clone();
        log::debug!("compiling module '{}' for {}", module.name, triple);

        let mut jit = JITModule::new(JITBuilder::with_isa(isa, cranelift_module::default_libcall_names()));
        match define_all(&mut jit, &module) {
            Ok(entries) => Ok(CompiledModule {
                module,
                jit: Some(jit),
                entries,
                triple,
            }),
            Err(e) => {
                // SAFETY: nothing compiled into `jit` has been handed out
                unsafe { jit.free_memory() };
                Err(ExecError::EngineCreationFailed(e))
            }
        }
    }

    fn host_isa(&self) -> Result<OwnedTargetIsa, CodegenError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", self.config.opt_level.setting())
            .map_err(|e| CodegenError::Isa(format!("failed to set opt_level: {}", e)))?;
        flag_builder
            .set("enable_verifier", if self.config.verify { "true" } else { "false" })
            .map_err(|e| CodegenError::Isa(format!("failed to set enable_verifier: {}", e)))?;
        // JIT code is placed at a fixed address and never relocated
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| CodegenError::Isa(format!("failed to set is_pic: {}", e)))?;
        let flags = settings::Flags::new(flag_builder);

        cranelift_native::builder()
            .map_err(|e| CodegenError::Isa(format!("failed to create native ISA builder: {}", e)))?
            .finish(flags)
            .map_err(|e| CodegenError::Isa(format!("failed to finish ISA: {}", e)))
    }
}

/// Declare and define every function plus its entry trampoline, then finalize.
///
/// Returns each function's trampoline address.
fn define_all(jit: &mut JITModule, module: &Module) -> Result<FxHashMap<String, *const u8>, CodegenError> {
    let call_conv = jit.isa().default_call_conv();
    let pointer_type = jit.target_config().pointer_type();
    let module_err = |what: &str, name: &str, e: cranelift_module::ModuleError| {
        CodegenError::Module(format!("{} '{}': {}", what, name, e))
    };

    // Phase 1: declare everything so calls can refer forward
    let mut func_ids: FxHashMap<String, FuncId> = FxHashMap::default();
    let mut entry_ids: Vec<(String, FuncId)> = Vec::with_capacity(module.functions().len());
    for func in module.functions() {
        let sig = abi::function_signature(func, call_conv);
        let id = jit
            .declare_function(&func.name, Linkage::Export, &sig)
            .map_err(|e| module_err("declare", &func.name, e))?;
        func_ids.insert(func.name.clone(), id);

        let entry_name = abi::entry_symbol(&func.name);
        let entry_sig = abi::entry_signature(pointer_type, call_conv);
        let entry_id = jit
            .declare_function(&entry_name, Linkage::Local, &entry_sig)
            .map_err(|e| module_err("declare", &entry_name, e))?;
        entry_ids.push((func.name.clone(), entry_id));
    }

    // Phase 2: lower and define
    let mut ctx = jit.make_context();
    let mut fb_ctx = FunctionBuilderContext::new();
    for (func, (_, entry_id)) in module.functions().iter().zip(&entry_ids) {
        let id = func_ids[&func.name];

        ctx.func.signature = abi::function_signature(func, call_conv);
        let mut callees = FxHashMap::default();
        for inst in func.instructions().map(|i| func.inst(i)) {
            if inst.opcode() != Opcode::Call {
                continue;
            }
            let name = inst.callee().unwrap_or_default();
            if let (Some(&callee_id), false) = (func_ids.get(name), callees.contains_key(name)) {
                let func_ref = jit.declare_func_in_func(callee_id, &mut ctx.func);
                callees.insert(name.to_string(), func_ref);
            }
        }
        FunctionLowering::lower(func, &callees, FunctionBuilder::new(&mut ctx.func, &mut fb_ctx))?;
        jit.define_function(id, &mut ctx)
            .map_err(|e| module_err("define", &func.name, e))?;
        jit.clear_context(&mut ctx);

        ctx.func.signature = abi::entry_signature(pointer_type, call_conv);
        let target = jit.declare_func_in_func(id, &mut ctx.func);
        abi::build_entry_trampoline(func, target, FunctionBuilder::new(&mut ctx.func, &mut fb_ctx));
        jit.define_function(*entry_id, &mut ctx)
            .map_err(|e| module_err("define entry for", &func.name, e))?;
        jit.clear_context(&mut ctx);

        log::debug!("compiled {}", func.name);
    }

    // Phase 3: finalize and collect trampoline addresses
    jit.finalize_definitions()
        .map_err(|e| CodegenError::Module(format!("finalize: {}", e)))?;

    Ok(entry_ids
        .into_iter()
        .map(|(name, entry_id)| (name, jit.get_finalized_function(entry_id)))
        .collect())
}

/// A module compiled to native code.
///
/// Owns the IR it was built from and the executable memory; both are released
/// on drop. Holds raw code pointers, so it stays on the thread that built it.
pub struct CompiledModule {
    module: Module,
    jit: Option<JITModule>,
    entries: FxHashMap<String, *const u8>,
    triple: Triple,
}

impl CompiledModule {
    /// Call a compiled function.
    ///
    /// Arguments are passed in declared order and narrowed to each
    /// parameter's width; the result is widened to `i64`.
    pub fn call(&self, name: &str, args: &[i64]) -> Result<i64, ExecError> {
        let func = self
            .module
            .function(name)
            .ok_or_else(|| ExecError::FunctionNotFound(name.to_string()))?;
        if func.params.len() != args.len() {
            return Err(ExecError::ArgumentCount {
                function: name.to_string(),
                expected: func.params.len(),
                given: args.len(),
            });
        }
        let ptr = *self
            .entries
            .get(name)
            .ok_or_else(|| ExecError::FunctionNotFound(name.to_string()))?;

        log::debug!("calling {}({:?})", name, args);
        // SAFETY: `ptr` is a finalized trampoline with the `EntryFn` ABI; it
        // reads exactly `func.params.len()` words from `args`, checked above,
        // and the code stays mapped while `self.jit` is alive.
        let result = unsafe {
            let entry: EntryFn = std::mem::transmute::<*const u8, EntryFn>(ptr);
            entry(args.as_ptr())
        };
        Ok(result)
    }

    /// The IR this module was compiled from
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Target the code was generated for
    pub fn triple(&self) -> &Triple {
        &self.triple
    }
}

impl Drop for CompiledModule {
    fn drop(&mut self) {
        if let Some(jit) = self.jit.take() {
            // SAFETY: the only pointers into this memory live in `entries`,
            // which is dropped together with `self`.
            unsafe { jit.free_memory() };
        }
    }
}
