//! Parse → passes → JIT pipeline behind the `passkit` command

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use passkit_engine::ir::parse_module;
use passkit_engine::passes::{CollectingSink, LogSink, PassRegistry};

#[cfg(feature = "jit")]
pub use passkit_engine::jit::OptLevel;

/// Code generation optimization level (no JIT in this build)
#[cfg(not(feature = "jit"))]
#[derive(Debug, Clone, Copy)]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

/// Everything one invocation needs
pub struct Options {
    pub input: PathBuf,
    pub passes: String,
    pub entry: String,
    pub args: Vec<i64>,
    pub print_ir: bool,
    pub run: bool,
    pub opt_level: OptLevel,
    pub verify: bool,
}

/// Print every registered pass with its description
pub fn list_passes() {
    let registry = PassRegistry::with_builtin(Arc::new(LogSink));
    for (name, description) in registry.describe() {
        println!("{:<12} {}", name, description);
    }
}

pub fn execute(options: &Options) -> anyhow::Result<()> {
    let path = &options.input;
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    let mut module =
        parse_module(&name, &source).with_context(|| format!("failed to parse {}", path.display()))?;
    log::info!("loaded {} function(s) from {}", module.functions().len(), path.display());

    let sink = Arc::new(CollectingSink::new());
    let registry = PassRegistry::with_builtin(sink.clone());
    let pipeline = registry.build_pipeline(&options.passes)?;

    let summary = pipeline.run(&mut module);
    for report in sink.take() {
        eprintln!("{}", report);
    }
    for (function, pass) in &summary.changed {
        log::info!("{} modified {}", pass, function);
    }

    if options.print_ir {
        print!("{}", module);
    }

    if options.run {
        let result = run_entry(module, options)?;
        let args: Vec<String> = options.args.iter().map(i64::to_string).collect();
        println!("{}({}) = {}", options.entry, args.join(", "), result);
    }
    Ok(())
}

#[cfg(feature = "jit")]
fn run_entry(module: passkit_engine::Module, options: &Options) -> anyhow::Result<i64> {
    use passkit_engine::jit::{JitConfig, JitEngine};

    let engine = JitEngine::new(JitConfig {
        opt_level: options.opt_level,
        verify: options.verify,
    });
    engine
        .run(module, &options.entry, &options.args)
        .with_context(|| format!("failed to execute @{}", options.entry))
}

#[cfg(not(feature = "jit"))]
fn run_entry(_module: passkit_engine::Module, options: &Options) -> anyhow::Result<i64> {
    let _ = (options.opt_level, options.verify);
    anyhow::bail!("cannot execute @{}: built without the `jit` feature (use --no-run)", options.entry)
}
