//! Passkit command-line driver
//!
//! Reads an IR file, runs a pass pipeline over it, and executes an entry
//! function through the JIT:
//!
//! ```text
//! passkit demos/simple_add.ll --passes instcount,add2sub --entry simple_add --args 10,5
//! ```

mod driver;

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "passkit")]
#[command(about = "Run function passes over IR and execute it with a JIT", long_about = None)]
#[command(version)]
struct Cli {
    /// Input IR file (.ll)
    #[arg(required_unless_present = "list_passes")]
    input: Option<PathBuf>,

    /// Comma-separated pass pipeline
    #[arg(short, long, default_value = "instcount,add2sub")]
    passes: String,

    /// Function to execute
    #[arg(short, long, default_value = "simple_add")]
    entry: String,

    /// Comma-separated integer arguments for the entry function
    #[arg(
        short,
        long,
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = [10i64, 5]
    )]
    args: Vec<i64>,

    /// Print the IR after the pipeline has run
    #[arg(long)]
    print_ir: bool,

    /// Stop after the pipeline; do not execute
    #[arg(long)]
    no_run: bool,

    /// Code generation optimization level
    #[arg(long, value_enum, default_value_t = OptLevelArg::Speed)]
    opt_level: OptLevelArg,

    /// Skip IR and Cranelift verification before compiling
    #[arg(long)]
    no_verify: bool,

    /// List the available passes and exit
    #[arg(long)]
    list_passes: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OptLevelArg {
    None,
    Speed,
    SpeedAndSize,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let usage_error = e.use_stderr();
            let _ = e.print();
            std::process::exit(if usage_error { 1 } else { 0 });
        }
    };
    init_logging(cli.verbose);

    if cli.list_passes {
        driver::list_passes();
        return Ok(());
    }

    let options = driver::Options {
        input: cli.input.unwrap_or_default(),
        passes: cli.passes,
        entry: cli.entry,
        args: cli.args,
        print_ir: cli.print_ir,
        run: !cli.no_run,
        opt_level: match cli.opt_level {
            OptLevelArg::None => driver::OptLevel::None,
            OptLevelArg::Speed => driver::OptLevel::Speed,
            OptLevelArg::SpeedAndSize => driver::OptLevel::SpeedAndSize,
        },
        verify: !cli.no_verify,
    };
    driver::execute(&options)
}
