//! `cflatc`: the compiler driver binary. Takes one or more `.c`/`.o` files
//! and either compiles+links them into an ELF executable named `out`, or
//! with `--emit`, dumps a single intermediate representation for the first
//! input and stops there.
//!
//! CLI shape follows `examples/parishoffman-smol/src/bin/smolc.rs`'s
//! `clap::Parser` struct and `Output` value-enum pattern, generalized to
//! this pipeline's stages and multi-file link-driver contract.

use std::path::PathBuf;

use clap::Parser;

use cflatc::back::spot::Syntax;
use cflatc::driver::{self, CompileOptions, EmitStage};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// input `.c`/`.o` files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// print register-allocator statistics per function
    #[arg(long = "z-reg-alloc-perf", default_value_t = false)]
    reg_alloc_perf: bool,

    /// dump an intermediate stage for the first input instead of linking
    #[arg(long, value_enum)]
    emit: Option<EmitStage>,

    /// assembly syntax to emit
    #[arg(long, value_enum, default_value = "intel")]
    syntax: Syntax,

    /// directory to search for `#include <...>` headers (repeatable)
    #[arg(short = 'I', long = "include-dir")]
    include_dirs: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let opts = CompileOptions {
        syntax: args.syntax,
        reg_alloc_perf: args.reg_alloc_perf,
        system_include_dirs: args.include_dirs,
    };

    let result = match args.emit {
        Some(stage) => {
            let Some(first) = args.files.first() else {
                eprintln!("cflatc: error: no input files");
                std::process::exit(1);
            };
            driver::emit_stage(first, stage, &opts).map(|text| {
                println!("{text}");
            })
        }
        None => driver::run(&args.files, &opts),
    };

    if let Err(diagnostics) = result {
        for d in &diagnostics {
            eprintln!("{d}");
        }
        std::process::exit(1);
    }
}
