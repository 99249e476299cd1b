//! Ties every phase together into the per-file and whole-invocation
//! pipelines `src/bin/cflatc.rs` drives: preprocess, lex, parse, lower,
//! allocate/emit, assemble and link.
//!
//! Grounded on `examples/parishoffman-smol/src/bin/smolc.rs`'s `get_ir`
//! helper (lex→parse→lower→optimize chained under one function the binary
//! just calls) and spec.md §5/§6's pipeline-abort and CLI contracts.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument};

use crate::back::asm::AsmWriter;
use crate::back::spot::Syntax;
use crate::back::{emit, globals};
use crate::diagnostics::{CompilerContext, Diagnostic, DiagnosticKind};
use crate::front::lex;
use crate::front::parse;
use crate::front::preproc;
use crate::middle::lower::lower_program;

/// Which intermediate representation `--emit` should print instead of
/// continuing on to assembling and linking, generalizing the teacher's
/// `Output` enum (`Tokens/Ast/Tir/Asm`) to this pipeline's stage names.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum EmitStage {
    Tokens,
    Ast,
    Il,
    Asm,
}

/// Options threaded through `compile_file`/`run`, gathered from CLI flags in
/// `src/bin/cflatc.rs`.
pub struct CompileOptions {
    pub syntax: Syntax,
    pub reg_alloc_perf: bool,
    pub system_include_dirs: Vec<PathBuf>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions { syntax: Syntax::Intel, reg_alloc_perf: false, system_include_dirs: Vec::new() }
    }
}

/// Result of emitting one intermediate stage instead of compiling through to
/// assembly: the rendered text `--emit` prints to stdout.
pub fn emit_stage(path: &Path, stage: EmitStage, opts: &CompileOptions) -> Result<String, Vec<Diagnostic>> {
    let mut cc = CompilerContext::new();
    let source = read_and_preprocess(path, &mut cc, opts)?;

    if matches!(stage, EmitStage::Tokens) {
        let tokens = lex::tokenize(&path.display().to_string(), &source, &mut cc.diagnostics);
        bail_if_errors(&cc)?;
        return Ok(tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("\n"));
    }

    let tokens = lex::tokenize(&path.display().to_string(), &source, &mut cc.diagnostics);
    bail_if_errors(&cc)?;
    let ast = parse::parse(&tokens).map_err(|e| vec![e.into_diagnostic()])?;

    if matches!(stage, EmitStage::Ast) {
        return Ok(format!("{ast:#?}"));
    }

    let program = lower_program(&ast, &mut cc);
    bail_if_errors(&cc)?;

    if matches!(stage, EmitStage::Il) {
        return Ok(format!("{program:#?}"));
    }

    debug_assert!(matches!(stage, EmitStage::Asm));
    let (asm, stats) = assemble_text(&program, opts)?;
    if opts.reg_alloc_perf {
        for (name, s) in stats {
            info!(function = %name, total_prefs = s.total_prefs, matched_prefs = s.matched_prefs, total_values = s.total_values, registered_values = s.registered_values, "register allocator stats");
        }
    }
    Ok(asm)
}

/// Reads `path` and runs `#include` preprocessing against it, returning the
/// flattened source or the diagnostics the preprocessor accumulated.
#[instrument(skip(cc, opts))]
fn read_and_preprocess(path: &Path, cc: &mut CompilerContext, opts: &CompileOptions) -> Result<String, Vec<Diagnostic>> {
    let source = std::fs::read_to_string(path).map_err(|e| {
        vec![Diagnostic::error(DiagnosticKind::Lex, format!("unable to read {}: {e}", path.display()), None)]
    })?;
    let expanded = preproc::process(&source, path, &opts.system_include_dirs, &mut cc.diagnostics);
    bail_if_errors(cc)?;
    Ok(expanded)
}

fn bail_if_errors(cc: &CompilerContext) -> Result<(), Vec<Diagnostic>> {
    if cc.diagnostics.has_errors() {
        Err(cc.diagnostics.issues().to_vec())
    } else {
        Ok(())
    }
}

/// Lowers one preprocessed/parsed `il::Program` all the way to assembly
/// text, running the allocator/emitter per function. Returns per-function
/// allocator stats alongside the rendered text for `-z-reg-alloc-perf`.
fn assemble_text(
    program: &crate::middle::il::Program,
    opts: &CompileOptions,
) -> Result<(String, Vec<(String, crate::back::alloc::AllocStats)>), Vec<Diagnostic>> {
    let mut out = AsmWriter::new(opts.syntax);
    let global_spotmap = globals::build(program, &mut out);

    let mut stats = Vec::new();
    for func in &program.functions {
        match emit::compile_function(func, &global_spotmap, &mut out) {
            Ok(s) => stats.push((func.name.to_string(), s)),
            Err(msg) => {
                return Err(vec![Diagnostic::error(
                    DiagnosticKind::Unsupported,
                    format!("in function '{}': {msg}", func.name),
                    None,
                )]);
            }
        }
    }
    Ok((out.finish(), stats))
}

/// Compiles one `.c` file to a `.s` file alongside it (same stem, `.s`
/// extension), returning the path to the written assembly. This is the unit
/// `run` drives per input before handing everything to the external
/// assembler/linker.
#[instrument(skip(opts))]
pub fn compile_file(path: &Path, opts: &CompileOptions) -> Result<PathBuf, Vec<Diagnostic>> {
    debug!("compiling translation unit");
    let asm = emit_stage(path, EmitStage::Asm, opts)?;
    let out_path = path.with_extension("s");
    std::fs::write(&out_path, asm).map_err(|e| {
        vec![Diagnostic::error(DiagnosticKind::Link, format!("unable to write {}: {e}", out_path.display()), None)]
    })?;
    Ok(out_path)
}

/// The whole-invocation pipeline: compile every `.c` input to assembly,
/// pass `.o` inputs through unchanged, then assemble+link everything into
/// an ELF executable named `out` in the current directory via the system
/// `cc`, mirroring the original implementation's use of GCC as link driver.
/// Returns `Ok(())` on success (exit code 0) or the diagnostics/link error
/// that should produce exit code 1.
pub fn run(files: &[PathBuf], opts: &CompileOptions) -> Result<(), Vec<Diagnostic>> {
    let mut link_inputs = Vec::new();
    for file in files {
        match file.extension().and_then(|e| e.to_str()) {
            Some("c") => {
                let s_path = compile_file(file, opts)?;
                link_inputs.push(s_path);
            }
            Some("o") => link_inputs.push(file.clone()),
            _ => {
                return Err(vec![Diagnostic::error(
                    DiagnosticKind::Link,
                    format!("unrecognized input file {}", file.display()),
                    None,
                )]);
            }
        }
    }
    link(&link_inputs)
}

/// Invokes the system `cc` as assembler+linker over the given `.s`/`.o`
/// files, producing `./out`. A non-zero exit (missing CRT objects, a bad
/// dynamic linker, an unresolved external symbol) becomes a single `Link`
/// diagnostic, per spec.md §7.
#[instrument]
fn link(inputs: &[PathBuf]) -> Result<(), Vec<Diagnostic>> {
    let status = Command::new("cc")
        .arg("-o")
        .arg("out")
        .args(inputs)
        .status()
        .map_err(|e| vec![Diagnostic::error(DiagnosticKind::Link, format!("unable to invoke cc: {e}"), None)])?;

    if status.success() {
        info!("link succeeded, wrote ./out");
        Ok(())
    } else {
        Err(vec![Diagnostic::error(
            DiagnosticKind::Link,
            format!("linker exited with status {status}"),
            None,
        )])
    }
}
