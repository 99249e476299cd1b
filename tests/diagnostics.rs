//! Diagnostic scenarios from spec.md §8: each program is malformed in one
//! specific way and must produce exactly the documented diagnostic.

use std::path::PathBuf;

use cflatc::diagnostics::DiagnosticKind;
use cflatc::driver::{self, CompileOptions, EmitStage};

fn write_source(name: &str, source: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("cflatc-diag-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("main.c");
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn undeclared_identifier_reports_a_type_error_at_the_right_column() {
    let src = write_source("undeclared", "int main(){ return a; }");
    let err = driver::emit_stage(&src, EmitStage::Il, &CompileOptions::default())
        .expect_err("undeclared identifier should fail to lower");
    assert_eq!(err.len(), 1);
    assert_eq!(err[0].kind, DiagnosticKind::Type);
    assert!(err[0].message.contains("undeclared identifier 'a'"), "{}", err[0].message);
    let range = err[0].range.as_ref().expect("diagnostic should carry a source range");
    assert_eq!(range.start.col, "int main(){ return ".len() + 1);
}

#[test]
fn redeclaring_a_local_in_the_same_scope_is_a_redefinition_error() {
    let src = write_source("redef", "int main(){ int a; int a; return 0; }");
    let err = driver::emit_stage(&src, EmitStage::Il, &CompileOptions::default())
        .expect_err("redeclaration in the same scope should fail to lower");
    assert!(err.iter().any(|d| d.message.contains("redefinition of 'a'")), "{err:?}");
}

#[test]
fn returning_a_string_literal_from_an_int_function_is_a_type_error() {
    let src = write_source("string_to_int", "int main(){ return \"hi\"; }");
    let err = driver::emit_stage(&src, EmitStage::Il, &CompileOptions::default())
        .expect_err("returning char* from an int function should fail to lower");
    assert!(err.iter().any(|d| d.kind == DiagnosticKind::Type), "{err:?}");
}
