//! Source-level include statements: compiling a unit pulls in its
//! dependencies, imports their exported symbols, and refuses duplicates.

use std::fs;

use sinc::{compile_source, CompilerConfig};

#[test]
fn included_source_unit_links_into_the_program() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("mathlib.sin"),
        "def int triple(alloc int n) { return n + n + n; }\n",
    )
    .unwrap();

    let source = "include \"mathlib.sin\";\nalloc int r: @triple(4);";
    let binary = compile_source(source, &CompilerConfig::default(), Some(dir.path()))
        .expect("include should compile and link");
    assert!(!binary.bytes.is_empty());

    // the include left its intermediate artifacts behind
    assert!(dir.path().join("mathlib.sina").exists());
    assert!(dir.path().join("mathlib.sinc").exists());
}

#[test]
fn duplicate_include_is_skipped_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("lib.sin"),
        "def int one() { return 1; }\n",
    )
    .unwrap();

    // including the same unit twice must not produce duplicate symbols
    let source = "include \"lib.sin\";\ninclude \"lib.sin\";\nalloc int r: @one();";
    let binary = compile_source(source, &CompilerConfig::default(), Some(dir.path()))
        .expect("duplicate include should be skipped, not fatal");
    assert!(!binary.bytes.is_empty());
}

#[test]
fn calling_a_function_that_was_never_included_fails() {
    let err = compile_source(
        "alloc int r: @missing(1);",
        &CompilerConfig::default(),
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("cannot locate function"));
}
