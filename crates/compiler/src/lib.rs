//! SIN compiler library.
//!
//! Drives the toolchain pipeline: source text is lexed and parsed into a
//! statement tree, the code generator lowers it to SINASM16 text, the
//! assembler turns that into a relocatable object, and the linker lays the
//! objects out for the target VM and emits a flat binary the SINVM loads.
//!
//! The in-memory entry points ([`compile_to_asm`], [`compile_source`]) are
//! what the tests drive; [`build_file`] is the `sinc build` path.

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symbol;
pub mod types;

pub use ast::StatementBlock;
pub use codegen::CodeGen;
pub use config::CompilerConfig;
pub use error::{CompilerError, ParserError};
pub use parser::Parser;
pub use symbol::{Symbol, SymbolTable};
pub use types::{DataType, Type};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use sin_asm::{Assembler, Linker};
use sin_core::{FlatBinary, ObjectFile};

/// Compile source text to assembly with the default configuration.
pub fn compile_to_asm(source: &str) -> Result<String, CompilerError> {
    compile_to_asm_with_config(source, &CompilerConfig::default())
}

/// Compile source text to SINASM16 assembly.
pub fn compile_to_asm_with_config(
    source: &str,
    config: &CompilerConfig,
) -> Result<String, CompilerError> {
    config.validate()?;
    let ast = Parser::new(source)?.create_ast()?;
    let mut codegen = CodeGen::new();
    codegen.compile_program(&ast, config.include_builtins)
}

/// Compile source text all the way to a linked flat binary. Include
/// statements resolve against `include_dir` when given.
pub fn compile_source(
    source: &str,
    config: &CompilerConfig,
    include_dir: Option<&Path>,
) -> Result<FlatBinary, CompilerError> {
    config.validate()?;

    let ast = Parser::new(source)?.create_ast()?;
    let mut codegen = CodeGen::new();
    if let Some(dir) = include_dir {
        codegen = codegen.with_include_dir(dir);
    }
    let assembly = codegen.compile_program(&ast, config.include_builtins)?;
    debug!(lines = assembly.lines().count(), "assembly generated");

    let mut assembler = Assembler::new(config.wordsize());
    if let Some(dir) = include_dir {
        assembler = assembler.with_include_dir(dir);
    }
    let program_object = assembler
        .assemble(&assembly)
        .map_err(|e| CompilerError::plain(e.to_string(), 0))?;

    // the program object leads so execution starts at its first
    // instruction; builtins and included units follow
    let mut objects = vec![program_object];
    if config.include_builtins {
        objects.push(builtins::assemble_builtins()?);
    }
    for path in codegen.object_files() {
        objects.push(read_object(path)?);
    }
    for path in assembler.dependencies() {
        objects.push(read_object(path)?);
    }

    let linker =
        Linker::new(objects).map_err(|e| CompilerError::plain(e.to_string(), 0))?;
    linker
        .link()
        .map_err(|e| CompilerError::plain(e.to_string(), 0))
}

/// Compile a .sin source file into a flat binary on disk.
pub fn build_file(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), CompilerError> {
    let source = fs::read_to_string(source_path).map_err(|e| {
        CompilerError::plain(
            format!("failed to read source file '{}': {}", source_path.display(), e),
            0,
        )
    })?;

    if config.keep_asm {
        let assembly = compile_to_asm_with_config(&source, config)?;
        let asm_path = output_path.with_extension("sina");
        fs::write(&asm_path, assembly).map_err(|e| {
            CompilerError::plain(format!("failed to write assembly file: {}", e), 0)
        })?;
    }

    let include_dir = source_path.parent().map(PathBuf::from);
    let binary = compile_source(&source, config, include_dir.as_deref())?;

    write_binary(&binary, output_path)?;
    info!(output = %output_path.display(), bytes = binary.bytes.len(), "build complete");
    Ok(())
}

/// Assemble a .sina file into a .sinc object on disk.
pub fn assemble_file_to_object(
    input: &Path,
    output: &Path,
) -> Result<(), CompilerError> {
    let (object, _dependencies) = Assembler::assemble_file(input)
        .map_err(|e| CompilerError::plain(e.to_string(), 0))?;
    let mut file = fs::File::create(output).map_err(|e| {
        CompilerError::plain(format!("failed to create '{}': {}", output.display(), e), 0)
    })?;
    object
        .write(&mut file)
        .map_err(|e| CompilerError::plain(e.to_string(), 0))
}

/// Link .sinc objects, in order, into a flat binary on disk.
pub fn link_files(inputs: &[PathBuf], output: &Path) -> Result<(), CompilerError> {
    let mut objects = Vec::with_capacity(inputs.len());
    for path in inputs {
        objects.push(read_object(path)?);
    }
    let linker = Linker::new(objects).map_err(|e| CompilerError::plain(e.to_string(), 0))?;
    let binary = linker
        .link()
        .map_err(|e| CompilerError::plain(e.to_string(), 0))?;
    write_binary(&binary, output)
}

fn read_object(path: &Path) -> Result<ObjectFile, CompilerError> {
    let mut file = fs::File::open(path).map_err(|e| {
        CompilerError::plain(
            format!("failed to open object file '{}': {}", path.display(), e),
            0,
        )
    })?;
    ObjectFile::read(&mut file).map_err(|e| CompilerError::plain(e.to_string(), 0))
}

fn write_binary(binary: &FlatBinary, path: &Path) -> Result<(), CompilerError> {
    let mut file = fs::File::create(path).map_err(|e| {
        CompilerError::plain(format!("failed to create '{}': {}", path.display(), e), 0)
    })?;
    binary
        .write(&mut file)
        .map_err(|e| CompilerError::plain(format!("failed to write binary: {}", e), 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_to_asm_emits_init_and_halt() {
        let asm = compile_to_asm("alloc int x: 10;").unwrap();
        assert!(asm.starts_with("\tjsr __builtins_init"));
        assert!(asm.contains("@rs 2 x"));
        assert!(asm.contains("\thalt"));
    }

    #[test]
    fn test_compile_to_asm_without_builtins() {
        let mut config = CompilerConfig::default();
        config.include_builtins = false;
        let asm = compile_to_asm_with_config("alloc int x;", &config).unwrap();
        assert!(!asm.contains("__builtins_init"));
    }

    #[test]
    fn test_functions_collected_after_halt() {
        let asm = compile_to_asm(
            "def int double(alloc int n) { return n + n; }\nalloc int r: @double(21);",
        )
        .unwrap();
        let halt_at = asm.find("\thalt").unwrap();
        let def_at = asm.find("double:").unwrap();
        assert!(def_at > halt_at, "function text must follow the halt");
        assert!(asm.contains("\tjsr double"));
    }

    #[test]
    fn test_compile_source_links_builtins() {
        let binary = compile_source(
            "alloc int x: 1;",
            &CompilerConfig::default(),
            None,
        )
        .unwrap();
        assert_eq!(binary.wordsize, 16);
        assert!(!binary.bytes.is_empty());
    }

    #[test]
    fn test_semantic_error_propagates() {
        let err = compile_to_asm("let x = 1;").unwrap_err();
        assert!(err.to_string().contains("Compiler Error"));
    }
}
