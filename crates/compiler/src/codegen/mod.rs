//! Code generation: lowering the AST to SINASM16 text.
//!
//! The generator walks a statement block in order, emitting assembly for
//! each statement and threading three pieces of state through every
//! lowering: the current scope (name + depth), the stack-offset model, and
//! the running end-of-frame offset (`max_offset`). Function bodies are
//! collected separately and appended after the top-level code.

mod allocate;
mod assign;
mod control_flow;
mod expressions;
mod functions;
mod state;

pub use state::CodeGen;
pub(crate) use state::{ASM_TYPE, WORD_BYTES};

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::ast::{Statement, StatementBlock, StatementKind};
use crate::error::{compiler_warning, CompilerError};
use crate::parser::Parser;
use crate::symbol::{Symbol, SymbolKind, GLOBAL_SCOPE};
use crate::types::Type;

impl CodeGen {
    /// Compile a whole program to assembly text: an optional call into the
    /// builtins init routine, the top-level statements, a halt, then every
    /// function subroutine.
    pub fn compile_program(
        &mut self,
        ast: &StatementBlock,
        include_builtins: bool,
    ) -> Result<String, CompilerError> {
        let mut out = String::new();
        if include_builtins {
            writeln!(out, "\tjsr __builtins_init")?;
        }
        let body = self.compile_block(ast, 0, GLOBAL_SCOPE, 0, 0)?;
        out.push_str(&body);
        writeln!(out, "\thalt")?;
        out.push_str(&self.functions_text);
        debug!(bytes = out.len(), "code generation complete");
        Ok(out)
    }

    /// Lower each statement of `block` in order.
    ///
    /// `level`/`scope_name` name the scope being compiled, `max_offset` is
    /// the end of the enclosing stack frame in words, and `frame_base` is
    /// the unwind target for return statements.
    pub(super) fn compile_block(
        &mut self,
        block: &StatementBlock,
        level: usize,
        scope_name: &str,
        mut max_offset: usize,
        frame_base: usize,
    ) -> Result<String, CompilerError> {
        self.current_scope = level;
        self.current_scope_name = scope_name.to_string();

        let mut out = String::new();
        for (index, statement) in block.statements.iter().enumerate() {
            match &statement.kind {
                StatementKind::Include { filename } => {
                    self.include_file(filename, statement.line)?;
                }
                StatementKind::Declaration {
                    data_type,
                    name,
                    is_function,
                    formal_parameters,
                } => {
                    self.handle_declaration(
                        *data_type,
                        name,
                        *is_function,
                        formal_parameters,
                        statement.line,
                    )?;
                }
                StatementKind::Allocation { .. } => {
                    let text = self.allocate(statement, &mut max_offset)?;
                    out.push_str(&text);
                }
                StatementKind::Assignment { .. } => {
                    let text = self.assign(statement, max_offset)?;
                    out.push_str(&text);
                }
                StatementKind::Return { value } => {
                    if self.current_scope_name == GLOBAL_SCOPE {
                        return Err(CompilerError::plain(
                            "cannot execute return statement outside of a function",
                            statement.line,
                        ));
                    }
                    let text =
                        self.return_value(value.as_ref(), frame_base, max_offset, statement.line)?;
                    out.push_str(&text);
                    if index + 1 != block.statements.len() {
                        compiler_warning(
                            "code after return statement is unreachable",
                            statement.line,
                        );
                    }
                }
                StatementKind::IfThenElse { .. } => {
                    let text = self.ite(statement, max_offset)?;
                    out.push_str(&text);
                }
                StatementKind::WhileLoop { .. } => {
                    let text = self.while_loop(statement, max_offset)?;
                    out.push_str(&text);
                }
                StatementKind::Definition { .. } => {
                    let text = self.define(statement)?;
                    self.functions_text.push_str(&text);
                    // defining a function must not disturb the scope we
                    // were compiling
                    self.current_scope = level;
                    self.current_scope_name = scope_name.to_string();
                }
                StatementKind::Call { name, args } => {
                    let text = self.call(name, args, max_offset, statement.line)?;
                    out.push_str(&text);
                }
                StatementKind::InlineAssembly { dialect, code } => {
                    if dialect != ASM_TYPE {
                        return Err(CompilerError::plain(
                            "inline ASM in file does not match compiler's ASM version",
                            statement.line,
                        ));
                    }
                    writeln!(out, ";; BEGIN ASM FROM .SIN FILE")?;
                    out.push_str(code);
                    if !code.ends_with('\n') {
                        out.push('\n');
                    }
                    writeln!(out, ";; END ASM FROM .SIN FILE")?;
                }
                StatementKind::Free { name } => {
                    let text = self.free(name, statement.line)?;
                    out.push_str(&text);
                }
                StatementKind::Empty => {
                    compiler_warning(
                        "empty statement found; could be the result of a parser error or a 'pass' statement",
                        statement.line,
                    );
                }
            }

            // statements may switch scope internally (definitions, branches)
            self.current_scope = level;
            self.current_scope_name = scope_name.to_string();
        }

        Ok(out)
    }

    /// Add the symbol from a `decl` statement; generates no code. The
    /// linker reports the missing definition if no implementation unit
    /// supplies one.
    fn handle_declaration(
        &mut self,
        data_type: crate::types::DataType,
        name: &str,
        is_function: bool,
        formal_parameters: &[Statement],
        line: usize,
    ) -> Result<(), CompilerError> {
        let symbol = if is_function {
            Symbol::function(name, data_type, formal_parameters.to_vec())
        } else {
            Symbol::variable(name, data_type, GLOBAL_SCOPE, 0, false)
        };
        self.symbol_table.insert(symbol, line)
    }

    /// Resolve an `include` statement: a compiled object is recorded for
    /// the linker, assembly is assembled, and source is compiled
    /// recursively with its exported symbols imported into our table.
    fn include_file(&mut self, filename: &str, line: usize) -> Result<(), CompilerError> {
        let path = match &self.include_dir {
            Some(dir) => dir.join(filename),
            None => PathBuf::from(filename),
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();

        if self.library_names.iter().any(|l| *l == stem) {
            compiler_warning("duplicate include found! skipping", line);
            return Ok(());
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            "sinc" => {
                self.object_files.push(path.clone());
            }
            "sina" => {
                let (object, dependencies) = sin_asm::Assembler::assemble_file(&path)
                    .map_err(|e| CompilerError::plain(e.to_string(), line))?;
                let object_path = path.with_extension("sinc");
                let mut file = fs::File::create(&object_path).map_err(|e| {
                    CompilerError::plain(
                        format!("could not create '{}': {}", object_path.display(), e),
                        line,
                    )
                })?;
                object
                    .write(&mut file)
                    .map_err(|e| CompilerError::plain(e.to_string(), line))?;
                self.object_files.push(object_path);
                self.object_files.extend(dependencies);
            }
            "sin" => {
                let source = fs::read_to_string(&path).map_err(|e| {
                    CompilerError::plain(
                        format!("could not open included file '{}': {}", path.display(), e),
                        line,
                    )
                })?;
                let ast = Parser::new(&source)?.create_ast()?;

                // compile the included unit with our include bookkeeping so
                // nested includes are deduplicated too
                let mut child = CodeGen::new();
                child.include_dir = path.parent().map(|p| p.to_path_buf());
                child.library_names = self.library_names.clone();
                child.library_names.push(stem.clone());
                let assembly = child.compile_program(&ast, false)?;

                let sina_path = path.with_extension("sina");
                fs::write(&sina_path, &assembly).map_err(|e| {
                    CompilerError::plain(
                        format!("could not write '{}': {}", sina_path.display(), e),
                        line,
                    )
                })?;

                let mut assembler = sin_asm::Assembler::new(self.wordsize);
                if let Some(parent) = path.parent() {
                    assembler = assembler.with_include_dir(parent);
                }
                let object = assembler
                    .assemble(&assembly)
                    .map_err(|e| CompilerError::plain(e.to_string(), line))?;
                let object_path = path.with_extension("sinc");
                let mut file = fs::File::create(&object_path).map_err(|e| {
                    CompilerError::plain(
                        format!("could not create '{}': {}", object_path.display(), e),
                        line,
                    )
                })?;
                object
                    .write(&mut file)
                    .map_err(|e| CompilerError::plain(e.to_string(), line))?;

                // import the unit's exported globals and functions
                for symbol in child.symbol_table.symbols() {
                    if symbol.is_global() {
                        self.symbol_table.insert(symbol.clone(), line)?;
                    }
                }
                for nested in child.library_names {
                    if !self.library_names.contains(&nested) && nested != stem {
                        self.library_names.push(nested);
                    }
                }
                self.object_files.extend(child.object_files);
                self.object_files.push(object_path);
            }
            _ => {
                return Err(CompilerError::plain(
                    format!("cannot include file '{}': unknown format", filename),
                    line,
                ));
            }
        }

        self.library_names.push(stem);
        Ok(())
    }

    /// Lower a `free` statement: load the variable's stored address into B
    /// and issue the heap-free syscall. Only dynamic memory that has not
    /// been freed may be freed, except that a plain pointer may always be
    /// freed (it may transitively own dynamic memory).
    fn free(&mut self, name: &str, line: usize) -> Result<String, CompilerError> {
        let mut out = String::new();

        let symbol = self
            .symbol_table
            .lookup(name, &self.current_scope_name, self.current_scope, line)?
            .clone();
        if !matches!(symbol.kind, SymbolKind::Variable) {
            return Err(CompilerError::plain("cannot free a function", line));
        }

        let is_dynamic = symbol.data_type.is_dynamic();
        let is_plain_pointer = symbol.data_type.primary() == Type::Ptr;
        if (!symbol.freed && is_dynamic) || is_plain_pointer {
            if symbol.has_static_storage() {
                writeln!(out, "\tloadb {}", symbol.name)?;
            } else {
                self.move_sp(&mut out, symbol.stack_offset + 1, false)?;
                writeln!(out, "\tplb")?;
                self.stack_offset -= 1;
            }
            writeln!(out, "\tsyscall #$20")?;

            let entry = self.symbol_table.lookup_mut(
                name,
                &self.current_scope_name,
                self.current_scope,
                line,
            )?;
            entry.defined = false;
            entry.freed = true;
        } else {
            return Err(CompilerError::plain(
                "cannot free the variable specified; can only free dynamic memory that has not already been freed",
                line,
            ));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parse(source: &str) -> StatementBlock {
        Parser::new(source).unwrap().create_ast().unwrap()
    }

    fn compile(source: &str) -> String {
        CodeGen::new().compile_program(&parse(source), false).unwrap()
    }

    #[test]
    fn test_stack_offset_restored_after_if_block() {
        let mut cg = CodeGen::new();
        let ast = parse("alloc int x: 1;\nif x { alloc int inner: 2; }\nalloc int after: 3;");
        cg.compile_program(&ast, false).unwrap();
        // one word for x, one for after; the if-branch local was unwound
        assert_eq!(cg.stack_offset, 0, "global scope runs at offset zero");
    }

    #[test]
    fn test_branch_block_locals_are_dropped() {
        let mut cg = CodeGen::new();
        let ast = parse("alloc int x: 1;\nwhile x { alloc int inner: 2; }\n");
        cg.compile_program(&ast, false).unwrap();
        assert!(
            !cg.symbol_table.contains("inner", GLOBAL_SCOPE),
            "loop-local symbol must be removed at scope exit"
        );
        assert!(cg.symbol_table.contains("x", GLOBAL_SCOPE));
    }

    #[test]
    fn test_branch_bodies_unwind_their_locals() {
        let asm = compile("alloc int x: 1;\nif x { alloc int inner: 2; } else { pass; }");
        // the branch allocates one word and must release exactly one
        let if_section: String = asm
            .lines()
            .skip_while(|l| !l.contains("breq"))
            .skip(1)
            .take_while(|l| !l.ends_with(".else:"))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(if_section.contains("incsp"), "if branch must unwind its local");
    }

    #[test]
    fn test_while_loop_label_scheme() {
        let asm = compile("alloc int i: 3;\nwhile i { let i = i - 1; }");
        assert!(asm.contains("__global_0__WHILE_"));
        assert!(asm.contains(".done:"));
        // the loop jumps back to its top label
        let label = asm
            .lines()
            .find(|l| l.starts_with("__global_0__WHILE_") && l.ends_with(':'))
            .unwrap()
            .trim_end_matches(':')
            .to_string();
        assert!(asm.contains(&format!("\tjmp {}", label)));
        assert!(asm.contains(&format!("\tbreq {}.done", label)));
    }

    #[test]
    fn test_inline_asm_passes_through_with_matching_dialect() {
        let asm = compile("asm<sinasm16> {\n\tnoop\n};");
        assert!(asm.contains(";; BEGIN ASM FROM .SIN FILE"));
        assert!(asm.contains("\tnoop"));
        assert!(asm.contains(";; END ASM FROM .SIN FILE"));
    }

    #[test]
    fn test_inline_asm_dialect_mismatch_rejected() {
        let ast = parse("asm<sinasm32> {\n\tnoop\n};");
        let err = CodeGen::new().compile_program(&ast, false).unwrap_err();
        assert!(err.message().contains("ASM version"));
    }

    #[test]
    fn test_free_emits_heap_free_syscall() {
        let asm = compile("alloc dynamic int x: 5;\nfree x;");
        assert!(asm.contains("\tloadb x"));
        assert!(asm.contains("\tsyscall #$20"));
    }

    #[test]
    fn test_double_free_rejected() {
        let ast = parse("alloc dynamic int x: 5;\nfree x;\nfree x;");
        let err = CodeGen::new().compile_program(&ast, false).unwrap_err();
        assert!(err.message().contains("already been freed"));
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_plain_pointer_may_always_be_freed() {
        let asm = compile(
            "alloc int v: 1;\nalloc ptr<int> p: $v;\nfree p;\nfree p;",
        );
        // both frees compile; a pointer may transitively own dynamic memory
        assert_eq!(asm.matches("\tsyscall #$20").count(), 2);
    }

    #[test]
    fn test_use_after_free_rejected() {
        let ast = parse("alloc dynamic int x: 5;\nfree x;\nalloc int y: x;");
        let err = CodeGen::new().compile_program(&ast, false).unwrap_err();
        assert!(err.message().contains("referenced before assignment"));
    }

    #[test]
    fn test_declaration_emits_no_code() {
        let asm = compile("decl int external_counter;");
        assert_eq!(asm.trim(), "halt");
    }
}
