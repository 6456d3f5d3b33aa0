//! Two-pass SINASM assembler.
//!
//! Pass one walks the source to build the symbol table and size the code
//! section: labels become Defined symbols at the current byte counter,
//! `@rs` reservations become Reserved symbols, `@db` constants land in the
//! data table with a Constant symbol. Pass two re-walks the source with the
//! byte counter reset and emits code bytes; symbolic operands emit zeroes
//! plus a relocation-table entry for the linker to patch.
//!
//! A label with a leading dot is a sublabel and is stored concatenated with
//! the enclosing top-level label, so `loop:` inside `main:` is addressable
//! as `main.loop` from elsewhere and as `.loop` locally.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use sin_core::io::to_be_bytes;
use sin_core::object::{DataEntry, ObjectFile, ObjectSymbol, Relocation, SymbolClass};
use sin_core::opcode::{
    self, accepts_reg_a, accepts_reg_b, can_use_immediate, is_standalone, opcode_for,
};
use sin_core::{addressing, Wordsize, RELOCATION_NONE};

use crate::error::AsmError;

/// Operand value: a literal number or a symbol to be relocated.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Num(u64),
    Sym(String),
}

/// A parsed operand.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    RegA,
    RegB,
    Expr { mode: u8, value: Value },
}

pub struct Assembler {
    wordsize: Wordsize,
    vm_version: u8,
    include_dir: Option<PathBuf>,

    current_byte: u16,
    line_number: usize,
    current_scope: String,

    symbols: Vec<ObjectSymbol>,
    relocations: Vec<Relocation>,
    data: Vec<DataEntry>,
    data_offset: u16,

    /// Object files named by `@include` directives, to be handed to the
    /// linker alongside this unit.
    dependencies: Vec<PathBuf>,
}

impl Assembler {
    pub fn new(wordsize: Wordsize) -> Self {
        Assembler {
            wordsize,
            vm_version: 1,
            include_dir: None,
            current_byte: 0,
            line_number: 0,
            current_scope: "global".to_string(),
            symbols: Vec::new(),
            relocations: Vec::new(),
            data: Vec::new(),
            data_offset: 0,
            dependencies: Vec::new(),
        }
    }

    /// Directory against which `@include` paths are resolved.
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }

    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    /// Assemble a file from disk, resolving includes relative to it.
    pub fn assemble_file(path: &Path) -> Result<(ObjectFile, Vec<PathBuf>), AsmError> {
        let source = fs::read_to_string(path)
            .map_err(|e| AsmError::new(format!("cannot open '{}': {}", path.display(), e), 0))?;
        let mut assembler = Assembler::new(Wordsize::W16);
        if let Some(parent) = path.parent() {
            assembler.include_dir = Some(parent.to_path_buf());
        }
        let object = assembler.assemble(&source)?;
        let deps = assembler.dependencies.clone();
        Ok((object, deps))
    }

    /// Run both passes over `source` and produce the object file.
    pub fn assemble(&mut self, source: &str) -> Result<ObjectFile, AsmError> {
        self.current_byte = 0;
        self.line_number = 0;
        self.data_offset = 0;
        self.current_scope = "global".to_string();

        self.first_pass(source)?;

        let code_size = self.current_byte;
        debug!(code_size, symbols = self.symbols.len(), "pass one complete");

        // reset for pass two
        self.current_byte = 0;
        self.line_number = 0;
        self.current_scope = "global".to_string();

        let code = self.second_pass(source)?;
        debug!(
            bytes = code.len(),
            relocations = self.relocations.len(),
            "pass two complete"
        );
        debug_assert_eq!(code.len(), code_size as usize);

        Ok(ObjectFile {
            wordsize: self.wordsize.bits(),
            vm_version: self.vm_version,
            entry: 0,
            code,
            symbols: std::mem::take(&mut self.symbols),
            relocations: std::mem::take(&mut self.relocations),
            data: std::mem::take(&mut self.data),
        })
    }

    fn first_pass(&mut self, source: &str) -> Result<(), AsmError> {
        for raw_line in source.lines() {
            self.line_number += 1;
            let tokens = split_line(raw_line);
            if tokens.is_empty() {
                continue;
            }
            let head = tokens[0].as_str();

            if let Some(op) = opcode_for(head) {
                self.current_byte += self.instruction_size(op, &tokens[1..]);
            } else if head.ends_with(':') {
                let name = self.scoped_label(&head[..head.len() - 1], true);
                self.symbols.push(ObjectSymbol::new(
                    name,
                    self.current_byte,
                    self.wordsize.bytes() as u16,
                    SymbolClass::Defined,
                ));
            } else if let Some(directive) = head.strip_prefix('@') {
                self.first_pass_directive(directive, &tokens)?;
            }
            // macros and anything else are handled on the second pass
        }
        Ok(())
    }

    /// Encoded length of one instruction: 1 byte standalone, 2 bytes with a
    /// register operand, 2 + wordsize/8 otherwise.
    fn instruction_size(&self, opcode: u8, rest: &[String]) -> u16 {
        if is_standalone(opcode) {
            1
        } else if rest.len() == 1 && (rest[0].eq_ignore_ascii_case("a") || rest[0].eq_ignore_ascii_case("b")) {
            2
        } else {
            2 + self.wordsize.bytes() as u16
        }
    }

    fn first_pass_directive(&mut self, directive: &str, tokens: &[String]) -> Result<(), AsmError> {
        match directive {
            "include" => {
                let file = tokens.get(1).ok_or_else(|| {
                    AsmError::new("@include requires a file name", self.line_number)
                })?;
                self.include(file)
            }
            "rs" => {
                // @rs <byteCount> <name>
                let count_str = tokens.get(1).ok_or_else(|| {
                    AsmError::new("@rs requires a byte count and a name", self.line_number)
                })?;
                if !count_str.chars().all(|c| c.is_ascii_digit()) {
                    return Err(AsmError::new(
                        "the number of bytes to reserve must be given in base 10",
                        self.line_number,
                    ));
                }
                let count: u16 = count_str.parse().map_err(|_| {
                    AsmError::new("invalid byte count in @rs directive", self.line_number)
                })?;
                if count == 0 {
                    return Err(AsmError::new(
                        "the number of bytes to reserve must be positive",
                        self.line_number,
                    ));
                }
                let name = tokens.get(2).ok_or_else(|| {
                    AsmError::new("@rs requires a name after the byte count", self.line_number)
                })?;
                self.symbols.push(ObjectSymbol::new(
                    name.clone(),
                    0,
                    count,
                    SymbolClass::Reserved,
                ));
                Ok(())
            }
            "db" => {
                // @db <name> (<data>)
                let name = tokens.get(1).ok_or_else(|| {
                    AsmError::new("@db requires a name and parenthesized data", self.line_number)
                })?;
                let joined = tokens[2..].join(" ");
                let data_text = joined
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .ok_or_else(|| {
                        AsmError::new(
                            "@db data must be enclosed in parentheses",
                            self.line_number,
                        )
                    })?;
                let bytes = self.db_bytes(data_text);
                self.symbols.push(ObjectSymbol::new(
                    name.clone(),
                    0,
                    self.wordsize.bytes() as u16,
                    SymbolClass::Constant,
                ));
                let len = bytes.len() as u16;
                self.data.push(DataEntry {
                    name: name.clone(),
                    offset: self.data_offset,
                    bytes,
                });
                self.data_offset += len;
                Ok(())
            }
            other => Err(AsmError::new(
                format!("unknown assembler directive '@{}'", other),
                self.line_number,
            )),
        }
    }

    /// Encode `@db` data: a numeric literal becomes one big-endian word,
    /// anything else is stored as its raw bytes.
    fn db_bytes(&self, text: &str) -> Vec<u8> {
        let trimmed = text.strip_prefix('#').unwrap_or(text);
        if let Ok(value) = parse_numeric(trimmed) {
            to_be_bytes(value, self.wordsize.bytes())
        } else {
            text.as_bytes().to_vec()
        }
    }

    fn include(&mut self, file: &str) -> Result<(), AsmError> {
        let path = match &self.include_dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        };
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            // already an object: just record the dependency
            "sinc" => {
                self.dependencies.push(path);
                Ok(())
            }
            // assembly source: assemble it now and link the result
            "sina" => {
                let (object, nested) = Assembler::assemble_file(&path)?;
                let object_path = path.with_extension("sinc");
                let mut out = fs::File::create(&object_path).map_err(|e| {
                    AsmError::new(
                        format!("cannot create '{}': {}", object_path.display(), e),
                        self.line_number,
                    )
                })?;
                object.write(&mut out).map_err(|e| {
                    AsmError::new(format!("cannot write included object: {}", e), self.line_number)
                })?;
                self.dependencies.push(object_path);
                self.dependencies.extend(nested);
                Ok(())
            }
            _ => Err(AsmError::new(
                format!("format of included file '{}' is not supported", file),
                self.line_number,
            )),
        }
    }

    fn second_pass(&mut self, source: &str) -> Result<Vec<u8>, AsmError> {
        let mut code: Vec<u8> = Vec::new();

        for raw_line in source.lines() {
            self.line_number += 1;
            let tokens = split_line(raw_line);
            if tokens.is_empty() {
                continue;
            }
            let head = tokens[0].as_str();

            if let Some(op) = opcode_for(head) {
                self.encode_instruction(op, &tokens[1..], &mut code)?;
            } else if head.ends_with(':') {
                let label = &head[..head.len() - 1];
                if !label.starts_with('.') {
                    self.current_scope = label.to_string();
                }
            } else if head.starts_with('@') {
                // directives were consumed in pass one
                continue;
            } else if tokens.len() >= 3 && tokens[1] == "=" {
                self.define_macro(&tokens[0], &tokens[2])?;
            } else if tokens.len() >= 2 {
                return Err(AsmError::new(
                    "leading identifiers must be labels, macros, or assembler directives",
                    self.line_number,
                ));
            } else if head.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                // a bare identifier is a label that lost its colon
                return Err(AsmError::new(
                    format!("label '{}' is missing its colon", head),
                    self.line_number,
                ));
            } else {
                return Err(AsmError::new("unknown symbol in file", self.line_number));
            }
        }

        Ok(code)
    }

    fn define_macro(&mut self, name: &str, value_text: &str) -> Result<(), AsmError> {
        let value = parse_numeric(value_text)
            .map_err(|e| AsmError::new(e, self.line_number))? as u16;
        match self.symbols.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.class = SymbolClass::Macro;
            }
            None => self.symbols.push(ObjectSymbol::new(
                name.to_string(),
                value,
                self.wordsize.bytes() as u16,
                SymbolClass::Macro,
            )),
        }
        Ok(())
    }

    fn encode_instruction(
        &mut self,
        opcode: u8,
        rest: &[String],
        code: &mut Vec<u8>,
    ) -> Result<(), AsmError> {
        self.current_byte += 1;
        code.push(opcode);

        if rest.is_empty() {
            if is_standalone(opcode) {
                return Ok(());
            }
            return Err(AsmError::new(
                "expected a value following instruction mnemonic",
                self.line_number,
            ));
        }
        if is_standalone(opcode) {
            return Err(AsmError::new(
                format!(
                    "'{}' does not take an operand",
                    opcode::mnemonic_for(opcode).unwrap_or("instruction")
                ),
                self.line_number,
            ));
        }

        let operand_text = rest.join(" ");
        let operand = self
            .parse_operand(&operand_text)
            .map_err(|msg| AsmError::new(msg, self.line_number))?;

        match operand {
            Operand::RegA => {
                if !accepts_reg_a(opcode) {
                    return Err(AsmError::new(
                        "cannot use 'a' as an operand unless with a bitshift instruction",
                        self.line_number,
                    ));
                }
                self.current_byte += 1;
                code.push(addressing::REG_A);
            }
            Operand::RegB => {
                if !accepts_reg_b(opcode) {
                    return Err(AsmError::new(
                        "may only use 'b' as an operand with the ALU and FPU register instructions",
                        self.line_number,
                    ));
                }
                self.current_byte += 1;
                code.push(addressing::REG_B);
            }
            Operand::Expr { mode, value } => {
                if mode == addressing::IMMEDIATE && !can_use_immediate(opcode) {
                    return Err(AsmError::new(
                        "cannot use the immediate addressing mode on an instruction of this type",
                        self.line_number,
                    ));
                }
                self.current_byte += 1;
                code.push(mode);

                let operand_offset = self.current_byte;
                let width = self.wordsize.bytes();
                self.current_byte += width as u16;

                match value {
                    Value::Sym(name) => {
                        // the operand word is patched by the linker
                        self.relocations.push(Relocation::new(name, operand_offset));
                        code.extend(std::iter::repeat(0u8).take(width));
                    }
                    Value::Num(n) => {
                        // numeric jump targets are program-relative; mark
                        // them for rebasing with the _NONE sentinel
                        if mode == addressing::ABSOLUTE && is_control_flow(opcode) {
                            self.relocations
                                .push(Relocation::new(RELOCATION_NONE, operand_offset));
                        }
                        code.extend(to_be_bytes(n, width));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse the operand text into a mode and value.
    fn parse_operand(&mut self, text: &str) -> Result<Operand, String> {
        let t: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if t.is_empty() {
            return Err("expected a value following instruction mnemonic".to_string());
        }
        if t.eq_ignore_ascii_case("a") {
            return Ok(Operand::RegA);
        }
        if t.eq_ignore_ascii_case("b") {
            return Ok(Operand::RegB);
        }

        if let Some(imm) = t.strip_prefix('#') {
            if imm.contains(',') || imm.contains('(') {
                return Err("immediate operands cannot be indexed".to_string());
            }
            let value = self.parse_value(imm)?;
            return Ok(Operand::Expr {
                mode: addressing::IMMEDIATE,
                value,
            });
        }

        if let Some(inner_and_rest) = t.strip_prefix('(') {
            let close = inner_and_rest
                .find(')')
                .ok_or_else(|| "unterminated parenthesis in operand".to_string())?;
            let inner = &inner_and_rest[..close];
            let after = &inner_and_rest[close + 1..];

            if let Some((value_text, index)) = inner.split_once(',') {
                // ($addr, x)
                if !after.is_empty() {
                    return Err("unexpected text after indirect operand".to_string());
                }
                if !index.eq_ignore_ascii_case("x") {
                    return Err(
                        "must use register X when using the indexed indirect addressing mode"
                            .to_string(),
                    );
                }
                let value = self.parse_value(value_text)?;
                return Ok(Operand::Expr {
                    mode: addressing::INDIRECT_X,
                    value,
                });
            }

            // ($addr), y
            let index = after.strip_prefix(',').ok_or_else(|| {
                "indirect addressing requires an index register".to_string()
            })?;
            if !index.eq_ignore_ascii_case("y") {
                return Err(
                    "must use register Y when using the indirect indexed addressing mode"
                        .to_string(),
                );
            }
            let value = self.parse_value(inner)?;
            return Ok(Operand::Expr {
                mode: addressing::INDIRECT_Y,
                value,
            });
        }

        if let Some((value_text, index)) = t.split_once(',') {
            if index.is_empty() {
                return Err("expected register for index but found nothing".to_string());
            }
            let mode = if index.eq_ignore_ascii_case("x") {
                addressing::X_INDEX
            } else if index.eq_ignore_ascii_case("y") {
                addressing::Y_INDEX
            } else {
                return Err("must use register X or Y when using indexed addressing modes"
                    .to_string());
            };
            let value = self.parse_value(value_text)?;
            return Ok(Operand::Expr { mode, value });
        }

        let value = self.parse_value(&t)?;
        Ok(Operand::Expr {
            mode: addressing::ABSOLUTE,
            value,
        })
    }

    /// Parse a bare value: a number with an optional radix prefix, or a
    /// symbol name (sublabels are expanded against the current scope).
    fn parse_value(&mut self, text: &str) -> Result<Value, String> {
        if text.is_empty() {
            return Err("cannot get the value of an empty string".to_string());
        }
        let first = text.chars().next().unwrap_or_default();
        if first.is_ascii_alphabetic() || first == '_' || first == '.' {
            if text.ends_with(':') {
                return Err("labels must not be followed by colons when referenced".to_string());
            }
            let name = self.scoped_label(text, false);
            return Ok(Value::Sym(name));
        }
        parse_numeric(text).map(Value::Num)
    }

    /// Expand a sublabel against the current scope; a plain label updates
    /// the scope when `declaring`.
    fn scoped_label(&mut self, label: &str, declaring: bool) -> String {
        if label.starts_with('.') {
            format!("{}{}", self.current_scope, label)
        } else {
            if declaring {
                self.current_scope = label.to_string();
            }
            label.to_string()
        }
    }
}

/// True for the instructions whose absolute operands are program addresses.
fn is_control_flow(op: u8) -> bool {
    matches!(
        op,
        opcode::JMP
            | opcode::BRNE
            | opcode::BREQ
            | opcode::BRGT
            | opcode::BRLT
            | opcode::BRZ
            | opcode::BRN
            | opcode::BRPL
            | opcode::JSR
    )
}

/// Parse a numeric literal: `$` hex, `%` binary, bare decimal.
fn parse_numeric(text: &str) -> Result<u64, String> {
    if text.is_empty() {
        return Err("cannot get the value of an empty string".to_string());
    }
    let first = text.chars().next().unwrap_or_default();
    if first.is_ascii_digit() {
        text.parse::<u64>()
            .map_err(|_| format!("invalid decimal value '{}'", text))
    } else if let Some(hex) = text.strip_prefix('$') {
        u64::from_str_radix(hex, 16).map_err(|_| format!("invalid hex value '{}'", text))
    } else if let Some(bin) = text.strip_prefix('%') {
        u64::from_str_radix(bin, 2).map_err(|_| format!("invalid binary value '{}'", text))
    } else {
        Err(format!(
            "the character '{}' is not a valid value operator; options are $ (hex) or % (binary)",
            first
        ))
    }
}

/// Split a raw source line into whitespace-separated tokens with the
/// trailing comment removed. A semicolon inside `@db` parentheses is data,
/// not a comment.
fn split_line(line: &str) -> Vec<String> {
    let mut cut = line.len();
    let mut depth = 0usize;
    for (i, c) in line.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ';' if depth == 0 => {
                cut = i;
                break;
            }
            _ => {}
        }
    }
    line[..cut]
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sin_core::opcode::{HALT, LOADA, MNEMONICS, STOREA};

    fn assemble(src: &str) -> ObjectFile {
        Assembler::new(Wordsize::W16).assemble(src).unwrap()
    }

    fn assemble_err(src: &str) -> AsmError {
        Assembler::new(Wordsize::W16).assemble(src).unwrap_err()
    }

    #[test]
    fn test_standalone_is_one_byte() {
        let obj = assemble("halt");
        assert_eq!(obj.code, vec![HALT]);
    }

    #[test]
    fn test_immediate_encoding() {
        let obj = assemble("loada #$2A");
        assert_eq!(obj.code, vec![LOADA, addressing::IMMEDIATE, 0x00, 0x2A]);
    }

    #[test]
    fn test_absolute_and_indexed_encoding() {
        let obj = assemble("storea $1234, y");
        assert_eq!(obj.code, vec![STOREA, addressing::Y_INDEX, 0x12, 0x34]);

        let obj = assemble("loada %101");
        assert_eq!(obj.code, vec![LOADA, addressing::ABSOLUTE, 0x00, 0x05]);
    }

    #[test]
    fn test_indirect_encoding() {
        let obj = assemble("loada ($00), y");
        assert_eq!(obj.code, vec![LOADA, addressing::INDIRECT_Y, 0x00, 0x00]);

        let obj = assemble("loada ($10, x)");
        assert_eq!(obj.code, vec![LOADA, addressing::INDIRECT_X, 0x00, 0x10]);
    }

    #[test]
    fn test_register_operand_encoding() {
        let obj = assemble("lsl a");
        assert_eq!(obj.code, vec![opcode::LSL, addressing::REG_A]);

        let obj = assemble("addca b");
        assert_eq!(obj.code, vec![opcode::ADDCA, addressing::REG_B]);
    }

    #[test]
    fn test_every_mnemonic_has_specified_length() {
        // property: 1 byte standalone, 2 + wordsize/8 with a word operand
        let w = Wordsize::W16;
        for &mnemonic in MNEMONICS {
            let op = opcode_for(mnemonic).unwrap();
            let line = if is_standalone(op) {
                mnemonic.to_string()
            } else if accepts_reg_a(op) {
                format!("{} a", mnemonic)
            } else if accepts_reg_b(op) {
                format!("{} b", mnemonic)
            } else if can_use_immediate(op) {
                format!("{} #$01", mnemonic)
            } else {
                format!("{} $1234", mnemonic)
            };
            let obj = Assembler::new(w).assemble(&line).unwrap();
            let expected = if is_standalone(op) {
                1
            } else if accepts_reg_a(op) || accepts_reg_b(op) {
                2
            } else {
                2 + w.bytes()
            };
            assert_eq!(obj.code.len(), expected, "length of '{}'", line);
        }
    }

    #[test]
    fn test_label_symbol_and_reference() {
        let obj = assemble("start:\n\tloada #$01\n\tjmp start\n");
        let sym = obj.symbols.iter().find(|s| s.name == "start").unwrap();
        assert_eq!(sym.class, SymbolClass::Defined);
        assert_eq!(sym.value, 0);
        // the jmp operand at bytes 6..8 must be relocated
        assert_eq!(obj.relocations.len(), 1);
        assert_eq!(obj.relocations[0].name, "start");
        assert_eq!(obj.relocations[0].address, 6);
        assert_eq!(&obj.code[6..8], &[0, 0]);
    }

    #[test]
    fn test_sublabel_scoping() {
        let obj = assemble("main:\n.loop:\n\tjmp .loop\nother:\n.loop:\n\tjmp .loop\n");
        let names: Vec<_> = obj.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"main.loop"));
        assert!(names.contains(&"other.loop"));
        assert_eq!(obj.relocations[0].name, "main.loop");
        assert_eq!(obj.relocations[1].name, "other.loop");
    }

    #[test]
    fn test_rs_directive() {
        let obj = assemble("@rs 2 counter\n");
        let sym = obj.symbols.iter().find(|s| s.name == "counter").unwrap();
        assert_eq!(sym.class, SymbolClass::Reserved);
        assert_eq!(sym.width, 2);
        assert!(obj.code.is_empty());
    }

    #[test]
    fn test_db_directive_text_and_numeric() {
        let obj = assemble("@db greeting (hello)\n@db answer ($2A)\n");
        assert_eq!(obj.data[0].bytes, b"hello");
        assert_eq!(obj.data[0].offset, 0);
        assert_eq!(obj.data[1].bytes, vec![0x00, 0x2A]);
        assert_eq!(obj.data[1].offset, 5);
        assert!(obj
            .symbols
            .iter()
            .any(|s| s.name == "greeting" && s.class == SymbolClass::Constant));
    }

    #[test]
    fn test_macro_definition() {
        let obj = assemble("__INPUT_BUFFER_START_ADDR = $1400\n");
        let sym = obj.symbols.iter().find(|s| s.name == "__INPUT_BUFFER_START_ADDR").unwrap();
        assert_eq!(sym.class, SymbolClass::Macro);
        assert_eq!(sym.value, 0x1400);
    }

    #[test]
    fn test_numeric_jump_gets_none_relocation() {
        let obj = assemble("jmp $0000\n");
        assert_eq!(obj.relocations.len(), 1);
        assert_eq!(obj.relocations[0].name, RELOCATION_NONE);
        assert_eq!(obj.relocations[0].address, 2);
    }

    #[test]
    fn test_unknown_mnemonic_rejected() {
        let err = assemble_err("frobnicate $00\nmore lines here\n");
        assert_eq!(err.line(), 1);
        assert!(err.to_string().contains("Assembler Error"));
    }

    #[test]
    fn test_immediate_store_rejected() {
        let err = assemble_err("storea #$10\n");
        assert!(err.message().contains("immediate"));
    }

    #[test]
    fn test_label_missing_colon_rejected() {
        let err = assemble_err("main\n");
        assert!(err.message().contains("colon"));
    }

    #[test]
    fn test_label_reference_with_colon_rejected() {
        let err = assemble_err("main:\n\tjmp main:\n");
        assert!(err.message().contains("colon"));
    }

    #[test]
    fn test_indirect_missing_index_rejected() {
        let err = assemble_err("loada ($00)\n");
        assert!(err.message().contains("index"));
    }

    #[test]
    fn test_malformed_rs_rejected() {
        let err = assemble_err("@rs $10 name\n");
        assert!(err.message().contains("base 10"));
    }

    #[test]
    fn test_reg_a_only_on_bitshifts() {
        let err = assemble_err("loada a\n");
        assert!(err.message().contains("bitshift"));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let obj = assemble("; comment only\n\n\thalt ; trailing\n");
        assert_eq!(obj.code, vec![HALT]);
    }

    #[test]
    fn test_missing_operand_rejected() {
        let err = assemble_err("loada\n");
        assert!(err.message().contains("expected a value"));
    }
}
