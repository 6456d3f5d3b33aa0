//! Allocation lowering.
//!
//! One policy picks among four storage classes: global constants become
//! `@db` data, global variables become `@rs` reservations (plus an init
//! sequence), locals live on the stack at the end of the current frame,
//! and dynamic values allocate heap storage through a syscall with the
//! returned address stored in the variable's slot.

use std::fmt::Write as _;

use crate::ast::{Expression, Literal, Statement, StatementKind};
use crate::error::CompilerError;
use crate::symbol::{Symbol, SymbolKind};
use crate::types::{DataType, Type};

use super::{CodeGen, WORD_BYTES};

impl CodeGen {
    /// Lower an allocation statement, inserting the symbol once its
    /// storage is arranged. `max_offset` advances for every word the
    /// allocation claims on the stack.
    pub(super) fn allocate(
        &mut self,
        statement: &Statement,
        max_offset: &mut usize,
    ) -> Result<String, CompilerError> {
        let StatementKind::Allocation {
            data_type,
            name,
            initialized,
            initial_value,
        } = &statement.kind
        else {
            return Err(CompilerError::plain("expected an allocation", statement.line));
        };
        let line = statement.line;
        data_type
            .validate()
            .map_err(|message| CompilerError::plain(message, line))?;

        let mut symbol = Symbol::variable(
            name.clone(),
            *data_type,
            self.current_scope_name.clone(),
            self.current_scope,
            *initialized,
        );

        let mut out = String::new();
        if data_type.is_static() || symbol.scope_level == 0 {
            self.alloc_global(&mut out, &mut symbol, initial_value.as_ref(), line, *max_offset)?;
        } else {
            // locals go at the end of the current stack frame
            self.move_sp(&mut out, *max_offset, false)?;
            symbol.stack_offset = self.stack_offset;
            self.alloc_local(&mut out, &mut symbol, initial_value.as_ref(), line, max_offset)?;
        }
        self.symbol_table.insert(symbol, line)?;
        Ok(out)
    }

    fn alloc_global(
        &mut self,
        out: &mut String,
        symbol: &mut Symbol,
        initial_value: Option<&Expression>,
        line: usize,
        max_offset: usize,
    ) -> Result<(), CompilerError> {
        if symbol.data_type.is_const() {
            return self.define_global_constant(out, symbol, initial_value, line, max_offset);
        }

        let is_dynamic = symbol.data_type.is_dynamic();
        match symbol.data_type.primary() {
            Type::Array => {
                let byte_count = symbol.data_type.array_length() * WORD_BYTES;
                writeln!(out, "@rs {} {}", byte_count, symbol.name)?;

                if let Some(initializer) = initial_value {
                    let members = self.array_initializer_members(
                        initializer,
                        &symbol.data_type,
                        line,
                    )?;
                    // X indexes the target; start one word under zero so
                    // the first increment pair lands on element zero
                    writeln!(out, "\tloadx #$FFFE")?;
                    for member in members {
                        writeln!(out, "\tincx")?;
                        writeln!(out, "\tincx")?;
                        writeln!(out, "\ttxa")?;
                        writeln!(out, "\tpha")?;
                        self.stack_offset += 1;
                        // the pushed index occupies one word; evaluate the
                        // member above it
                        let text = self.fetch_value(&member, line, max_offset + 1)?;
                        out.push_str(&text);
                        writeln!(out, "\ttab")?;
                        writeln!(out, "\tpla")?;
                        self.stack_offset -= 1;
                        writeln!(out, "\ttax")?;
                        writeln!(out, "\ttba")?;
                        writeln!(out, "\tstorea {}, x", symbol.name)?;
                    }
                }
            }
            Type::Struct => {
                return Err(CompilerError::plain("structs currently unsupported", line));
            }
            _ => {
                // one word for the value, or for the pointer to it
                writeln!(out, "@rs {} {}", WORD_BYTES, symbol.name)?;

                if symbol.data_type.primary() == Type::String {
                    if symbol.defined {
                        let initializer = initial_value.ok_or_else(|| {
                            CompilerError::plain("string initializer missing", line)
                        })?;
                        let allocated = self.string_assignment(
                            out,
                            symbol,
                            initializer,
                            false,
                            line,
                            max_offset,
                        )?;
                        symbol.allocated = allocated;
                    }
                } else {
                    if is_dynamic {
                        writeln!(out, "\tloada #${:x}", WORD_BYTES)?;
                        writeln!(out, "\tsyscall #$21")?;
                        writeln!(out, "\tstoreb {}", symbol.name)?;
                        symbol.allocated = true;
                    }
                    if symbol.defined {
                        let initializer = initial_value.ok_or_else(|| {
                            CompilerError::plain("initializer missing", line)
                        })?;
                        let text = self.fetch_value(initializer, line, max_offset)?;
                        out.push_str(&text);
                        if is_dynamic {
                            writeln!(out, "\tloady {}", symbol.name)?;
                            writeln!(out, "\tstorea $00, y")?;
                        } else {
                            writeln!(out, "\tstorea {}", symbol.name)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn alloc_local(
        &mut self,
        out: &mut String,
        symbol: &mut Symbol,
        initial_value: Option<&Expression>,
        line: usize,
        max_offset: &mut usize,
    ) -> Result<(), CompilerError> {
        if symbol.data_type.is_const() {
            if !symbol.defined {
                return Err(CompilerError::plain(
                    "const-qualified variables must be initialized in allocation",
                    line,
                ));
            }
            if !matches!(initial_value, Some(Expression::Literal(_))) {
                return Err(CompilerError::plain(
                    "const-qualified variables must be initialized with literal values",
                    line,
                ));
            }
        }

        let is_dynamic = symbol.data_type.is_dynamic();

        if symbol.defined {
            let initializer = initial_value
                .ok_or_else(|| CompilerError::plain("initializer missing", line))?;

            match symbol.data_type.primary() {
                Type::String => {
                    // one stack word for the pointer to the string
                    writeln!(out, "\tdecsp")?;
                    self.stack_offset += 1;
                    *max_offset += 1;
                    let allocated = self.string_assignment(
                        out,
                        symbol,
                        initializer,
                        false,
                        line,
                        *max_offset,
                    )?;
                    symbol.allocated = allocated;
                }
                Type::Array => {
                    let members = self.array_initializer_members(
                        initializer,
                        &symbol.data_type,
                        line,
                    )?;
                    self.move_sp(out, *max_offset, false)?;
                    symbol.stack_offset = *max_offset;
                    for member in members {
                        let text = self.fetch_value(&member, line, *max_offset)?;
                        out.push_str(&text);
                        // the fetch may have walked the stack pointer; get
                        // back to the end of the frame without losing A
                        if self.stack_offset != *max_offset {
                            writeln!(out, "\ttax")?;
                            self.move_sp(out, *max_offset, false)?;
                            writeln!(out, "\ttxa")?;
                        }
                        writeln!(out, "\tpha")?;
                        self.stack_offset += 1;
                        *max_offset += 1;
                    }
                }
                Type::Struct => {
                    return Err(CompilerError::plain("structs currently unsupported", line));
                }
                _ => {
                    if is_dynamic {
                        // allocate a word on the heap; the stack slot holds
                        // the returned address, and the initial value is
                        // assigned through it
                        writeln!(out, "\tloada #${:x}", WORD_BYTES)?;
                        writeln!(out, "\tsyscall #$21")?;
                        writeln!(out, "\tphb")?;
                        self.stack_offset += 1;
                        *max_offset += 1;
                        let text = self.fetch_value(initializer, line, *max_offset)?;
                        out.push_str(&text);
                        writeln!(out, "\ttax")?;
                        self.move_sp(out, symbol.stack_offset + 1, false)?;
                        writeln!(out, "\tpla")?;
                        self.stack_offset -= 1;
                        writeln!(out, "\ttay")?;
                        writeln!(out, "\ttxa")?;
                        writeln!(out, "\tstorea $00, y")?;
                        symbol.allocated = true;
                    } else {
                        let text = self.fetch_value(initializer, line, *max_offset)?;
                        out.push_str(&text);
                        if self.stack_offset != *max_offset {
                            writeln!(out, "\ttax")?;
                            self.move_sp(out, *max_offset, false)?;
                            writeln!(out, "\ttxa")?;
                        }
                        writeln!(out, "\tpha")?;
                        self.stack_offset += 1;
                        *max_offset += 1;
                    }
                }
            }
        } else {
            match symbol.data_type.primary() {
                Type::Array => {
                    if is_dynamic {
                        return Err(CompilerError::plain(
                            "dynamic arrays currently unsupported",
                            line,
                        ));
                    }
                    // open a hole of array-length words in the frame
                    let byte_count = symbol.data_type.array_length() * WORD_BYTES;
                    writeln!(out, "\tloadb #${:x}", byte_count)?;
                    writeln!(out, "\ttspa")?;
                    writeln!(out, "\tsec")?;
                    writeln!(out, "\tsubca b")?;
                    writeln!(out, "\ttasp")?;
                    self.stack_offset += symbol.data_type.array_length();
                    *max_offset += symbol.data_type.array_length();
                }
                Type::Struct => {
                    return Err(CompilerError::plain("structs currently unsupported", line));
                }
                _ => {
                    if is_dynamic {
                        writeln!(out, "\tloada #${:x}", WORD_BYTES)?;
                        writeln!(out, "\tsyscall #$21")?;
                        writeln!(out, "\tphb")?;
                        self.stack_offset += 1;
                        *max_offset += 1;
                        symbol.allocated = true;
                    } else {
                        writeln!(out, "\tdecsp")?;
                        self.stack_offset += 1;
                        *max_offset += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Check an array initializer: it must be a list of the declared
    /// length whose members are compatible with the element type.
    fn array_initializer_members(
        &self,
        initializer: &Expression,
        data_type: &DataType,
        line: usize,
    ) -> Result<Vec<Expression>, CompilerError> {
        let Expression::List(members) = initializer else {
            return Err(CompilerError::plain(
                "expected initializer list for initialization of aggregate data type",
                line,
            ));
        };
        if members.len() != data_type.array_length() {
            return Err(CompilerError::plain(
                format!(
                    "array initializer has {} elements; expected {}",
                    members.len(),
                    data_type.array_length()
                ),
                line,
            ));
        }
        let element_type = DataType::new(data_type.subtype());
        for member in members {
            let member_type = self.expression_type(member, false, line)?;
            if !member_type.is_compatible(&element_type) {
                return Err(CompilerError::plain(
                    "array initializer members must match the element type",
                    line,
                ));
            }
        }
        Ok(members.clone())
    }

    /// Define a global constant with `@db`. Constants must be initialized
    /// at declaration with a value computable at compile time.
    fn define_global_constant(
        &mut self,
        out: &mut String,
        symbol: &mut Symbol,
        initial_value: Option<&Expression>,
        line: usize,
        max_offset: usize,
    ) -> Result<(), CompilerError> {
        if !symbol.defined {
            return Err(CompilerError::plain(
                "const-qualified variables must be initialized in allocation",
                line,
            ));
        }
        let initializer = initial_value
            .ok_or_else(|| CompilerError::plain("constant initializer missing", line))?;

        match initializer {
            Expression::Literal(Literal { data_type, value }) => {
                if !symbol.data_type.is_compatible(data_type) {
                    return Err(CompilerError::plain("types are incompatible", line));
                }
                let rendered = match data_type.primary() {
                    Type::Bool => if value == "true" { "1" } else { "0" }.to_string(),
                    _ => value.clone(),
                };
                writeln!(out, "@db {} ({})", symbol.name, rendered)?;
            }
            Expression::LValue(other_name) => {
                let other = self
                    .symbol_table
                    .lookup(other_name, &self.current_scope_name, self.current_scope, line)?
                    .clone();
                if !matches!(other.kind, SymbolKind::Variable) {
                    return Err(CompilerError::plain(
                        "symbol found was not a variable symbol",
                        line,
                    ));
                }
                if !other.data_type.is_const() {
                    return Err(CompilerError::plain(
                        "initializing const-qualified variables with non-const-qualified variables is illegal",
                        line,
                    ));
                }
                if !other.defined {
                    return Err(CompilerError::plain(
                        format!("'{}' was referenced before assignment", other.name),
                        line,
                    ));
                }
                if other.data_type.primary() != symbol.data_type.primary() {
                    return Err(CompilerError::plain("types are incompatible", line));
                }

                // reserve the slot, then copy the other constant at runtime
                writeln!(out, "@db {} (0)", symbol.name)?;
                if symbol.data_type.primary() == Type::String {
                    let text = self.fetch_value(initializer, line, max_offset)?;
                    out.push_str(&text);
                    self.move_sp(out, max_offset, true)?;
                    writeln!(out, "\tphb")?;
                    writeln!(out, "\tloadb #{}", symbol.name)?;
                    writeln!(out, "\tphb")?;
                    writeln!(out, "\tpha")?;
                    writeln!(out, "\tjsr __builtins_memcpy")?;
                } else {
                    let text = self.fetch_value(initializer, line, max_offset)?;
                    out.push_str(&text);
                    writeln!(out, "\tstorea {}", symbol.name)?;
                }
            }
            Expression::Unary { .. } | Expression::Binary { .. } => {
                let value_type = self.expression_type(initializer, false, line)?;
                if value_type.primary() != symbol.data_type.primary() {
                    return Err(CompilerError::plain("types do not match", line));
                }
                writeln!(out, "@db {} (0)", symbol.name)?;
                let text = self.fetch_value(initializer, line, max_offset)?;
                out.push_str(&text);
                writeln!(out, "\tstorea {}", symbol.name)?;
            }
            Expression::Dereferenced(_) | Expression::AddressOf(_) => {
                return Err(CompilerError::plain(
                    "it is illegal to initialize const-qualified variables with pointers or addresses",
                    line,
                ));
            }
            _ => {
                return Err(CompilerError::plain(
                    "it is illegal to initialize a const-qualified variable with an expression of this type",
                    line,
                ));
            }
        }
        Ok(())
    }
}
