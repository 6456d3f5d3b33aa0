//! Assignment lowering.
//!
//! Simple lvalues store to a named label (globals) or a stack slot
//! (locals). Indexed lvalues walk the stack pointer to the element and
//! back, keeping the offset model true. Dereferenced lvalues store through
//! the pointed-to address. String assignment allocates or reallocates heap
//! storage, writes the length word, and copies the bytes.

use std::fmt::Write as _;

use crate::ast::{Expression, Statement, StatementKind};
use crate::error::CompilerError;
use crate::symbol::{Symbol, SymbolKind};
use crate::types::Type;

use super::CodeGen;

impl CodeGen {
    /// Lower an assignment statement.
    pub(super) fn assign(
        &mut self,
        statement: &Statement,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        let StatementKind::Assignment { lvalue, rvalue } = &statement.kind else {
            return Err(CompilerError::plain("expected an assignment", statement.line));
        };
        let line = statement.line;

        // find the variable under the lvalue form
        let (var_name, index_expression) = match lvalue {
            Expression::LValue(name) => (name.clone(), None),
            Expression::Indexed { name, index } => (name.clone(), Some(index.as_ref())),
            Expression::Dereferenced(_) => {
                let root = lvalue.dereferenced_root().ok_or_else(|| {
                    CompilerError::plain("error in parsing dereference tree", line)
                })?;
                (root.to_string(), None)
            }
            _ => {
                return Err(CompilerError::plain(
                    "expression is not a modifiable-lvalue",
                    line,
                ))
            }
        };

        if !self.symbol_table.contains(&var_name, &self.current_scope_name) {
            return Err(CompilerError::plain(
                format!("could not find '{}' in symbol table", var_name),
                line,
            ));
        }
        let symbol = self
            .symbol_table
            .lookup(&var_name, &self.current_scope_name, self.current_scope, line)?
            .clone();
        if !matches!(symbol.kind, SymbolKind::Variable) {
            return Err(CompilerError::plain("expected modifiable-lvalue", line));
        }

        let is_indexed = index_expression.is_some();
        if is_indexed
            && symbol.data_type.primary() != Type::String
            && symbol.data_type.primary() != Type::Array
        {
            return Err(CompilerError::plain(
                "cannot index variables of this type",
                line,
            ));
        }
        if symbol.data_type.is_const() {
            return Err(CompilerError::plain(
                "cannot make an assignment to a const-qualified variable",
                line,
            ));
        }

        let mut out = String::new();

        if matches!(lvalue, Expression::Dereferenced(_)) {
            if symbol.data_type.primary() != Type::Ptr {
                return Err(CompilerError::plain(
                    "you may not dereference a variable whose type is not ptr<...>",
                    line,
                ));
            }
            self.pointer_assignment(&mut out, lvalue, rvalue, line, max_offset)?;
            return Ok(out);
        }

        // the anticipated rvalue type; an address-of is a pointer literal
        let mut rvalue_type = self.expression_type(rvalue, false, line)?;
        let compatible = if matches!(rvalue, Expression::AddressOf(_)) {
            rvalue_type.set_subtype(rvalue_type.primary());
            rvalue_type.set_primary(Type::Ptr);
            symbol.data_type.is_compatible(&rvalue_type)
        } else {
            self.types_are_compatible(lvalue, rvalue, line)?
        };
        if !compatible {
            return Err(CompilerError::plain(
                format!(
                    "cannot match '{}' and '{}'",
                    symbol.data_type.primary(),
                    rvalue_type.primary()
                ),
                line,
            ));
        }

        if symbol.data_type.is_dynamic() {
            match symbol.data_type.primary() {
                Type::String => {
                    if is_indexed {
                        return Err(CompilerError::plain(
                            "index assignment on strings is forbidden",
                            line,
                        ));
                    }
                    let allocated =
                        self.string_assignment(&mut out, &symbol, rvalue, false, line, max_offset)?;
                    let entry = self.symbol_table.lookup_mut(
                        &var_name,
                        &self.current_scope_name.clone(),
                        self.current_scope,
                        line,
                    )?;
                    entry.defined = true;
                    entry.freed = false;
                    entry.allocated = allocated;
                }
                Type::Array | Type::Struct => {
                    return Err(CompilerError::plain(
                        "assignment to dynamic aggregates is unsupported",
                        line,
                    ));
                }
                _ => {
                    self.dynamic_assignment(&mut out, &symbol, rvalue, line, max_offset)?;
                    let entry = self.symbol_table.lookup_mut(
                        &var_name,
                        &self.current_scope_name.clone(),
                        self.current_scope,
                        line,
                    )?;
                    entry.defined = true;
                }
            }
            return Ok(out);
        }

        // automatic and static storage
        if symbol.has_static_storage() {
            if let Some(index_exp) = index_expression {
                if symbol.data_type.subtype() == Type::String {
                    // Y carries the byte index into the string-pointer array
                    let text = self.fetch_value(index_exp, line, max_offset)?;
                    out.push_str(&text);
                    writeln!(out, "\tlsl a")?;
                    writeln!(out, "\ttay")?;
                    let allocated =
                        self.string_assignment(&mut out, &symbol, rvalue, true, line, max_offset)?;
                    let entry = self.symbol_table.lookup_mut(
                        &var_name,
                        &self.current_scope_name.clone(),
                        self.current_scope,
                        line,
                    )?;
                    entry.allocated = allocated;
                } else {
                    // push the index, fetch the value, then recover the
                    // index into Y for the indexed store
                    let text = self.fetch_value(index_exp, line, max_offset)?;
                    out.push_str(&text);
                    writeln!(out, "\ttax")?;
                    self.move_sp(&mut out, max_offset, false)?;
                    writeln!(out, "\ttxa")?;
                    writeln!(out, "\tpha")?;
                    self.stack_offset += 1;

                    let text = self.fetch_value(rvalue, line, max_offset + 1)?;
                    out.push_str(&text);
                    writeln!(out, "\ttax")?;
                    self.move_sp(&mut out, max_offset + 1, false)?;
                    writeln!(out, "\tpla")?;
                    self.stack_offset -= 1;
                    writeln!(out, "\tlsl a")?;
                    writeln!(out, "\ttay")?;
                    writeln!(out, "\ttxa")?;
                    writeln!(out, "\tstorea {}, y", symbol.name)?;
                }
            } else {
                let text = self.fetch_value(rvalue, line, max_offset)?;
                out.push_str(&text);
                writeln!(out, "\tloady #$00")?;
                writeln!(out, "\tstorea {}, y", symbol.name)?;
            }
        } else if let Some(index_exp) = index_expression {
            if symbol.data_type.subtype() == Type::String {
                let text = self.fetch_value(index_exp, line, max_offset)?;
                out.push_str(&text);
                writeln!(out, "\tlsl a")?;
                writeln!(out, "\ttay")?;
                let allocated =
                    self.string_assignment(&mut out, &symbol, rvalue, true, line, max_offset)?;
                let entry = self.symbol_table.lookup_mut(
                    &var_name,
                    &self.current_scope_name.clone(),
                    self.current_scope,
                    line,
                )?;
                entry.allocated = allocated;
            } else {
                self.indexed_local_assignment(&mut out, &symbol, index_exp, rvalue, line, max_offset)?;
            }
        } else {
            // simple local store: fetch, reposition to the slot, push
            let text = self.fetch_value(rvalue, line, max_offset)?;
            out.push_str(&text);
            writeln!(out, "\ttax")?;
            self.move_sp(&mut out, symbol.stack_offset, false)?;
            writeln!(out, "\ttxa")?;
            writeln!(out, "\tpha")?;
            self.stack_offset += 1;
        }

        let entry = self.symbol_table.lookup_mut(
            &var_name,
            &self.current_scope_name.clone(),
            self.current_scope,
            line,
        )?;
        entry.defined = true;
        Ok(out)
    }

    /// Store into `array[index]` for a local array: walk the stack pointer
    /// down by the index, push the value into the slot, and walk back so
    /// the offset model ends where the stack pointer does.
    fn indexed_local_assignment(
        &mut self,
        out: &mut String,
        symbol: &Symbol,
        index_expression: &Expression,
        rvalue: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<(), CompilerError> {
        // index on the stack while the rvalue is computed
        let text = self.fetch_value(index_expression, line, max_offset)?;
        out.push_str(&text);
        writeln!(out, "\ttax")?;
        self.move_sp(out, max_offset, false)?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tpha")?;
        self.stack_offset += 1;

        let text = self.fetch_value(rvalue, line, max_offset + 1)?;
        out.push_str(&text);
        writeln!(out, "\ttax")?;
        self.move_sp(out, max_offset + 1, false)?;
        writeln!(out, "\tpla")?;
        self.stack_offset -= 1;

        // A = index, X = value; convert to a byte offset in B
        writeln!(out, "\tlsl a")?;
        writeln!(out, "\ttab")?;
        self.move_sp(out, symbol.stack_offset, false)?;
        writeln!(out, "\ttspa")?;
        writeln!(out, "\tsec")?;
        writeln!(out, "\tsubca b")?;
        writeln!(out, "\ttasp")?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tpha")?;
        writeln!(out, "\tincsp")?;
        writeln!(out, "\ttspa")?;
        writeln!(out, "\tclc")?;
        writeln!(out, "\taddca b")?;
        writeln!(out, "\ttasp")?;
        // the walk down and back cancels; the model still sits at the
        // array's base offset
        Ok(())
    }

    /// Assign through a dynamic scalar's heap pointer.
    fn dynamic_assignment(
        &mut self,
        out: &mut String,
        symbol: &Symbol,
        rvalue: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<(), CompilerError> {
        // fetch the heap address from the variable's home
        if symbol.has_static_storage() {
            writeln!(out, "\tloada {}", symbol.name)?;
        } else {
            self.move_sp(out, symbol.stack_offset + 1, false)?;
            writeln!(out, "\tpla")?;
            self.stack_offset -= 1;
        }
        // the address waits on the stack while the value is computed
        writeln!(out, "\ttax")?;
        self.move_sp(out, max_offset, false)?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tpha")?;
        self.stack_offset += 1;

        let text = self.fetch_value(rvalue, line, max_offset + 1)?;
        out.push_str(&text);
        writeln!(out, "\ttax")?;
        self.move_sp(out, max_offset + 1, false)?;
        writeln!(out, "\tpla")?;
        self.stack_offset -= 1;
        writeln!(out, "\ttay")?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tstorea $00, y")?;
        Ok(())
    }

    /// Assign through a dereferenced pointer: fetch the rvalue, fetch the
    /// address held one level above the innermost dereference, and store
    /// through it.
    fn pointer_assignment(
        &mut self,
        out: &mut String,
        lvalue: &Expression,
        rvalue: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<(), CompilerError> {
        let Expression::Dereferenced(inner) = lvalue else {
            return Err(CompilerError::plain("expected a dereferenced lvalue", line));
        };

        let text = self.fetch_value(rvalue, line, max_offset)?;
        out.push_str(&text);
        writeln!(out, "\ttax")?;

        // the inner expression yields the address to store through
        let text = self.fetch_value(inner, line, max_offset)?;
        out.push_str(&text);
        writeln!(out, "\ttay")?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tstorea $00, y")?;
        Ok(())
    }

    /// Assign a string rvalue into `target`. Allocates backing storage on
    /// first assignment and reallocates after, stores the length word,
    /// then copies the bytes with the memcpy builtin. When `indexed` is
    /// set the target is a string-array element and Y holds the byte
    /// index on entry.
    ///
    /// Returns the target's new `allocated` state; the caller owns the
    /// symbol-table update.
    pub(super) fn string_assignment(
        &mut self,
        out: &mut String,
        target: &Symbol,
        rvalue: &Expression,
        indexed: bool,
        line: usize,
        max_offset: usize,
    ) -> Result<bool, CompilerError> {
        let mut max = max_offset;
        let target_is_array = indexed && target.data_type.primary() == Type::Array;

        if target_is_array {
            // hold the element's byte index while the value is fetched
            writeln!(out, "\tstorey $02")?;
        }

        // A = length, B = address of the source characters
        let text = self.fetch_value(rvalue, line, max)?;
        out.push_str(&text);

        if self.stack_offset != max {
            writeln!(out, "\ttax")?;
            writeln!(out, "\ttba")?;
            writeln!(out, "\ttay")?;
            self.move_sp(out, max, false)?;
            writeln!(out, "\ttya")?;
            writeln!(out, "\ttab")?;
            writeln!(out, "\ttxa")?;
        }

        // the source address and length wait on the stack through the
        // allocation dance
        writeln!(out, "\tphb")?;
        self.stack_offset += 1;
        max += 1;
        writeln!(out, "\tpha")?;
        self.stack_offset += 1;
        max += 1;

        // pad the requested size so small growth avoids a reallocation
        writeln!(out, "\tclc")?;
        writeln!(out, "\taddca #$10")?;

        let mut allocated = target.allocated;
        if !allocated {
            writeln!(out, "\tsyscall #$21")?;
            allocated = true;
        } else {
            // fetch the existing pointer into B for reallocation
            writeln!(out, "\ttax")?;
            if target.has_static_storage() {
                if target_is_array {
                    writeln!(out, "\tloady $02")?;
                    writeln!(out, "\tloadb {}, y", target.name)?;
                } else {
                    writeln!(out, "\tloadb {}", target.name)?;
                }
            } else {
                let former = self.stack_offset;
                if target_is_array {
                    self.move_sp(out, target.stack_offset + 1, false)?;
                    writeln!(out, "\ttspa")?;
                    writeln!(out, "\tsec")?;
                    writeln!(out, "\tsubca $02")?;
                    writeln!(out, "\ttasp")?;
                    writeln!(out, "\tplb")?;
                    writeln!(out, "\ttspa")?;
                    writeln!(out, "\tclc")?;
                    writeln!(out, "\taddca $02")?;
                    writeln!(out, "\ttasp")?;
                    self.stack_offset -= 1;
                } else {
                    self.move_sp(out, target.stack_offset + 1, false)?;
                    writeln!(out, "\tplb")?;
                    self.stack_offset -= 1;
                }
                self.move_sp(out, former, false)?;
            }
            writeln!(out, "\ttxa")?;
            if target_is_array {
                // the safe variant creates a fresh block if the old
                // pointer is not a live allocation
                writeln!(out, "\tsyscall #$23")?;
            } else {
                writeln!(out, "\tsyscall #$22")?;
            }
        }

        // B now holds the storage address; record it in the variable's
        // home and in the scratch pointer
        if target.has_static_storage() {
            if target_is_array {
                writeln!(out, "\tloady $02")?;
                writeln!(out, "\tstoreb {}, y", target.name)?;
                writeln!(out, "\tstoreb $02")?;
            } else {
                writeln!(out, "\tstoreb {}", target.name)?;
                writeln!(out, "\tstoreb $02")?;
            }
        } else {
            let former = self.stack_offset;
            self.move_sp(out, target.stack_offset, false)?;
            if target_is_array {
                writeln!(out, "\ttspa")?;
                writeln!(out, "\tsec")?;
                writeln!(out, "\tsubca $02")?;
                writeln!(out, "\ttasp")?;
                writeln!(out, "\tphb")?;
                writeln!(out, "\tincsp")?;
                writeln!(out, "\ttspa")?;
                writeln!(out, "\tclc")?;
                writeln!(out, "\taddca $02")?;
                writeln!(out, "\ttasp")?;
                writeln!(out, "\tstoreb $02")?;
            } else {
                writeln!(out, "\tphb")?;
                writeln!(out, "\tincsp")?;
                writeln!(out, "\tstoreb $02")?;
            }
            self.move_sp(out, former, false)?;
        }

        // pull the length back and write it into the heap block
        writeln!(out, "\tpla")?;
        self.stack_offset -= 1;
        max -= 1;
        writeln!(out, "\tloady #$00")?;
        writeln!(out, "\tstorea ($02), y")?;

        // memcpy arguments: the source is already on the stack; push the
        // destination (data begins past the length word) and the length
        writeln!(out, "\tloada $02")?;
        writeln!(out, "\tclc")?;
        writeln!(out, "\taddca #$02")?;
        writeln!(out, "\tpha")?;
        self.stack_offset += 1;
        max += 1;
        writeln!(out, "\tloada ($02), y")?;
        writeln!(out, "\tpha")?;
        self.stack_offset += 1;
        max += 1;
        writeln!(out, "\tjsr __builtins_memcpy")?;
        // memcpy pulls its three arguments
        self.stack_offset -= 3;
        max -= 3;

        // scrub the scratch words the string machinery used
        writeln!(out, "\tloada #$00")?;
        writeln!(out, "\tstorea __TEMP_A")?;
        writeln!(out, "\tstorea __TEMP_B")?;
        writeln!(out, "\tstorea __INPUT_LEN")?;

        debug_assert_eq!(max, max_offset);
        Ok(allocated)
    }
}
