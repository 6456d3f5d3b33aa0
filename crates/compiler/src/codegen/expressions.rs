//! Expression lowering: type probing, value fetching, and tree evaluation.
//!
//! `fetch_value` produces assembly that leaves the value of an expression
//! in the A register (strings use A for the length and B for the address).
//! Binary and unary trees evaluate through the stack: the left operand is
//! pushed, the right evaluated, the left pulled back, and the operation
//! applied with the right operand in B.

use std::fmt::Write as _;

use sin_core::float16::pack_32;

use crate::ast::{Expression, Literal, Operator};
use crate::error::{compiler_warning, CompilerError};
use crate::types::{DataType, Type};

use super::CodeGen;

impl CodeGen {
    /// The type an expression is expected to evaluate to. Trees are not
    /// walked exhaustively; the first literal or lvalue decides, and
    /// genuine mismatches surface when the tree is lowered.
    pub(super) fn expression_type(
        &self,
        expression: &Expression,
        get_subtype: bool,
        line: usize,
    ) -> Result<DataType, CompilerError> {
        match expression {
            Expression::Literal(Literal { data_type, .. }) => Ok(*data_type),
            Expression::LValue(name) => {
                let symbol = self.symbol_table.lookup(
                    name,
                    &self.current_scope_name,
                    self.current_scope,
                    line,
                )?;
                if get_subtype && symbol.data_type.subtype() != Type::None {
                    Ok(DataType::new(symbol.data_type.subtype()))
                } else {
                    Ok(symbol.data_type)
                }
            }
            Expression::Indexed { name, .. } => {
                let symbol = self.symbol_table.lookup(
                    name,
                    &self.current_scope_name,
                    self.current_scope,
                    line,
                )?;
                // indexing a string yields a string; indexing an array
                // yields the element type
                if symbol.data_type.primary() == Type::String {
                    Ok(symbol.data_type)
                } else {
                    Ok(DataType::new(symbol.data_type.subtype()))
                }
            }
            Expression::AddressOf(name) => {
                self.expression_type(&Expression::LValue(name.clone()), false, line)
            }
            Expression::Dereferenced(inner) => self.expression_type(inner, true, line),
            Expression::Unary { operand, .. } => self.expression_type(operand, false, line),
            Expression::Binary { left, .. } => self.expression_type(left, true, line),
            Expression::ValueReturningCall { name, .. } => {
                let symbol = self.symbol_table.lookup(
                    name,
                    &self.current_scope_name,
                    self.current_scope,
                    line,
                )?;
                Ok(symbol.data_type)
            }
            Expression::SizeOf(_) => Ok(DataType::new(Type::Int)),
            Expression::List(members) => match members.first() {
                Some(first) => self.expression_type(first, false, line),
                None => Ok(DataType::new(Type::None)),
            },
        }
    }

    /// Whether the result of an expression is signed. A mixed
    /// signed/unsigned binary tree is treated as signed, with a warning.
    pub(super) fn is_signed(
        &self,
        expression: &Expression,
        line: usize,
    ) -> Result<bool, CompilerError> {
        match expression {
            Expression::Literal(Literal { data_type, value }) => match data_type.primary() {
                Type::Int => Ok(value.starts_with('-')),
                Type::Float => Ok(true),
                _ => Ok(false),
            },
            Expression::LValue(name) | Expression::Indexed { name, .. } => {
                let symbol = self.symbol_table.lookup(
                    name,
                    &self.current_scope_name,
                    self.current_scope,
                    line,
                )?;
                Ok(symbol.data_type.is_signed())
            }
            Expression::AddressOf(_) => Ok(false),
            Expression::Dereferenced(inner) => self.is_signed(inner, line),
            Expression::Unary { operator, operand } => {
                Ok(self.is_signed(operand, line)? || *operator == Operator::Minus)
            }
            Expression::Binary { left, right, .. } => {
                let left_signed = self.is_signed(left, line)?;
                let right_signed = self.is_signed(right, line)?;
                if left_signed != right_signed {
                    compiler_warning("signed/unsigned mismatch", line);
                }
                Ok(left_signed || right_signed)
            }
            _ => Ok(false),
        }
    }

    /// Whether two expressions may be combined or assigned.
    pub(super) fn types_are_compatible(
        &self,
        left: &Expression,
        right: &Expression,
        line: usize,
    ) -> Result<bool, CompilerError> {
        let left_type = self.expression_type(left, false, line)?;
        let right_type = self.expression_type(right, false, line)?;
        Ok(left_type.is_compatible(&right_type))
    }

    /// Emit code leaving the expression's value in A (length in A and
    /// address in B for strings).
    pub(super) fn fetch_value(
        &mut self,
        expression: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        let mut out = String::new();
        match expression {
            Expression::Literal(literal) => self.fetch_literal(&mut out, literal, line)?,
            Expression::LValue(_) | Expression::Indexed { .. } => {
                self.fetch_variable(&mut out, expression, line, max_offset)?
            }
            Expression::Dereferenced(inner) => {
                // the inner fetch leaves the pointed-to address in A
                let inner_text = self.fetch_value(inner, line, max_offset)?;
                out.push_str(&inner_text);
                writeln!(out, "\ttay")?;
                writeln!(out, "\tloada $00, y")?;
            }
            Expression::AddressOf(name) => {
                self.fetch_address_of(&mut out, name, line)?;
            }
            Expression::Unary { .. } => {
                let text = self.evaluate_unary(expression, line, max_offset)?;
                out.push_str(&text);
            }
            Expression::Binary { .. } => {
                let text = self.evaluate_binary(expression, line, max_offset)?;
                out.push_str(&text);
            }
            Expression::ValueReturningCall { name, args } => {
                let symbol = self
                    .symbol_table
                    .lookup(name, &self.current_scope_name, self.current_scope, line)?
                    .clone();
                if matches!(symbol.data_type.primary(), Type::Void | Type::None) {
                    return Err(CompilerError::plain(
                        format!("cannot retrieve value of '{}' type", symbol.data_type),
                        line,
                    ));
                }
                self.move_sp(&mut out, max_offset, false)?;
                let call_text = self.call(name, args, max_offset, line)?;
                out.push_str(&call_text);
            }
            Expression::SizeOf(type_name) => {
                // every fundamental type is one machine word
                match type_name.as_str() {
                    "int" | "bool" | "float" | "string" | "ptr" | "raw" => {
                        writeln!(out, "\tloada #$02")?;
                    }
                    other => {
                        return Err(CompilerError::plain(
                            format!("cannot take the size of '{}'", other),
                            line,
                        ));
                    }
                }
            }
            Expression::List(_) => {
                return Err(CompilerError::plain(
                    "list expressions may only initialize arrays",
                    line,
                ));
            }
        }
        Ok(out)
    }

    fn fetch_literal(
        &mut self,
        out: &mut String,
        literal: &Literal,
        line: usize,
    ) -> Result<(), CompilerError> {
        match literal.data_type.primary() {
            Type::Int => {
                let value: i64 = literal.value.parse().map_err(|_| {
                    CompilerError::plain(
                        format!("invalid integer literal '{}'", literal.value),
                        line,
                    )
                })?;
                writeln!(out, "\tloada #${:x}", value as u16)?;
            }
            Type::Bool => match literal.value.as_str() {
                "true" => writeln!(out, "\tloada #$01")?,
                "false" => writeln!(out, "\tloada #$00")?,
                _ => {
                    return Err(CompilerError::plain(
                        "expected 'true' or 'false' as boolean literal value",
                        line,
                    ))
                }
            },
            Type::Float => {
                let value: f32 = literal.value.parse().map_err(|_| {
                    CompilerError::plain(
                        format!("invalid float literal '{}'", literal.value),
                        line,
                    )
                })?;
                let half = pack_32(value.to_bits());
                // set the F bit so the ALU treats the operands as floats
                writeln!(out, "\ttay")?;
                writeln!(out, "\ttstatusa")?;
                writeln!(out, "\tora #%00000100")?;
                writeln!(out, "\ttastatus")?;
                writeln!(out, "\ttya")?;
                writeln!(out, "\tloada #${:x}", half)?;
            }
            Type::String => {
                let constant = format!("__STRC__NUM_{}", self.next_strc());
                writeln!(out, "@db {} ({})", constant, literal.value)?;
                writeln!(out, "\tloadb #{}", constant)?;
                writeln!(out, "\tloada #${:x}", literal.value.len())?;
            }
            other => {
                return Err(CompilerError::plain(
                    format!("cannot fetch a literal of type '{}'", other),
                    line,
                ));
            }
        }
        Ok(())
    }

    /// Fetch a named or indexed variable. Globals load through their
    /// symbol name, locals through the stack.
    fn fetch_variable(
        &mut self,
        out: &mut String,
        expression: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<(), CompilerError> {
        let (name, index) = match expression {
            Expression::LValue(name) => (name, None),
            Expression::Indexed { name, index } => (name, Some(index.as_ref())),
            _ => unreachable!("fetch_variable called on a non-variable"),
        };
        let symbol = self
            .symbol_table
            .lookup(name, &self.current_scope_name, self.current_scope, line)?
            .clone();

        if !symbol.defined {
            return Err(CompilerError::plain(
                format!("variable '{}' referenced before assignment", symbol.name),
                line,
            ));
        }
        let is_dynamic = symbol.data_type.is_dynamic();
        if is_dynamic && symbol.freed {
            return Err(CompilerError::plain(
                "cannot reference dynamic memory that has already been freed",
                line,
            ));
        }

        // the index value is computed first, into A
        if let Some(index_expression) = index {
            let primary = symbol.data_type.primary();
            if primary != Type::Array && primary != Type::String {
                return Err(CompilerError::plain(
                    "cannot index variables of this type",
                    line,
                ));
            }
            let text = self.fetch_value(index_expression, line, max_offset)?;
            out.push_str(&text);
        }

        if symbol.has_static_storage() {
            if is_dynamic {
                if index.is_some() {
                    // a single character: A = 1, B = data address + index
                    writeln!(out, "\ttab")?;
                    writeln!(out, "\tloada {}", symbol.name)?;
                    writeln!(out, "\tclc")?;
                    writeln!(out, "\taddca b")?;
                    writeln!(out, "\ttab")?;
                    writeln!(out, "\tincb")?;
                    writeln!(out, "\tincb")?;
                    writeln!(out, "\tloada #$01")?;
                } else if symbol.data_type.primary() == Type::String {
                    // length word first, then the character base address
                    writeln!(out, "\tloady #$00")?;
                    writeln!(out, "\tloada ({}), y", symbol.name)?;
                    writeln!(out, "\tloadb {}", symbol.name)?;
                    writeln!(out, "\tincb")?;
                    writeln!(out, "\tincb")?;
                } else {
                    // a dynamic scalar reads through its pointer
                    writeln!(out, "\tloady #$00")?;
                    writeln!(out, "\tloada ({}), y", symbol.name)?;
                }
            } else if index.is_some() {
                // word index to byte offset, then indexed load
                writeln!(out, "\tlsl a")?;
                writeln!(out, "\ttay")?;
                writeln!(out, "\tloada {}, y", symbol.name)?;
            } else {
                writeln!(out, "\tloada {}", symbol.name)?;
            }
            return Ok(());
        }

        // locals live on the stack
        if symbol.is_parameter {
            // parameters hold fetched values: one word for scalars, a
            // length word then an address word for strings
            if symbol.data_type.primary() == Type::String {
                if index.is_some() {
                    // a single character of a string parameter
                    writeln!(out, "\ttay")?;
                    self.move_sp(out, symbol.stack_offset + 2, false)?;
                    writeln!(out, "\tplb")?;
                    self.stack_offset -= 1;
                    writeln!(out, "\tpla")?;
                    self.stack_offset -= 1;
                    writeln!(out, "\ttya")?;
                    writeln!(out, "\tclc")?;
                    writeln!(out, "\taddca b")?;
                    writeln!(out, "\ttab")?;
                    writeln!(out, "\tloada #$01")?;
                } else {
                    self.move_sp(out, symbol.stack_offset + 2, false)?;
                    writeln!(out, "\tplb")?;
                    self.stack_offset -= 1;
                    writeln!(out, "\tpla")?;
                    self.stack_offset -= 1;
                }
            } else {
                self.move_sp(out, symbol.stack_offset + 1, false)?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 1;
            }
            return Ok(());
        }
        if is_dynamic {
            if symbol.data_type.primary() == Type::String {
                if index.is_some() {
                    // A currently holds the index; keep it in B while the
                    // pointer is pulled
                    writeln!(out, "\ttab")?;
                    self.move_sp(out, symbol.stack_offset + 1, true)?;
                    writeln!(out, "\tpla")?;
                    self.stack_offset -= 1;
                    writeln!(out, "\tclc")?;
                    writeln!(out, "\taddca b")?;
                    writeln!(out, "\ttab")?;
                    writeln!(out, "\tincb")?;
                    writeln!(out, "\tincb")?;
                    writeln!(out, "\tloada #$01")?;
                } else {
                    // pull the string pointer, then read the length word
                    // through it
                    self.move_sp(out, symbol.stack_offset + 1, false)?;
                    writeln!(out, "\tplb")?;
                    self.stack_offset -= 1;
                    writeln!(out, "\ttba")?;
                    writeln!(out, "\ttax")?;
                    writeln!(out, "\tloada $00, x")?;
                    writeln!(out, "\tincb")?;
                    writeln!(out, "\tincb")?;
                }
            } else {
                // dynamic scalar: pull the heap address, then read through it
                self.move_sp(out, symbol.stack_offset + 1, false)?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 1;
                writeln!(out, "\ttay")?;
                writeln!(out, "\tloada $00, y")?;
            }
        } else if index.is_some() {
            if symbol.data_type.subtype() == Type::String {
                return Err(CompilerError::plain(
                    "indexing local string arrays is unsupported",
                    line,
                ));
            }
            // A holds the index; walk the SP down to the element, pull it,
            // and walk back so the offset model stays true
            writeln!(out, "\ttay")?;
            self.move_sp(out, symbol.stack_offset + 1, false)?;
            writeln!(out, "\ttya")?;
            writeln!(out, "\tlsl a")?;
            writeln!(out, "\ttab")?;
            writeln!(out, "\ttspa")?;
            writeln!(out, "\tsec")?;
            writeln!(out, "\tsubca b")?;
            writeln!(out, "\ttasp")?;
            writeln!(out, "\tpla")?;
            writeln!(out, "\ttax")?;
            writeln!(out, "\ttspa")?;
            writeln!(out, "\tclc")?;
            writeln!(out, "\taddca b")?;
            writeln!(out, "\ttasp")?;
            writeln!(out, "\ttxa")?;
            // the SP walked down and back; net effect matches the pull
            self.stack_offset -= 1;
        } else {
            self.move_sp(out, symbol.stack_offset + 1, false)?;
            writeln!(out, "\tpla")?;
            self.stack_offset -= 1;
        }
        Ok(())
    }

    fn fetch_address_of(
        &mut self,
        out: &mut String,
        name: &str,
        line: usize,
    ) -> Result<(), CompilerError> {
        let symbol = self
            .symbol_table
            .lookup(name, &self.current_scope_name, self.current_scope, line)?
            .clone();
        if !symbol.defined {
            return Err(CompilerError::plain(
                format!("variable '{}' referenced before assignment", symbol.name),
                line,
            ));
        }

        if symbol.data_type.is_dynamic() {
            if symbol.freed {
                return Err(CompilerError::plain(
                    "cannot reference dynamic memory that has already been freed",
                    line,
                ));
            }
            if symbol.has_static_storage() {
                writeln!(out, "\tloada {}", symbol.name)?;
            } else {
                self.move_sp(out, symbol.stack_offset + 1, false)?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 1;
            }
        } else if symbol.has_static_storage() {
            writeln!(out, "\tloada #{}", symbol.name)?;
        } else {
            // position one past the slot, step back onto it, and read SP
            self.move_sp(out, symbol.stack_offset + 1, false)?;
            writeln!(out, "\tincsp")?;
            writeln!(out, "\ttspa")?;
            self.stack_offset -= 1;
        }
        Ok(())
    }

    /// Evaluate a binary tree. The result lands in A (strings in A and B).
    pub(super) fn evaluate_binary(
        &mut self,
        expression: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        let Expression::Binary {
            operator,
            left,
            right,
        } = expression
        else {
            return Err(CompilerError::plain("expected a binary expression", line));
        };

        let mut out = String::new();
        let mut max = max_offset;

        self.move_sp(&mut out, max, false)?;

        // evaluate the left operand and push it
        let left_type = self.expression_type(left, matches!(left.as_ref(), Expression::Indexed { .. }), line)?;
        let left_text = match left.as_ref() {
            Expression::Binary { .. } => self.evaluate_binary(left, line, max)?,
            Expression::Unary { operator, .. } => {
                let mut text = String::new();
                // a negated operand flags signed arithmetic for the ALU
                if *operator == Operator::Minus {
                    writeln!(text, "\ttay")?;
                    writeln!(text, "\ttstatusa")?;
                    writeln!(text, "\tora #%10000000")?;
                    writeln!(text, "\ttastatus")?;
                    writeln!(text, "\ttya")?;
                }
                text.push_str(&self.evaluate_unary(left, line, max)?);
                text
            }
            _ => self.fetch_value(left, line, max)?,
        };
        out.push_str(&left_text);

        if left_type.primary() == Type::String {
            writeln!(out, "\ttax")?;
            writeln!(out, "\ttba")?;
            writeln!(out, "\ttay")?;
            self.move_sp(&mut out, max, false)?;
            writeln!(out, "\ttya")?;
            writeln!(out, "\ttab")?;
            writeln!(out, "\ttxa")?;
            writeln!(out, "\tpha")?;
            writeln!(out, "\tphb")?;
            self.stack_offset += 2;
            max += 2;
        } else {
            writeln!(out, "\ttax")?;
            self.move_sp(&mut out, max, false)?;
            writeln!(out, "\ttxa")?;
            writeln!(out, "\tpha")?;
            self.stack_offset += 1;
            max += 1;
        }

        // evaluate the right operand, then bring the left back
        if matches!(right.as_ref(), Expression::Binary { .. }) {
            let right_text = self.evaluate_binary(right, line, max)?;
            out.push_str(&right_text);
            if left_type.primary() == Type::String {
                writeln!(out, "\tstorea __TEMP_A")?;
                writeln!(out, "\tstoreb __TEMP_B")?;
                self.move_sp(&mut out, max, false)?;
                writeln!(out, "\tplb")?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 2;
                max -= 2;
            } else {
                writeln!(out, "\ttab")?;
                self.move_sp(&mut out, max, false)?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 1;
                max -= 1;
            }
        } else {
            if !self.types_are_compatible(left, right, line)? {
                return Err(CompilerError::plain(
                    "types in binary expression do not match",
                    line,
                ));
            }
            let right_text = match right.as_ref() {
                Expression::Unary { .. } => self.evaluate_unary(right, line, max)?,
                _ => self.fetch_value(right, line, max)?,
            };
            out.push_str(&right_text);

            if left_type.primary() == Type::String {
                writeln!(out, "\tstorea __TEMP_A")?;
                writeln!(out, "\tstoreb __TEMP_B")?;
                self.move_sp(&mut out, max, false)?;
                writeln!(out, "\tplb")?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 2;
                max -= 2;
            } else {
                writeln!(out, "\ttax")?;
                self.move_sp(&mut out, max, false)?;
                writeln!(out, "\ttxb")?;
                writeln!(out, "\tpla")?;
                self.stack_offset -= 1;
                max -= 1;
            }
        }

        // both operands are in place: left in A, right in B (strings:
        // left in registers, right in the temp words)
        let is_float = left_type.primary() == Type::Float;
        match operator {
            Operator::Plus => {
                if left_type.primary() == Type::String {
                    self.concatenate_strings(&mut out, left)?;
                } else if is_float {
                    writeln!(out, "\tfadda b")?;
                } else {
                    writeln!(out, "\tclc")?;
                    writeln!(out, "\taddca b")?;
                }
            }
            Operator::Minus => {
                if is_float {
                    writeln!(out, "\tfsuba b")?;
                } else {
                    writeln!(out, "\tsec")?;
                    writeln!(out, "\tsubca b")?;
                }
            }
            Operator::Mult => {
                if is_float {
                    writeln!(out, "\tfmulta b")?;
                } else if self.is_signed(expression, line)? {
                    writeln!(out, "\tmulta b")?;
                } else {
                    writeln!(out, "\tmultua b")?;
                }
            }
            Operator::Div => {
                if is_float {
                    writeln!(out, "\tfdiva b")?;
                } else if self.is_signed(expression, line)? {
                    writeln!(out, "\tdiva b")?;
                } else {
                    writeln!(out, "\tdivua b")?;
                }
            }
            Operator::Modulo => {
                // the remainder is left in B by the divide
                if self.is_signed(expression, line)? {
                    writeln!(out, "\tdiva b")?;
                } else {
                    writeln!(out, "\tdivua b")?;
                }
                writeln!(out, "\ttba")?;
            }
            Operator::Equal => writeln!(out, "\tjsr __builtins_equal")?,
            Operator::NotEqual => {
                writeln!(out, "\tjsr __builtins_equal")?;
                writeln!(out, "\txora #$01")?;
            }
            Operator::Greater => writeln!(out, "\tjsr __builtins_greater")?,
            Operator::GreaterOrEqual => writeln!(out, "\tjsr __builtins_gt_equal")?,
            Operator::Less => writeln!(out, "\tjsr __builtins_less")?,
            Operator::LessOrEqual => writeln!(out, "\tjsr __builtins_lt_equal")?,
            Operator::And | Operator::BitAnd => writeln!(out, "\tanda b")?,
            Operator::Or | Operator::BitOr => writeln!(out, "\tora b")?,
            Operator::Not => {
                return Err(CompilerError::plain(
                    "'not' is a unary operator",
                    line,
                ));
            }
        }

        debug_assert_eq!(max, max_offset);
        Ok(out)
    }

    /// String concatenation through the input buffer: copy the left operand
    /// in (unless a nested concatenation already did), then append the
    /// right operand and reload the registers with the result.
    fn concatenate_strings(
        &mut self,
        out: &mut String,
        left: &Expression,
    ) -> Result<(), CompilerError> {
        writeln!(out, "\tstorea __INPUT_LEN")?;

        if !matches!(left, Expression::Binary { .. }) {
            // copy the left argument into the string buffer
            writeln!(out, "\tphb")?;
            writeln!(out, "\tloadb __INPUT_BUFFER_START_ADDR")?;
            writeln!(out, "\tphb")?;
            writeln!(out, "\tpha")?;
            writeln!(out, "\tjsr __builtins_memcpy")?;
        }

        // destination: buffer start plus the bytes already written
        writeln!(out, "\tloada __INPUT_LEN")?;
        writeln!(out, "\tclc")?;
        writeln!(out, "\taddca __INPUT_BUFFER_START_ADDR")?;
        writeln!(out, "\tloadb __TEMP_B")?;
        writeln!(out, "\tphb")?;
        writeln!(out, "\tpha")?;
        writeln!(out, "\tloada __TEMP_A")?;
        writeln!(out, "\tpha")?;
        writeln!(out, "\tclc")?;
        writeln!(out, "\taddca __INPUT_LEN")?;
        writeln!(out, "\tstorea __INPUT_LEN")?;
        writeln!(out, "\tjsr __builtins_memcpy")?;

        // the concatenated string sits in the buffer; load its registers
        writeln!(out, "\tloadb __INPUT_BUFFER_START_ADDR")?;
        writeln!(out, "\tloada __INPUT_LEN")?;
        Ok(())
    }

    /// Evaluate a unary expression into A.
    pub(super) fn evaluate_unary(
        &mut self,
        expression: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        let Expression::Unary { operator, operand } = expression else {
            return Err(CompilerError::plain("expected a unary expression", line));
        };

        let mut out = String::new();
        let operand_type = self.expression_type(operand, false, line)?;
        let text = self.fetch_value(operand, line, max_offset)?;
        out.push_str(&text);

        match operator {
            Operator::Plus => {
                compiler_warning("expression seems to have no effect", line);
            }
            Operator::Minus => match operand_type.primary() {
                Type::Float => {
                    // floats carry a sign bit rather than two's complement
                    writeln!(out, "\txora #$8000")?;
                }
                Type::Int => {
                    writeln!(out, "\txora #$FFFF")?;
                    writeln!(out, "\tclc")?;
                    writeln!(out, "\taddca #$01")?;
                }
                other => {
                    return Err(CompilerError::plain(
                        format!("cannot negate a value of type '{}'", other),
                        line,
                    ));
                }
            },
            Operator::Not => {
                // zero is the only false value; NOT maps 0 to 1 and
                // everything else to 0
                let label = self.branch_label("NOT");
                writeln!(out, "\tcmpa #$00")?;
                writeln!(out, "\tbreq {}.zero", label)?;
                writeln!(out, "\tloada #$00")?;
                writeln!(out, "\tjmp {}.done", label)?;
                writeln!(out, "{}.zero:", label)?;
                writeln!(out, "\tloada #$01")?;
                writeln!(out, "{}.done:", label)?;
            }
            _ => {
                return Err(CompilerError::plain(
                    "invalid operator in unary expression",
                    line,
                ));
            }
        }
        Ok(out)
    }
}
