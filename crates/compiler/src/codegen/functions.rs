//! Function definition, call, and return lowering.
//!
//! Calls evaluate arguments left to right and push them at the end of the
//! caller's frame; the callee's formal parameters are symbols at scope
//! level 1 whose stack offsets match the pushed positions. Returns load
//! the value into registers, unwind the stack pointer to the frame base,
//! and return from the subroutine.

use std::fmt::Write as _;

use crate::ast::{Expression, Statement, StatementKind};
use crate::error::{compiler_warning, CompilerError};
use crate::symbol::{Symbol, SymbolKind, GLOBAL_SCOPE};
use crate::types::Type;

use super::CodeGen;

impl CodeGen {
    /// Compile a function definition into subroutine text. Only permitted
    /// at global scope.
    pub(super) fn define(&mut self, statement: &Statement) -> Result<String, CompilerError> {
        let StatementKind::Definition {
            name,
            return_type,
            formal_parameters,
            procedure,
        } = &statement.kind
        else {
            return Err(CompilerError::plain("expected a definition", statement.line));
        };
        let line = statement.line;

        if self.current_scope_name != GLOBAL_SCOPE || self.current_scope != 0 {
            return Err(CompilerError::plain(
                "function definitions must be in the global scope",
                line,
            ));
        }

        // where the stack model stood when the definition began; returns
        // unwind to here
        let frame_base = self.stack_offset;

        self.symbol_table.insert(
            Symbol::function(name.clone(), *return_type, formal_parameters.to_vec()),
            line,
        )?;

        let mut out = String::new();
        writeln!(out, "{}:", name)?;

        // formal parameters were pushed by the caller; mirror their
        // positions in the symbol table
        let mut must_be_default = false;
        for parameter in formal_parameters {
            let StatementKind::Allocation {
                data_type,
                name: parameter_name,
                initialized,
                ..
            } = &parameter.kind
            else {
                return Err(CompilerError::plain(
                    "only allocation statements are allowed in function parameter definitions",
                    line,
                ));
            };

            if *initialized {
                must_be_default = true;
            } else if must_be_default {
                return Err(CompilerError::plain(
                    "default arguments must be declared last in an argument list",
                    line,
                ));
            }

            let mut parameter_symbol =
                Symbol::variable(parameter_name.clone(), *data_type, name.clone(), 1, true);
            parameter_symbol.stack_offset = self.stack_offset;
            parameter_symbol.is_parameter = true;
            if data_type.is_dynamic() {
                parameter_symbol.allocated = true;
            }
            self.symbol_table.insert(parameter_symbol, line)?;

            match data_type.primary() {
                Type::Array | Type::Struct => {
                    return Err(CompilerError::plain(
                        "aggregate parameters are unsupported",
                        line,
                    ));
                }
                // strings occupy a length word and an address word
                Type::String => self.stack_offset += 2,
                _ => self.stack_offset += 1,
            }
        }

        if procedure.statements.is_empty() {
            compiler_warning("empty function definition", line);
        } else {
            let body =
                self.compile_block(procedure, 1, name, self.stack_offset, frame_base)?;
            out.push_str(&body);
        }
        // functions that fall off the end still unwind their frame; after
        // an explicit return this emits nothing
        self.move_sp(&mut out, frame_base, false)?;
        writeln!(out, "\trts")?;

        // the parameters fall out of scope with the body
        self.symbol_table.remove_scope(name, 1);
        self.current_scope_name = GLOBAL_SCOPE.to_string();
        self.current_scope = 0;
        self.stack_offset = frame_base;
        Ok(out)
    }

    /// Compile a call. Arguments are checked against the formal parameters
    /// and pushed in order; missing trailing arguments fall back to their
    /// declared defaults.
    pub(super) fn call(
        &mut self,
        name: &str,
        args: &[Expression],
        max_offset: usize,
        line: usize,
    ) -> Result<String, CompilerError> {
        let mut out = String::new();

        if !self.symbol_table.contains(name, GLOBAL_SCOPE) {
            return Err(CompilerError::plain(
                "cannot locate function in symbol table (perhaps you didn't include the right file?)",
                line,
            ));
        }
        let function = self
            .symbol_table
            .lookup(name, GLOBAL_SCOPE, 0, line)?
            .clone();
        let SymbolKind::Function { formal_parameters } = &function.kind else {
            return Err(CompilerError::plain(
                format!("'{}' is not a function", name),
                line,
            ));
        };

        self.move_sp(&mut out, max_offset, false)?;
        let frame_base = self.stack_offset;
        let mut max = max_offset;

        if args.len() > formal_parameters.len() {
            return Err(CompilerError::plain(
                format!(
                    "too many arguments in function call; expected {}, got {}",
                    formal_parameters.len(),
                    args.len()
                ),
                line,
            ));
        }

        for (argument, parameter) in args.iter().zip(formal_parameters.iter()) {
            let StatementKind::Allocation {
                data_type: formal_type,
                ..
            } = &parameter.kind
            else {
                return Err(CompilerError::plain(
                    "expected allocation statement in parameter list",
                    line,
                ));
            };
            let argument_type = self.expression_type(argument, false, line)?;
            if !argument_type.is_compatible(formal_type) {
                return Err(CompilerError::plain(
                    "argument supplied does not match the type of the formal parameter",
                    line,
                ));
            }
            self.push_argument(&mut out, argument, formal_type.primary(), &mut max, line)?;
        }

        // defaults for any trailing parameters the call left out
        for parameter in formal_parameters.iter().skip(args.len()) {
            let StatementKind::Allocation {
                data_type: formal_type,
                initialized,
                initial_value,
                name: parameter_name,
                ..
            } = &parameter.kind
            else {
                return Err(CompilerError::plain(
                    "expected allocation statement in parameter list",
                    line,
                ));
            };
            if !initialized {
                return Err(CompilerError::plain(
                    format!(
                        "not enough arguments supplied in call to '{}'; expected '{}'",
                        name, parameter_name
                    ),
                    line,
                ));
            }
            let default_value = initial_value.as_ref().ok_or_else(|| {
                CompilerError::plain("default parameter value missing", line)
            })?;
            self.push_argument(&mut out, default_value, formal_type.primary(), &mut max, line)?;
        }

        writeln!(out, "\tjsr {}", name)?;

        // the callee unwinds to the frame base for register-returnable
        // types; aggregates are left on the stack below it
        match function.data_type.primary() {
            Type::Array => {
                let element_words = if function.data_type.subtype() == Type::String {
                    2
                } else {
                    1
                };
                self.stack_offset = frame_base
                    .saturating_sub(function.data_type.array_length() * element_words);
            }
            _ => {
                self.stack_offset = frame_base;
            }
        }
        Ok(out)
    }

    fn push_argument(
        &mut self,
        out: &mut String,
        argument: &Expression,
        formal_primary: Type,
        max: &mut usize,
        line: usize,
    ) -> Result<(), CompilerError> {
        let text = self.fetch_value(argument, line, *max)?;
        out.push_str(&text);
        match formal_primary {
            Type::Int | Type::Float | Type::Bool | Type::Ptr | Type::Raw => {
                writeln!(out, "\ttax")?;
                self.move_sp(out, *max, false)?;
                writeln!(out, "\ttxa")?;
                writeln!(out, "\tpha")?;
                self.stack_offset += 1;
                *max += 1;
            }
            Type::String => {
                writeln!(out, "\ttax")?;
                writeln!(out, "\ttba")?;
                writeln!(out, "\ttay")?;
                self.move_sp(out, *max, false)?;
                writeln!(out, "\ttya")?;
                writeln!(out, "\ttab")?;
                writeln!(out, "\ttxa")?;
                // a string is a length word and an address word
                writeln!(out, "\tpha")?;
                writeln!(out, "\tphb")?;
                self.stack_offset += 2;
                *max += 2;
            }
            Type::Array | Type::Struct => {
                return Err(CompilerError::plain(
                    "aggregate arguments are unsupported",
                    line,
                ));
            }
            _ => {
                return Err(CompilerError::plain(
                    "could not resolve function parameter data type",
                    line,
                ));
            }
        }
        Ok(())
    }

    /// Compile a return statement: the value lands in registers, the stack
    /// unwinds to the frame base, and the subroutine returns.
    pub(super) fn return_value(
        &mut self,
        value: Option<&Expression>,
        frame_base: usize,
        max_offset: usize,
        line: usize,
    ) -> Result<String, CompilerError> {
        let mut out = String::new();

        match value {
            None => {
                self.move_sp(&mut out, frame_base, false)?;
            }
            Some(expression) => {
                let return_type = self.expression_type(expression, false, line)?;
                match return_type.primary() {
                    Type::Int | Type::String | Type::Bool | Type::Float | Type::Ptr
                    | Type::Raw => {
                        let text = self.fetch_value(expression, line, max_offset)?;
                        out.push_str(&text);
                        // park A and B while the unwind uses A
                        writeln!(out, "\ttax")?;
                        writeln!(out, "\ttba")?;
                        writeln!(out, "\ttay")?;
                        self.move_sp(&mut out, frame_base, false)?;
                        writeln!(out, "\ttya")?;
                        writeln!(out, "\ttab")?;
                        writeln!(out, "\ttxa")?;
                    }
                    Type::Void | Type::None => {
                        self.move_sp(&mut out, frame_base, false)?;
                    }
                    _ => {
                        return Err(CompilerError::plain(
                            "cannot return an expression of the specified type",
                            line,
                        ));
                    }
                }
            }
        }
        debug_assert_eq!(self.stack_offset, frame_base);
        writeln!(out, "\trts")?;
        // statements after a return are unreachable; the model stays at
        // the frame base
        Ok(out)
    }
}
