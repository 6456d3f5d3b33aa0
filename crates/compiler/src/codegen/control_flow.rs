//! Conditional and loop lowering.
//!
//! Branch labels derive from the current scope name, depth, and a
//! monotonically increasing branch id, so every construct gets a unique,
//! fully-qualified label family. A condition value of zero is false;
//! anything else is true. Both constructs normalize the stack pointer to
//! the end of the frame before branching so every control-flow path
//! arrives with the same stack shape, and symbols declared inside a
//! branch body are removed from the table when it exits.

use std::fmt::Write as _;

use crate::ast::{Expression, Statement, StatementKind};
use crate::error::CompilerError;

use super::CodeGen;

impl CodeGen {
    /// Evaluate a branch condition into A.
    fn condition_value(
        &mut self,
        condition: &Expression,
        line: usize,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        match condition {
            Expression::List(_) => Err(CompilerError::plain(
                "invalid expression type in conditional statement",
                line,
            )),
            _ => self.fetch_value(condition, line, max_offset),
        }
    }

    /// Lower an if/then/else statement.
    pub(super) fn ite(
        &mut self,
        statement: &Statement,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        let StatementKind::IfThenElse {
            condition,
            if_branch,
            else_branch,
        } = &statement.kind
        else {
            return Err(CompilerError::plain("expected an if statement", statement.line));
        };
        let line = statement.line;

        let label = self.branch_label("ITE");
        let outer_scope = self.current_scope_name.clone();
        let outer_level = self.current_scope;

        let mut out = String::new();
        writeln!(out, "{}:", label)?;

        let text = self.condition_value(condition, line, max_offset)?;
        out.push_str(&text);

        // every path must reach the branch point with the same stack
        // shape; park the condition in X while the pointer is normalized
        writeln!(out, "\ttax")?;
        self.move_sp(&mut out, max_offset, false)?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tcmpa #$00")?;
        writeln!(out, "\tbreq {}.else", label)?;

        // the if branch opens a deeper scope
        let body = self.compile_block(
            if_branch,
            outer_level + 1,
            &outer_scope,
            max_offset,
            max_offset,
        )?;
        out.push_str(&body);
        self.move_sp(&mut out, max_offset, false)?;
        self.symbol_table.remove_scope(&outer_scope, outer_level + 1);
        debug_assert_eq!(self.stack_offset, max_offset);

        writeln!(out, "\tjmp {}.done", label)?;
        writeln!(out)?;
        writeln!(out, "{}.else:", label)?;

        if let Some(else_block) = else_branch {
            let body = self.compile_block(
                else_block,
                outer_level + 1,
                &outer_scope,
                max_offset,
                max_offset,
            )?;
            out.push_str(&body);
            self.move_sp(&mut out, max_offset, false)?;
            self.symbol_table.remove_scope(&outer_scope, outer_level + 1);
            debug_assert_eq!(self.stack_offset, max_offset);
        }

        writeln!(out, "\tjmp {}.done", label)?;
        writeln!(out)?;
        writeln!(out, "{}.done:", label)?;
        writeln!(out)?;

        self.current_scope_name = outer_scope;
        self.current_scope = outer_level;
        Ok(out)
    }

    /// Lower a while loop.
    pub(super) fn while_loop(
        &mut self,
        statement: &Statement,
        max_offset: usize,
    ) -> Result<String, CompilerError> {
        let StatementKind::WhileLoop { condition, body } = &statement.kind else {
            return Err(CompilerError::plain("expected a while loop", statement.line));
        };
        let line = statement.line;

        let label = self.branch_label("WHILE");
        let outer_scope = self.current_scope_name.clone();
        let outer_level = self.current_scope;

        let mut out = String::new();

        // the loop is re-entered at the top label, so the stack must be
        // normalized before it
        self.move_sp(&mut out, max_offset, false)?;
        writeln!(out, "{}:", label)?;

        let text = self.condition_value(condition, line, max_offset)?;
        out.push_str(&text);
        writeln!(out, "\ttax")?;
        self.move_sp(&mut out, max_offset, false)?;
        writeln!(out, "\ttxa")?;
        writeln!(out, "\tcmpa #$00")?;
        writeln!(out, "\tbreq {}.done", label)?;

        let body_text = self.compile_block(
            body,
            outer_level + 1,
            &outer_scope,
            max_offset,
            max_offset,
        )?;
        out.push_str(&body_text);

        // unwind the body's locals and drop their symbols before looping
        self.move_sp(&mut out, max_offset, false)?;
        self.symbol_table.remove_scope(&outer_scope, outer_level + 1);
        debug_assert_eq!(self.stack_offset, max_offset);

        writeln!(out, "\tjmp {}", label)?;
        writeln!(out, "{}.done:", label)?;
        writeln!(out)?;

        self.current_scope_name = outer_scope;
        self.current_scope = outer_level;
        Ok(out)
    }
}
