//! Compiler diagnostics.
//!
//! Every error is fatal to its phase; warnings are printed to stderr and
//! processing continues.

use std::fmt;

/// A fatal compiler error with its source line.
#[derive(Debug)]
pub struct CompilerError {
    message: String,
    code: u32,
    line: usize,
}

impl CompilerError {
    pub fn new(message: impl Into<String>, code: u32, line: usize) -> Self {
        CompilerError {
            message: message.into(),
            code,
            line,
        }
    }

    /// An error with no specific code.
    pub fn plain(message: impl Into<String>, line: usize) -> Self {
        CompilerError::new(message, 0, line)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "**** Compiler Error {}: {} (line {})",
            self.code, self.message, self.line
        )
    }
}

impl std::error::Error for CompilerError {}

impl From<fmt::Error> for CompilerError {
    fn from(e: fmt::Error) -> Self {
        CompilerError::plain(format!("could not write generated code: {}", e), 0)
    }
}

/// A parse error with its source line.
#[derive(Debug)]
pub struct ParserError {
    message: String,
    code: u32,
    line: usize,
}

impl ParserError {
    pub fn new(message: impl Into<String>, code: u32, line: usize) -> Self {
        ParserError {
            message: message.into(),
            code,
            line,
        }
    }

    pub fn plain(message: impl Into<String>, line: usize) -> Self {
        ParserError::new(message, 0, line)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line(&self) -> usize {
        self.line
    }
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "**** Parser Error {}: {} (line {})",
            self.code, self.message, self.line
        )
    }
}

impl std::error::Error for ParserError {}

impl From<ParserError> for CompilerError {
    fn from(e: ParserError) -> Self {
        CompilerError::new(e.message, e.code, e.line)
    }
}

/// Print a warning and continue.
pub fn compiler_warning(message: &str, line: usize) {
    eprintln!("**** Compiler Warning: {} (line {})", message, line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_format() {
        let err = CompilerError::new("could not find 'x' in symbol table", 0, 12);
        assert_eq!(
            err.to_string(),
            "**** Compiler Error 0: could not find 'x' in symbol table (line 12)"
        );
    }

    #[test]
    fn test_parser_error_format() {
        let err = ParserError::new("unexpected token", 210, 3);
        assert_eq!(
            err.to_string(),
            "**** Parser Error 210: unexpected token (line 3)"
        );
    }
}
