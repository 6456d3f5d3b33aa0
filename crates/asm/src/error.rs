//! Assembler and linker error types.

use std::fmt;

/// An error raised while assembling a translation unit. Carries the source
/// line on which the offending statement begins.
#[derive(Debug)]
pub struct AsmError {
    message: String,
    line: usize,
}

impl AsmError {
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        AsmError {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "**** Assembler Error: {} (line {})", self.message, self.line)
    }
}

impl std::error::Error for AsmError {}

/// A fatal error raised while linking object files.
#[derive(Debug)]
pub enum LinkError {
    /// Word sizes in all object files must match.
    WordsizeMismatch,
    /// VM version must be the same between all object files.
    VersionMismatch,
    /// The VM version named by the objects has no known memory layout.
    UnsupportedVmVersion(u8),
    /// The same symbol is defined by more than one object.
    DuplicateDefinition(String),
    /// A relocation names a symbol no object defines.
    UnresolvedSymbol(String),
    /// `@rs` reservations ran past the end of the reserved region.
    ReservationOverflow,
    Io(std::io::Error),
    Object(sin_core::ObjectError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::WordsizeMismatch => {
                write!(f, "**** Linker Error: word sizes in all object files must match")
            }
            LinkError::VersionMismatch => {
                write!(f, "**** Linker Error: VM version must be the same between all object files")
            }
            LinkError::UnsupportedVmVersion(v) => write!(
                f,
                "**** Linker Error: VM version {} is not supported by this toolchain",
                v
            ),
            LinkError::DuplicateDefinition(name) => {
                write!(f, "**** Linker Error: duplicate definition of '{}'", name)
            }
            LinkError::UnresolvedSymbol(name) => write!(
                f,
                "**** Linker Error: could not find '{}' in symbol table",
                name
            ),
            LinkError::ReservationOverflow => {
                write!(f, "**** Linker Error: global variable limit exceeded")
            }
            LinkError::Io(e) => write!(f, "**** Linker Error: {}", e),
            LinkError::Object(e) => write!(f, "**** Linker Error: {}", e),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e)
    }
}

impl From<sin_core::ObjectError> for LinkError {
    fn from(e: sin_core::ObjectError) -> Self {
        LinkError::Object(e)
    }
}
