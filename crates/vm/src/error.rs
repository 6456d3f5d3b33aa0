//! VM error types. Every error carries the program counter at the time it
//! was raised.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmErrorKind {
    IllegalInstruction,
    Segmentation,
    StackFault,
    FloatingPoint,
    Syscall,
}

#[derive(Debug)]
pub struct VmError {
    pub kind: VmErrorKind,
    message: String,
    address: u16,
}

impl VmError {
    pub fn new(kind: VmErrorKind, message: impl Into<String>, address: u16) -> Self {
        VmError {
            kind,
            message: message.into(),
            address,
        }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "**** SINVM Error: {} (at memory location ${:04x})",
            self.message, self.address
        )
    }
}

impl std::error::Error for VmError {}
