//! Embedded runtime-support assembly.
//!
//! The builtins unit is assembled and linked into every program unless the
//! build suppresses it. It supplies the comparison subroutines, the memcpy
//! routine behind string assignment and concatenation, and the scratch
//! words they use.

use sin_core::{ObjectFile, Wordsize};

use crate::error::CompilerError;

/// The builtins assembly source, embedded at build time.
pub const BUILTINS_SINA: &str = include_str!("../stdlib/builtins.sina");

/// Assemble the embedded builtins into an object file.
pub fn assemble_builtins() -> Result<ObjectFile, CompilerError> {
    sin_asm::Assembler::new(Wordsize::W16)
        .assemble(BUILTINS_SINA)
        .map_err(|e| CompilerError::plain(format!("could not assemble builtins: {}", e), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sin_core::object::SymbolClass;

    #[test]
    fn test_builtins_assemble_cleanly() {
        let object = assemble_builtins().unwrap();
        assert!(!object.code.is_empty());
        for name in [
            "__builtins_init",
            "__builtins_memcpy",
            "__builtins_equal",
            "__builtins_greater",
            "__builtins_less",
            "__builtins_gt_equal",
            "__builtins_lt_equal",
        ] {
            assert!(
                object
                    .symbols
                    .iter()
                    .any(|s| s.name == name && s.class == SymbolClass::Defined),
                "missing builtin '{}'",
                name
            );
        }
        assert!(object
            .symbols
            .iter()
            .any(|s| s.name == "__INPUT_BUFFER_START_ADDR" && s.class == SymbolClass::Reserved));
    }

    #[test]
    fn test_builtins_have_no_unresolved_references() {
        let object = assemble_builtins().unwrap();
        let defined: Vec<&str> = object.symbols.iter().map(|s| s.name.as_str()).collect();
        for relocation in &object.relocations {
            assert!(
                defined.contains(&relocation.name.as_str()),
                "'{}' is referenced but not defined in builtins",
                relocation.name
            );
        }
    }
}
