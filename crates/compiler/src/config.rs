//! Build configuration.
//!
//! A small TOML file can override the defaults, e.g.:
//!
//! ```toml
//! wordsize = 16
//! vm_version = 1
//! keep_asm = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use sin_core::Wordsize;

use crate::error::CompilerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Target machine word size in bits.
    pub wordsize: u8,
    /// Target VM version; decides the linker's memory layout.
    pub vm_version: u8,
    /// Keep the intermediate .sina assembly next to the output.
    pub keep_asm: bool,
    /// Link the embedded runtime-support routines.
    pub include_builtins: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            wordsize: 16,
            vm_version: 1,
            keep_asm: false,
            include_builtins: true,
        }
    }
}

impl CompilerConfig {
    /// Load a configuration file, validating the wordsize.
    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompilerError::plain(
                format!("could not read config '{}': {}", path.display(), e),
                0,
            )
        })?;
        let config: CompilerConfig = toml::from_str(&text).map_err(|e| {
            CompilerError::plain(
                format!("could not parse config '{}': {}", path.display(), e),
                0,
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CompilerError> {
        if Wordsize::from_bits(self.wordsize).is_none() {
            return Err(CompilerError::plain(
                format!(
                    "cannot initialize machine word size to {}; must be 16, 32, or 64",
                    self.wordsize
                ),
                0,
            ));
        }
        Ok(())
    }

    pub fn wordsize(&self) -> Wordsize {
        Wordsize::from_bits(self.wordsize).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.wordsize, 16);
        assert_eq!(config.vm_version, 1);
        assert!(config.include_builtins);
        assert!(!config.keep_asm);
    }

    #[test]
    fn test_parse_overrides() {
        let config: CompilerConfig = toml::from_str("keep_asm = true\n").unwrap();
        assert!(config.keep_asm);
        assert_eq!(config.wordsize, 16);
    }

    #[test]
    fn test_bad_wordsize_rejected() {
        let config: CompilerConfig = toml::from_str("wordsize = 24\n").unwrap();
        assert!(config.validate().is_err());
    }
}
