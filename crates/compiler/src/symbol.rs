//! Symbols and the scoped symbol table.
//!
//! A symbol binds a name to a type, a scope (name + level), a stack offset
//! (zero for statics), and lifecycle flags. Function symbols additionally
//! carry their formal parameter list. The table permits shadowing across
//! scope names and levels but rejects duplicates at the exact same scope.

use crate::ast::Statement;
use crate::error::CompilerError;
use crate::types::DataType;

pub const GLOBAL_SCOPE: &str = "global";

/// What kind of entity a symbol names.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolKind {
    Variable,
    /// A function; the parameters are the `alloc` statements of its
    /// definition, in order.
    Function { formal_parameters: Vec<Statement> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub data_type: DataType,
    pub scope_name: String,
    pub scope_level: usize,
    /// Whether a value has been assigned.
    pub defined: bool,
    /// For dynamic memory: backing storage has been acquired.
    pub allocated: bool,
    /// For dynamic memory: backing storage has been released.
    pub freed: bool,
    /// Offset in words below the stack-frame base; zero for statics.
    pub stack_offset: usize,
    /// Formal parameters hold fetched values on the stack (a string is a
    /// length word and an address word), unlike local variables, whose
    /// slots hold pointers for dynamic types.
    pub is_parameter: bool,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn variable(
        name: impl Into<String>,
        data_type: DataType,
        scope_name: impl Into<String>,
        scope_level: usize,
        defined: bool,
    ) -> Self {
        Symbol {
            name: name.into(),
            data_type,
            scope_name: scope_name.into(),
            scope_level,
            defined,
            allocated: false,
            freed: false,
            stack_offset: 0,
            is_parameter: false,
            kind: SymbolKind::Variable,
        }
    }

    pub fn function(
        name: impl Into<String>,
        return_type: DataType,
        formal_parameters: Vec<Statement>,
    ) -> Self {
        Symbol {
            name: name.into(),
            data_type: return_type,
            scope_name: GLOBAL_SCOPE.to_string(),
            scope_level: 0,
            defined: true,
            allocated: false,
            freed: false,
            stack_offset: 0,
            is_parameter: false,
            kind: SymbolKind::Function { formal_parameters },
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope_name == GLOBAL_SCOPE && self.scope_level == 0
    }

    /// Whether the symbol's storage is a named static location rather
    /// than a stack slot: true for globals and for `static`-qualified
    /// locals.
    pub fn has_static_storage(&self) -> bool {
        self.is_global() || self.data_type.is_static()
    }
}

/// The compiler's symbol table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Insert a symbol, rejecting a duplicate at the same scope name and
    /// level. Shadowing in other scopes or at deeper levels is permitted.
    pub fn insert(&mut self, symbol: Symbol, line: usize) -> Result<(), CompilerError> {
        if self.exists_in_scope(&symbol.name, &symbol.scope_name, symbol.scope_level) {
            return Err(CompilerError::plain(
                format!("'{}' already in symbol table", symbol.name),
                line,
            ));
        }
        self.symbols.push(symbol);
        Ok(())
    }

    fn exists_in_scope(&self, name: &str, scope_name: &str, scope_level: usize) -> bool {
        self.symbols.iter().any(|s| {
            s.name == name && s.scope_name == scope_name && s.scope_level == scope_level
        })
    }

    /// Find the most recently declared symbol visible from the requested
    /// scope: candidates match by name in the requested scope or in the
    /// global scope, and the innermost shadow wins.
    pub fn lookup(
        &self,
        name: &str,
        scope_name: &str,
        scope_level: usize,
        line: usize,
    ) -> Result<&Symbol, CompilerError> {
        let _ = scope_level;
        let mut found: Option<&Symbol> = None;
        for symbol in &self.symbols {
            if symbol.name != name {
                continue;
            }
            let visible = symbol.scope_name == scope_name
                || (symbol.scope_name == GLOBAL_SCOPE && symbol.scope_level == 0);
            if !visible {
                continue;
            }
            match found {
                None => found = Some(symbol),
                Some(current) if symbol.scope_level > current.scope_level => {
                    found = Some(symbol)
                }
                _ => {}
            }
        }
        found.ok_or_else(|| {
            CompilerError::plain(format!("cannot find '{}' in symbol table", name), line)
        })
    }

    /// Mutable lookup with the same visibility rules.
    pub fn lookup_mut(
        &mut self,
        name: &str,
        scope_name: &str,
        scope_level: usize,
        line: usize,
    ) -> Result<&mut Symbol, CompilerError> {
        let _ = scope_level;
        let mut found: Option<usize> = None;
        for (i, symbol) in self.symbols.iter().enumerate() {
            if symbol.name != name {
                continue;
            }
            let visible = symbol.scope_name == scope_name
                || (symbol.scope_name == GLOBAL_SCOPE && symbol.scope_level == 0);
            if !visible {
                continue;
            }
            match found {
                None => found = Some(i),
                Some(j) if symbol.scope_level > self.symbols[j].scope_level => found = Some(i),
                _ => {}
            }
        }
        match found {
            Some(i) => Ok(&mut self.symbols[i]),
            None => Err(CompilerError::plain(
                format!("cannot find '{}' in symbol table", name),
                line,
            )),
        }
    }

    /// Whether a lookup from this scope would succeed.
    pub fn contains(&self, name: &str, scope_name: &str) -> bool {
        self.symbols.iter().any(|s| {
            s.name == name
                && (s.scope_name == scope_name
                    || (s.scope_name == GLOBAL_SCOPE && s.scope_level == 0))
        })
    }

    /// Remove every entry matching the scope exactly; used at scope exit.
    pub fn remove_scope(&mut self, scope_name: &str, scope_level: usize) {
        self.symbols
            .retain(|s| !(s.scope_name == scope_name && s.scope_level == scope_level));
    }

    /// Remove entries of one name at an exact scope.
    pub fn remove(&mut self, name: &str, scope_name: &str, scope_level: usize) {
        self.symbols.retain(|s| {
            !(s.name == name && s.scope_name == scope_name && s.scope_level == scope_level)
        });
    }

    /// All symbols, in declaration order; used when importing an included
    /// unit's exports.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn int() -> DataType {
        DataType::new(Type::Int)
    }

    #[test]
    fn test_duplicate_in_same_scope_rejected() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::variable("x", int(), GLOBAL_SCOPE, 0, false), 1)
            .unwrap();
        let err = table
            .insert(Symbol::variable("x", int(), GLOBAL_SCOPE, 0, false), 2)
            .unwrap_err();
        assert!(err.message().contains("already in symbol table"));
    }

    #[test]
    fn test_shadowing_across_levels() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::variable("x", int(), "f", 1, true), 1)
            .unwrap();
        let mut inner = Symbol::variable("x", int(), "f", 2, true);
        inner.stack_offset = 5;
        table.insert(inner, 2).unwrap();

        // innermost shadow wins
        let found = table.lookup("x", "f", 2, 3).unwrap();
        assert_eq!(found.scope_level, 2);
        assert_eq!(found.stack_offset, 5);

        // after scope exit, the outer declaration is visible again
        table.remove_scope("f", 2);
        let found = table.lookup("x", "f", 2, 4).unwrap();
        assert_eq!(found.scope_level, 1);
    }

    #[test]
    fn test_globals_visible_from_function_scopes() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::variable("g", int(), GLOBAL_SCOPE, 0, true), 1)
            .unwrap();
        assert!(table.contains("g", "my_function"));
        assert!(table.lookup("g", "my_function", 1, 2).is_ok());
    }

    #[test]
    fn test_locals_invisible_from_other_scopes() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::variable("x", int(), "f", 1, true), 1)
            .unwrap();
        assert!(!table.contains("x", "g"));
        assert!(table.lookup("x", "g", 1, 2).is_err());
    }

    #[test]
    fn test_remove_is_exact() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::variable("x", int(), "f", 1, true), 1)
            .unwrap();
        table
            .insert(Symbol::variable("x", int(), "f", 2, true), 2)
            .unwrap();
        table.remove("x", "f", 2);
        let found = table.lookup("x", "f", 2, 3).unwrap();
        assert_eq!(found.scope_level, 1);
    }

    #[test]
    fn test_not_found_error() {
        let table = SymbolTable::new();
        let err = table.lookup("missing", GLOBAL_SCOPE, 0, 7).unwrap_err();
        assert!(err.message().contains("cannot find 'missing'"));
        assert_eq!(err.line(), 7);
    }
}
