//! The SIN type system.
//!
//! A data type carries a primary type, a subtype (for `ptr` and `array`),
//! an array length, and a set of qualities. Two types are compatible when
//! either is `raw`, when both are pointers or arrays with compatible
//! element types, or when their primaries agree after unwrapping an outer
//! array on one side.

use std::fmt;

/// Primary type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Type {
    #[default]
    None,
    Int,
    Float,
    String,
    Bool,
    Void,
    Ptr,
    Raw,
    Array,
    Struct,
}

impl Type {
    /// Parse a type-name keyword.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "string" => Some(Type::String),
            "bool" => Some(Type::Bool),
            "void" => Some(Type::Void),
            "ptr" => Some(Type::Ptr),
            "raw" => Some(Type::Raw),
            "array" => Some(Type::Array),
            "struct" => Some(Type::Struct),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::None => "none",
            Type::Int => "int",
            Type::Float => "float",
            Type::String => "string",
            Type::Bool => "bool",
            Type::Void => "void",
            Type::Ptr => "ptr",
            Type::Raw => "raw",
            Type::Array => "array",
            Type::Struct => "struct",
        };
        write!(f, "{}", name)
    }
}

/// Symbol qualities. Stored as flags so adding a duplicate is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qualities {
    pub constant: bool,
    pub static_storage: bool,
    pub dynamic: bool,
    pub signed: bool,
    pub unsigned: bool,
}

/// A single quality keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quality {
    Constant,
    Static,
    Dynamic,
    Signed,
    Unsigned,
}

impl Quality {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "const" => Some(Quality::Constant),
            "static" => Some(Quality::Static),
            "dynamic" => Some(Quality::Dynamic),
            "signed" => Some(Quality::Signed),
            "unsigned" => Some(Quality::Unsigned),
            _ => None,
        }
    }
}

impl Qualities {
    pub fn add(&mut self, quality: Quality) {
        match quality {
            Quality::Constant => self.constant = true,
            Quality::Static => self.static_storage = true,
            Quality::Dynamic => self.dynamic = true,
            Quality::Signed => self.signed = true,
            Quality::Unsigned => self.unsigned = true,
        }
    }

    pub fn add_all(&mut self, qualities: &[Quality]) {
        for &q in qualities {
            self.add(q);
        }
    }
}

/// A complete type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataType {
    primary: Type,
    subtype: Type,
    qualities: Qualities,
    array_length: usize,
}

impl DataType {
    pub fn new(primary: Type) -> Self {
        let mut data_type = DataType {
            primary,
            ..Default::default()
        };
        // strings always use dynamic memory; ints default to signed
        if primary == Type::String {
            data_type.qualities.dynamic = true;
        }
        if primary == Type::Int {
            data_type.qualities.signed = true;
        }
        data_type
    }

    pub fn pointer(subtype: Type) -> Self {
        DataType {
            primary: Type::Ptr,
            subtype,
            ..Default::default()
        }
    }

    pub fn array(length: usize, subtype: Type) -> Self {
        DataType {
            primary: Type::Array,
            subtype,
            array_length: length,
            ..Default::default()
        }
    }

    pub fn with_qualities(mut self, qualities: &[Quality]) -> Self {
        // an explicit sign replaces the int default
        if qualities.contains(&Quality::Unsigned) {
            self.qualities.signed = false;
        }
        self.qualities.add_all(qualities);
        self
    }

    pub fn primary(&self) -> Type {
        self.primary
    }

    pub fn subtype(&self) -> Type {
        self.subtype
    }

    pub fn set_primary(&mut self, primary: Type) {
        self.primary = primary;
    }

    pub fn set_subtype(&mut self, subtype: Type) {
        self.subtype = subtype;
    }

    pub fn array_length(&self) -> usize {
        self.array_length
    }

    pub fn qualities(&self) -> &Qualities {
        &self.qualities
    }

    pub fn add_quality(&mut self, quality: Quality) {
        if quality == Quality::Unsigned {
            self.qualities.signed = false;
        }
        self.qualities.add(quality);
    }

    pub fn is_const(&self) -> bool {
        self.qualities.constant
    }

    pub fn is_dynamic(&self) -> bool {
        self.qualities.dynamic
    }

    pub fn is_static(&self) -> bool {
        self.qualities.static_storage
    }

    /// Signedness applies to ints (default signed) and floats (always).
    pub fn is_signed(&self) -> bool {
        match self.primary {
            Type::Int => !self.qualities.unsigned,
            Type::Float => true,
            _ => false,
        }
    }

    /// Validate the structural invariants of the descriptor.
    pub fn validate(&self) -> Result<(), String> {
        if self.qualities.signed && self.qualities.unsigned {
            return Err("a type cannot be both signed and unsigned".to_string());
        }
        if (self.qualities.signed || self.qualities.unsigned) && self.primary != Type::Int {
            return Err(format!(
                "cannot use sign qualifier for variable of type '{}'",
                self.primary
            ));
        }
        match self.primary {
            Type::Ptr | Type::Array => {
                if self.subtype == Type::None {
                    return Err(format!("'{}' requires a defined subtype", self.primary));
                }
                if self.primary == Type::Array
                    && matches!(self.subtype, Type::Array | Type::Struct)
                {
                    return Err(
                        "arrays may not contain other arrays nor structs (only pointers to such members)"
                            .to_string(),
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Structural compatibility as used for assignments and arguments.
    pub fn is_compatible(&self, other: &DataType) -> bool {
        if self.primary == Type::Raw || other.primary == Type::Raw {
            return true;
        }
        if (self.primary == Type::Ptr && other.primary == Type::Ptr)
            || (self.primary == Type::Array && other.primary == Type::Array)
        {
            return DataType::new(self.subtype).is_compatible(&DataType::new(other.subtype));
        }

        // unwrap an outer array to its element type on either side
        let left = if self.primary == Type::Array {
            self.subtype
        } else {
            self.primary
        };
        let right = if other.primary == Type::Array {
            other.subtype
        } else {
            other.primary
        };
        left == right
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary {
            Type::Ptr => write!(f, "ptr<{}>", self.subtype),
            Type::Array => write!(f, "array<{}, {}>", self.array_length, self.subtype),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_is_reflexive() {
        let types = [
            DataType::new(Type::Int),
            DataType::new(Type::Float),
            DataType::new(Type::Bool),
            DataType::new(Type::String),
            DataType::pointer(Type::Int),
            DataType::array(4, Type::Bool),
            DataType::new(Type::Raw),
        ];
        for t in &types {
            assert!(t.is_compatible(t), "{} not compatible with itself", t);
        }
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        let types = [
            DataType::new(Type::Int),
            DataType::new(Type::Float),
            DataType::new(Type::String),
            DataType::pointer(Type::Int),
            DataType::pointer(Type::Float),
            DataType::array(2, Type::Int),
            DataType::new(Type::Raw),
        ];
        for a in &types {
            for b in &types {
                assert_eq!(
                    a.is_compatible(b),
                    b.is_compatible(a),
                    "asymmetry between {} and {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_raw_is_compatible_with_everything() {
        let raw = DataType::new(Type::Raw);
        for t in [
            DataType::new(Type::Int),
            DataType::new(Type::String),
            DataType::pointer(Type::Bool),
            DataType::array(8, Type::Float),
        ] {
            assert!(raw.is_compatible(&t));
            assert!(t.is_compatible(&raw));
        }
    }

    #[test]
    fn test_array_unwraps_to_element_type() {
        let arr = DataType::array(3, Type::Int);
        let int = DataType::new(Type::Int);
        assert!(arr.is_compatible(&int));
        assert!(int.is_compatible(&arr));
        assert!(!arr.is_compatible(&DataType::new(Type::Bool)));
    }

    #[test]
    fn test_pointer_compatibility_follows_subtype() {
        assert!(DataType::pointer(Type::Int).is_compatible(&DataType::pointer(Type::Int)));
        assert!(!DataType::pointer(Type::Int).is_compatible(&DataType::pointer(Type::Bool)));
        assert!(DataType::pointer(Type::Raw).is_compatible(&DataType::pointer(Type::Bool)));
        assert!(!DataType::pointer(Type::Int).is_compatible(&DataType::new(Type::Int)));
    }

    #[test]
    fn test_int_defaults_to_signed() {
        let t = DataType::new(Type::Int);
        assert!(t.is_signed());
        let u = DataType::new(Type::Int).with_qualities(&[Quality::Unsigned]);
        assert!(!u.is_signed());
    }

    #[test]
    fn test_string_is_always_dynamic() {
        assert!(DataType::new(Type::String).is_dynamic());
    }

    #[test]
    fn test_quality_add_is_idempotent() {
        let mut q = Qualities::default();
        q.add(Quality::Constant);
        q.add(Quality::Constant);
        let mut expected = Qualities::default();
        expected.constant = true;
        assert_eq!(q, expected);
    }

    #[test]
    fn test_validation_rules() {
        assert!(DataType::new(Type::Int).validate().is_ok());
        assert!(DataType::pointer(Type::None).validate().is_err());
        assert!(DataType::array(2, Type::Array).validate().is_err());
        assert!(DataType::array(2, Type::Struct).validate().is_err());
        assert!(DataType::array(2, Type::Ptr).validate().is_ok());
        assert!(DataType::new(Type::Bool)
            .with_qualities(&[Quality::Unsigned])
            .validate()
            .is_err());
    }
}
