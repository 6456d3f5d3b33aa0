//! The .sinc relocatable object format, version 2.
//!
//! Wire layout:
//!
//! ```text
//! magic       4 bytes   "sinC"
//! wordsize    1 byte    {16, 32, 64}
//! endian      2 bytes   (reserved)
//! fileVer     1 byte    = 2
//! vmVer       1 byte
//! entry       2 bytes   (base address for the code section)
//! codeSize    4 bytes
//! symTabLen   4 bytes
//!   per entry: value (2B), class (1B), name (length-prefixed)
//!              (a Reserved entry's value slot carries its byte width;
//!              its address is meaningless until link time)
//! relTabLen   4 bytes
//!   per entry: address (2B), name (length-prefixed)
//! codeBytes   codeSize bytes
//! dataLen     4 bytes
//!   per entry: byteCount (2B), name (length-prefixed), bytes
//! ```

use std::fmt;
use std::io::{self, Read, Write};

use tracing::debug;

use crate::io::{
    read_string, read_u16, read_u32, read_u8, write_string, write_u16, write_u32, write_u8,
};
use crate::Wordsize;

pub const MAGIC: &[u8; 4] = b"sinC";
pub const FILE_VERSION: u8 = 2;

/// Classification of a symbol-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolClass {
    /// Referenced here, defined in another object.
    Undefined,
    /// A label defined in this object's code section.
    Defined,
    /// A `@db` constant living in this object's data section.
    Constant,
    /// A `@rs` reservation; its address is assigned at link time.
    Reserved,
    /// A `name = value` macro; its value is final.
    Macro,
}

impl SymbolClass {
    pub fn code(self) -> u8 {
        match self {
            SymbolClass::Undefined => 1,
            SymbolClass::Defined => 2,
            SymbolClass::Constant => 3,
            SymbolClass::Reserved => 4,
            SymbolClass::Macro => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SymbolClass::Undefined),
            2 => Some(SymbolClass::Defined),
            3 => Some(SymbolClass::Constant),
            4 => Some(SymbolClass::Reserved),
            5 => Some(SymbolClass::Macro),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SymbolClass::Undefined => "U",
            SymbolClass::Defined => "D",
            SymbolClass::Constant => "C",
            SymbolClass::Reserved => "R",
            SymbolClass::Macro => "M",
        };
        write!(f, "{}", s)
    }
}

/// One symbol-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSymbol {
    pub name: String,
    pub value: u16,
    /// Width in bytes; one word for labels, the reserved size for `@rs`.
    pub width: u16,
    pub class: SymbolClass,
}

impl ObjectSymbol {
    pub fn new(name: impl Into<String>, value: u16, width: u16, class: SymbolClass) -> Self {
        ObjectSymbol {
            name: name.into(),
            value,
            width,
            class,
        }
    }
}

/// One relocation-table entry: the operand word at `address` must be
/// patched with the final value of `name` (or rebased, for the `_NONE`
/// sentinel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub name: String,
    pub address: u16,
}

impl Relocation {
    pub fn new(name: impl Into<String>, address: u16) -> Self {
        Relocation {
            name: name.into(),
            address,
        }
    }
}

/// One data-table entry: named bytes placed after the code section, at
/// `offset` bytes from the end of the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub name: String,
    pub offset: u16,
    pub bytes: Vec<u8>,
}

/// A relocatable translation unit.
#[derive(Debug, Clone, Default)]
pub struct ObjectFile {
    pub wordsize: u8,
    pub vm_version: u8,
    pub entry: u16,
    pub code: Vec<u8>,
    pub symbols: Vec<ObjectSymbol>,
    pub relocations: Vec<Relocation>,
    pub data: Vec<DataEntry>,
}

/// Errors reading or writing a .sinc file.
#[derive(Debug)]
pub enum ObjectError {
    Io(io::Error),
    BadMagic([u8; 4]),
    UnsupportedFileVersion(u8),
    BadWordsize(u8),
    BadSymbolClass(u8),
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectError::Io(e) => write!(f, "object file i/o error: {}", e),
            ObjectError::BadMagic(m) => {
                write!(f, "invalid magic number in file header: {:02X?}", m)
            }
            ObjectError::UnsupportedFileVersion(v) => {
                write!(f, "unsupported object file version {}", v)
            }
            ObjectError::BadWordsize(w) => write!(f, "invalid wordsize {} in object file", w),
            ObjectError::BadSymbolClass(c) => {
                write!(f, "bad number {} in symbol class specifier", c)
            }
        }
    }
}

impl std::error::Error for ObjectError {}

impl From<io::Error> for ObjectError {
    fn from(e: io::Error) -> Self {
        ObjectError::Io(e)
    }
}

impl ObjectFile {
    /// Total byte size of the data section.
    pub fn data_size(&self) -> usize {
        self.data.iter().map(|d| d.bytes.len()).sum()
    }

    /// Deserialize from a reader.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, ObjectError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ObjectError::BadMagic(magic));
        }

        let wordsize = read_u8(r)?;
        if Wordsize::from_bits(wordsize).is_none() {
            return Err(ObjectError::BadWordsize(wordsize));
        }
        let _endian = read_u16(r)?; // reserved
        let file_version = read_u8(r)?;
        if file_version != FILE_VERSION {
            return Err(ObjectError::UnsupportedFileVersion(file_version));
        }
        let vm_version = read_u8(r)?;
        let entry = read_u16(r)?;
        let code_size = read_u32(r)? as usize;

        let sym_count = read_u32(r)? as usize;
        let mut symbols = Vec::with_capacity(sym_count);
        for _ in 0..sym_count {
            let stored = read_u16(r)?;
            let class_code = read_u8(r)?;
            let class = SymbolClass::from_code(class_code)
                .ok_or(ObjectError::BadSymbolClass(class_code))?;
            let name = read_string(r)?;
            // reserved regions park their width where other classes keep
            // their value
            let (value, width) = if class == SymbolClass::Reserved {
                (0, stored)
            } else {
                (stored, (wordsize / 8) as u16)
            };
            symbols.push(ObjectSymbol {
                name,
                value,
                width,
                class,
            });
        }

        let rel_count = read_u32(r)? as usize;
        let mut relocations = Vec::with_capacity(rel_count);
        for _ in 0..rel_count {
            let address = read_u16(r)?;
            let name = read_string(r)?;
            relocations.push(Relocation { name, address });
        }

        let mut code = vec![0u8; code_size];
        r.read_exact(&mut code)?;

        let data_count = read_u32(r)? as usize;
        let mut data = Vec::with_capacity(data_count);
        let mut offset = 0u16;
        for _ in 0..data_count {
            let byte_count = read_u16(r)? as usize;
            let name = read_string(r)?;
            let mut bytes = vec![0u8; byte_count];
            r.read_exact(&mut bytes)?;
            data.push(DataEntry {
                name,
                offset,
                bytes,
            });
            offset += byte_count as u16;
        }

        debug!(
            code = code.len(),
            symbols = symbols.len(),
            relocations = relocations.len(),
            data_entries = data.len(),
            "loaded object file"
        );

        Ok(ObjectFile {
            wordsize,
            vm_version,
            entry,
            code,
            symbols,
            relocations,
            data,
        })
    }

    /// Serialize to a writer.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), ObjectError> {
        w.write_all(MAGIC)?;
        write_u8(w, self.wordsize)?;
        write_u16(w, 0)?; // endianness, reserved
        write_u8(w, FILE_VERSION)?;
        write_u8(w, self.vm_version)?;
        write_u16(w, self.entry)?;
        write_u32(w, self.code.len() as u32)?;

        write_u32(w, self.symbols.len() as u32)?;
        for sym in &self.symbols {
            let stored = if sym.class == SymbolClass::Reserved {
                sym.width
            } else {
                sym.value
            };
            write_u16(w, stored)?;
            write_u8(w, sym.class.code())?;
            write_string(w, &sym.name)?;
        }

        write_u32(w, self.relocations.len() as u32)?;
        for rel in &self.relocations {
            write_u16(w, rel.address)?;
            write_string(w, &rel.name)?;
        }

        w.write_all(&self.code)?;

        write_u32(w, self.data.len() as u32)?;
        for entry in &self.data {
            write_u16(w, entry.bytes.len() as u16)?;
            write_string(w, &entry.name)?;
            w.write_all(&entry.bytes)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> ObjectFile {
        ObjectFile {
            wordsize: 16,
            vm_version: 1,
            entry: 0,
            code: vec![0x10, 0x03, 0x00, 0x2A, 0xFF],
            symbols: vec![
                ObjectSymbol::new("main", 0, 2, SymbolClass::Defined),
                ObjectSymbol::new("x", 0, 2, SymbolClass::Reserved),
                ObjectSymbol::new("greeting", 0, 2, SymbolClass::Constant),
                ObjectSymbol::new("external_fn", 0, 2, SymbolClass::Undefined),
            ],
            relocations: vec![Relocation::new("x", 2)],
            data: vec![DataEntry {
                name: "greeting".to_string(),
                offset: 0,
                bytes: b"hi".to_vec(),
            }],
        }
    }

    #[test]
    fn test_object_round_trip() {
        let obj = sample();
        let mut buf = Vec::new();
        obj.write(&mut buf).unwrap();
        assert_eq!(&buf[..4], MAGIC);

        let back = ObjectFile::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.wordsize, 16);
        assert_eq!(back.vm_version, 1);
        assert_eq!(back.code, obj.code);
        assert_eq!(back.symbols, obj.symbols);
        assert_eq!(back.relocations, obj.relocations);
        assert_eq!(back.data, obj.data);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        sample().write(&mut buf).unwrap();
        buf[0] = b'x';
        let err = ObjectFile::read(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ObjectError::BadMagic(_)));
    }

    #[test]
    fn test_bad_symbol_class_rejected() {
        let mut obj = sample();
        obj.data.clear();
        obj.relocations.clear();
        let mut buf = Vec::new();
        obj.write(&mut buf).unwrap();
        // first symbol's class byte sits after header (15B) + symtab len (4B) + value (2B)
        buf[21] = 9;
        let err = ObjectFile::read(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, ObjectError::BadSymbolClass(9)));
    }

    #[test]
    fn test_reserved_width_survives_serialization() {
        let mut obj = sample();
        obj.symbols = vec![ObjectSymbol::new("buffer", 0, 64, SymbolClass::Reserved)];
        obj.relocations.clear();
        obj.data.clear();
        let mut buf = Vec::new();
        obj.write(&mut buf).unwrap();
        let back = ObjectFile::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.symbols[0].width, 64);
        assert_eq!(back.symbols[0].value, 0);
    }

    #[test]
    fn test_data_offsets_assigned_in_order() {
        let mut obj = sample();
        obj.data.push(DataEntry {
            name: "second".to_string(),
            offset: 0, // reader recomputes
            bytes: vec![1, 2, 3],
        });
        let mut buf = Vec::new();
        obj.write(&mut buf).unwrap();
        let back = ObjectFile::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back.data[0].offset, 0);
        assert_eq!(back.data[1].offset, 2);
    }
}
