//! Linker: merges object files into a flat executable image.
//!
//! Layout is address-ordered and deterministic: each object's code section
//! is placed at the running offset starting at the program-region base, its
//! data table immediately after its code, and the next object follows.
//! `@rs` reservations draw addresses from the separate reserved region.
//! Once layout fixes every symbol's address, relocations are patched in
//! place and the concatenated image is wrapped in the flat-binary header.

use std::collections::HashMap;

use tracing::debug;

use sin_core::io::{from_be_bytes, to_be_bytes};
use sin_core::object::{ObjectFile, SymbolClass};
use sin_core::{memmap, FlatBinary, Wordsize, RELOCATION_NONE};

use crate::error::LinkError;

pub struct Linker {
    objects: Vec<ObjectFile>,
    wordsize: Wordsize,
    vm_version: u8,
    program_base: u16,
    rs_base: u16,
    rs_end: u16,
}

impl Linker {
    /// Build a linker over an ordered set of objects, validating that their
    /// wordsizes and VM versions agree.
    pub fn new(objects: Vec<ObjectFile>) -> Result<Self, LinkError> {
        let first = objects.first().ok_or(LinkError::UnresolvedSymbol(
            "no object files to link".to_string(),
        ))?;

        let wordsize_bits = first.wordsize;
        let vm_version = first.vm_version;
        for object in &objects {
            if object.wordsize != wordsize_bits {
                return Err(LinkError::WordsizeMismatch);
            }
            if object.vm_version != vm_version {
                return Err(LinkError::VersionMismatch);
            }
        }

        // memory region bases are a property of the target VM version
        let (program_base, rs_base, rs_end) = match vm_version {
            1 => (memmap::PRG_BOTTOM, memmap::RS_START, memmap::RS_END),
            other => return Err(LinkError::UnsupportedVmVersion(other)),
        };

        let wordsize = Wordsize::from_bits(wordsize_bits)
            .ok_or(LinkError::Object(sin_core::ObjectError::BadWordsize(wordsize_bits)))?;

        Ok(Linker {
            objects,
            wordsize,
            vm_version,
            program_base,
            rs_base,
            rs_end,
        })
    }

    /// Lay out, resolve, and emit the final image.
    pub fn link(mut self) -> Result<FlatBinary, LinkError> {
        let code_bases = self.layout()?;
        let master = self.build_master_table()?;
        self.resolve(&code_bases, &master)?;

        let mut image: Vec<u8> = Vec::new();
        for object in &self.objects {
            image.extend_from_slice(&object.code);
            for entry in &object.data {
                image.extend_from_slice(&entry.bytes);
            }
        }

        debug!(
            objects = self.objects.len(),
            bytes = image.len(),
            vm_version = self.vm_version,
            "linked image"
        );

        Ok(FlatBinary::new(self.wordsize, image))
    }

    /// Assign every object its code base and every symbol its final
    /// address. Returns the per-object code bases.
    fn layout(&mut self) -> Result<Vec<u16>, LinkError> {
        let mut current = self.program_base;
        let mut rs_address = self.rs_base;
        let mut code_bases = Vec::with_capacity(self.objects.len());

        for object in &mut self.objects {
            object.entry = current;
            code_bases.push(current);
            let code_size = object.code.len() as u16;

            for symbol in &mut object.symbols {
                match symbol.class {
                    SymbolClass::Defined => {
                        symbol.value += current;
                    }
                    SymbolClass::Constant => {
                        // constants live in the data section, just past the code
                        let entry = object
                            .data
                            .iter()
                            .find(|d| d.name == symbol.name)
                            .ok_or_else(|| {
                                LinkError::UnresolvedSymbol(symbol.name.clone())
                            })?;
                        symbol.value = current + code_size + entry.offset;
                    }
                    SymbolClass::Reserved => {
                        if rs_address + symbol.width > self.rs_end {
                            return Err(LinkError::ReservationOverflow);
                        }
                        symbol.value = rs_address;
                        rs_address += symbol.width;
                    }
                    // macro values are final; undefined entries are
                    // resolved against the master table later
                    SymbolClass::Macro | SymbolClass::Undefined => {}
                }
            }

            current += code_size + object.data_size() as u16;
        }

        Ok(code_bases)
    }

    /// Merge every resolvable symbol into one table. A name defined by two
    /// objects is a fatal error rather than a silent first-or-last pick.
    fn build_master_table(&self) -> Result<HashMap<String, u16>, LinkError> {
        let mut master: HashMap<String, u16> = HashMap::new();
        for object in &self.objects {
            for symbol in &object.symbols {
                match symbol.class {
                    SymbolClass::Defined
                    | SymbolClass::Constant
                    | SymbolClass::Reserved
                    | SymbolClass::Macro => {
                        if master.insert(symbol.name.clone(), symbol.value).is_some() {
                            return Err(LinkError::DuplicateDefinition(symbol.name.clone()));
                        }
                    }
                    SymbolClass::Undefined => {}
                }
            }
        }
        Ok(master)
    }

    /// Patch every relocation site with its final value.
    fn resolve(
        &mut self,
        code_bases: &[u16],
        master: &HashMap<String, u16>,
    ) -> Result<(), LinkError> {
        let width = self.wordsize.bytes();

        for (object, &base) in self.objects.iter_mut().zip(code_bases) {
            for relocation in &object.relocations {
                let site = relocation.address as usize;
                if relocation.name == RELOCATION_NONE {
                    // the assembler emitted a program-relative address
                    // verbatim; rebase it
                    let stored = from_be_bytes(&object.code[site..site + width]);
                    let rebased = stored + base as u64;
                    object.code[site..site + width].copy_from_slice(&to_be_bytes(rebased, width));
                } else {
                    let value = *master
                        .get(&relocation.name)
                        .ok_or_else(|| LinkError::UnresolvedSymbol(relocation.name.clone()))?;
                    object.code[site..site + width]
                        .copy_from_slice(&to_be_bytes(value as u64, width));
                }
            }
        }
        Ok(())
    }
}
