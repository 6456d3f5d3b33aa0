//! The .sml flat executable image: `wordsize (1B) | totalSize (4B) | bytes`.

use std::io::{self, Read, Write};

use crate::io::{read_u32, read_u8, write_u32, write_u8};
use crate::Wordsize;

/// A linked, loadable program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBinary {
    pub wordsize: u8,
    pub bytes: Vec<u8>,
}

impl FlatBinary {
    pub fn new(wordsize: Wordsize, bytes: Vec<u8>) -> Self {
        FlatBinary {
            wordsize: wordsize.bits(),
            bytes,
        }
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let wordsize = read_u8(r)?;
        if Wordsize::from_bits(wordsize).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid wordsize {} in binary header", wordsize),
            ));
        }
        let total = read_u32(r)? as usize;
        let mut bytes = vec![0u8; total];
        r.read_exact(&mut bytes)?;
        Ok(FlatBinary { wordsize, bytes })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u8(w, self.wordsize)?;
        write_u32(w, self.bytes.len() as u32)?;
        w.write_all(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_flat_binary_round_trip() {
        let bin = FlatBinary::new(Wordsize::W16, vec![0xFA, 0x03, 0x00, 0xFF, 0xFF]);
        let mut buf = Vec::new();
        bin.write(&mut buf).unwrap();
        assert_eq!(buf[0], 16);
        assert_eq!(&buf[1..5], &[0, 0, 0, 5]);
        let back = FlatBinary::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, bin);
    }

    #[test]
    fn test_bad_wordsize_rejected() {
        let buf = vec![7u8, 0, 0, 0, 0];
        assert!(FlatBinary::read(&mut Cursor::new(buf)).is_err());
    }
}
