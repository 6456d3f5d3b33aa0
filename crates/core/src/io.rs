//! Big-endian binary I/O helpers for the toolchain's file formats.
//!
//! Multi-byte values are written most-significant byte first. Strings are
//! length-prefixed with a 2-byte length, so the longest representable
//! string is 2^16 - 1 bytes.

use std::io::{self, Read, Write};

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u8<W: Write>(w: &mut W, val: u8) -> io::Result<()> {
    w.write_all(&[val])
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn write_u16<W: Write>(w: &mut W, val: u16) -> io::Result<()> {
    w.write_all(&val.to_be_bytes())
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub fn write_u32<W: Write>(w: &mut W, val: u32) -> io::Result<()> {
    w.write_all(&val.to_be_bytes())
}

pub fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let len = read_u16(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    if s.len() > u16::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string too long for length prefix: {} bytes", s.len()),
        ));
    }
    write_u16(w, s.len() as u16)?;
    w.write_all(s.as_bytes())
}

/// Split `value` into `width` big-endian bytes, most significant first.
pub fn to_be_bytes(value: u64, width: usize) -> Vec<u8> {
    (0..width).rev().map(|i| (value >> (i * 8)) as u8).collect()
}

/// Reassemble a big-endian value from `bytes`.
pub fn from_be_bytes(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_u16_round_trip() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0x2600).unwrap();
        assert_eq!(buf, [0x26, 0x00]);
        assert_eq!(read_u16(&mut Cursor::new(buf)).unwrap(), 0x2600);
    }

    #[test]
    fn test_string_round_trip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "__builtins_memcpy").unwrap();
        assert_eq!(&buf[..2], &[0x00, 17]);
        let back = read_string(&mut Cursor::new(buf)).unwrap();
        assert_eq!(back, "__builtins_memcpy");
    }

    #[test]
    fn test_be_byte_splitting() {
        assert_eq!(to_be_bytes(0x2A, 2), vec![0x00, 0x2A]);
        assert_eq!(to_be_bytes(0x1234, 2), vec![0x12, 0x34]);
        assert_eq!(from_be_bytes(&[0x12, 0x34]), 0x1234);
        assert_eq!(from_be_bytes(&to_be_bytes(0xDEADBEEF, 4)), 0xDEADBEEF);
    }
}
