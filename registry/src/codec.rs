//! Byte-level encode/decode helpers for persisted records.
//!
//! Persisted integers are big-endian, matching the wire framing. Strings
//! are u16-length-prefixed UTF-8.

use crate::error::{RegistryError, Result};

/// Sequential reader over a byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(RegistryError::Corrupted(format!(
                "unexpected end of record: need {n} bytes, have {}",
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| RegistryError::Corrupted(format!("invalid utf8 string: {e}")))
    }

    pub fn read_strings(&mut self) -> Result<Vec<String>> {
        let count = self.read_u16()? as usize;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_string()?);
        }
        Ok(out)
    }
}

pub fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// Write a u16-length-prefixed UTF-8 string. Strings longer than
/// `u16::MAX` bytes are rejected.
pub fn write_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len: u16 = s
        .len()
        .try_into()
        .map_err(|_| RegistryError::InvalidRecord(format!("string too long: {} bytes", s.len())))?;
    write_u16(out, len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn write_strings(out: &mut Vec<u8>, strings: &[String]) -> Result<()> {
    let count: u16 = strings
        .len()
        .try_into()
        .map_err(|_| RegistryError::InvalidRecord("too many strings".into()))?;
    write_u16(out, count);
    for s in strings {
        write_string(out, s)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_list_roundtrip() {
        let strings = vec!["a:4000".to_string(), "b:4001".to_string(), String::new()];
        let mut buf = Vec::new();
        write_strings(&mut buf, &strings).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(reader.read_strings().unwrap(), strings);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_record_rejected() {
        let mut buf = Vec::new();
        write_string(&mut buf, "host:4000").unwrap();
        buf.truncate(buf.len() - 1);

        let mut reader = Reader::new(&buf);
        assert!(reader.read_string().is_err());
    }

    #[test]
    fn test_integers_big_endian() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0x0102);
        write_u32(&mut buf, 0x0304_0506);
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }
}
