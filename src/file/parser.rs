//! Cursor-based byte stream parser for CIL bytecode and heap blobs.
//!
//! [`Parser`] wraps a byte slice and a position. Every read is bounds-checked and advances
//! the cursor, which keeps the instruction decoder and the `#US` heap reader free of manual
//! offset arithmetic.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ownerscope::file::parser::Parser;
//!
//! let code = [0x72, 0x01, 0x00, 0x00, 0x70]; // ldstr 0x70000001
//! let mut parser = Parser::new(&code);
//! assert_eq!(parser.read_le::<u8>()?, 0x72);
//! assert_eq!(parser.read_le::<u32>()?, 0x7000_0001);
//! assert!(!parser.has_more_data());
//! # Ok::<(), ownerscope::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked reader over a borrowed byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true while the cursor has not reached the end of the data
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Number of bytes left after the cursor
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move the cursor to an absolute position.
    ///
    /// Seeking to exactly `len()` is allowed and leaves the parser exhausted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }

        self.position = pos;
        Ok(())
    }

    /// Peek at the next byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the parser is exhausted.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Read a little-endian value and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Read `length` raw bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self.position.checked_add(length).ok_or(OutOfBounds)?;
        if end > self.data.len() {
            return Err(OutOfBounds);
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read an ECMA-335 compressed unsigned integer (II.23.2).
    ///
    /// # Errors
    /// Returns an error if the data is exhausted or the leading byte is not a valid
    /// 1, 2 or 4 byte encoding.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_movement() {
        let data = [0x00, 0x2A, 0x01, 0x02];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.len(), 4);
        assert_eq!(parser.peek_byte().unwrap(), 0x00);
        assert_eq!(parser.read_le::<u16>().unwrap(), 0x2A00);
        assert_eq!(parser.pos(), 2);
        assert_eq!(parser.remaining(), 2);
        assert_eq!(parser.read_bytes(2).unwrap(), &[0x01, 0x02]);
        assert!(!parser.has_more_data());
        assert!(parser.peek_byte().is_err());

        parser.seek(4).unwrap();
        assert!(parser.seek(5).is_err());
    }

    #[test]
    fn test_compressed_uint() {
        let cases: [(&[u8], u32); 4] = [
            (&[0x03], 0x03),
            (&[0x7F], 0x7F),
            (&[0x80, 0x80], 0x80),
            (&[0xC0, 0x00, 0x40, 0x00], 0x4000),
        ];

        for (bytes, expected) in cases {
            let mut parser = Parser::new(bytes);
            assert_eq!(parser.read_compressed_uint().unwrap(), expected);
        }

        let mut invalid = Parser::new(&[0xFF]);
        assert!(invalid.read_compressed_uint().is_err());
    }
}
