//! User String Heap (`#US`)
//!
//! `ldstr` operands are tokens of the form `0x70xxxxxx` whose low 24 bits are an offset into
//! the `#US` heap. Each entry is a compressed length, followed by that many bytes of UTF-16LE
//! text and a trailing flag byte (the length includes the flag byte).
//!
//! # Reference
//! - [ECMA-335 II.24.2.4](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

use widestring::U16Str;

/// Helper to access the data within the `#US` heap of a module image.
///
/// # Examples
///
/// ```rust,ignore
/// use ownerscope::metadata::streams::UserStrings;
/// let data = &[0u8, 0x03, 0x41, 0x00, 0x00];
/// let us = UserStrings::from(data).unwrap();
/// assert_eq!(us.get(1).unwrap(), "A");
/// ```
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Create a `UserStrings` object from a sequence of bytes
    ///
    /// # Arguments
    /// * 'data' - The heap bytes; the first byte is always the empty entry
    ///
    /// # Errors
    /// Returns an error if the heap is empty or does not start with the empty entry
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(OutOfBounds);
        }

        Ok(UserStrings { data })
    }

    /// Decode the string stored at `index`.
    ///
    /// ## Arguments
    /// * 'index' - The heap offset, i.e. the row part of an `ldstr` token
    ///
    /// # Errors
    /// Returns an error if the index is out of bounds, or the entry is not valid UTF-16
    pub fn get(&self, index: usize) -> Result<String> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let length = parser.read_compressed_uint()? as usize;
        if length == 0 {
            return Ok(String::new());
        }

        // The trailing flag byte is not part of the text
        let text = parser.read_bytes(length)?;
        let text = &text[..length - 1];
        if text.len() % 2 != 0 {
            return Err(malformed_error!(
                "Invalid string data length at index - {}",
                index
            ));
        }

        let units = text
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<u16>>();

        U16Str::from_slice(&units)
            .to_string()
            .map_err(|_| malformed_error!("Invalid string from index - {}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crafted() {
        #[rustfmt::skip]
        let data: [u8; 29] = [
            0x00, 0x1b, 0x48, 0x00, 0x65, 0x00, 0x6c, 0x00, 0x6c, 0x00, 0x6f, 0x00, 0x2c, 0x00, 0x20, 0x00,
            0x57, 0x00, 0x6f, 0x00, 0x72, 0x00, 0x6c, 0x00, 0x64, 0x00, 0x21, 0x00, 0x00,
        ];

        let us_str = UserStrings::from(&data).unwrap();

        assert_eq!(us_str.get(1).unwrap(), "Hello, World!");
        assert_eq!(us_str.get(0).unwrap(), "");
    }

    #[test]
    fn test_invalid() {
        let data_empty = [];
        assert!(UserStrings::from(&data_empty).is_err());

        let data_invalid_first = [0x22, 0x03, 0x41, 0x00, 0x00];
        assert!(UserStrings::from(&data_invalid_first).is_err());

        // Declared length runs past the heap
        let data_truncated = [0x00, 0xCC, 0x41, 0x00];
        let us_str = UserStrings::from(&data_truncated).unwrap();
        assert!(us_str.get(1).is_err());
        assert!(us_str.get(10).is_err());

        // Odd number of text bytes
        let data_odd = [0x00, 0x02, 0x41, 0x00];
        let us_str = UserStrings::from(&data_odd).unwrap();
        assert!(us_str.get(1).is_err());

        // Unpaired surrogate
        let data_surrogate = [0x00, 0x03, 0x00, 0xD8, 0x00];
        let us_str = UserStrings::from(&data_surrogate).unwrap();
        assert!(us_str.get(1).is_err());
    }
}
