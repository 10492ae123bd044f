//! Access to on-disk module images.
//!
//! The body inspector never trusts the live, possibly JIT-optimised representation of a
//! method. Instead it re-reads the method body from the module image that was loaded from
//! disk. This module provides the byte-level access layer for that: a [`Backend`] trait with
//! a memory-mapped implementation for files and an owned-buffer implementation for tests and
//! images that were already read into memory, unified behind [`Image`].
//!
//! # Key Components
//!
//! - [`Image`] - A loaded module image, backed by a file mapping or an owned buffer
//! - [`Backend`] - Trait for the data source behind an [`Image`]
//! - [`parser::Parser`] - Cursor-based reader used by the IL and heap decoders
//! - [`io`] - Little-endian primitive reading and writing
//!
//! # Examples
//!
//! ```rust,no_run
//! use ownerscope::Image;
//!
//! let image = Image::from_file("Managed/Assembly-CSharp.dll".as_ref())?;
//! let header = image.data_slice(0, 2)?;
//! assert_eq!(header, b"MZ");
//! # Ok::<(), ownerscope::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use memory::Memory;
use physical::Physical;

use crate::{Error::OutOfBounds, Result};

/// Data source for an [`Image`].
///
/// Implementations must be `Send + Sync` because images are shared with the background
/// scan thread.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let data = self.data();
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if offset_end > data.len() {
            return Err(OutOfBounds);
        }

        Ok(&data[offset..offset_end])
    }

    /// The complete data of this backend
    fn data(&self) -> &[u8];

    /// Length of the data in bytes
    fn len(&self) -> usize {
        self.data().len()
    }
}

/// A module image, either mapped from disk or held in memory.
pub struct Image {
    data: Box<dyn Backend>,
}

impl Image {
    /// Map a module image from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped, and
    /// [`crate::Error::Empty`] for empty files.
    pub fn from_file(path: &Path) -> Result<Image> {
        Ok(Image {
            data: Box::new(Physical::new(path)?),
        })
    }

    /// Wrap an image that already lives in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<Image> {
        if data.is_empty() {
            return Err(crate::Error::Empty);
        }

        Ok(Image {
            data: Box::new(Memory::new(data)),
        })
    }

    /// Size of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the image holds no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The complete image data
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Returns everything from `offset` to the end of the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` lies past the end.
    pub fn data_from(&self, offset: usize) -> Result<&[u8]> {
        let data = self.data.data();
        if offset > data.len() {
            return Err(OutOfBounds);
        }

        Ok(&data[offset..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_image() {
        let image = Image::from_mem(vec![0x4D, 0x5A, 0x90, 0x00]).unwrap();
        assert_eq!(image.len(), 4);
        assert_eq!(image.data_slice(0, 2).unwrap(), b"MZ");
        assert_eq!(image.data_from(3).unwrap(), &[0x00]);
        assert!(image.data_from(5).is_err());
        assert!(image.data_slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_empty_image() {
        assert!(matches!(Image::from_mem(Vec::new()), Err(crate::Error::Empty)));
    }

    #[test]
    fn test_file_image() {
        let path = std::env::temp_dir().join("ownerscope_file_image.bin");
        std::fs::write(&path, [0x2A, 0x00, 0x2A]).unwrap();

        let image = Image::from_file(&path).unwrap();
        assert_eq!(image.data(), &[0x2A, 0x00, 0x2A]);

        std::fs::remove_file(&path).ok();
    }
}
