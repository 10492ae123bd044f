//! Memory-mapped file backend.

use super::Backend;
use crate::{
    Error::{Empty, Error, FileError},
    Result,
};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A read-only mapping of a module image on disk
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path`
    ///
    /// # Errors
    /// Returns an error if the file can not be opened or mapped, or if it is empty
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) => return Err(FileError(error)),
        };

        // Zero-length mappings are rejected on some platforms
        if file.metadata()?.len() == 0 {
            return Err(Empty);
        }

        let mmap = match unsafe { Mmap::map(&file) } {
            Ok(mmap) => mmap,
            Err(error) => return Err(Error(error.to_string())),
        };

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_file_path() {
        let result = Physical::new("/nonexistent/path/to/module.dll");
        match result {
            Err(FileError(io_error)) => {
                assert_eq!(io_error.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected FileError"),
        }
    }

    #[test]
    fn test_empty_file() {
        let path = std::env::temp_dir().join("ownerscope_empty_image.bin");
        std::fs::write(&path, b"").unwrap();

        assert!(matches!(Physical::new(&path), Err(Empty)));

        std::fs::remove_file(&path).ok();
    }
}
