//! Bounds-checked little-endian reading and writing of primitive values.
//!
//! Method bodies, exception-handling sections and instruction operands are all stored
//! in little-endian byte order. The helpers in this module are the only place where raw
//! slices are turned into numbers, so every caller gets the same bounds checking and the
//! same [`crate::Error::OutOfBounds`] failure mode.
//!
//! # Key Components
//!
//! - [`CilIO`] - Conversion trait implemented for the primitive integer and float types
//! - [`read_le`] / [`read_le_at`] - Read a value from the start of a slice, or at a cursor
//! - [`write_le_at`] - Overwrite a value at a cursor inside an existing buffer
//! - [`push_le`] - Append a value to a growing buffer
//!
//! # Examples
//!
//! ```rust,ignore
//! use ownerscope::file::io::{read_le_at, push_le};
//!
//! let mut buffer = Vec::new();
//! push_le::<u16>(&mut buffer, 0x1234);
//! push_le::<u32>(&mut buffer, 7);
//!
//! let mut cursor = 0;
//! assert_eq!(read_le_at::<u16>(&buffer, &mut cursor)?, 0x1234);
//! assert_eq!(read_le_at::<u32>(&buffer, &mut cursor)?, 7);
//! # Ok::<(), ownerscope::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Type-specific conversion between primitive values and their little-endian bytes.
pub trait CilIO: Sized + Copy {
    /// Fixed-size byte array backing this type (e.g. `[u8; 4]` for `u32`)
    type Bytes: AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cilio {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cilio!(
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
);

/// Reads a little-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a little-endian value at `offset` and advances the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Overwrites the bytes at `offset` with the little-endian encoding of `value`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit inside `data`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;

    Ok(())
}

/// Appends the little-endian encoding of `value` to `buffer`.
pub fn push_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}
