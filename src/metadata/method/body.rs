//! Method body header parsing (ECMA-335 II.25.4).
//!
//! A method body starts with either a one-byte tiny header or a twelve-byte fat header,
//! followed by the IL code. Fat bodies may carry extra data sections after the code,
//! aligned to four bytes, which hold the exception handling clauses in either the small
//! (12-byte) or the fat (24-byte) clause layout.

use crate::{
    file::io::{read_le, read_le_at},
    metadata::method::{
        ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags, TINY_MAX_STACK,
    },
    Error::OutOfBounds,
    Result,
};

/// The raw header of a method body and its exception handling clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Size of the IL code in bytes
    pub size_code: usize,
    /// Size of the header in bytes (1 for tiny, usually 12 for fat)
    pub size_header: usize,
    /// `StandAloneSig` token describing the locals, zero if there are none
    pub local_var_sig_token: u32,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// True if the body uses a fat header
    pub is_fat: bool,
    /// True if locals are zero-initialised
    pub is_init_local: bool,
    /// True if at least one exception handling clause was found
    pub is_exception_data: bool,
    /// The raw exception handling clauses, in declaration order
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Parse a method body header from the bytes starting at the body.
    ///
    /// `data` may extend past the end of the body; only the header, the code range and
    /// the extra sections are read.
    ///
    /// # Errors
    /// Returns an error if the data is empty, truncated, or the header is neither tiny
    /// nor fat.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_00000011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: 0,
                    max_stack: TINY_MAX_STACK,
                    is_fat: false,
                    is_init_local: false,
                    is_exception_data: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;

                let size_header = ((first_duo >> 12) * 4) as usize;
                if size_header < 12 {
                    return Err(malformed_error!(
                        "Fat method header is too small - {}",
                        size_header
                    ));
                }

                let size_code = read_le::<u32>(&data[4..])? as usize;
                let Some(size_body) = size_header.checked_add(size_code) else {
                    return Err(OutOfBounds);
                };
                if data.len() < size_body {
                    return Err(OutOfBounds);
                }

                let local_var_sig_token = read_le::<u32>(&data[8..])?;
                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000111111111111_u16);
                let max_stack = read_le::<u16>(&data[2..])?;

                let is_init_local = flags_header.contains(MethodBodyFlags::INIT_LOCALS);

                let exception_handlers = if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    Self::read_sections(data, (size_body + 3) & !3)?
                } else {
                    Vec::new()
                };

                Ok(MethodBody {
                    size_code,
                    size_header,
                    local_var_sig_token,
                    max_stack,
                    is_fat: true,
                    is_init_local,
                    is_exception_data: !exception_handlers.is_empty(),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// The extra sections can currently only contain exception handling data (II.25.4.6)
    fn read_sections(data: &[u8], mut cursor: usize) -> Result<Vec<ExceptionHandler>> {
        let mut exception_handlers = Vec::new();

        while data.len() > (cursor + 4) {
            let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(&data[cursor..])?);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                break;
            }

            if section_flags.contains(SectionFlags::FAT_FORMAT) {
                let section_size = read_le::<u32>(&data[cursor + 1..])? as usize & 0x00FF_FFFF;
                if section_size < 4 || data.len() < (cursor + section_size) {
                    break;
                }

                let mut clause = cursor + 4;
                for _ in 0..(section_size - 4) / 24 {
                    // Only the low 16 bits carry defined flags
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = read_le_at::<u32>(data, &mut clause)? as u16;
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                        try_offset: read_le_at::<u32>(data, &mut clause)?,
                        try_length: read_le_at::<u32>(data, &mut clause)?,
                        handler_offset: read_le_at::<u32>(data, &mut clause)?,
                        handler_length: read_le_at::<u32>(data, &mut clause)?,
                        filter_offset: read_le_at::<u32>(data, &mut clause)?,
                    });
                }

                cursor += section_size;
            } else {
                let section_size = read_le::<u8>(&data[cursor + 1..])? as usize;
                if section_size < 4 || data.len() < (cursor + section_size) {
                    break;
                }

                let mut clause = cursor + 4;
                for _ in 0..(section_size - 4) / 12 {
                    exception_handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                            data,
                            &mut clause,
                        )?),
                        try_offset: u32::from(read_le_at::<u16>(data, &mut clause)?),
                        try_length: u32::from(read_le_at::<u8>(data, &mut clause)?),
                        handler_offset: u32::from(read_le_at::<u16>(data, &mut clause)?),
                        handler_length: u32::from(read_le_at::<u8>(data, &mut clause)?),
                        filter_offset: read_le_at::<u32>(data, &mut clause)?,
                    });
                }

                cursor += section_size;
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
            cursor = (cursor + 3) & !3;
        }

        Ok(exception_handlers)
    }

    /// Size of header and code combined
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }

    /// The IL code of this body inside `data`, which must be the slice it was parsed from.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the body.
    pub fn code<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        data.get(self.size_header..self.size()).ok_or(OutOfBounds)
    }
}
