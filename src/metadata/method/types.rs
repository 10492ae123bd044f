//! Method body header and data-section flags (ECMA-335 II.25.4).

use bitflags::bitflags;

bitflags! {
    /// Flags in the first bytes of a method body header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header: one byte, code size in the upper six bits
        const TINY_FORMAT = 0x2;
        /// Fat header: twelve bytes, may carry extra sections
        const FAT_FORMAT = 0x3;
        /// Extra data sections follow the code
        const MORE_SECTS = 0x8;
        /// Locals are zero-initialised on entry
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags in the first byte of an extra method data section
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Section holds exception handling clauses
        const EHTABLE = 0x1;
        /// Reserved, never set by current compilers
        const OPT_ILTABLE = 0x2;
        /// Section uses the fat (24-byte clause) layout
        const FAT_FORMAT = 0x40;
        /// Another section follows this one
        const MORE_SECTS = 0x80;
    }
}

/// Largest code size a tiny header can describe
pub const TINY_CODE_SIZE_MAX: usize = 0x3F;

/// Evaluation stack depth implied by a tiny header
pub const TINY_MAX_STACK: u16 = 8;

/// Size of a fat header in 4-byte units, as stored in its upper four bits
pub const FAT_HEADER_DWORDS: u16 = 3;
