use std::fmt;
use std::hash::{Hash, Hasher};

/// A metadata token as it appears in CIL instruction operands.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table (or heap) the token points into
/// - The low 24 bits (bits 0-23) indicate the row index, or the heap offset for user strings
///
/// Only the handful of tables that the call-site scanner cares about get named constants;
/// everything else is carried through untouched.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Table id of `MethodDef` tokens
    pub const METHOD_DEF: u8 = 0x06;
    /// Table id of `MemberRef` tokens
    pub const MEMBER_REF: u8 = 0x0A;
    /// Table id of `MethodSpec` tokens
    pub const METHOD_SPEC: u8 = 0x2B;
    /// Pseudo-table id of `#US` heap references used by `ldstr`
    pub const USER_STRING: u8 = 0x70;

    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table id and a row (or heap offset)
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if this token references a method (`MethodDef`, `MemberRef` or `MethodSpec`)
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(
            self.table(),
            Self::METHOD_DEF | Self::MEMBER_REF | Self::METHOD_SPEC
        )
    }

    /// Returns true if this token references the `#US` heap
    #[must_use]
    pub fn is_user_string(&self) -> bool {
        self.table() == Self::USER_STRING
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
