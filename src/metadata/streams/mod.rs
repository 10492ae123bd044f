//! Metadata heaps needed to resolve instruction operands.
//!
//! Only the `#US` heap is parsed here: it holds the string literals loaded by `ldstr`, which
//! is what the marker scanner compares against. Identifier strings and signatures are
//! resolved by the host's reflection layer and reach this crate already decoded.

mod userstrings;

pub use userstrings::UserStrings;
