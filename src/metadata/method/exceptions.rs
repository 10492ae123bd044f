//! Exception handling clauses of a method body.
//!
//! Two representations exist. [`ExceptionHandler`] is the raw clause as stored in the
//! body's extra data section, with byte offsets into the code. [`ExceptionClause`] is the
//! decoded form used by the rewriter: every boundary is a [`Label`] attached to an
//! instruction, so inserting instructions never invalidates a protected region.

use bitflags::bitflags;

use crate::{assembly::Label, metadata::token::Token};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause; the last clause field is the caught type token
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause; the last clause field is the filter offset
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception)
        const FAULT = 0x0004;
    }
}

/// A raw exception handling clause.
///
/// # References
/// - ECMA-335 6th Edition, Partition II, Section 25.4.6 - Exception Handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of try block from start of the code.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Location of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Caught type token for typed clauses, filter offset for filter clauses, else zero.
    pub filter_offset: u32,
}

/// What a decoded clause does when control leaves its protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    /// Catches exceptions of the given type
    Catch(Token),
    /// Runs the filter starting at the label to decide whether to catch
    Filter(Label),
    /// Always runs
    Finally,
    /// Runs only when an exception escapes
    Fault,
}

impl ClauseKind {
    /// Raw clause flags for this kind
    #[must_use]
    pub fn flags(&self) -> ExceptionHandlerFlags {
        match self {
            ClauseKind::Catch(_) => ExceptionHandlerFlags::EXCEPTION,
            ClauseKind::Filter(_) => ExceptionHandlerFlags::FILTER,
            ClauseKind::Finally => ExceptionHandlerFlags::FINALLY,
            ClauseKind::Fault => ExceptionHandlerFlags::FAULT,
        }
    }
}

/// An exception handling clause whose boundaries are labels.
///
/// `try_end` and `handler_end` are exclusive: they name the first instruction after the
/// region, or an end label of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Kind of the clause
    pub kind: ClauseKind,
    /// First instruction of the protected region
    pub try_start: Label,
    /// First instruction after the protected region
    pub try_end: Label,
    /// First instruction of the handler
    pub handler_start: Label,
    /// First instruction after the handler
    pub handler_end: Label,
}

impl ExceptionClause {
    /// All labels this clause refers to
    #[must_use]
    pub fn labels(&self) -> Vec<Label> {
        let mut labels = vec![
            self.try_start,
            self.try_end,
            self.handler_start,
            self.handler_end,
        ];
        if let ClauseKind::Filter(filter) = self.kind {
            labels.push(filter);
        }

        labels
    }
}
