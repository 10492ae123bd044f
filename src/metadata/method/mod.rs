//! Method bodies: raw headers, exception handling clauses and the decoded IL form.
//!
//! [`MethodBody`] is the byte-level view of a body as stored in a module image. [`MethodIl`]
//! is the decoded, label-based view that the inspector scans and the rewriter edits. The
//! conversion between the two lives in [`crate::assembly::decoder`] and
//! [`crate::assembly::encoder`].

mod body;
mod exceptions;
mod types;

pub use body::MethodBody;
pub use exceptions::{ClauseKind, ExceptionClause, ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;

use crate::assembly::{Instruction, Label};

/// A decoded method body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodIl {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// True if locals are zero-initialised
    pub init_locals: bool,
    /// `StandAloneSig` token describing the locals, zero if there are none
    pub local_var_sig_token: u32,
    /// The instructions in execution layout order
    pub instructions: Vec<Instruction>,
    /// Labels that resolve to the position right after the last instruction
    pub end_labels: Vec<Label>,
    /// Exception handling clauses, in declaration order
    pub exception_clauses: Vec<ExceptionClause>,
}

impl MethodIl {
    /// A body with the given instructions and the defaults of a tiny header
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        MethodIl {
            max_stack: TINY_MAX_STACK,
            init_locals: false,
            local_var_sig_token: 0,
            instructions,
            end_labels: Vec::new(),
            exception_clauses: Vec::new(),
        }
    }

    /// Every label defined in this body, attached to an instruction or at the end
    pub fn defined_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.instructions
            .iter()
            .flat_map(|instr| instr.labels.iter().copied())
            .chain(self.end_labels.iter().copied())
    }
}
