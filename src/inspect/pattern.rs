//! The call-site pattern that marks the ownership check of an inbound dispatch handler.
//!
//! Generated dispatch handlers reject calls from non-owners by loading a fixed literal
//! and passing it to a generic logging call:
//!
//! ```text
//! ldstr  "Only the owner can invoke a ServerRpc that requires ownership!"
//! call   void UnityEngine.Debug::LogError(object)
//! ```
//!
//! [`find_window`] looks for that pair with some slack between the two instructions, which
//! is enough to confirm a candidate. The rewriter only touches the exact adjacent form.

use crate::assembly::Instruction;

/// Literal loaded by the generated ownership check
pub const OWNERSHIP_MARKER: &str = "Only the owner can invoke a ServerRpc that requires ownership!";

/// Declaring type of the generic diagnostic call
pub const MARKER_CALL_TYPE: &str = "Debug";

/// Name of the generic diagnostic call
pub const MARKER_CALL_NAME: &str = "LogError";

/// Instructions searched after the literal load for the diagnostic call
pub const DEFAULT_LOOKAHEAD: usize = 3;

/// A literal load followed by a call to a named method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPattern {
    /// Literal text loaded by `ldstr`
    pub literal: String,
    /// Declaring type of the call, simple or namespace-qualified
    pub call_type: String,
    /// Name of the called method
    pub call_name: String,
    /// Maximum number of instructions between the load and the call, inclusive of the call
    pub lookahead: usize,
}

impl Default for MarkerPattern {
    fn default() -> Self {
        MarkerPattern {
            literal: OWNERSHIP_MARKER.to_string(),
            call_type: MARKER_CALL_TYPE.to_string(),
            call_name: MARKER_CALL_NAME.to_string(),
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

impl MarkerPattern {
    /// Creates a pattern with the default lookahead
    pub fn new(
        literal: impl Into<String>,
        call_type: impl Into<String>,
        call_name: impl Into<String>,
    ) -> Self {
        MarkerPattern {
            literal: literal.into(),
            call_type: call_type.into(),
            call_name: call_name.into(),
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }

    /// Sets the lookahead window
    #[must_use]
    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// True if `instruction` loads the marker literal
    #[must_use]
    pub fn is_marker_load(&self, instruction: &Instruction) -> bool {
        instruction.string_literal() == Some(self.literal.as_str())
    }

    /// True if `instruction` is a `call` or `callvirt` of the diagnostic method
    #[must_use]
    pub fn is_marker_call(&self, instruction: &Instruction) -> bool {
        instruction
            .call_target()
            .is_some_and(|target| target.matches(&self.call_type, &self.call_name))
    }

    /// True if the instructions contain the marker within the lookahead window
    #[must_use]
    pub fn matches(&self, instructions: &[Instruction]) -> bool {
        find_window(instructions, self).is_some()
    }
}

/// Location of a marker inside an instruction sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerSite {
    /// Index of the literal load
    pub load: usize,
    /// Index of the diagnostic call
    pub call: usize,
}

impl MarkerSite {
    /// True if the call immediately follows the load
    #[must_use]
    pub fn is_adjacent(&self) -> bool {
        self.call == self.load + 1
    }
}

/// Find the first marker literal load followed, within the lookahead window, by the
/// diagnostic call.
#[must_use]
pub fn find_window(instructions: &[Instruction], pattern: &MarkerPattern) -> Option<MarkerSite> {
    instructions
        .iter()
        .enumerate()
        .filter(|(_, instruction)| pattern.is_marker_load(instruction))
        .find_map(|(load, _)| {
            instructions
                .iter()
                .enumerate()
                .skip(load + 1)
                .take(pattern.lookahead)
                .find(|(_, instruction)| pattern.is_marker_call(instruction))
                .map(|(call, _)| MarkerSite { load, call })
        })
}

/// Find the first marker whose call immediately follows the literal load.
#[must_use]
pub fn find_adjacent(instructions: &[Instruction], pattern: &MarkerPattern) -> Option<MarkerSite> {
    instructions
        .windows(2)
        .position(|pair| pattern.is_marker_load(&pair[0]) && pattern.is_marker_call(&pair[1]))
        .map(|load| MarkerSite {
            load,
            call: load + 1,
        })
}
