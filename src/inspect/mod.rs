//! Static inspection and rewriting of method bodies.
//!
//! Inbound dispatch handlers are recognised by name and parameter shape, but only those
//! that actually contain the generated ownership diagnostic are worth patching. The
//! [`BodyInspector`] confirms that by re-reading the handler's body from the module image
//! and scanning it for the [`MarkerPattern`]. The [`rewrite`] module then performs the
//! surgery on confirmed handlers.
//!
//! # Key Components
//!
//! - [`BodyInspector`] - Decides whether a method body contains the marker call site
//! - [`BodySource`] - Collaborator that re-reads bodies from disk
//! - [`ImageBodySource`] - [`BodySource`] over a mapped module image
//! - [`pattern`] - The marker pattern and its search functions
//! - [`rewrite`] - Splicing, nop-filling and the marker call redirect

mod image;
pub mod pattern;
pub mod rewrite;

pub use image::ImageBodySource;
pub use pattern::{find_window, MarkerPattern, MarkerSite};
pub use rewrite::{nop_fill, rewrite_marker_call, splice};

use crate::{
    metadata::{descriptor::MethodDescriptor, method::MethodIl},
    Result,
};

/// Re-reads method bodies from the module image a method was loaded from.
pub trait BodySource: Send + Sync {
    /// Decode the body of `method`.
    ///
    /// Returns `Ok(None)` if the image has no body for the method (abstract, extern, or
    /// simply unknown).
    ///
    /// # Errors
    /// Returns an error if the image cannot be read or the body cannot be decoded.
    fn read_body(&self, method: &MethodDescriptor) -> Result<Option<MethodIl>>;
}

/// Decides whether a method body contains the marker call site.
#[derive(Debug, Clone, Default)]
pub struct BodyInspector {
    pattern: MarkerPattern,
}

impl BodyInspector {
    /// Creates an inspector for `pattern`
    #[must_use]
    pub fn new(pattern: MarkerPattern) -> Self {
        BodyInspector { pattern }
    }

    /// The pattern this inspector looks for
    #[must_use]
    pub fn pattern(&self) -> &MarkerPattern {
        &self.pattern
    }

    /// True if the on-disk body of `method` contains the marker.
    ///
    /// Never fails: an unreadable image, a missing body or an undecodable body all count
    /// as "no marker".
    #[must_use]
    pub fn contains_marker(&self, source: &dyn BodySource, method: &MethodDescriptor) -> bool {
        match source.read_body(method) {
            Ok(Some(il)) => self.pattern.matches(&il.instructions),
            Ok(None) | Err(_) => false,
        }
    }
}
