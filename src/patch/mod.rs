//! Installation of interceptions through the host's patching engine.
//!
//! Two kinds of interception exist. Outbound remote methods get a pre-call guard that
//! evaluates ownership before the original body runs. Inbound dispatch handlers get a
//! body rewrite that redirects the generic ownership diagnostic to the detailed reporter.
//!
//! # Key Components
//!
//! - [`PatchEngine`] - The host's interception engine
//! - [`HookRegistry`] - In-memory [`PatchEngine`] that dispatches calls itself
//! - [`Installer`] - Builds guards and rewrites and hands them to the engine
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use ownerscope::{
//!     metadata::descriptor::MethodDescriptor,
//!     patch::{HookRegistry, PatchEngine},
//!     runtime::MemorySink,
//! };
//!
//! let registry = HookRegistry::new("ownerscope", Arc::new(MemorySink::new()));
//! let method = MethodDescriptor::new("Assembly-CSharp", "Foo", "DoThingServerRpc");
//! registry.install_prefix(&method, Arc::new(|_| {}))?;
//! assert!(registry.has_prefix(&method));
//! # Ok::<(), ownerscope::Error>(())
//! ```

mod engine;
mod installer;
mod registry;

pub use engine::{BodyRewriteFn, PatchEngine, PatchError, PrefixFn};
pub use installer::Installer;
pub use registry::{HookRegistry, PatchedBody};
