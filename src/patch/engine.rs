use std::sync::Arc;

use thiserror::Error;

use crate::{
    metadata::{descriptor::MethodDescriptor, method::MethodIl},
    runtime::Invocation,
    Result,
};

/// Reasons a patching engine refuses an installation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// Another owner already patched the method.
    #[error("{0} is already patched by {1}")]
    AlreadyPatched(String, String),

    /// The method cannot carry the requested patch (abstract, extern, no body).
    #[error("{0} cannot be patched - {1}")]
    Incompatible(String, String),

    /// The runtime refused write access to the method.
    #[error("Access to {0} was denied")]
    AccessDenied(String),

    /// The rewritten body was rejected.
    #[error("Rewritten body of {0} was rejected - {1}")]
    Rewrite(String, String),
}

/// Guard invoked before the original body of an intercepted method
pub type PrefixFn = Arc<dyn Fn(&Invocation<'_>) + Send + Sync>;

/// Transform applied to the original body of a method
pub type BodyRewriteFn = Arc<dyn Fn(MethodIl) -> Result<MethodIl> + Send + Sync>;

/// The method-interception engine of the host runtime.
///
/// Installations stay in effect for the lifetime of the process. Installing a second
/// patch of the same kind on the same method replaces the first.
pub trait PatchEngine: Send + Sync {
    /// Install `prefix` to run before every call to `method`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Patch`] if the engine refuses the installation.
    fn install_prefix(&self, method: &MethodDescriptor, prefix: PrefixFn) -> Result<()>;

    /// Replace the body of `method` by the result of `rewrite` applied to its original
    /// body.
    ///
    /// # Errors
    /// Returns [`crate::Error::Patch`] if the engine refuses the installation, or the
    /// error of `rewrite` if the transform fails.
    fn install_body_patch(&self, method: &MethodDescriptor, rewrite: BodyRewriteFn)
        -> Result<()>;
}
