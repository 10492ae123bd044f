use std::sync::Arc;

use crate::{
    assembly::MethodRef,
    config::ScanConfig,
    discovery::{CandidateRole, ScanPass},
    inspect::{rewrite_marker_call, BodySource},
    metadata::{descriptor::MethodDescriptor, method::MethodIl},
    patch::{BodyRewriteFn, PatchEngine, PrefixFn},
    runtime::{LogSink, ServerRpcGuard},
    Error, Result,
};

/// Installs the two kinds of interception through a [`PatchEngine`].
///
/// Both installation paths are idempotent within a [`ScanPass`]: a signature the pass has
/// already seen is not installed again.
pub struct Installer {
    engine: Arc<dyn PatchEngine>,
    bodies: Arc<dyn BodySource>,
    sink: Arc<dyn LogSink>,
    config: ScanConfig,
    reporter: MethodRef,
}

impl Installer {
    /// Creates an installer.
    ///
    /// # Arguments
    /// * `engine` - Patching engine of the host
    /// * `bodies` - Source of original bodies for the rewrite pre-check
    /// * `sink` - Destination of guard reports and installer diagnostics
    /// * `config` - Trace settings for guards and the marker pattern for rewrites
    /// * `reporter` - Member reference rewritten bodies call in place of the diagnostic
    pub fn new(
        engine: Arc<dyn PatchEngine>,
        bodies: Arc<dyn BodySource>,
        sink: Arc<dyn LogSink>,
        config: ScanConfig,
        reporter: MethodRef,
    ) -> Self {
        Installer {
            engine,
            bodies,
            sink,
            config,
            reporter,
        }
    }

    /// Install a [`ServerRpcGuard`] in front of `method`.
    ///
    /// Returns `false` if the pass already handled the method.
    ///
    /// # Errors
    /// Returns the engine's error if it refuses the installation.
    pub fn install_pre_call_guard(
        &self,
        pass: &mut ScanPass,
        method: &MethodDescriptor,
    ) -> Result<bool> {
        let signature = method.signature();
        if pass.contains(&signature) {
            return Ok(false);
        }

        let guard = ServerRpcGuard::new(method, self.sink.clone(), &self.config);
        let prefix: PrefixFn = Arc::new(move |invocation| {
            guard.check(invocation);
        });
        self.engine.install_prefix(method, prefix)?;

        pass.record(signature, CandidateRole::OutboundCall);
        Ok(true)
    }

    /// Redirect the marker call site of a dispatch handler to the detailed reporter.
    ///
    /// The rewrite is tried on the on-disk body first; if the exact two-instruction marker
    /// is not there, a warning is logged and the method is left untouched. The checked
    /// result is handed to the engine unless it rewrites a different original. Returns
    /// `true` if the rewrite was installed.
    ///
    /// # Errors
    /// Returns [`Error::MethodNotFound`] if no body is available, a decode or stack error
    /// from the pre-check, or the engine's error if it refuses the installation.
    pub fn install_body_rewrite(
        &self,
        pass: &mut ScanPass,
        method: &MethodDescriptor,
    ) -> Result<bool> {
        let signature = method.signature();
        if pass.contains(&signature) {
            return Ok(false);
        }

        let Some(il) = self.bodies.read_body(method)? else {
            return Err(Error::MethodNotFound(signature));
        };

        let checked = il.clone();
        let rewritten =
            match rewrite_marker_call(il, &self.config.marker, &self.reporter, &signature) {
                Ok(rewritten) => rewritten,
                Err(Error::BodyShapeMismatch(reason)) => {
                    self.sink.warning(&format!(
                        "Ownership marker not found in {signature}, leaving it unpatched: {reason}"
                    ));
                    return Ok(false);
                }
                Err(error) => return Err(error),
            };

        // the engine may hold a different original than the one read from disk
        let pattern = self.config.marker.clone();
        let reporter = self.reporter.clone();
        let target = signature.clone();
        let rewrite: BodyRewriteFn = Arc::new(move |original: MethodIl| {
            if original == checked {
                Ok(rewritten.clone())
            } else {
                rewrite_marker_call(original, &pattern, &reporter, &target)
            }
        });
        self.engine.install_body_patch(method, rewrite)?;

        pass.record(signature, CandidateRole::InboundDispatch);
        Ok(true)
    }
}
