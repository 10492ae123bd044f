use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, RwLock},
};

use crate::{
    assembly::encode_method,
    inspect::BodySource,
    metadata::{descriptor::MethodDescriptor, method::MethodIl},
    patch::{BodyRewriteFn, PatchEngine, PatchError, PrefixFn},
    runtime::{Invocation, LogSink},
    Error, Result,
};

/// A body patch that was accepted by the registry
#[derive(Debug, Clone)]
pub struct PatchedBody {
    /// The decoded body after rewriting
    pub il: MethodIl,
    /// The re-encoded body, header included
    pub bytes: Vec<u8>,
}

/// In-memory patching engine.
///
/// Keeps installed prefixes and rewritten bodies keyed by normalized signature and
/// dispatches calls through [`HookRegistry::invoke`]. Rewrites always start from the
/// original body, so installing the same rewrite twice yields the same result.
///
/// # Thread Safety
///
/// All maps are behind `RwLock`s; installation happens on the scan thread while
/// [`HookRegistry::invoke`] runs on whichever thread makes the call.
pub struct HookRegistry {
    owner: String,
    sink: Arc<dyn LogSink>,
    bodies: Option<Arc<dyn BodySource>>,
    originals: RwLock<HashMap<String, MethodIl>>,
    foreign: RwLock<HashMap<String, String>>,
    prefixes: RwLock<HashMap<String, PrefixFn>>,
    patched: RwLock<HashMap<String, PatchedBody>>,
}

impl HookRegistry {
    /// Creates an empty registry installing patches as `owner`
    pub fn new(owner: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        HookRegistry {
            owner: owner.into(),
            sink,
            bodies: None,
            originals: RwLock::new(HashMap::new()),
            foreign: RwLock::new(HashMap::new()),
            prefixes: RwLock::new(HashMap::new()),
            patched: RwLock::new(HashMap::new()),
        }
    }

    /// Reads original bodies from `source` when none was registered explicitly
    #[must_use]
    pub fn with_body_source(mut self, source: Arc<dyn BodySource>) -> Self {
        self.bodies = Some(source);
        self
    }

    /// Owner id patches are installed under
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Registers the original body of `method`.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the registry lock is poisoned.
    pub fn register_body(&self, method: &MethodDescriptor, il: MethodIl) -> Result<()> {
        self.originals
            .write()
            .map_err(|e| Error::LockError(format!("originals write lock: {e}")))?
            .insert(method.signature(), il);
        Ok(())
    }

    /// Records that `method` was already patched by another owner.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the registry lock is poisoned.
    pub fn mark_foreign(&self, method: &MethodDescriptor, owner: impl Into<String>) -> Result<()> {
        self.foreign
            .write()
            .map_err(|e| Error::LockError(format!("foreign write lock: {e}")))?
            .insert(method.signature(), owner.into());
        Ok(())
    }

    /// True if a prefix is installed on `method`
    #[must_use]
    pub fn has_prefix(&self, method: &MethodDescriptor) -> bool {
        self.prefixes
            .read()
            .is_ok_and(|prefixes| prefixes.contains_key(&method.signature()))
    }

    /// Number of installed prefixes
    #[must_use]
    pub fn prefix_count(&self) -> usize {
        self.prefixes.read().map_or(0, |prefixes| prefixes.len())
    }

    /// Number of rewritten bodies
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.patched.read().map_or(0, |patched| patched.len())
    }

    /// The rewritten body of `method`, if one was installed.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the registry lock is poisoned.
    pub fn patched_body(&self, method: &MethodDescriptor) -> Result<Option<PatchedBody>> {
        Ok(self
            .patched
            .read()
            .map_err(|e| Error::LockError(format!("patched read lock: {e}")))?
            .get(&method.signature())
            .cloned())
    }

    /// Dispatch a call to `invocation.method`.
    ///
    /// Runs the installed prefix, if any, then `original`. A panicking prefix is logged
    /// and the call proceeds; the prefix can never prevent the original from running.
    pub fn invoke<R>(&self, invocation: &Invocation<'_>, original: impl FnOnce() -> R) -> R {
        let signature = invocation.method.signature();
        let prefix = self
            .prefixes
            .read()
            .ok()
            .and_then(|prefixes| prefixes.get(&signature).cloned());

        if let Some(prefix) = prefix {
            if catch_unwind(AssertUnwindSafe(|| prefix(invocation))).is_err() {
                self.sink
                    .error(&format!("Prefix installed on {signature} panicked"));
            }
        }

        original()
    }

    fn check_owner(&self, signature: &str) -> Result<()> {
        let foreign = self
            .foreign
            .read()
            .map_err(|e| Error::LockError(format!("foreign read lock: {e}")))?;

        match foreign.get(signature) {
            Some(owner) if *owner != self.owner => Err(Error::Patch(PatchError::AlreadyPatched(
                signature.to_string(),
                owner.clone(),
            ))),
            _ => Ok(()),
        }
    }

    fn original_body(&self, method: &MethodDescriptor, signature: &str) -> Result<MethodIl> {
        let registered = self
            .originals
            .read()
            .map_err(|e| Error::LockError(format!("originals read lock: {e}")))?
            .get(signature)
            .cloned();
        if let Some(il) = registered {
            return Ok(il);
        }

        let from_source = match &self.bodies {
            Some(source) => source.read_body(method)?,
            None => None,
        };

        from_source.ok_or_else(|| {
            Error::Patch(PatchError::Incompatible(
                signature.to_string(),
                "no method body available".to_string(),
            ))
        })
    }
}

impl PatchEngine for HookRegistry {
    fn install_prefix(&self, method: &MethodDescriptor, prefix: PrefixFn) -> Result<()> {
        let signature = method.signature();
        self.check_owner(&signature)?;

        self.prefixes
            .write()
            .map_err(|e| Error::LockError(format!("prefixes write lock: {e}")))?
            .insert(signature, prefix);
        Ok(())
    }

    fn install_body_patch(&self, method: &MethodDescriptor, rewrite: BodyRewriteFn) -> Result<()> {
        let signature = method.signature();
        self.check_owner(&signature)?;

        let il = rewrite(self.original_body(method, &signature)?)?;
        let bytes = encode_method(&il)
            .map_err(|e| Error::Patch(PatchError::Rewrite(signature.clone(), e.to_string())))?;

        self.patched
            .write()
            .map_err(|e| Error::LockError(format!("patched write lock: {e}")))?
            .insert(signature, PatchedBody { il, bytes });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        assembly::{opcodes, Instruction},
        runtime::{CapturedStack, MemorySink},
    };

    fn registry() -> (Arc<MemorySink>, HookRegistry) {
        let sink = Arc::new(MemorySink::new());
        (sink.clone(), HookRegistry::new("ownerscope", sink))
    }

    fn method() -> MethodDescriptor {
        MethodDescriptor::new("Game", "Foo", "DoThingServerRpc")
    }

    #[test]
    fn test_prefix_runs_before_original() {
        let (_, registry) = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry
            .install_prefix(
                &method(),
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        let method = method();
        let stack = CapturedStack::default();
        let invocation = Invocation {
            method: &method,
            instance: None,
            stack: &stack,
        };
        let result = registry.invoke(&invocation, || calls.load(Ordering::SeqCst) * 10);

        assert_eq!(result, 10);
        assert!(registry.has_prefix(&method));
        assert_eq!(registry.prefix_count(), 1);
    }

    #[test]
    fn test_panicking_prefix_is_contained() {
        let (sink, registry) = registry();
        registry
            .install_prefix(&method(), Arc::new(|_| panic!("guard failure")))
            .unwrap();

        let method = method();
        let stack = CapturedStack::default();
        let invocation = Invocation {
            method: &method,
            instance: None,
            stack: &stack,
        };
        assert_eq!(registry.invoke(&invocation, || 42), 42);
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_foreign_owner_is_rejected() {
        let (_, registry) = registry();
        registry.mark_foreign(&method(), "OtherPlugin").unwrap();

        let result = registry.install_prefix(&method(), Arc::new(|_| {}));
        assert!(matches!(
            result,
            Err(Error::Patch(PatchError::AlreadyPatched(_, owner))) if owner == "OtherPlugin"
        ));

        registry.mark_foreign(&method(), "ownerscope").unwrap();
        assert!(registry.install_prefix(&method(), Arc::new(|_| {})).is_ok());
    }

    #[test]
    fn test_body_patch_starts_from_original() {
        let (_, registry) = registry();
        let original = MethodIl::new(vec![Instruction::simple(opcodes::RET)]);
        registry.register_body(&method(), original).unwrap();

        let prepend_nop: BodyRewriteFn = Arc::new(|mut il| {
            il.instructions.insert(0, Instruction::nop());
            Ok(il)
        });

        registry
            .install_body_patch(&method(), prepend_nop.clone())
            .unwrap();
        registry.install_body_patch(&method(), prepend_nop).unwrap();

        let patched = registry.patched_body(&method()).unwrap().unwrap();
        assert_eq!(patched.il.instructions.len(), 2);
        assert_eq!(patched.bytes, vec![(2 << 2) | 0x2, opcodes::NOP, opcodes::RET]);
        assert_eq!(registry.body_count(), 1);
    }

    #[test]
    fn test_body_patch_without_body() {
        let (_, registry) = registry();
        let result = registry.install_body_patch(&method(), Arc::new(|il: MethodIl| Ok(il)));
        assert!(matches!(
            result,
            Err(Error::Patch(PatchError::Incompatible(..)))
        ));
    }

    #[test]
    fn test_rewrite_errors_propagate() {
        let (_, registry) = registry();
        registry
            .register_body(&method(), MethodIl::new(vec![Instruction::simple(opcodes::RET)]))
            .unwrap();

        let result = registry.install_body_patch(
            &method(),
            Arc::new(|_| Err(Error::BodyShapeMismatch("no marker".to_string()))),
        );
        assert!(matches!(result, Err(Error::BodyShapeMismatch(_))));
        assert!(registry.patched_body(&method()).unwrap().is_none());
    }
}
