use std::sync::Arc;

use crate::{
    config::ScanConfig,
    metadata::descriptor::MethodDescriptor,
    runtime::{
        ownership::{NetworkBehaviour, OwnershipContext, Verdict},
        report::{Direction, ViolationReport},
        sink::LogSink,
        stacktrace::{self, StackWalker},
    },
    Error, Result,
};

/// One intercepted call, as handed to a pre-call guard by the patching engine.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    /// The method being called
    pub method: &'a MethodDescriptor,
    /// The object the method is called on, `None` for static methods
    pub instance: Option<&'a dyn NetworkBehaviour>,
    /// Captures the caller's stack on demand
    pub stack: &'a dyn StackWalker,
}

/// Pre-call guard for a single outbound remote method.
///
/// The guard observes and reports; it never alters or blocks the call. Any failure while
/// evaluating ownership or building the report is logged and swallowed so the
/// intercepted call always proceeds.
pub struct ServerRpcGuard {
    signature: String,
    sink: Arc<dyn LogSink>,
    strip_instrumentation: bool,
    max_frames: Option<usize>,
}

impl ServerRpcGuard {
    /// Builds the guard for `method`
    pub fn new(method: &MethodDescriptor, sink: Arc<dyn LogSink>, config: &ScanConfig) -> Self {
        ServerRpcGuard {
            signature: method.signature(),
            sink,
            strip_instrumentation: config.remove_first_line_of_stack_trace,
            max_frames: config.max_trace_frames,
        }
    }

    /// Normalized signature of the guarded method
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Evaluate the ownership rule for `invocation` and report a denial.
    ///
    /// Returns the verdict, or `None` if it could not be evaluated.
    pub fn check(&self, invocation: &Invocation<'_>) -> Option<Verdict> {
        match self.evaluate(invocation) {
            Ok(verdict) => Some(verdict),
            Err(error) => {
                self.sink.error(&format!(
                    "Error in ServerRpc guard for {}: {error}",
                    self.signature
                ));
                None
            }
        }
    }

    fn evaluate(&self, invocation: &Invocation<'_>) -> Result<Verdict> {
        let Some(instance) = invocation.instance else {
            return Err(Error::Error(format!(
                "{} invoked without an instance",
                self.signature
            )));
        };

        let context = OwnershipContext::capture(instance)?;
        let verdict = context.verdict();
        if verdict.is_denied() {
            let frames = invocation.stack.capture();
            let report = ViolationReport {
                direction: Direction::Outbound,
                method: Some(self.signature.clone()),
                caller_id: context.local_id,
                owner_id: context.owner_id,
                object_name: instance.object_name(),
                object_type: instance.type_name(),
                role: context.role,
                trace: stacktrace::render_limited(
                    &frames,
                    self.strip_instrumentation,
                    self.max_frames,
                ),
            };
            self.sink.error(&report.to_string());
        }

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        ownership::{NetworkManager, RpcExecStage},
        sink::{Level, MemorySink},
        stacktrace::{CapturedStack, StackFrame},
    };

    struct Client {
        local: u64,
    }

    impl NetworkManager for Client {
        fn local_client_id(&self) -> u64 {
            self.local
        }
        fn is_client(&self) -> bool {
            true
        }
        fn is_host(&self) -> bool {
            false
        }
        fn is_server(&self) -> bool {
            false
        }
        fn is_listening(&self) -> bool {
            true
        }
    }

    struct Foo {
        owner: u64,
        manager: Option<Client>,
    }

    impl NetworkBehaviour for Foo {
        fn owner_client_id(&self) -> u64 {
            self.owner
        }
        fn exec_stage(&self) -> RpcExecStage {
            RpcExecStage::None
        }
        fn object_name(&self) -> String {
            "Foo".to_string()
        }
        fn type_name(&self) -> String {
            "Game.Foo".to_string()
        }
        fn network_manager(&self) -> Option<&dyn NetworkManager> {
            self.manager.as_ref().map(|m| m as &dyn NetworkManager)
        }
    }

    fn stack() -> CapturedStack {
        CapturedStack(vec![
            StackFrame::new("ownerscope::runtime::guard::ServerRpcGuard", "check"),
            StackFrame::new("Game.Foo", "DoThingServerRpc"),
            StackFrame::new("Game.Foo", "Interact").with_location("Assets/Foo.cs", 12),
            StackFrame::new("Game.Player", "Update"),
            StackFrame::new("UnityEngine.PlayerLoop", "Run"),
        ])
    }

    fn setup() -> (Arc<MemorySink>, ServerRpcGuard, MethodDescriptor) {
        let sink = Arc::new(MemorySink::new());
        let method = MethodDescriptor::new("Game", "Foo", "DoThingServerRpc");
        let guard = ServerRpcGuard::new(&method, sink.clone(), &ScanConfig::default());
        (sink, guard, method)
    }

    #[test]
    fn test_reports_denied_call() {
        let (sink, guard, method) = setup();
        let foo = Foo {
            owner: 5,
            manager: Some(Client { local: 3 }),
        };
        let stack = stack();

        let verdict = guard.check(&Invocation {
            method: &method,
            instance: Some(&foo),
            stack: &stack,
        });

        assert_eq!(verdict, Some(Verdict::Denied));
        assert_eq!(sink.count(), 1);
        let message = &sink.at_level(Level::Error)[0].message;
        assert!(message.contains("Foo.DoThingServerRpc()"));
        assert!(message.contains("Called by client 3, but owner is 5"));
        assert!(message.contains("  at Game.Foo.Interact in Foo.cs:line 12"));
        assert!(!message.contains("ServerRpcGuard"));
        assert!(!message.contains("PlayerLoop"));
    }

    #[test]
    fn test_owner_is_silent() {
        let (sink, guard, method) = setup();
        let foo = Foo {
            owner: 3,
            manager: Some(Client { local: 3 }),
        };
        let stack = stack();

        let verdict = guard.check(&Invocation {
            method: &method,
            instance: Some(&foo),
            stack: &stack,
        });
        assert_eq!(verdict, Some(Verdict::Authorized));
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_failures_are_logged() {
        let (sink, guard, method) = setup();
        let foo = Foo {
            owner: 5,
            manager: None,
        };
        let stack = stack();

        assert!(guard
            .check(&Invocation {
                method: &method,
                instance: Some(&foo),
                stack: &stack,
            })
            .is_none());
        assert!(guard
            .check(&Invocation {
                method: &method,
                instance: None,
                stack: &stack,
            })
            .is_none());

        assert_eq!(sink.count_level(Level::Error), 2);
        assert!(sink.contains(
            Level::Error,
            "Error in ServerRpc guard for Foo.DoThingServerRpc(): No network manager attached to Foo"
        ));
    }
}
