//! Violation reports and the detailed reporter for inbound dispatch handlers.

use std::fmt;

use strum::Display;

use crate::{
    assembly::MethodRef,
    config::ScanConfig,
    metadata::token::Token,
    runtime::{
        ownership::{NetworkBehaviour, OwnershipContext, Role},
        sink::LogSink,
        stacktrace::{self, StackWalker},
    },
};

/// Fully qualified name of the detailed reporter as referenced from rewritten bodies
pub const REPORTER_TYPE: &str = "ownerscope.InboundViolationReporter";

/// Method name of the detailed reporter
pub const REPORTER_METHOD: &str = "Report";

/// Which side of the wire detected the violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    /// A local caller invoked a restricted method it does not own
    Outbound,
    /// The server received a restricted call from a non-owner
    Inbound,
}

/// Diagnostic emitted for a single denied call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationReport {
    /// Side of the wire the violation was detected on
    pub direction: Direction,
    /// Normalized signature of the restricted method, if known
    pub method: Option<String>,
    /// Client id of the caller
    pub caller_id: u64,
    /// Client id of the object's owner
    pub owner_id: u64,
    /// Name of the target game object
    pub object_name: String,
    /// Type of the target behaviour
    pub object_type: String,
    /// Role of the local process
    pub role: Role,
    /// Rendered and sanitized stack trace, empty if none was captured
    pub trace: String,
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.direction, &self.method) {
            (Direction::Outbound, Some(method)) => write!(
                f,
                "Non-owner called ServerRpc that requires ownership: {method}"
            )?,
            (Direction::Outbound, None) => {
                write!(f, "Non-owner called ServerRpc that requires ownership")?;
            }
            (Direction::Inbound, Some(method)) => write!(
                f,
                "Non-owner sent ServerRpc that requires ownership: {method}"
            )?,
            (Direction::Inbound, None) => {
                write!(f, "Non-owner sent ServerRpc that requires ownership")?;
            }
        }

        let verb = match self.direction {
            Direction::Outbound => "Called",
            Direction::Inbound => "Sent",
        };
        write!(
            f,
            "\n{verb} by client {}, but owner is {}",
            self.caller_id, self.owner_id
        )?;
        write!(
            f,
            "\nTarget: {} ({}), local role: {}",
            self.object_name, self.object_type, self.role
        )?;

        if !self.trace.is_empty() {
            write!(f, "\n{}", self.trace)?;
        }
        Ok(())
    }
}

/// Parameters of a received remote call as seen by a dispatch handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcCallContext {
    /// Client id of the sender
    pub sender_client_id: u64,
}

/// Report a restricted call received from a non-owner.
///
/// Called from rewritten dispatch handlers in place of the generic diagnostic; the
/// handler only reaches the call site after the networking layer decided the sender is
/// not the owner, so no verdict is evaluated here. Never fails: without a network manager
/// the role is reported as [`Role::Offline`].
pub fn report_inbound_violation(
    sink: &dyn LogSink,
    stack: &dyn StackWalker,
    config: &ScanConfig,
    target: &dyn NetworkBehaviour,
    context: &RpcCallContext,
) {
    InboundViolationReporter::new(sink, stack, config).report(target, context);
}

/// The detailed reporter bound to a sink and a stack walker.
pub struct InboundViolationReporter<'a> {
    sink: &'a dyn LogSink,
    stack: &'a dyn StackWalker,
    strip_instrumentation: bool,
    max_frames: Option<usize>,
}

impl<'a> InboundViolationReporter<'a> {
    /// Binds the reporter to `sink`, tracing through `stack` with the trace settings of
    /// `config`
    pub fn new(sink: &'a dyn LogSink, stack: &'a dyn StackWalker, config: &ScanConfig) -> Self {
        InboundViolationReporter {
            sink,
            stack,
            strip_instrumentation: config.remove_first_line_of_stack_trace,
            max_frames: config.max_trace_frames,
        }
    }

    /// Entry point invoked by rewritten handlers with (target, call parameters)
    pub fn report(&self, target: &dyn NetworkBehaviour, context: &RpcCallContext) {
        let role = OwnershipContext::capture(target)
            .map(|ownership| ownership.role)
            .unwrap_or(Role::Offline);

        let frames = self.stack.capture();
        let report = ViolationReport {
            direction: Direction::Inbound,
            method: None,
            caller_id: context.sender_client_id,
            owner_id: target.owner_client_id(),
            object_name: target.object_name(),
            object_type: target.type_name(),
            role,
            trace: stacktrace::render_limited(
                &frames,
                self.strip_instrumentation,
                self.max_frames,
            ),
        };
        self.sink.error(&report.to_string());
    }

    /// Member reference rewritten bodies call, under the `MemberRef` token the host
    /// allocated for the reporter in the patched module
    #[must_use]
    pub fn method_ref(token: Token) -> MethodRef {
        MethodRef::new_static(token, REPORTER_TYPE, REPORTER_METHOD, 2)
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

    fn handler_stack() -> CapturedStack {
        CapturedStack(vec![
            StackFrame::new("ownerscope.InboundViolationReporter", "Report"),
            StackFrame::new("Game.Door", "__rpc_handler_3127"),
            StackFrame::new("Unity.Netcode.RpcMessageHelpers", "Handle")
                .with_location("/netcode/Runtime/Messaging/RpcMessages.cs", 74),
            StackFrame::new("Unity.Netcode.NetworkBehaviour", "__endSendServerRpc"),
            StackFrame::new("Unity.Netcode.NetworkManager", "NetworkUpdate"),
        ])
    }

    struct Host;

    impl NetworkManager for Host {
        fn local_client_id(&self) -> u64 {
            0
        }
        fn is_client(&self) -> bool {
            true
        }
        fn is_host(&self) -> bool {
            true
        }
        fn is_server(&self) -> bool {
            true
        }
        fn is_listening(&self) -> bool {
            true
        }
    }

    struct Door {
        manager: Option<Host>,
    }

    impl NetworkBehaviour for Door {
        fn owner_client_id(&self) -> u64 {
            5
        }
        fn exec_stage(&self) -> RpcExecStage {
            RpcExecStage::Server
        }
        fn object_name(&self) -> String {
            "Door (2)".to_string()
        }
        fn type_name(&self) -> String {
            "Game.Door".to_string()
        }
        fn network_manager(&self) -> Option<&dyn NetworkManager> {
            self.manager.as_ref().map(|m| m as &dyn NetworkManager)
        }
    }

    #[test]
    fn test_outbound_format() {
        let report = ViolationReport {
            direction: Direction::Outbound,
            method: Some("Foo.DoThingServerRpc()".to_string()),
            caller_id: 3,
            owner_id: 5,
            object_name: "Foo".to_string(),
            object_type: "Game.Foo".to_string(),
            role: Role::Client,
            trace: "  at Game.Player.Update".to_string(),
        };

        assert_eq!(
            report.to_string(),
            "Non-owner called ServerRpc that requires ownership: Foo.DoThingServerRpc()\n\
             Called by client 3, but owner is 5\n\
             Target: Foo (Game.Foo), local role: Client\n\
             \x20 at Game.Player.Update"
        );
    }

    #[test]
    fn test_inbound_report() {
        let sink = MemorySink::new();
        let stack = handler_stack();
        let door = Door {
            manager: Some(Host),
        };
        InboundViolationReporter::new(&sink, &stack, &ScanConfig::default()).report(
            &door,
            &RpcCallContext {
                sender_client_id: 7,
            },
        );

        assert_eq!(sink.count(), 1);
        let record = &sink.at_level(Level::Error)[0].message;
        assert!(record.starts_with("Non-owner sent ServerRpc that requires ownership\n"));
        assert!(record.contains("Sent by client 7, but owner is 5"));
        assert!(record.contains("Target: Door (2) (Game.Door), local role: Host"));
        assert!(record.contains("  at Game.Door.__rpc_handler_3127"));
        assert!(record
            .contains("  at Unity.Netcode.RpcMessageHelpers.Handle in RpcMessages.cs:line 74"));
        assert!(!record.contains("InboundViolationReporter"));
        assert!(!record.contains("NetworkUpdate"));
    }

    #[test]
    fn test_inbound_report_unstripped() {
        let sink = MemorySink::new();
        let stack = handler_stack();
        let config = ScanConfig::default()
            .with_stripped_traces(false)
            .with_max_trace_frames(None);
        report_inbound_violation(
            &sink,
            &stack,
            &config,
            &Door {
                manager: Some(Host),
            },
            &RpcCallContext {
                sender_client_id: 7,
            },
        );

        let record = &sink.at_level(Level::Error)[0].message;
        assert!(record.contains("  at ownerscope.InboundViolationReporter.Report"));
        assert!(record.contains("  at Unity.Netcode.NetworkManager.NetworkUpdate"));
    }

    #[test]
    fn test_inbound_without_manager() {
        let sink = MemorySink::new();
        report_inbound_violation(
            &sink,
            &CapturedStack::default(),
            &ScanConfig::default(),
            &Door { manager: None },
            &RpcCallContext {
                sender_client_id: 1,
            },
        );
        assert!(sink.contains(Level::Error, "local role: Offline"));
    }

    #[test]
    fn test_reporter_reference() {
        let reference = InboundViolationReporter::method_ref(Token::new(0x0A00_0042));
        assert!(reference.matches("InboundViolationReporter", "Report"));
        assert_eq!(reference.param_count, 2);
    }
}
