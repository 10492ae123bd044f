//! Call-time side of the interception: ownership checks, stack traces and reports.
//!
//! Everything here runs on the thread of the intercepted call, synchronously and without
//! locking. Ownership state is read from the live [`NetworkBehaviour`] on every call and
//! never cached.
//!
//! # Key Components
//!
//! - [`ServerRpcGuard`] - Pre-call guard installed on outbound remote methods
//! - [`OwnershipContext`] / [`authorized`] - The ownership rule
//! - [`stacktrace`] - Frame rendering and removal of interception frames
//! - [`report_inbound_violation`] - Detailed reporter called from rewritten handlers
//! - [`LogSink`] - Destination of every diagnostic

mod guard;
pub mod ownership;
pub mod report;
pub mod sink;
pub mod stacktrace;

pub use guard::{Invocation, ServerRpcGuard};
pub use ownership::{
    authorized, NetworkBehaviour, NetworkManager, OwnershipContext, Role, RpcExecStage, Verdict,
};
pub use report::{
    report_inbound_violation, Direction, InboundViolationReporter, RpcCallContext,
    ViolationReport,
};
pub use sink::{Level, LogCrateSink, LogRecord, LogSink, MemorySink};
pub use stacktrace::{CapturedStack, StackFrame, StackWalker};
