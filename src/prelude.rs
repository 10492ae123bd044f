//! # ownerscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the ownerscope library. Import this module to wire a host up to the scanner.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all ownerscope operations
pub use crate::Error;

/// The result type used throughout ownerscope
pub use crate::Result;

/// Scan configuration
pub use crate::config::ScanConfig;

/// Module image
pub use crate::Image;

// ================================================================================================
// Discovery and Activation
// ================================================================================================

pub use crate::discovery::{
    DiscoveryEngine, InMemorySource, ModuleSource, ScanCoordinator, ScanSummary, ScanTask,
    TypeListing,
};

// ================================================================================================
// Inspection and Patching
// ================================================================================================

pub use crate::inspect::{BodyInspector, BodySource, ImageBodySource, MarkerPattern};
pub use crate::patch::{HookRegistry, Installer, PatchEngine, PatchError};

// ================================================================================================
// Metadata
// ================================================================================================

pub use crate::metadata::{
    descriptor::{
        CustomAttribute, CustomAttributeArgument, MethodDescriptor, ModuleDescriptor,
        TypeDescriptor,
    },
    method::MethodIl,
    token::Token,
};

// ================================================================================================
// Runtime
// ================================================================================================

pub use crate::runtime::{
    InboundViolationReporter, Invocation, Level, LogCrateSink, LogSink, MemorySink,
    NetworkBehaviour, NetworkManager, RpcCallContext, RpcExecStage, StackFrame, StackWalker,
};
