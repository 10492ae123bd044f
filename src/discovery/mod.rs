//! Runtime discovery of interception candidates.
//!
//! When a network session starts, the [`ScanCoordinator`] runs one [`DiscoveryEngine`]
//! pass on a background thread. The pass walks every loaded module through the host's
//! [`ModuleSource`], classifies methods by name, parameter shape and attributes, and hands
//! the candidates to the [`crate::patch::Installer`].
//!
//! # Key Components
//!
//! - [`DiscoveryEngine`] - One scan pass over a snapshot of the loaded modules
//! - [`ScanPass`] / [`ScanSummary`] - Per-pass seen-set and counters
//! - [`ModuleSource`] - The host's reflection facility, [`InMemorySource`] for fixed data
//! - [`ScanTask`] / [`ScanCoordinator`] - Background execution and session trigger
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use ownerscope::{
//!     config::ScanConfig,
//!     discovery::{DiscoveryEngine, InMemorySource},
//!     inspect::ImageBodySource,
//!     metadata::{
//!         descriptor::{CustomAttribute, MethodDescriptor, TypeDescriptor},
//!         token::Token,
//!     },
//!     patch::HookRegistry,
//!     runtime::{InboundViolationReporter, MemorySink},
//!     Image,
//! };
//!
//! let source = InMemorySource::new().with_method(
//!     TypeDescriptor::new("Assembly-CSharp", "", "Foo"),
//!     MethodDescriptor::new("Assembly-CSharp", "Foo", "DoThingServerRpc"),
//!     [CustomAttribute::new("ServerRpcAttribute")],
//! );
//! let sink = Arc::new(MemorySink::new());
//! let bodies = Arc::new(ImageBodySource::new(Image::from_mem(vec![0x2A])?));
//!
//! let engine = DiscoveryEngine::new(
//!     Arc::new(source),
//!     bodies,
//!     Arc::new(HookRegistry::new("ownerscope", sink.clone())),
//!     sink.clone(),
//!     ScanConfig::default(),
//!     InboundViolationReporter::method_ref(Token::new(0x0A00_0001)),
//! );
//!
//! let summary = engine.scan();
//! assert_eq!(summary.outbound, 1);
//! # Ok::<(), ownerscope::Error>(())
//! ```

mod engine;
mod pass;
mod source;
mod task;

pub use engine::{
    DiscoveryEngine, INBOUND_PREFIX, INBOUND_SHAPE, OUTBOUND_SUFFIX, REQUIRE_OWNERSHIP,
    RPC_ATTRIBUTE,
};
pub use pass::{CandidateRole, MethodCandidate, ScanPass, ScanSummary};
pub use source::{InMemorySource, ModuleSource, TypeListing};
pub use task::{ScanCoordinator, ScanTask, SCAN_THREAD_NAME};
