// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # ownerscope
//!
//! Detection and detailed reporting of unauthorized ownership-restricted remote procedure
//! calls in a running .NET multiplayer game.
//!
//! The networking layer only allows the owner of a networked object to invoke some of its
//! remote methods. When a non-owner tries anyway, the game logs a single generic line that
//! names neither the method, the caller nor the object. `ownerscope` scans the loaded
//! modules once a network session starts, intercepts every ownership-restricted remote
//! method and replaces that line with a report naming all three, plus the calling chain.
//!
//! ## Features
//!
//! - **Runtime discovery** - Finds candidates by name, parameter shape and attributes
//! - **Body inspection** - Confirms dispatch handlers by scanning their CIL for the marker
//! - **Label-based rewriting** - Splices the reporter call without any offset fix-ups
//! - **Background scanning** - One scan per session start, off the game thread
//! - **Pluggable host** - Reflection, patching, networking and logging are traits
//!
//! ## Quick Start
//!
//! ### Using the Prelude
//!
//! ```rust
//! use std::sync::Arc;
//! use ownerscope::prelude::*;
//!
//! let source = InMemorySource::new().with_method(
//!     TypeDescriptor::new("Assembly-CSharp", "", "Foo"),
//!     MethodDescriptor::new("Assembly-CSharp", "Foo", "DoThingServerRpc"),
//!     [CustomAttribute::new("ServerRpcAttribute")],
//! );
//!
//! let sink = Arc::new(MemorySink::new());
//! let registry = Arc::new(HookRegistry::new("ownerscope", sink.clone()));
//! let bodies = Arc::new(ImageBodySource::new(Image::from_mem(vec![0x2A])?));
//! let engine = DiscoveryEngine::new(
//!     Arc::new(source),
//!     bodies,
//!     registry.clone(),
//!     sink.clone(),
//!     ScanConfig::default(),
//!     InboundViolationReporter::method_ref(Token::new(0x0A00_0001)),
//! );
//!
//! let coordinator = ScanCoordinator::new(Arc::new(engine), sink.clone());
//! let summary = coordinator.on_session_started()?.wait()?;
//! assert_eq!(summary.outbound, 1);
//! # Ok::<(), ownerscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ### Core Modules
//!
//! - [`discovery`] - Module enumeration, candidate classification and the scan task
//! - [`inspect`] - Marker search in method bodies and the in-place body rewrite
//! - [`patch`] - Installation of guards and rewrites through the host's patching engine
//! - [`runtime`] - Ownership verdicts, stack traces, reports and log sinks
//!
//! ### Byte-level Modules
//!
//! - [`assembly`] - CIL opcode table, label-based decoder and encoder
//! - [`metadata`] - Descriptors, signatures, method bodies, the `#US` heap and tokens
//! - [`file`] - Memory-mapped module images and little-endian parsing
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`] with the crate's [`Error`] type. Most
//! errors never reach the caller: the scan swallows them at method, type or module level
//! and turns them into log entries.

#[macro_use]
pub(crate) mod error;

/// CIL instruction model, opcode table, decoder and encoder
pub mod assembly;

/// Scan configuration
pub mod config;

/// Runtime discovery of interception candidates
pub mod discovery;

/// Module image access and little-endian parsing
pub mod file;

/// Body inspection and rewriting
pub mod inspect;

/// Reflection-level descriptions and byte-level metadata structures
pub mod metadata;

/// Installation of interceptions
pub mod patch;

/// Convenient re-exports of the most commonly used types
pub mod prelude;

/// Call-time ownership checks and reporting
pub mod runtime;

/// `ownerscope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ownerscope` Error type
///
/// See [`Error`] for all variants.
pub use error::Error;

/// Memory-mapped or in-memory module image
pub use file::Image;
