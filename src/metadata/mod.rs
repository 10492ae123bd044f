//! Metadata of loaded modules as far as call-site scanning needs it.
//!
//! This module holds the reflection-level descriptions the discovery engine works with
//! and the byte-level pieces of a module image that the body inspector re-reads.
//!
//! # Key Components
//!
//! - [`descriptor`] - Module, type, method and custom attribute descriptions
//! - [`signature`] - Normalized method signatures used for deduplication and reports
//! - [`method`] - Method body headers, exception clauses and the decoded [`method::MethodIl`]
//! - [`streams`] - The `#US` heap that `ldstr` operands point into
//! - [`token`] - Metadata tokens as they appear in instruction operands
//!
//! # Examples
//!
//! ```rust
//! use ownerscope::metadata::descriptor::MethodDescriptor;
//!
//! let method = MethodDescriptor::new("Assembly-CSharp", "Foo", "DoThingServerRpc")
//!     .with_parameters(["Int32"]);
//! assert_eq!(method.signature(), "Foo.DoThingServerRpc(Int32)");
//! ```

/// Reflection-level descriptions of modules, types, methods and attributes
pub mod descriptor;
/// Method body headers, exception clauses and decoded IL
pub mod method;
/// Normalized method signatures
pub mod signature;
/// Metadata heaps
pub mod streams;
/// Metadata tokens
pub mod token;
