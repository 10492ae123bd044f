use thiserror::Error;

use crate::patch::PatchError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Most of these never reach the host. The discovery engine and the installers swallow
/// failures at the smallest granularity (method, then type, then module) and turn them into
/// log entries; only orchestration errors such as [`Error::ScanInProgress`] are returned to
/// the caller.
///
/// # Error Categories
///
/// ## Byte-level Errors
/// - [`Error::Malformed`] - Corrupted method body, heap entry or instruction stream
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the data
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors while mapping a module image
///
/// ## Body Surgery Errors
/// - [`Error::MethodNotFound`] - No body is known for the method
/// - [`Error::BodyShapeMismatch`] - The expected call-site pattern is not in the body
/// - [`Error::StackImbalance`] - A replacement would change the stack depth
/// - [`Error::UnresolvedLabel`] - A branch or clause refers to an undefined label
///
/// ## Runtime Errors
/// - [`Error::MissingNetworkManager`] - A network object has no manager attached
/// - [`Error::Patch`] - The patching engine refused an installation
/// - [`Error::LockError`] - A registry lock was poisoned
///
/// ## Orchestration Errors
/// - [`Error::ScanInProgress`] - A scan was requested while another one is running
/// - [`Error::ScanFailed`] - The background scan terminated abnormally
///
/// # Examples
///
/// ```rust
/// use ownerscope::{Error, Image};
///
/// match Image::from_mem(Vec::new()) {
///     Err(Error::Empty) => {}
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed: {} ({}:{})", message, file, line);
///     }
///     other => panic!("unexpected: {:?}", other.map(|image| image.len())),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The data is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors raised while opening or mapping a module image.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// No method body is known for the given normalized signature.
    #[error("Method not found - {0}")]
    MethodNotFound(String),

    /// The body does not contain the call-site pattern a rewrite expects.
    ///
    /// The method is left untouched when this is returned.
    #[error("Body shape mismatch - {0}")]
    BodyShapeMismatch(String),

    /// A replacement instruction sequence does not have the stack effect of the
    /// sequence it replaces.
    #[error("Stack imbalance in {method} - expected {expected}, found {actual}")]
    StackImbalance {
        /// Normalized signature of the method being rewritten
        method: String,
        /// Net stack effect of the removed instructions
        expected: i32,
        /// Net stack effect of the inserted instructions
        actual: i32,
    },

    /// A branch or exception clause refers to a label no instruction defines.
    #[error("Unresolved label - {0}")]
    UnresolvedLabel(u32),

    /// The network object has no manager attached, so ownership cannot be evaluated.
    #[error("No network manager attached to {0}")]
    MissingNetworkManager(String),

    /// The patching engine refused to install an interception.
    #[error("{0}")]
    Patch(#[from] PatchError),

    /// Failed to lock a shared registry.
    #[error("Failed to lock target - {0}")]
    LockError(String),

    /// A scan was requested while another scan is still running.
    #[error("A scan is already in progress")]
    ScanInProgress,

    /// The background scan terminated abnormally.
    #[error("Scan failed - {0}")]
    ScanFailed(String),
}
