//! Call stacks of intercepted calls, rendered for violation reports.
//!
//! The interesting part of a violation is who called the restricted method. The frames
//! closest to the capture point belong to the interception machinery (the guard, the
//! reporter, the engine's generated trampolines) and are stripped before rendering when
//! configured. Frames are rendered one per line:
//!
//! ```text
//!   at Game.Crate.Grab in Crate.cs:line 42
//!   at Game.PlayerController.Update
//! ```

/// Substrings identifying frames that belong to the interception machinery
pub const INSTRUMENTATION_MARKERS: &[&str] = &[
    "ownerscope::",
    "ServerRpcGuard",
    "InboundViolationReporter",
    "DMD<",
    "HarmonyLib.",
];

/// A single frame of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Namespace-qualified declaring type, if known
    pub declaring_type: Option<String>,
    /// Method name
    pub method: String,
    /// Source file, if debug symbols are available
    pub file: Option<String>,
    /// Source line, if debug symbols are available
    pub line: Option<u32>,
}

impl StackFrame {
    /// A frame without source location
    pub fn new(declaring_type: impl Into<String>, method: impl Into<String>) -> Self {
        StackFrame {
            declaring_type: Some(declaring_type.into()),
            method: method.into(),
            file: None,
            line: None,
        }
    }

    /// Attaches a source location
    #[must_use]
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// `Type.Method`, or just the method name when the type is unknown
    #[must_use]
    pub fn identity(&self) -> String {
        match &self.declaring_type {
            Some(declaring_type) => format!("{declaring_type}.{}", self.method),
            None => self.method.clone(),
        }
    }

    /// True if the frame belongs to the interception machinery
    #[must_use]
    pub fn is_instrumentation(&self) -> bool {
        let identity = self.identity();
        INSTRUMENTATION_MARKERS
            .iter()
            .any(|marker| identity.contains(marker))
    }

    /// Renders the frame as a single trace line
    #[must_use]
    pub fn render(&self) -> String {
        let mut line = format!("  at {}", self.identity());
        if let (Some(file), Some(number)) = (&self.file, self.line) {
            line.push_str(&format!(" in {}:line {number}", base_name(file)));
        }
        line
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Captures the call stack of the current intercepted call.
///
/// Frames are ordered innermost first.
pub trait StackWalker: Send + Sync {
    /// The frames of the current call stack
    fn capture(&self) -> Vec<StackFrame>;
}

/// A stack that was captured beforehand, e.g. by the host before dispatching to the guard
#[derive(Debug, Clone, Default)]
pub struct CapturedStack(pub Vec<StackFrame>);

impl StackWalker for CapturedStack {
    fn capture(&self) -> Vec<StackFrame> {
        self.0.clone()
    }
}

/// Frames remaining after optional removal of instrumentation frames, in original order
#[must_use]
pub fn sanitize(frames: &[StackFrame], strip_instrumentation: bool) -> Vec<&StackFrame> {
    frames
        .iter()
        .filter(|frame| !strip_instrumentation || !frame.is_instrumentation())
        .collect()
}

/// Render a trace, one frame per line.
#[must_use]
pub fn render(frames: &[StackFrame], strip_instrumentation: bool) -> String {
    render_limited(frames, strip_instrumentation, None)
}

/// Render a trace keeping at most `limit` frames after sanitizing.
#[must_use]
pub fn render_limited(
    frames: &[StackFrame],
    strip_instrumentation: bool,
    limit: Option<usize>,
) -> String {
    sanitize(frames, strip_instrumentation)
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(StackFrame::render)
        .collect::<Vec<_>>()
        .join("\n")
}
