//! Scan and reporting configuration.
//!
//! [`ScanConfig`] collects the switches the host exposes to players plus the constants
//! the scanner matches on. The two player-facing switches live in the `[General]` section
//! of the plugin's cfg file and can be read with [`ScanConfig::from_cfg_str`]:
//!
//! ```text
//! [General]
//! ## Enable/disable logging of assembly scanning progress
//! LogAssemblyScanning = false
//! RemoveFirstLineOfStackTrace = true
//! ```

use crate::{inspect::MarkerPattern, Error, Result};

/// Section of the cfg file holding the scanner switches
pub const CONFIG_SECTION: &str = "General";

/// Configuration for a scan pass and for the reports it installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Emit per-module headers, per-method skip reasons and per-method success lines
    pub log_assembly_scanning: bool,

    /// Drop the interception layer's own frames from reported stack traces
    pub remove_first_line_of_stack_trace: bool,

    /// Number of caller frames kept in a report, `None` keeps all of them
    pub max_trace_frames: Option<usize>,

    /// Log a progress line after every this many modules; zero is treated as one
    pub progress_interval: usize,

    /// Call-site pattern confirming an inbound dispatch handler
    pub marker: MarkerPattern,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            log_assembly_scanning: false,
            remove_first_line_of_stack_trace: true,
            max_trace_frames: Some(3),
            progress_interval: 5,
            marker: MarkerPattern::default(),
        }
    }
}

impl ScanConfig {
    /// Defaults with per-module and per-method tracing enabled
    #[must_use]
    pub fn verbose() -> Self {
        Self {
            log_assembly_scanning: true,
            ..Self::default()
        }
    }

    /// Enables or disables per-module and per-method tracing
    #[must_use]
    pub fn with_assembly_scanning_log(mut self, enabled: bool) -> Self {
        self.log_assembly_scanning = enabled;
        self
    }

    /// Enables or disables stripping of interception frames from stack traces
    #[must_use]
    pub fn with_stripped_traces(mut self, enabled: bool) -> Self {
        self.remove_first_line_of_stack_trace = enabled;
        self
    }

    /// Limits the number of caller frames in a report
    #[must_use]
    pub fn with_max_trace_frames(mut self, limit: Option<usize>) -> Self {
        self.max_trace_frames = limit;
        self
    }

    /// Sets the progress logging interval; zero is treated as one
    #[must_use]
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Replaces the call-site marker pattern
    #[must_use]
    pub fn with_marker(mut self, marker: MarkerPattern) -> Self {
        self.marker = marker;
        self
    }

    /// Read the `[General]` switches from cfg file text, starting from the defaults.
    ///
    /// Comments (`#`), blank lines, other sections and unknown keys are ignored. Boolean
    /// values are matched case-insensitively.
    ///
    /// # Errors
    /// Returns [`Error::Error`] if a known key carries a value that is not a boolean.
    pub fn from_cfg_str(text: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut in_section = false;

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                in_section = section.trim() == CONFIG_SECTION;
                continue;
            }

            if !in_section {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            match key.trim() {
                "LogAssemblyScanning" => config.log_assembly_scanning = parse_bool(key, value)?,
                "RemoveFirstLineOfStackTrace" => {
                    config.remove_first_line_of_stack_trace = parse_bool(key, value)?;
                }
                _ => {}
            }
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::Error(format!(
            "Invalid boolean for {} - {}",
            key.trim(),
            value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_config_presets() {
        let config = ScanConfig::default();
        assert!(!config.log_assembly_scanning);
        assert!(config.remove_first_line_of_stack_trace);
        assert_eq!(config.max_trace_frames, Some(3));
        assert_eq!(config.progress_interval, 5);
        assert_eq!(config.marker, MarkerPattern::default());

        let verbose = ScanConfig::verbose();
        assert!(verbose.log_assembly_scanning);
        assert!(verbose.remove_first_line_of_stack_trace);
    }

    #[test]
    fn test_scan_config_builders() {
        let config = ScanConfig::default()
            .with_assembly_scanning_log(true)
            .with_stripped_traces(false)
            .with_max_trace_frames(None)
            .with_progress_interval(0);

        assert!(config.log_assembly_scanning);
        assert!(!config.remove_first_line_of_stack_trace);
        assert_eq!(config.max_trace_frames, None);
        assert_eq!(config.progress_interval, 1);
    }

    #[test]
    fn test_from_cfg_str() {
        let text = "\
## Settings file was created by plugin BetterServerRpcErrorLog
[General]

## Enable/disable logging of assembly scanning progress
# Setting type: Boolean
# Default value: false
LogAssemblyScanning = TRUE
RemoveFirstLineOfStackTrace = false
SomethingElse = 12

[Other]
LogAssemblyScanning = false
";

        let config = ScanConfig::from_cfg_str(text).unwrap();
        assert!(config.log_assembly_scanning);
        assert!(!config.remove_first_line_of_stack_trace);
    }

    #[test]
    fn test_from_cfg_str_invalid() {
        assert!(ScanConfig::from_cfg_str("[General]\nLogAssemblyScanning = maybe").is_err());
        assert_eq!(ScanConfig::from_cfg_str("").unwrap(), ScanConfig::default());
    }
}
