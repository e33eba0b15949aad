//! Error types for the harness
//!
//! The variants mirror the failure taxonomy of a run: environment faults are
//! detected before anything is launched, setup failures abort a partially
//! built run, and capture timeouts mean the forwarder never delivered.
//! Assertion mismatches are deliberately *not* errors - they are the failure
//! list inside a completed [`crate::TestReport`].

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Preflight fault: missing executable, port already bound.
    ///
    /// Reported before any process is launched; no teardown is needed.
    #[error("environment fault: {0}")]
    Environment(String),

    /// Setup failure after partial setup: health timeout, non-200 stimulus
    /// response, or a protocol-level fault at the collector.
    ///
    /// Carries the child's captured stderr for diagnostic replay.
    #[error("setup failure: {message}")]
    Setup {
        message: String,
        process_stderr: String,
    },

    /// No forwarded request observed within the wait window.
    #[error("no forwarded request received within {timeout_secs}s")]
    Timeout {
        timeout_secs: u64,
        process_stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Captured child stderr attached to this failure, if any
    pub fn process_stderr(&self) -> Option<&str> {
        match self {
            HarnessError::Setup { process_stderr, .. }
            | HarnessError::Timeout { process_stderr, .. } => {
                (!process_stderr.is_empty()).then_some(process_stderr.as_str())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_failure_exposes_stderr() {
        let err = HarnessError::Setup {
            message: "health timeout".to_string(),
            process_stderr: "boot panic".to_string(),
        };
        assert_eq!(err.process_stderr(), Some("boot panic"));
    }

    #[test]
    fn test_empty_stderr_is_none() {
        let err = HarnessError::Timeout {
            timeout_secs: 10,
            process_stderr: String::new(),
        };
        assert!(err.process_stderr().is_none());
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_environment_fault_has_no_stderr() {
        let err = HarnessError::Environment("port 9090 is already in use".to_string());
        assert!(err.process_stderr().is_none());
    }
}
