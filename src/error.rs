//! Error Types for the Accessibility Autofill Engine
//!
//! Inner components return these errors strictly. Only the event dispatcher
//! swallows them, see [`crate::service::AutofillService::on_accessibility_event`].

use thiserror::Error;

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, AutofillError>;

/// Structural problems found while walking a foreign UI tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeAnomaly {
    /// A node reported more children than we are willing to examine
    ExcessiveFanOut,
    /// A child was the same node as its parent
    Cycle,
    /// The tree was deeper than the recursion limit
    ExcessiveDepth,
}

impl std::fmt::Display for TreeAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TreeAnomaly::ExcessiveFanOut => "too many child iterations",
            TreeAnomaly::Cycle => "child node is the same as its parent",
            TreeAnomaly::ExcessiveDepth => "tree exceeds maximum depth",
        };
        f.write_str(text)
    }
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum AutofillError {
    // ===== Transient OS Errors =====
    /// No root node for the foreground window
    #[error("Accessibility tree unavailable")]
    TreeUnavailable,

    /// The active window no longer belongs to the app that raised the event
    #[error("Stale window: event from '{expected}', active window owned by '{actual}'")]
    StaleWindow { expected: String, actual: String },

    // ===== Tree Warnings =====
    /// Malformed tree detected during traversal
    #[error("Malformed tree: {0}")]
    MalformedTree(TreeAnomaly),

    // ===== Policy Violations =====
    /// Attempt to fill a credential on a screen with a different host
    #[error("Credential host does not match current screen")]
    HostMismatch,

    // ===== Host Action Errors =====
    /// Setting text on a node failed
    #[error("Failed to fill field: {0}")]
    FillFailed(String),

    /// Posting or cancelling the notification failed
    #[error("Notification error: {0}")]
    NotificationFailed(String),

    /// A host callback panicked while handling an event
    #[error("Host panicked while handling event: {0}")]
    HostPanic(String),

    // ===== Configuration Errors =====
    /// Settings could not be loaded or saved
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ===== I/O Errors =====
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AutofillError {
    /// Errors caused by the OS state changing under us. The event is dropped
    /// and the next one is processed normally.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AutofillError::TreeUnavailable
                | AutofillError::StaleWindow { .. }
                | AutofillError::FillFailed(_)
                | AutofillError::NotificationFailed(_)
                | AutofillError::HostPanic(_)
        )
    }

    /// Check if this error is a refused fill
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, AutofillError::HostMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AutofillError::TreeUnavailable.is_transient());
        assert!(AutofillError::StaleWindow {
            expected: "a".to_string(),
            actual: "b".to_string()
        }
        .is_transient());
        assert!(!AutofillError::MalformedTree(TreeAnomaly::Cycle).is_transient());
        assert!(AutofillError::HostMismatch.is_policy_violation());
        assert!(!AutofillError::HostMismatch.is_transient());
        assert!(!AutofillError::ConfigError("x".to_string()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = AutofillError::MalformedTree(TreeAnomaly::ExcessiveFanOut);
        assert_eq!(err.to_string(), "Malformed tree: too many child iterations");
    }
}
