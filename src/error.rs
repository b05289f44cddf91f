//! Error types for port and configuration operations.
//!
//! The timestamp, descriptor and statistics core never fails: degenerate inputs
//! resolve to safe defaults. Errors only surface at the edges, where ports talk to
//! their connections and where configuration is loaded.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: Invalid or unreadable port configuration
//! - **Connection Errors**: Unknown or duplicate connection identifiers
//! - **Stream Errors**: Operations on streams without a descriptor
//! - **Transport Errors**: A downstream push failed
//! - **Timeouts**: No packet arrived within the requested wait
//! - **Closed Ports**: The input port was closed and its queue is drained
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use sigport::PortError;
//!
//! let error = PortError::transport_failed("conn-1", "receiver queue closed");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for port operations.
pub type Result<T, E = PortError> = std::result::Result<T, E>;

/// Main error type for port operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PortError {
    #[error("Invalid configuration in {context}: {details}")]
    Config { context: String, details: String },

    #[error("Configuration file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection '{connection_id}' is not known to this port")]
    UnknownConnection { connection_id: String },

    #[error("Connection '{connection_id}' already exists on this port")]
    DuplicateConnection { connection_id: String },

    #[error("No stream descriptor for stream '{stream_id}'")]
    UnknownStream { stream_id: String },

    #[error("Push to connection '{connection_id}' failed: {reason}")]
    Transport {
        connection_id: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid time code {code} for {field}")]
    InvalidTimeCode { field: &'static str, code: i16 },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Port '{port}' is closed")]
    Closed { port: String },
}

impl PortError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PortError::Transport { .. } => true,
            PortError::Timeout { .. } => true,
            PortError::Config { .. } => false,
            PortError::ConfigFile { .. } => false,
            PortError::UnknownConnection { .. } => false,
            PortError::DuplicateConnection { .. } => false,
            PortError::UnknownStream { .. } => false,
            PortError::InvalidTimeCode { .. } => false,
            PortError::Closed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PortError::Config { .. } => vec![
                "Check configuration values against documented ranges",
                "Remove the field to fall back to its default",
            ],
            PortError::ConfigFile { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            PortError::UnknownConnection { .. } => vec![
                "List connections before disconnecting",
                "Verify the connection identifier spelling",
            ],
            PortError::DuplicateConnection { .. } => vec![
                "Disconnect the existing connection first",
                "Use a unique connection identifier",
            ],
            PortError::UnknownStream { .. } => vec![
                "Push a stream descriptor before querying the stream",
                "Check whether the stream already ended with end-of-stream",
            ],
            PortError::Transport { .. } => vec![
                "Verify the receiving port is still running",
                "Retry the push once the receiver drains its queue",
            ],
            PortError::InvalidTimeCode { .. } => vec![
                "Use one of the defined time code modes (0-7)",
                "Use status 0 (invalid) or 1 (valid)",
            ],
            PortError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check that the upstream port is pushing data",
            ],
            PortError::Closed { .. } => vec![
                "Create a new port to resume receiving",
                "Drain remaining packets before closing",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(context: impl Into<String>, details: impl Into<String>) -> Self {
        PortError::Config { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration file errors with path context.
    pub fn config_file(path: PathBuf, source: std::io::Error) -> Self {
        PortError::ConfigFile { path, source }
    }

    /// Helper constructor for transport failures.
    pub fn transport_failed(connection_id: impl Into<String>, reason: impl Into<String>) -> Self {
        PortError::Transport { connection_id: connection_id.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for unknown connection errors.
    pub fn unknown_connection(connection_id: impl Into<String>) -> Self {
        PortError::UnknownConnection { connection_id: connection_id.into() }
    }

    /// Helper constructor for closed port errors.
    pub fn closed(port: impl Into<String>) -> Self {
        PortError::Closed { port: port.into() }
    }

    /// Helper constructor for unknown stream errors.
    pub fn unknown_stream(stream_id: impl Into<String>) -> Self {
        PortError::UnknownStream { stream_id: stream_id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            connection_id in "\\w+",
            stream_id in "[a-z0-9_]+",
            code in any::<i16>(),
            duration_ms in 1u64..60000u64
          ) {
            let transport = PortError::transport_failed(connection_id.clone(), reason.clone());
            let unknown = PortError::unknown_connection(connection_id.clone());
            let stream = PortError::unknown_stream(stream_id.clone());
            let time_code = PortError::InvalidTimeCode { field: "tcmode", code };
            let timeout = PortError::Timeout { duration: Duration::from_millis(duration_ms) };

            let transport_msg = transport.to_string();
            prop_assert!(transport_msg.contains(&connection_id));
            prop_assert!(transport_msg.contains(&reason));
            prop_assert!(unknown.to_string().contains(&connection_id));
            prop_assert!(stream.to_string().contains(&stream_id));
            prop_assert!(time_code.to_string().contains(&code.to_string()));
            prop_assert!(!timeout.to_string().is_empty());
          }

          #[test]
          fn transport_source_chain_is_preserved(base_message in ".*") {
            let error = PortError::Transport {
              connection_id: "conn".to_string(),
              reason: "push failed".to_string(),
              source: Some(Box::new(std::io::Error::other(base_message.clone()))),
            };

            let source = std::error::Error::source(&error);
            prop_assert!(source.is_some());
            prop_assert_eq!(source.map(|s| s.to_string()), Some(base_message));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<PortError>();

        let error = PortError::invalid_config("port", "bad value");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn recovery_methods_work() {
        let transport = PortError::transport_failed("conn", "closed");
        let config = PortError::invalid_config("queue_threshold", "must be at least 1");
        let timeout = PortError::Timeout { duration: Duration::from_millis(10) };

        let closed = PortError::closed("dataFloat_in");

        assert!(transport.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!config.is_retryable());
        assert!(!closed.is_retryable());
        assert_eq!(closed.to_string(), "Port 'dataFloat_in' is closed");

        for error in [transport, config, timeout, closed] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }

    #[test]
    fn config_file_error_keeps_path() {
        let error = PortError::config_file(
            PathBuf::from("/etc/sigport/port.yaml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(error.to_string().contains("/etc/sigport/port.yaml"));
        assert!(matches!(error, PortError::ConfigFile { .. }));
    }
}
