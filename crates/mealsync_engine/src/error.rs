//! Error types for the sync engine.

use mealsync_protocol::ApiEnvelope;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the gateway and the reconciler.
///
/// Only [`SyncError::AuthenticationExpired`] and
/// [`SyncError::ValidationFailed`] (plus unexpected server failures) reach
/// UI callers; transient network failures are turned into offline handling
/// before they get that far.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Token refresh failed; the user must sign in again.
    #[error("authentication expired, please sign in again")]
    AuthenticationExpired,

    /// The server rejected the request (4xx).
    #[error("request rejected ({status}): {message}")]
    ValidationFailed {
        /// HTTP status code.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// The server could not be reached; the call should succeed on a later sync.
    #[error("network unavailable: {0}")]
    TransientNetwork(String),

    /// Server failure (5xx) or a response that could not be understood.
    #[error("unexpected server response{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Unknown {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Description.
        message: String,
    },

    /// A queued mutation was dropped after too many failed attempts.
    #[error("mutation {mutation_id} dropped after reaching the retry ceiling")]
    RetryCeilingExceeded {
        /// Queue id of the dropped mutation.
        mutation_id: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates an unknown error for an HTTP status.
    pub fn unknown(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Unknown {
            status,
            message: message.into(),
        }
    }

    /// Returns true if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::TransientNetwork(_) | SyncError::Unknown { .. })
    }

    /// Returns true if the user has to re-authenticate.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::AuthenticationExpired)
    }

    /// Flattens the error into a failed `{success: false, message}` envelope.
    pub fn into_envelope<T>(self) -> ApiEnvelope<T> {
        let message = match self {
            SyncError::ValidationFailed { message, .. } => message,
            other => other.to_string(),
        };
        ApiEnvelope::failure(message)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::TransientNetwork("connection reset".into()).is_retryable());
        assert!(SyncError::unknown(Some(500), "internal error").is_retryable());
        assert!(!SyncError::AuthenticationExpired.is_retryable());
        assert!(!SyncError::ValidationFailed {
            status: 422,
            message: "title is required".into()
        }
        .is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::unknown(Some(503), "service unavailable");
        assert_eq!(
            err.to_string(),
            "unexpected server response (503): service unavailable"
        );

        let err = SyncError::unknown(None, "bad json");
        assert_eq!(err.to_string(), "unexpected server response: bad json");
    }

    #[test]
    fn validation_message_passes_through() {
        let env: ApiEnvelope<()> = SyncError::ValidationFailed {
            status: 400,
            message: "Calories must be positive".into(),
        }
        .into_envelope();
        assert!(!env.success);
        assert_eq!(env.message.as_deref(), Some("Calories must be positive"));
    }
}
