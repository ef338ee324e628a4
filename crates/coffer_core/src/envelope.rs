//! Uniform result envelope for upward-facing callers.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};

/// Outcome tag of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation completed.
    Success,
    /// The operation failed.
    Error,
}

/// The `{status, message, data}` payload every surfaced operation
/// resolves with.
///
/// Inside the crate, failures propagate as [`CoreError`] through
/// `CoreResult`; the envelope is the uniform wrapper produced at the
/// surface for callers that branch on `status` instead of handling
/// errors. Failures carry `data: None` and put the error display in
/// `message`.
///
/// [`CoreError`]: crate::CoreError
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Outcome tag.
    pub status: Status,
    /// Human-readable description of the outcome.
    pub message: String,
    /// Payload on success, `None` on failure.
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Creates a success envelope.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Creates an error envelope with no payload.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            data: None,
        }
    }

    /// Converts a result into an envelope.
    pub fn capture(result: CoreResult<T>, ok_message: &str) -> Self {
        match result {
            Ok(data) => Self::success(ok_message, data),
            Err(error) => Self::failure(error.to_string()),
        }
    }

    /// Whether the envelope carries a success status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Consumes the envelope, returning its payload.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}
