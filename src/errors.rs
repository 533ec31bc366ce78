//! Typed error hierarchy for the taskflow client.
//!
//! Two layers:
//! - `ApiError`: one failed HTTP exchange with the remote API
//! - `BoardError`: what the stores surface to the presentation layer

use thiserror::Error;

/// Errors from a single request against the remote API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401, or a body that says the bearer token was missing or rejected.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// `message` is the display text picked message-first; `error` keeps
    /// the body's `error` field for stores that read it first.
    #[error("{message} (HTTP {status})")]
    Status {
        status: u16,
        message: String,
        error: Option<String>,
    },

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Invalid request URL '{path}': {message}")]
    InvalidUrl { path: String, message: String },
}

impl ApiError {
    /// The human-readable message a UI would display.
    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized { message } | ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Errors surfaced by the board, reference and sprint stores.
///
/// Absent tasks or columns are never errors: those operations are silent
/// no-ops.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Read path failed; the cached data is left as it was.
    #[error("{message}")]
    FetchFailed {
        message: String,
        #[source]
        source: ApiError,
    },

    /// Write path rejected; any optimistic change has been rolled back.
    #[error("{message}")]
    CommitFailed {
        message: String,
        #[source]
        source: ApiError,
    },

    /// Rejected locally before any request was sent.
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Which part of a failure body a store shows first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageOrder {
    /// `message`, then `error`, then the HTTP reason.
    #[default]
    MessageFirst,
    /// The body's `error` field ahead of everything else.
    ErrorFirst,
    /// Always the operation's own message; the server's text stays on the
    /// source error.
    FallbackOnly,
}

impl BoardError {
    pub fn fetch(fallback: &str, source: ApiError) -> Self {
        Self::fetch_with(MessageOrder::MessageFirst, fallback, source)
    }

    pub fn commit(fallback: &str, source: ApiError) -> Self {
        Self::commit_with(MessageOrder::MessageFirst, fallback, source)
    }

    pub fn fetch_with(order: MessageOrder, fallback: &str, source: ApiError) -> Self {
        Self::FetchFailed {
            message: display_message(&source, fallback, order),
            source,
        }
    }

    pub fn commit_with(order: MessageOrder, fallback: &str, source: ApiError) -> Self {
        Self::CommitFailed {
            message: display_message(&source, fallback, order),
            source,
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            BoardError::FetchFailed { source, .. } | BoardError::CommitFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Prefer the server's own message; fall back to the operation's default
/// when the failure carried nothing readable.
fn display_message(source: &ApiError, fallback: &str, order: MessageOrder) -> String {
    if order == MessageOrder::FallbackOnly {
        return fallback.to_string();
    }
    if order == MessageOrder::ErrorFirst
        && let ApiError::Status {
            error: Some(error), ..
        } = source
        && !error.trim().is_empty()
    {
        return error.clone();
    }
    match source {
        ApiError::Unauthorized { message } | ApiError::Status { message, .. }
            if !message.trim().is_empty() =>
        {
            message.clone()
        }
        _ => fallback.to_string(),
    }
}

pub type Result<T, E = BoardError> = std::result::Result<T, E>;
