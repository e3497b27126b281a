use std::fmt;

use serde::{Deserialize, Serialize};

/// Failures raised by the search engine.
///
/// Only [`SearchError::NotReady`] and [`SearchError::Busy`] are recoverable;
/// everything else aborts the run and must reach the top of the caller.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("resource not ready: {0}")]
    NotReady(String),

    #[error("a search is already running against this form")]
    Busy,

    #[error("malformed results table: {0}")]
    MalformedTable(String),

    #[error("missing element: {0}")]
    MissingElement(String),

    #[error("booking form failure")]
    Form(#[source] anyhow::Error),
}

impl SearchError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedTable(message.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotReady(_) | Self::Busy)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady(_) => ErrorKind::Resource,
            Self::Busy => ErrorKind::Busy,
            Self::MalformedTable(_) | Self::MissingElement(_) | Self::Form(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        let message = match self {
            Self::Form(err) => format!("{self}: {err:#}"),
            _ => self.to_string(),
        };
        ErrorPayload {
            kind: self.kind(),
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    #[serde(rename = "ResourceError")]
    Resource,
    #[serde(rename = "InternalError")]
    Internal,
    #[serde(rename = "BusyError")]
    Busy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resource => "ResourceError",
            Self::Internal => "InternalError",
            Self::Busy => "BusyError",
        })
    }
}

/// Error attached to a channel message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
