use serde::Serialize;
use std::fmt;
use ts_rs::TS;

use crate::transport::TransportError;

/// ErrorKind
///
/// The fixed set of failure categories the rest of the core branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ErrorKind {
    Timeout,
    Network,
    Auth,
    Other,
}

/// ClassifiedError
///
/// Derived view of a failed operation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_status: Option<u16>,
    pub message: String,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.original_status {
            Some(status) => write!(f, "{:?} error ({}): {}", self.kind, status, self.message),
            None => write!(f, "{:?} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ClassifiedError {}

// Transport codes that carry an explicit timeout or unreachable signal.
const TIMEOUT_CODES: &[&str] = &["ECONNABORTED", "ETIMEDOUT"];
const NETWORK_CODES: &[&str] = &["ERR_NETWORK", "ECONNREFUSED", "ECONNRESET", "ENOTFOUND"];

/// classify
///
/// Total mapping from a transport failure to an error kind. First match wins:
/// 1. timeout signal, timeout code, or a message containing "timeout";
/// 2. unreachable signal, network code, or a message containing "network";
/// 3. HTTP 401 / 403;
/// 4. everything else.
///
/// Message matching is case-insensitive. Only `Other` is retryable.
pub fn classify(error: &TransportError) -> ClassifiedError {
    let message = error.message.to_ascii_lowercase();
    let code = error.code.as_deref().unwrap_or_default();

    let kind = if error.timed_out || TIMEOUT_CODES.contains(&code) || message.contains("timeout")
    {
        ErrorKind::Timeout
    } else if error.unreachable || NETWORK_CODES.contains(&code) || message.contains("network") {
        ErrorKind::Network
    } else if matches!(error.status, Some(401) | Some(403)) {
        ErrorKind::Auth
    } else {
        ErrorKind::Other
    };

    ClassifiedError {
        kind,
        retryable: kind == ErrorKind::Other,
        original_status: error.status,
        message: error.message.clone(),
    }
}

impl From<&TransportError> for ClassifiedError {
    fn from(error: &TransportError) -> Self {
        classify(error)
    }
}
