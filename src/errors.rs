//! Classification of failed request attempts.
//!
//! Every attempt that does not produce an HTTP response is sorted into one
//! of a small set of kinds so the final report can say *why* traffic failed,
//! not just how much of it did.

use std::fmt;

/// Kinds of non-response outcomes a request attempt can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The per-request timeout elapsed before a response arrived.
    Timeout,

    /// Connection-level failure (DNS, refused, reset, TLS handshake).
    Connection,

    /// The exchange broke after connecting, or the resolved request could
    /// not be turned into a valid HTTP request at all.
    Protocol,

    /// The attempt was abandoned at the shutdown grace deadline.
    Cancelled,

    /// Strict substitution found an unresolved placeholder; nothing was sent.
    MissingVariable,
}

impl ErrorKind {
    /// Classify a reqwest error.
    ///
    /// # Arguments
    /// * `error` - The reqwest error to classify
    ///
    /// # Returns
    /// The appropriate error kind
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_connect() {
            ErrorKind::Connection
        } else {
            // Builder errors, body/decode errors, redirect loops and the
            // rest all mean the exchange itself went wrong.
            ErrorKind::Protocol
        }
    }

    /// Stable snake_case label used in histograms and serialized snapshots.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection_error",
            ErrorKind::Protocol => "protocol_error",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::MissingVariable => "missing_variable",
        }
    }

    /// Human-readable description for report output.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "Request Timeouts",
            ErrorKind::Connection => "Connection Errors",
            ErrorKind::Protocol => "Protocol Errors",
            ErrorKind::Cancelled => "Cancelled at Shutdown",
            ErrorKind::MissingVariable => "Unresolved Template Variables",
        }
    }

    /// All kinds in a consistent reporting order.
    pub fn all() -> Vec<ErrorKind> {
        vec![
            ErrorKind::Timeout,
            ErrorKind::Connection,
            ErrorKind::Protocol,
            ErrorKind::Cancelled,
            ErrorKind::MissingVariable,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
