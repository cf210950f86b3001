//! Retry classification for fetches.

use reqwest::StatusCode;

/// Attempts per request, the first one included.
pub const MAX_ATTEMPTS: usize = 3;

/// Delay between retry attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 500;

/// Redirects followed by a single fetch before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// What to do with a response, based on its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Hand the response to the caller, including 4xx.
    Return,
    /// Follow the `Location` header, if any.
    Redirect,
    /// Server error; consume one retry.
    Retry,
}

pub fn classify_status(status: StatusCode) -> StatusAction {
    if status.is_redirection() {
        StatusAction::Redirect
    } else if status.is_server_error() {
        StatusAction::Retry
    } else {
        StatusAction::Return
    }
}

/// How a transport error affects the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// A pooled connection went away; reconnect without using a retry.
    StaleConnection,
    /// Anything else: consumes one retry.
    Transient,
}

pub fn classify_error(error: &reqwest::Error, reused: bool) -> TransportFailure {
    if reused && error.is_connect() {
        TransportFailure::StaleConnection
    } else {
        TransportFailure::Transient
    }
}
