//! Scraping client for the metering portal.
//!
//! The portal has no API: every step is a server-rendered page whose
//! identifiers feed the next request, and authentication lives in cookies.

pub mod extract;
pub mod profile;
pub mod session;
pub mod timestamp;

pub use profile::CustomerProfile;
pub use session::{PortalSession, SessionState};

/// Markers that only appear on the login form.
pub(crate) const LOGIN_MARKERS: [&str; 2] = ["txtUsername", "txtPassword"];

/// A timestamp or numeric cell that could not be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse {value:?}: {reason}")]
pub struct FormatError {
    pub value: String,
    pub reason: String,
}

impl FormatError {
    pub(crate) fn new(value: &str, reason: impl ToString) -> Self {
        Self {
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    #[error("login rejected by the portal")]
    Credentials,
    #[error("unexpected portal page: {0}")]
    Protocol(String),
    #[error("portal session expired")]
    SessionExpired,
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("{operation} requires a {required} session")]
    OutOfSequence {
        operation: &'static str,
        required: &'static str,
    },
    #[error("invalid portal configuration: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub(crate) fn is_login_page(body: &str) -> bool {
    LOGIN_MARKERS.iter().any(|marker| body.contains(marker))
}
