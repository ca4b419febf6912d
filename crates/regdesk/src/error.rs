//! Error types for the portal session and dispatcher.

use std::time::Duration;

/// All errors that can occur while talking to the registration portal.
///
/// A rejected registration action is *not* an error: course verbs report it
/// as `Ok(false)`. These variants are either fatal to the owning session or
/// transport failures of a single request.
#[derive(thiserror::Error, Debug)]
pub enum PortalError {
    /// Login finished without the portal's success cookie.
    #[error("Authentication failed for {username}: no {cookie} cookie in login response")]
    Authentication { username: String, cookie: String },

    /// No selectable semester matched the season hint.
    #[error("Semester not found: no option matches {season:?}")]
    SemesterNotFound { season: String },

    /// `submit` was asked for a method other than GET or POST.
    #[error("Unsupported request method: {0}")]
    UnsupportedRequest(String),

    /// A portal step that needs a session ran before `login`.
    #[error("Session is not authenticated")]
    NotAuthenticated,

    /// The portal answered with an HTTP error status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The unit of work ran past its deadline.
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid portal URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl PortalError {
    /// Whether this error ends the owning session.
    ///
    /// Transport failures only spoil the request that hit them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PortalError::Authentication { .. }
                | PortalError::SemesterNotFound { .. }
                | PortalError::UnsupportedRequest(_)
                | PortalError::NotAuthenticated
                | PortalError::DeadlineExceeded(_)
                | PortalError::InvalidUrl(_)
        )
    }
}

pub type PortalResult<T> = Result<T, PortalError>;
