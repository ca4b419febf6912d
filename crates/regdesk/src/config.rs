//! Portal endpoints and session settings.

use std::time::Duration;

use serde::Deserialize;

use crate::semester::DEFAULT_SEASON;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                  AppleWebKit/537.36 (KHTML, like Gecko) \
                                  Chrome/131.0.0.0 Safari/537.36";

/// The four portal pages the session talks to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortalUrls {
    pub logon: String,
    pub registration: String,
    pub semester: String,
    pub email: String,
}

impl Default for PortalUrls {
    fn default() -> Self {
        Self {
            logon: "https://login.utexas.edu/openam/UI/Login".to_string(),
            registration: "https://utdirect.utexas.edu/registration/registration.WBX".to_string(),
            semester: "https://utdirect.utexas.edu/registration/chooseSemester.WBX".to_string(),
            email: "https://utdirect.utexas.edu/registration/confirmEmailAddress.WBX".to_string(),
        }
    }
}

impl PortalUrls {
    /// Same page layout as production, rooted at another origin.
    pub fn rooted_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            logon: format!("{base}/openam/UI/Login"),
            registration: format!("{base}/registration/registration.WBX"),
            semester: format!("{base}/registration/chooseSemester.WBX"),
            email: format!("{base}/registration/confirmEmailAddress.WBX"),
        }
    }
}

/// Settings for one portal session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub urls: PortalUrls,
    /// Season hint used by the course verbs when choosing a semester.
    pub season: String,
    /// Surface portal notification and error text at info/warn level.
    pub verbose: bool,
    #[serde(skip, default = "default_request_timeout")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            urls: PortalUrls::default(),
            season: DEFAULT_SEASON.to_string(),
            verbose: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
