//! Wire constants shared with the registration portal.
//!
//! Field names and request codes are a fixed contract with the portal and
//! must be sent exactly as written here.

use std::fmt;
use std::str::FromStr;

use crate::error::PortalError;

/// Hidden input carrying the rotating anti-forgery token.
pub const FIELD_NONCE: &str = "s_nonce";
/// Hidden input carrying the term identifier.
pub const FIELD_TERM: &str = "s_ccyys";
/// Submit-button field on the semester selection forms.
pub const FIELD_SEMESTER_SUBMIT: &str = "submit";
pub const FIELD_REQUEST: &str = "s_request";
pub const FIELD_SUBMIT: &str = "s_submit";

pub const FIELD_UNIQUE_ADD: &str = "s_unique_add";
pub const FIELD_UNIQUE_DROP: &str = "s_unique_drop";
pub const FIELD_WAITLIST_UNIQUE: &str = "s_waitlist_unique";
pub const FIELD_WAITLIST_SWAP: &str = "s_waitlist_swap_unique";
pub const FIELD_SWAP_ADD: &str = "s_swap_unique_add";
pub const FIELD_SWAP_DROP: &str = "s_swap_unique_drop";
pub const FIELD_PASS_FAIL: &str = "s_unique_pass_fail";
pub const FIELD_ACK_DEGREE_PLAN: &str = "ack_dgre_plan";

/// Login form credential fields.
pub const FIELD_LOGIN_USER: &str = "IDToken1";
pub const FIELD_LOGIN_PASSWORD: &str = "IDToken2";

/// Cookie set by a successful login; the only cookie kept afterwards.
pub const AUTH_COOKIE: &str = "utlogin-prod";

/// Label of the submit button on course-verb requests.
pub const SUBMIT_LABEL: &str = "Submit";

/// Form action whose presence marks a registration-access error page.
pub const ACCESS_ERROR_ACTION: &str = "registrationAccessError.WBX";

/// Request-type codes sent in `s_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestCode {
    /// Add a section.
    Add,
    /// Add to a section's waitlist.
    Waitlist,
    /// Drop a section.
    Drop,
    /// Drop one section only if adding another succeeds.
    Swap,
    /// Change a section to pass/fail.
    PassFail,
    /// Get access to registration for the chosen semester.
    GrantAccess,
    /// Acknowledge university obligations.
    Obligations,
}

impl RequestCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestCode::Add => "STADD",
            RequestCode::Waitlist => "STAWL",
            RequestCode::Drop => "STDRP",
            RequestCode::Swap => "STSWP",
            RequestCode::PassFail => "STCPF",
            RequestCode::GrantAccess => "STGAR",
            RequestCode::Obligations => "STUOF",
        }
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two HTTP methods the portal's forms use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMethod {
    /// Fields travel as query parameters.
    #[default]
    Get,
    /// Fields travel as a url-encoded body.
    Post,
}

impl FromStr for RequestMethod {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(RequestMethod::Get),
            "POST" => Ok(RequestMethod::Post),
            other => Err(PortalError::UnsupportedRequest(other.to_string())),
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Get => f.write_str("GET"),
            RequestMethod::Post => f.write_str("POST"),
        }
    }
}
