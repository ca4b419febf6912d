//! Semester tokens scraped from the semester selection page.

use crate::error::{PortalError, PortalResult};
use crate::extract::{find_form_by_field, FormFields, HtmlForm};
use crate::protocol::{FIELD_SEMESTER_SUBMIT, FIELD_TERM};

/// Season picked when no hint is configured.
pub const DEFAULT_SEASON: &str = "fall";

/// Hidden fields of one selectable semester option.
///
/// Once chosen for a session it is never refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemesterToken {
    fields: FormFields,
}

impl SemesterToken {
    /// Pick the first option whose submit label contains `season`,
    /// case-insensitively. Forms without a submit label are not options.
    pub fn select(forms: &[HtmlForm], season: &str) -> PortalResult<Self> {
        find_form_by_field(forms, FIELD_SEMESTER_SUBMIT, season)
            .map(|form| Self {
                fields: form.fields.clone(),
            })
            .ok_or_else(|| PortalError::SemesterNotFound {
                season: season.to_string(),
            })
    }

    /// Term identifier injected into every submission.
    pub fn term_id(&self) -> Option<&str> {
        self.fields.get(FIELD_TERM).map(String::as_str)
    }

    /// Label of the button that selected this semester.
    pub fn submit_label(&self) -> &str {
        self.fields
            .get(FIELD_SEMESTER_SUBMIT)
            .map(String::as_str)
            .unwrap_or_default()
    }
}
