//! End-of-run report in text or JSON form.

use chrono::{DateTime, Utc};
use serde::Serialize;

use regdesk::Outcome;

/// Results of one run with its wall-clock bounds.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Outcome,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, finished_at: DateTime<Utc>, results: Outcome) -> Self {
        Self {
            started_at,
            finished_at,
            results,
        }
    }

    /// Header line followed by one `<label> : <id>` line per course.
    pub fn render_text(&self) -> String {
        format!("Registration complete\n{}", self.results)
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
