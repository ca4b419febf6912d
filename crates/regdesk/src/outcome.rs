//! Registration outcomes and the merge rule that combines them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// A section's unique number. Zero is reserved as the failure sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(u32);

impl SectionId {
    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this id collides with the failure sentinel.
    pub const fn is_sentinel(self) -> bool {
        self.0 == FAILURE_SENTINEL
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SectionId {
    fn from(uid: u32) -> Self {
        Self(uid)
    }
}

/// Value reported for a course no candidate could be registered for.
pub const FAILURE_SENTINEL: u32 = 0;

/// Result for one course label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Enrolled(SectionId),
    Failed,
}

impl Registration {
    pub fn is_enrolled(self) -> bool {
        matches!(self, Registration::Enrolled(_))
    }

    /// The winning id, or the failure sentinel.
    pub fn as_u32(self) -> u32 {
        match self {
            Registration::Enrolled(uid) => uid.get(),
            Registration::Failed => FAILURE_SENTINEL,
        }
    }
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

impl Serialize for Registration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

/// Course label → registration result.
///
/// Ordered by label so reports are stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Outcome {
    entries: BTreeMap<String, Registration>,
}

impl Outcome {
    /// Outcome marking a single course as failed.
    pub fn failed(course: impl Into<String>) -> Self {
        let mut outcome = Self::default();
        outcome.record(course, Registration::Failed);
        outcome
    }

    /// Record a result under the merge rule: an existing enrollment is never
    /// replaced, a failure is upgraded by an enrollment.
    pub fn record(&mut self, course: impl Into<String>, result: Registration) {
        let course = course.into();
        match self.entries.get(&course) {
            Some(Registration::Enrolled(_)) => {}
            Some(Registration::Failed) if !result.is_enrolled() => {}
            _ => {
                self.entries.insert(course, result);
            }
        }
    }

    /// Fold `other` into `self` entry by entry.
    pub fn merge(&mut self, other: Outcome) {
        for (course, result) in other.entries {
            self.record(course, result);
        }
    }

    /// Merge any number of outcomes into one.
    pub fn merge_all(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        outcomes.into_iter().fold(Self::default(), |mut acc, o| {
            acc.merge(o);
            acc
        })
    }

    pub fn get(&self, course: &str) -> Option<Registration> {
        self.entries.get(course).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Registration)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enrolled_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_enrolled()).count()
    }
}

/// Renders one `<label> : <id-or-sentinel>` line per course.
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (course, result) in &self.entries {
            writeln!(f, "{course} : {result}")?;
        }
        Ok(())
    }
}
