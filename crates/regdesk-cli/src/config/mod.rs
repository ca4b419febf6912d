//! Schedule file loading, resolution, and validation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

use regdesk::{CourseRequest, Credentials, PortalConfig, PortalUrls};

pub const SCHEDULE_ENV: &str = "REGDESK_SCHEDULE";
pub const USERNAME_ENV: &str = "REGDESK_USERNAME";
pub const PASSWORD_ENV: &str = "REGDESK_PASSWORD";

const SCHEDULE_FILE: &str = "schedule.json";

/// Resolve the schedule file path.
pub fn resolve_schedule_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(SCHEDULE_ENV) {
        return PathBuf::from(env_path);
    }

    let cwd_schedule = PathBuf::from(SCHEDULE_FILE);
    if cwd_schedule.exists() {
        return cwd_schedule;
    }

    resolve_default_schedule_path()
}

fn resolve_default_schedule_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".regdesk")
        .join(SCHEDULE_FILE)
}

#[derive(Deserialize)]
struct RawAuth {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Deserialize)]
struct RawSchedule {
    #[serde(default)]
    auth: Option<RawAuth>,
    #[serde(default)]
    semester: Option<String>,
    #[serde(default)]
    schedule: Vec<CourseRequest>,
    #[serde(default)]
    portal: PortalUrls,
}

/// Credentials taken from the environment; each one overrides the file.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl EnvCredentials {
    pub fn from_env() -> Self {
        Self {
            username: std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty()),
            password: std::env::var(PASSWORD_ENV).ok().filter(|v| !v.is_empty()),
        }
    }
}

/// A loaded and validated schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub credentials: Credentials,
    pub semester: String,
    pub requests: Vec<CourseRequest>,
    pub portal: PortalUrls,
}

impl Schedule {
    /// Session settings for this schedule.
    pub fn portal_config(&self) -> PortalConfig {
        PortalConfig {
            urls: self.portal.clone(),
            season: self.semester.clone(),
            ..PortalConfig::default()
        }
    }
}

/// Read, parse, and validate the schedule at `path`.
pub fn load_schedule(path: &Path, env: &EnvCredentials) -> anyhow::Result<Schedule> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read schedule file {}", path.display()))?;
    parse_schedule(&text, env).with_context(|| format!("invalid schedule file {}", path.display()))
}

/// Parse and validate schedule JSON.
pub fn parse_schedule(text: &str, env: &EnvCredentials) -> anyhow::Result<Schedule> {
    let raw: RawSchedule = serde_json::from_str(text)?;

    let (file_user, file_password) = match raw.auth {
        Some(auth) => (auth.username, auth.password),
        None => (None, None),
    };
    let username = env.username.clone().or(file_user);
    let password = env.password.clone().or(file_password);
    let (Some(username), Some(password)) = (username, password) else {
        bail!("missing credentials: set \"auth\" in the schedule or {USERNAME_ENV} and {PASSWORD_ENV}");
    };

    validate_requests(&raw.schedule)?;

    Ok(Schedule {
        credentials: Credentials::new(username, password),
        semester: raw
            .semester
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| PortalConfig::default().season),
        requests: raw.schedule,
        portal: raw.portal,
    })
}

/// Reject trees the fallback walk cannot report on.
pub fn validate_requests(requests: &[CourseRequest]) -> anyhow::Result<()> {
    for root in requests {
        for node in root.nodes() {
            if node.course.trim().is_empty() {
                bail!("course label must not be empty");
            }
            if let Some(uid) = node.uids.iter().find(|uid| uid.is_sentinel()) {
                bail!("course {}: section id {uid} is reserved", node.course);
            }
            if node.uids.is_empty() && node.fallbacks.is_empty() {
                bail!("course {}: no section ids and no fallbacks", node.course);
            }
        }
    }
    Ok(())
}

/// Indented outline of the request trees.
pub fn describe_tree(requests: &[CourseRequest]) -> String {
    fn walk(out: &mut String, node: &CourseRequest, depth: usize) {
        let uids: Vec<String> = node.uids.iter().map(ToString::to_string).collect();
        out.push_str(&format!(
            "{:indent$}{} [{}]\n",
            "",
            node.course,
            uids.join(", "),
            indent = depth * 2
        ));
        for fallback in &node.fallbacks {
            walk(out, fallback, depth + 1);
        }
    }

    let mut out = String::new();
    for root in requests {
        walk(&mut out, root, 0);
    }
    out
}
