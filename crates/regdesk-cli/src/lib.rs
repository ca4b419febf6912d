//! regdesk command-line runner: schedule loading, logging, and reporting.

pub mod config;
pub mod logging;
pub mod report;

pub use config::{load_schedule, resolve_schedule_path, EnvCredentials, Schedule};
pub use logging::init_tracing;
pub use report::RunReport;
