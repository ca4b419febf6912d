// Copyright 2026 regdesk contributors
// SPDX-License-Identifier: MIT

//! regdesk: automated section registration against a form-based portal.
//!
//! The portal has no API: every step is a page scrape followed by a synthetic
//! form submission carrying a rotating nonce and a semester token. This crate
//! holds the stateful [`PortalSession`], the fallback-chain algorithm that
//! walks a [`CourseRequest`] tree, and the [`Dispatcher`] that runs many trees
//! concurrently, one session per unit of work.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod http;
pub mod outcome;
pub mod protocol;
pub mod semester;
pub mod session;

pub use config::{PortalConfig, PortalUrls, DEFAULT_REQUEST_TIMEOUT};
pub use dispatch::{Dispatcher, PortalSessionFactory, SessionFactory};
pub use error::{PortalError, PortalResult};
pub use fallback::{register, register_into, Attempt, CourseRequest, Enroller, FallbackPolicy};
pub use outcome::{Outcome, Registration, SectionId};
pub use semester::SemesterToken;
pub use session::{Credentials, PortalSession, SessionState};
