//! Parallel dispatch of independent course request trees.
//!
//! Every top-level request becomes one unit of work running in its own tokio
//! task with its own freshly authenticated session. Units never share state;
//! the only shared result is the merged [`Outcome`], assembled after each unit
//! has finished. A unit that fails fatally reports its top-level course as
//! failed and leaves its siblings alone.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::Instrument;

use crate::config::PortalConfig;
use crate::error::{PortalError, PortalResult};
use crate::fallback::{register_into, CourseRequest, Enroller, FallbackPolicy};
use crate::outcome::{Outcome, Registration};
use crate::session::{Credentials, PortalSession};

/// Opens a ready-to-use session for one unit of work.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Enroller + 'static;

    /// Build, authenticate, and prepare a session for the unit handling `course`.
    async fn open(&self, course: &str) -> PortalResult<Self::Session>;
}

/// Opens real [`PortalSession`]s: new connection, login, semester choice.
#[derive(Debug, Clone)]
pub struct PortalSessionFactory {
    config: PortalConfig,
    credentials: Credentials,
}

impl PortalSessionFactory {
    pub fn new(config: PortalConfig, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

#[async_trait]
impl SessionFactory for PortalSessionFactory {
    type Session = PortalSession;

    async fn open(&self, course: &str) -> PortalResult<PortalSession> {
        tracing::debug!(course, "opening portal session");
        let mut session = PortalSession::new(&self.config, self.credentials.clone())?;
        session.login().await?;
        session.choose_semester(&self.config.season).await?;
        Ok(session)
    }
}

/// Fans course requests out over a bounded pool of independent units.
pub struct Dispatcher<F> {
    factory: Arc<F>,
    workers: usize,
    deadline: Option<Duration>,
    policy: FallbackPolicy,
}

impl<F: SessionFactory> Dispatcher<F> {
    /// Pool sized to the host's available parallelism.
    pub fn new(factory: F) -> Self {
        let workers = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(4);
        Self {
            factory: Arc::new(factory),
            workers,
            deadline: None,
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Give up on a unit after `deadline`, marking its course failed.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every request and merge the results.
    pub async fn dispatch(&self, requests: Vec<CourseRequest>) -> Outcome {
        tracing::info!(units = requests.len(), workers = self.workers, "dispatching");

        let outcomes: Vec<Outcome> = stream::iter(requests)
            .map(|request| {
                let factory = Arc::clone(&self.factory);
                let policy = self.policy.clone();
                let deadline = self.deadline;
                async move {
                    let course = request.course.clone();
                    let span = tracing::info_span!("unit", course = %course);
                    let handle =
                        tokio::spawn(run_unit(factory, request, policy, deadline).instrument(span));
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(%course, error = %e, "unit aborted");
                            Outcome::failed(course)
                        }
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let merged = Outcome::merge_all(outcomes);
        tracing::info!(
            courses = merged.len(),
            enrolled = merged.enrolled_count(),
            "dispatch complete"
        );
        merged
    }
}

async fn run_unit<F: SessionFactory>(
    factory: Arc<F>,
    request: CourseRequest,
    policy: FallbackPolicy,
    deadline: Option<Duration>,
) -> Outcome {
    let mut outcome = Outcome::default();
    let work = async {
        let mut session = factory.open(&request.course).await?;
        register_into(&request, &mut session, &policy, &mut outcome).await
    };

    let result = match deadline {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or(Err(PortalError::DeadlineExceeded(limit))),
        None => work.await,
    };

    // Results recorded before the failure stand; the top-level course is
    // marked failed unless it already has an entry.
    if let Err(e) = result {
        tracing::warn!(course = %request.course, error = %e, "unit failed");
        outcome.record(request.course.as_str(), Registration::Failed);
    }
    outcome
}
