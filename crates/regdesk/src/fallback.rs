//! Fallback-chain registration over a course request tree.
//!
//! Each node lists candidate sections in priority order. Candidates are tried
//! one at a time until one is accepted; if none is, the node is recorded as
//! failed and its fallback nodes are tried in order, recursively. The walk is
//! independent of the network: the add step is injected as an [`Enroller`].
//!
//! Rejections and transport errors only spoil one candidate. An error that
//! ends the session stops the walk and is returned to the caller.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::PortalResult;
use crate::outcome::{Outcome, Registration, SectionId};
use crate::session::PortalSession;

/// One course with its candidate sections and ordered alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRequest {
    #[serde(rename = "course", alias = "label")]
    pub course: String,
    #[serde(rename = "uid", alias = "uids", default)]
    pub uids: Vec<SectionId>,
    #[serde(rename = "failure", alias = "fallbacks", default)]
    pub fallbacks: Vec<CourseRequest>,
}

impl CourseRequest {
    pub fn new(course: impl Into<String>, uids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            course: course.into(),
            uids: uids.into_iter().map(SectionId::new).collect(),
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: CourseRequest) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    /// Every node in the tree, depth-first in listed order.
    pub fn nodes(&self) -> Vec<&CourseRequest> {
        let mut out = vec![self];
        for fallback in &self.fallbacks {
            out.extend(fallback.nodes());
        }
        out
    }
}

/// Result of one add attempt that did not end the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The portal took the request.
    Accepted,
    /// The portal answered with error text.
    Rejected,
    /// The request never got a readable answer.
    TransportError(String),
}

/// The capability of trying to add one section.
///
/// `Err` is reserved for errors that end the session; they stop the walk and
/// are never retried.
#[async_trait]
pub trait Enroller: Send {
    async fn try_add(&mut self, uid: SectionId) -> PortalResult<Attempt>;
}

#[async_trait]
impl Enroller for PortalSession {
    async fn try_add(&mut self, uid: SectionId) -> PortalResult<Attempt> {
        match self.add(uid).await {
            Ok(true) => Ok(Attempt::Accepted),
            Ok(false) => Ok(Attempt::Rejected),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Attempt::TransportError(e.to_string())),
        }
    }
}

/// How hard to push on a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Extra attempts on the same candidate after a transport error.
    /// Rejections are never retried.
    pub transport_retries: u32,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            transport_retries: 1,
        }
    }
}

/// Walk `request` with `enroller` and return the outcome of every node reached.
///
/// Fallbacks of a node that succeeded are not visited.
pub async fn register<E>(
    request: &CourseRequest,
    enroller: &mut E,
    policy: &FallbackPolicy,
) -> PortalResult<Outcome>
where
    E: Enroller + ?Sized,
{
    let mut outcome = Outcome::default();
    register_into(request, enroller, policy, &mut outcome).await?;
    Ok(outcome)
}

/// Like [`register`], recording into `outcome` as the walk goes.
///
/// When a fatal error stops the walk, `outcome` keeps every result recorded
/// before it.
pub fn register_into<'a, E>(
    request: &'a CourseRequest,
    enroller: &'a mut E,
    policy: &'a FallbackPolicy,
    outcome: &'a mut Outcome,
) -> BoxFuture<'a, PortalResult<()>>
where
    E: Enroller + ?Sized,
{
    Box::pin(async move {
        if let Some(uid) = first_accepted(request, enroller, policy).await? {
            tracing::info!(course = %request.course, %uid, "registered");
            outcome.record(request.course.as_str(), Registration::Enrolled(uid));
            return Ok(());
        }

        tracing::info!(
            course = %request.course,
            fallbacks = request.fallbacks.len(),
            "no candidate accepted"
        );
        outcome.record(request.course.as_str(), Registration::Failed);

        for fallback in &request.fallbacks {
            register_into(fallback, &mut *enroller, policy, &mut *outcome).await?;
        }
        Ok(())
    })
}

async fn first_accepted<E>(
    request: &CourseRequest,
    enroller: &mut E,
    policy: &FallbackPolicy,
) -> PortalResult<Option<SectionId>>
where
    E: Enroller + ?Sized,
{
    for &uid in &request.uids {
        let mut retries = 0u32;
        loop {
            match enroller.try_add(uid).await? {
                Attempt::Accepted => return Ok(Some(uid)),
                Attempt::Rejected => {
                    tracing::debug!(course = %request.course, %uid, "candidate rejected");
                    break;
                }
                Attempt::TransportError(reason) if retries < policy.transport_retries => {
                    retries += 1;
                    tracing::warn!(course = %request.course, %uid, %reason, retries, "retrying candidate");
                }
                Attempt::TransportError(reason) => {
                    tracing::warn!(course = %request.course, %uid, %reason, "candidate failed");
                    break;
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use std::collections::{HashMap, HashSet, VecDeque};

    /// Scripted enroller: each uid answers from its queue, then repeats `Rejected`.
    /// Uids in `fatal` end the session instead.
    #[derive(Default)]
    struct ScriptedEnroller {
        script: HashMap<u32, VecDeque<Attempt>>,
        fatal: HashSet<u32>,
        calls: Vec<u32>,
    }

    impl ScriptedEnroller {
        fn answer(mut self, uid: u32, attempts: impl IntoIterator<Item = Attempt>) -> Self {
            self.script.insert(uid, attempts.into_iter().collect());
            self
        }

        fn accepting(uids: &[u32]) -> Self {
            uids.iter().fold(Self::default(), |e, &uid| {
                e.answer(uid, [Attempt::Accepted])
            })
        }
    }

    #[async_trait]
    impl Enroller for ScriptedEnroller {
        async fn try_add(&mut self, uid: SectionId) -> PortalResult<Attempt> {
            self.calls.push(uid.get());
            if self.fatal.contains(&uid.get()) {
                return Err(PortalError::NotAuthenticated);
            }
            Ok(self
                .script
                .get_mut(&uid.get())
                .and_then(VecDeque::pop_front)
                .unwrap_or(Attempt::Rejected))
        }
    }

    fn enrolled(uid: u32) -> Option<Registration> {
        Some(Registration::Enrolled(SectionId::new(uid)))
    }

    #[tokio::test]
    async fn test_second_candidate_wins() {
        let request = CourseRequest::new("CS101", [111, 222]);
        let mut enroller = ScriptedEnroller::accepting(&[222]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.get("CS101"), enrolled(222));
        assert_eq!(enroller.calls, vec![111, 222]);
    }

    #[tokio::test]
    async fn test_short_circuit_on_first_success() {
        let request = CourseRequest::new("CS101", [111, 222, 333])
            .with_fallback(CourseRequest::new("CS102", [444]));
        let mut enroller = ScriptedEnroller::accepting(&[111, 222, 444]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome.get("CS101"), enrolled(111));
        assert_eq!(outcome.get("CS102"), None);
        assert_eq!(enroller.calls, vec![111]);
    }

    #[tokio::test]
    async fn test_falls_back_after_exhaustion() {
        let request =
            CourseRequest::new("CS101", [111]).with_fallback(CourseRequest::new("CS102", [333]));
        let mut enroller = ScriptedEnroller::accepting(&[333]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome.get("CS101"), Some(Registration::Failed));
        assert_eq!(outcome.get("CS102"), enrolled(333));
        assert_eq!(outcome.len(), 2);
    }

    #[tokio::test]
    async fn test_fallbacks_run_in_order_and_all_fail() {
        let request = CourseRequest::new("A", [1])
            .with_fallback(CourseRequest::new("B", [2]).with_fallback(CourseRequest::new("C", [3])))
            .with_fallback(CourseRequest::new("D", [4]));
        let mut enroller = ScriptedEnroller::default();

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(enroller.calls, vec![1, 2, 3, 4]);
        assert_eq!(outcome.len(), 4);
        assert_eq!(outcome.enrolled_count(), 0);
    }

    #[tokio::test]
    async fn test_later_branch_cannot_overwrite_success() {
        // Both fallback branches target the same course label.
        let request = CourseRequest::new("CS101", [1])
            .with_fallback(CourseRequest::new("CS102", [2]))
            .with_fallback(CourseRequest::new("CS102", [3]));
        let mut enroller = ScriptedEnroller::accepting(&[2, 3]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome.get("CS102"), enrolled(2));
    }

    #[tokio::test]
    async fn test_fallback_success_upgrades_own_label() {
        let request = CourseRequest::new("CS101", [1]).with_fallback(CourseRequest::new("CS101", [2]));
        let mut enroller = ScriptedEnroller::accepting(&[2]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome.get("CS101"), enrolled(2));
        assert_eq!(outcome.len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_retried_then_skipped() {
        let request = CourseRequest::new("CS101", [111, 222]);
        let mut enroller = ScriptedEnroller::default()
            .answer(
                111,
                [
                    Attempt::TransportError("timeout".into()),
                    Attempt::TransportError("timeout".into()),
                ],
            )
            .answer(222, [Attempt::Accepted]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(enroller.calls, vec![111, 111, 222]);
        assert_eq!(outcome.get("CS101"), enrolled(222));
    }

    #[tokio::test]
    async fn test_transport_retry_can_succeed() {
        let request = CourseRequest::new("CS101", [111, 222]);
        let mut enroller = ScriptedEnroller::default().answer(
            111,
            [Attempt::TransportError("reset".into()), Attempt::Accepted],
        );

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        assert_eq!(outcome.get("CS101"), enrolled(111));
        assert_eq!(enroller.calls, vec![111, 111]);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let request = CourseRequest::new("CS101", [111]);
        let mut enroller =
            ScriptedEnroller::default().answer(111, [Attempt::TransportError("dns".into())]);
        let policy = FallbackPolicy {
            transport_retries: 0,
        };

        let outcome = register(&request, &mut enroller, &policy).await.unwrap();

        assert_eq!(enroller.calls, vec![111]);
        assert_eq!(outcome.get("CS101"), Some(Registration::Failed));
    }

    #[tokio::test]
    async fn test_one_entry_per_reached_label() {
        let request = CourseRequest::new("A", [1, 2])
            .with_fallback(CourseRequest::new("B", [3]).with_fallback(CourseRequest::new("C", [4])))
            .with_fallback(CourseRequest::new("D", [5]));
        let mut enroller = ScriptedEnroller::accepting(&[3, 5]);

        let outcome = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap();

        // C is a fallback of B, which succeeded, so it is never reached.
        let labels: Vec<&str> = outcome.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["A", "B", "D"]);
        assert_eq!(outcome.get("D"), enrolled(5));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_walk() {
        let request = CourseRequest::new("CS101", [111, 222])
            .with_fallback(CourseRequest::new("CS102", [333]));
        let mut enroller = ScriptedEnroller::accepting(&[222, 333]);
        enroller.fatal.insert(111);

        let err = register(&request, &mut enroller, &FallbackPolicy::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PortalError::NotAuthenticated));
        // Not retried, and neither the next candidate nor the fallback ran.
        assert_eq!(enroller.calls, vec![111]);
    }

    #[tokio::test]
    async fn test_fatal_error_keeps_earlier_results() {
        let request = CourseRequest::new("A", [1])
            .with_fallback(CourseRequest::new("B", [2]))
            .with_fallback(CourseRequest::new("C", [3]))
            .with_fallback(CourseRequest::new("D", [4]));
        let mut enroller = ScriptedEnroller::accepting(&[2, 4]);
        enroller.fatal.insert(3);

        let mut outcome = Outcome::default();
        let result =
            register_into(&request, &mut enroller, &FallbackPolicy::default(), &mut outcome).await;

        assert!(result.is_err());
        assert_eq!(enroller.calls, vec![1, 2, 3]);
        assert_eq!(outcome.get("A"), Some(Registration::Failed));
        assert_eq!(outcome.get("B"), enrolled(2));
        assert_eq!(outcome.get("C"), None);
        assert_eq!(outcome.get("D"), None);
    }

    #[test]
    fn test_deserialize_schedule_shape() {
        let json = r#"{
            "course": "CS101",
            "uid": [11111, 22222],
            "failure": [{"course": "CS102", "uid": [33333]}]
        }"#;
        let request: CourseRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.uids, vec![SectionId::new(11111), SectionId::new(22222)]);
        assert_eq!(request.fallbacks[0].course, "CS102");
        assert!(request.fallbacks[0].fallbacks.is_empty());
        assert_eq!(request.nodes().len(), 2);
    }
}
