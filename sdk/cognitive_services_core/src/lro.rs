//! Polling of long-running operations.
//!
//! Index creation, video ingestion, training iterations and batch translations
//! all follow the same shape: a triggering call returns a handle, and a status
//! endpoint is queried until the operation reaches a terminal state.
//! [`poll_until`] implements that loop once; each service supplies the status
//! check and a classifier, usually a [`StatusSet`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cognitive_services_core::lro::{poll_until, PollOptions, StatusSet};
//! # async fn check() -> cognitive_services_core::error::CognitiveResult<String> { Ok("Completed".into()) }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let statuses = StatusSet::new(["Running"], ["Completed"], ["Failed"]);
//! let status = poll_until("ingestion demo", &PollOptions::default(), check, |s: &String| {
//!     statuses.classify(s)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use crate::error::{CognitiveError, CognitiveResult};

/// Default time between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default maximum time to wait for a terminal state.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5 * 60);

/// Classification of one observed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Not finished; check again after the poll interval.
    Pending,
    /// Finished successfully.
    Succeeded,
    /// Finished unsuccessfully. Carries the vendor's failure detail.
    Failed(String),
}

/// Which terminal or non-terminal class a status string belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Pending,
    Succeeded,
    Failed,
}

/// Timing of a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between consecutive status checks.
    pub interval: Duration,
    /// Elapsed time after which a still-pending operation times out.
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl PollOptions {
    /// Create options with the given interval and maximum wait.
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    /// Replace the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the maximum wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// The status vocabulary of one vendor endpoint.
///
/// Status strings are matched exactly. A status outside all three sets is
/// classified as a failure naming the unexpected status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSet {
    pending: Vec<String>,
    succeeded: Vec<String>,
    failed: Vec<String>,
}

impl StatusSet {
    /// Build a status set from its pending, succeeded and failed members.
    pub fn new<P, S, F>(pending: P, succeeded: S, failed: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            succeeded: succeeded.into_iter().map(Into::into).collect(),
            failed: failed.into_iter().map(Into::into).collect(),
        }
    }

    /// Move `status` into `class`, removing it from any other set.
    pub fn treat_as(mut self, status: impl Into<String>, class: StatusClass) -> Self {
        let status = status.into();
        for set in [&mut self.pending, &mut self.succeeded, &mut self.failed] {
            set.retain(|s| *s != status);
        }
        match class {
            StatusClass::Pending => self.pending.push(status),
            StatusClass::Succeeded => self.succeeded.push(status),
            StatusClass::Failed => self.failed.push(status),
        }
        self
    }

    /// The class `status` belongs to, if any.
    pub fn class_of(&self, status: &str) -> Option<StatusClass> {
        if self.pending.iter().any(|s| s == status) {
            Some(StatusClass::Pending)
        } else if self.succeeded.iter().any(|s| s == status) {
            Some(StatusClass::Succeeded)
        } else if self.failed.iter().any(|s| s == status) {
            Some(StatusClass::Failed)
        } else {
            None
        }
    }

    /// Classify a status string.
    pub fn classify(&self, status: &str) -> PollState {
        self.classify_with_detail(status, None)
    }

    /// Classify a status string, attaching `detail` to a failure.
    pub fn classify_with_detail(&self, status: &str, detail: Option<&str>) -> PollState {
        match self.class_of(status) {
            Some(StatusClass::Pending) => PollState::Pending,
            Some(StatusClass::Succeeded) => PollState::Succeeded,
            Some(StatusClass::Failed) => PollState::Failed(match detail {
                Some(detail) if !detail.is_empty() => format!("status {status}: {detail}"),
                _ => format!("status {status}"),
            }),
            None => PollState::Failed(format!("unrecognized status {status:?}")),
        }
    }
}

/// Poll `check` until `classify` reports a terminal state or `max_wait` elapses.
///
/// `check` is called immediately, then once per `interval` while the observed
/// status is pending. The last sleep is shortened so that it ends on the
/// deadline, and no check is made once the deadline is reached. Errors from
/// `check` are returned as-is and end the loop; retrying individual requests is
/// the HTTP client's job.
///
/// # Errors
///
/// - [`CognitiveError::OperationFailed`] on the first failed observation.
/// - [`CognitiveError::PollTimeout`] once the elapsed time reaches `max_wait`
///   with the operation still pending.
/// - Any error returned by `check`.
///
/// # Tracing
///
/// Emits a span named `cognitive::lro::poll_until`.
#[tracing::instrument(
    name = "cognitive::lro::poll_until",
    skip(options, check, classify),
    fields(
        interval_ms = options.interval.as_millis() as u64,
        max_wait_ms = options.max_wait.as_millis() as u64,
    )
)]
pub async fn poll_until<T, F, Fut, C>(
    operation: &str,
    options: &PollOptions,
    mut check: F,
    mut classify: C,
) -> CognitiveResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CognitiveResult<T>>,
    C: FnMut(&T) -> PollState,
{
    let start = tokio::time::Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let observed = check().await?;

        match classify(&observed) {
            PollState::Succeeded => {
                tracing::debug!(attempt, "operation succeeded");
                return Ok(observed);
            }
            PollState::Failed(detail) => {
                tracing::debug!(attempt, %detail, "operation failed");
                return Err(CognitiveError::OperationFailed {
                    operation: operation.to_string(),
                    detail,
                });
            }
            PollState::Pending => {
                tracing::trace!(attempt, "operation still pending, waiting");
            }
        }

        let remaining = options.max_wait.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(timed_out(operation, attempt, start.elapsed()));
        }

        // Never sleep past the deadline.
        tokio::time::sleep(options.interval.min(remaining)).await;

        if start.elapsed() >= options.max_wait {
            return Err(timed_out(operation, attempt, start.elapsed()));
        }
    }
}

fn timed_out(operation: &str, attempt: u32, waited: Duration) -> CognitiveError {
    tracing::debug!(attempt, waited_ms = waited.as_millis() as u64, "operation timed out");
    CognitiveError::PollTimeout {
        operation: operation.to_string(),
        waited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn ingestion_statuses() -> StatusSet {
        StatusSet::new(
            ["NotStarted", "Running"],
            ["Completed"],
            ["Failed", "PartiallySucceeded"],
        )
    }

    /// A scripted status source recording when each check happened.
    #[derive(Clone)]
    struct Script {
        statuses: Arc<Mutex<VecDeque<&'static str>>>,
        last: &'static str,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    impl Script {
        fn new(statuses: &[&'static str]) -> Self {
            Self {
                statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
                last: statuses.last().copied().unwrap_or("Running"),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        async fn check(&self) -> CognitiveResult<String> {
            self.calls.lock().unwrap().push(Instant::now());
            let next = self.statuses.lock().unwrap().pop_front().unwrap_or(self.last);
            Ok(next.to_string())
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn status_set_classifies_members() {
        let set = ingestion_statuses();
        assert_eq!(set.classify("Running"), PollState::Pending);
        assert_eq!(set.classify("Completed"), PollState::Succeeded);
        assert_eq!(
            set.classify("Failed"),
            PollState::Failed("status Failed".into())
        );
    }

    #[test]
    fn status_set_rejects_unknown_status() {
        let state = ingestion_statuses().classify("Exploded");
        match state {
            PollState::Failed(detail) => assert!(detail.contains("Exploded"), "{detail}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn status_set_is_case_sensitive() {
        assert!(matches!(
            ingestion_statuses().classify("completed"),
            PollState::Failed(_)
        ));
    }

    #[test]
    fn treat_as_moves_status_between_sets() {
        let set = ingestion_statuses().treat_as("PartiallySucceeded", StatusClass::Succeeded);
        assert_eq!(set.classify("PartiallySucceeded"), PollState::Succeeded);
        assert_eq!(set.class_of("PartiallySucceeded"), Some(StatusClass::Succeeded));
        assert_eq!(set.classify("Failed"), PollState::Failed("status Failed".into()));
    }

    #[test]
    fn failure_detail_is_attached() {
        let state = ingestion_statuses().classify_with_detail("Failed", Some("quota exceeded"));
        assert_eq!(state, PollState::Failed("status Failed: quota exceeded".into()));
    }

    #[test]
    fn default_options_match_ingestion_loop() {
        let options = PollOptions::default();
        assert_eq!(options.interval, secs(5));
        assert_eq!(options.max_wait, secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_pending_observations() {
        let script = Script::new(&["Running", "Running", "Completed"]);
        let set = ingestion_statuses();
        let start = Instant::now();

        let status = poll_until(
            "ingestion video-1",
            &PollOptions::new(secs(1), secs(10)),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect("should succeed");

        assert_eq!(status, "Completed");
        assert_eq!(script.call_times().len(), 3);
        assert_eq!(start.elapsed(), secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_immediately_without_sleeping() {
        let script = Script::new(&["Failed", "Completed"]);
        let set = ingestion_statuses();
        let start = Instant::now();

        let err = poll_until(
            "ingestion video-1",
            &PollOptions::new(secs(1), secs(10)),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect_err("should fail");

        match err {
            CognitiveError::OperationFailed { operation, detail } => {
                assert_eq!(operation, "ingestion video-1");
                assert!(detail.contains("Failed"));
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
        assert_eq!(script.call_times().len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_max_wait() {
        let script = Script::new(&["Running"]);
        let set = ingestion_statuses();
        let start = Instant::now();

        let err = poll_until(
            "training iteration",
            &PollOptions::new(secs(1), secs(3)),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect_err("should time out");

        match err {
            CognitiveError::PollTimeout { operation, waited } => {
                assert_eq!(operation, "training iteration");
                assert!(waited >= secs(3));
            }
            other => panic!("expected PollTimeout, got {other:?}"),
        }
        // Checks at t=0,1,2; the third sleep ends on the deadline.
        assert_eq!(script.call_times().len(), 3);
        assert_eq!(start.elapsed(), secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_clamped_to_the_deadline() {
        let script = Script::new(&["Running"]);
        let set = ingestion_statuses();
        let start = Instant::now();

        let err = poll_until(
            "slow interval",
            &PollOptions::new(secs(60), secs(3)),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect_err("should time out");

        match err {
            CognitiveError::PollTimeout { waited, .. } => assert_eq!(waited, secs(3)),
            other => panic!("expected PollTimeout, got {other:?}"),
        }
        assert_eq!(script.call_times().len(), 1);
        assert_eq!(start.elapsed(), secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_wait_checks_once() {
        let script = Script::new(&["Running"]);
        let set = ingestion_statuses();

        let err = poll_until(
            "batch",
            &PollOptions::new(secs(1), Duration::ZERO),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect_err("should time out");

        assert!(matches!(err, CognitiveError::PollTimeout { .. }));
        assert_eq!(script.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_checks_are_at_least_one_interval_apart() {
        let script = Script::new(&["NotStarted", "Running", "Running", "Running", "Completed"]);
        let set = ingestion_statuses();

        poll_until(
            "ingestion video-2",
            &PollOptions::new(Duration::from_millis(250), secs(60)),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect("should succeed");

        let times = script.call_times();
        assert_eq!(times.len(), 5);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_propagate_without_retry() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();

        let err = poll_until(
            "index video-index",
            &PollOptions::new(secs(1), secs(10)),
            move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<String, _>(CognitiveError::http(500, "boom"))
                }
            },
            |_: &String| PollState::Pending,
        )
        .await
        .expect_err("should propagate");

        assert_eq!(err.status(), Some(500));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_polls_are_independent() {
        let fast = Script::new(&["Running", "Completed"]);
        let slow = Script::new(&["Running", "Running", "Running", "Completed"]);
        let broken = Script::new(&["Running", "Failed"]);
        let set = ingestion_statuses();
        let options = PollOptions::new(secs(1), secs(10));

        let results = futures::future::join_all([&fast, &slow, &broken].map(|script| {
            let set = &set;
            let options = &options;
            async move {
                poll_until("fan-out", options, || script.check(), |s: &String| {
                    set.classify(s)
                })
                .await
            }
        }))
        .await;

        assert_eq!(results[0].as_deref().ok(), Some("Completed"));
        assert_eq!(results[1].as_deref().ok(), Some("Completed"));
        assert!(matches!(
            results[2],
            Err(CognitiveError::OperationFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn poll_emits_span_and_pending_events() {
        let script = Script::new(&["Running", "Completed"]);
        let set = ingestion_statuses();

        poll_until(
            "ingestion traced",
            &PollOptions::new(secs(1), secs(10)),
            || script.check(),
            |s: &String| set.classify(s),
        )
        .await
        .expect("should succeed");

        assert!(logs_contain("cognitive::lro::poll_until"));
        assert!(logs_contain("operation succeeded"));
    }
}
