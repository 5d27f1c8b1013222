//! Retry policy for transient failures.
//!
//! The [`RetryPolicy`] decides, after each failed attempt, whether the whole
//! send-and-translate step runs again and how long to wait first. Fatal
//! errors are rejected before anything else is considered.

use crate::{config::ServiceConfig, Error};
use http::{Method, StatusCode};
use rand::Rng;
use std::time::{Duration, Instant};

/// How long to wait between attempts.
///
/// # Examples
///
/// ```
/// use partner_client::retry::Backoff;
/// use std::time::Duration;
///
/// // 100ms, 200ms, 400ms, 800ms...
/// let exponential = Backoff::Exponential {
///     base_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     jitter: false,
/// };
/// assert_eq!(exponential.delay_for_attempt(3), Duration::from_millis(400));
///
/// let fixed = Backoff::Fixed(Duration::from_secs(1));
/// assert_eq!(fixed.delay_for_attempt(3), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
    ///
    /// With `jitter`, each delay is scaled by a random factor in `[0.5, 1.0]`.
    Exponential {
        base_delay: Duration,
        max_delay: Duration,
        jitter: bool,
    },

    /// The same delay before every retry.
    Fixed(Duration),
}

impl Backoff {
    /// Returns the delay after the given failed attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential {
                base_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
                let delay = base_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(jitter_factor)
                } else {
                    delay
                }
            }
            Backoff::Fixed(delay) => *delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

/// Outcome of a retry query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the attempt again after the delay.
    Retry(Duration),
    /// Surface the error.
    Stop,
}

/// Per-call retry bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    idempotent: bool,
    started: Instant,
    total_wait: Duration,
    last_error: Option<String>,
}

impl RetryState {
    /// Creates the state for a call, before its first attempt.
    pub fn new(idempotent: bool) -> Self {
        Self {
            attempt: 0,
            idempotent,
            started: Instant::now(),
            total_wait: Duration::ZERO,
            last_error: None,
        }
    }

    /// Creates the state for a call using `method`.
    pub fn for_method(method: &Method) -> Self {
        Self::new(is_idempotent(method))
    }

    /// Starts the next attempt and returns its 1-indexed number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Records a failed attempt.
    pub fn record_failure(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
    }

    /// Records a backoff wait.
    pub fn record_wait(&mut self, delay: Duration) {
        self.total_wait += delay;
    }

    /// Attempts started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time spent waiting between attempts.
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// Returns `true` for methods that are safe to repeat.
pub fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

/// Decides whether a failed attempt is retried.
///
/// Retries transient errors (connection failures, timeouts and the
/// configured HTTP statuses) until `max_attempts` attempts have been made.
///
/// POST and PATCH requests are retried like any other by default, which can
/// apply a create twice if the first attempt reached the service before
/// failing. [`retry_non_idempotent(false)`](Self::retry_non_idempotent)
/// turns that off.
///
/// # Examples
///
/// ```
/// use partner_client::RetryPolicy;
/// use partner_client::retry::Backoff;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_attempts(5)
///     .with_backoff(Backoff::Fixed(Duration::from_millis(250)))
///     .with_retryable_statuses([429, 503])
///     .retry_non_idempotent(false);
///
/// assert_eq!(policy.max_attempts(), 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable_statuses: Vec<u16>,
    retry_non_idempotent: bool,
    respect_retry_after: bool,
    max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            retryable_statuses: vec![429, 502, 503, 504],
            retry_non_idempotent: true,
            respect_retry_after: true,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Builds the policy described by the service configuration.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::default()
            .with_max_attempts(config.max_retry_attempts)
            .with_backoff(Backoff::Exponential {
                base_delay: Duration::from_millis(config.base_retry_delay_ms),
                max_delay: Duration::from_millis(config.max_retry_delay_ms),
                jitter: false,
            })
            .with_retryable_statuses(config.retryable_statuses.iter().copied())
    }

    /// Sets the total number of attempts, including the first. Zero is raised to one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replaces the set of HTTP statuses treated as transient.
    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Whether POST and PATCH requests are retried.
    pub fn retry_non_idempotent(mut self, retry: bool) -> Self {
        self.retry_non_idempotent = retry;
        self
    }

    /// Whether a `Retry-After` hint can lengthen the backoff delay, and the
    /// longest hint honored.
    pub fn respect_retry_after(mut self, respect: bool, max_wait: Duration) -> Self {
        self.respect_retry_after = respect;
        self.max_retry_after = max_wait;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Returns `true` if `status` is in the transient set.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_statuses.contains(&status.as_u16())
    }

    /// Decides what happens after the attempt recorded in `state` failed with `error`.
    pub fn should_retry(&self, state: &RetryState, error: &Error) -> RetryDecision {
        if error.is_fatal() {
            return RetryDecision::Stop;
        }

        if state.attempt() >= self.max_attempts || !error.is_transient(self) {
            return RetryDecision::Stop;
        }

        if !state.is_idempotent() && !self.retry_non_idempotent {
            return RetryDecision::Stop;
        }

        let mut delay = self.backoff.delay_for_attempt(state.attempt());
        if self.respect_retry_after {
            if let Some(hint) = error.retry_after() {
                delay = delay.max(hint.min(self.max_retry_after));
            }
        }

        RetryDecision::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::HeaderNames, fault::ServiceFault};
    use http::{HeaderMap, HeaderValue};

    fn unavailable() -> Error {
        ServiceFault::from_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            b"",
            &HeaderNames::default(),
        )
        .into()
    }

    fn after_attempts(method: Method, attempts: u32) -> RetryState {
        let mut state = RetryState::for_method(&method);
        for _ in 0..attempts {
            state.begin_attempt();
        }
        state
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let backoff = Backoff::Exponential {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: false,
        };

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(800));
        assert_eq!(backoff.delay_for_attempt(20), Duration::from_secs(10));
    }

    #[test]
    fn test_jittered_delay_stays_within_half_to_full() {
        let backoff = Backoff::Exponential {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: true,
        };

        for _ in 0..50 {
            let delay = backoff.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_transient_error_retried_until_max_attempts() {
        let policy = RetryPolicy::default();
        let error = unavailable();

        let mut delays = Vec::new();
        for attempt in 1..=3 {
            match policy.should_retry(&after_attempts(Method::GET, attempt), &error) {
                RetryDecision::Retry(delay) => delays.push(delay),
                RetryDecision::Stop => assert_eq!(attempt, 3),
            }
        }

        assert_eq!(delays.len(), 2);
        assert!(delays[0] < delays[1], "delays must grow: {:?}", delays);
    }

    #[test]
    fn test_fatal_error_is_never_retried() {
        let policy = RetryPolicy::default().with_max_attempts(10);
        let fatal = Error::Fatal("out of memory".to_string());

        assert_eq!(
            policy.should_retry(&after_attempts(Method::GET, 1), &fatal),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_non_transient_fault_is_not_retried() {
        let policy = RetryPolicy::default();
        let not_found: Error = ServiceFault::from_response(
            StatusCode::NOT_FOUND,
            &HeaderMap::new(),
            b"",
            &HeaderNames::default(),
        )
        .into();

        assert_eq!(
            policy.should_retry(&after_attempts(Method::GET, 1), &not_found),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_post_retried_by_default_but_can_be_disabled() {
        let error = unavailable();
        let state = after_attempts(Method::POST, 1);
        assert!(!state.is_idempotent());

        assert!(matches!(
            RetryPolicy::default().should_retry(&state, &error),
            RetryDecision::Retry(_)
        ));
        assert_eq!(
            RetryPolicy::default()
                .retry_non_idempotent(false)
                .should_retry(&state, &error),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_retry_after_lengthens_delay_up_to_cap() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        let throttled: Error = ServiceFault::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            &headers,
            b"",
            &HeaderNames::default(),
        )
        .into();
        let state = after_attempts(Method::GET, 1);

        assert_eq!(
            RetryPolicy::default().should_retry(&state, &throttled),
            RetryDecision::Retry(Duration::from_secs(5))
        );
        assert_eq!(
            RetryPolicy::default()
                .respect_retry_after(true, Duration::from_secs(2))
                .should_retry(&state, &throttled),
            RetryDecision::Retry(Duration::from_secs(2))
        );
        assert_eq!(
            RetryPolicy::default()
                .respect_retry_after(false, Duration::ZERO)
                .should_retry(&state, &throttled),
            RetryDecision::Retry(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_from_config() {
        let config = ServiceConfig {
            max_retry_attempts: 4,
            base_retry_delay_ms: 10,
            retryable_statuses: vec![500],
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);

        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.backoff().delay_for_attempt(2), Duration::from_millis(20));
        assert!(policy.is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!policy.is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_retry_state_tracks_attempts_and_waits() {
        let mut state = RetryState::for_method(&Method::DELETE);
        assert!(state.is_idempotent());
        assert_eq!(state.begin_attempt(), 1);
        state.record_failure(&Error::Timeout);
        state.record_wait(Duration::from_millis(5));
        assert_eq!(state.begin_attempt(), 2);
        state.record_wait(Duration::from_millis(10));

        assert_eq!(state.attempt(), 2);
        assert_eq!(state.total_wait(), Duration::from_millis(15));
        assert_eq!(state.last_error(), Some("Request timed out"));
    }
}
