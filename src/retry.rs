//! Capacity-limited retry executor shared by role assumption and login refresh.
//!
//! Each [`RetryStrategy::execute`] call retries an operation while three conditions hold: the
//! attempt budget is not spent, the failure is [`Disposition::Retryable`], and the shared
//! [`RetryQuota`] can pay for the retry. Delays grow exponentially with full jitter and never
//! undercut a server-provided Retry-After hint. The adaptive mode additionally gates every attempt
//! on a [`RateLimiter`].
//!
//! [`Disposition::Retryable`]: crate::error::Disposition::Retryable

pub mod classify;
pub mod quota;
pub mod rate_limit;

pub use classify::*;
pub use quota::*;
pub use rate_limit::*;

// self
use crate::{
	_prelude::*,
	config::{RetryConfig, RetryMode},
	error::RetryKind,
};

/// Value or error annotated with retry bookkeeping.
#[derive(Debug)]
pub struct Attempted<T> {
	/// Operation output (or final error).
	pub value: T,
	/// Attempts performed, including the first.
	pub attempts: u32,
	/// Sum of the delays slept between attempts.
	pub total_delay: Duration,
}
impl Attempted<Error> {
	/// Converts a failed execution into the error surfaced to callers.
	///
	/// Retryable failures that ran out of budget become [`Error::RetriesExhausted`]. A fatal
	/// failure after earlier retries becomes [`Error::RetryAborted`]; a fatal first attempt
	/// propagates unchanged.
	pub fn into_error(self) -> Error {
		let Self { value, attempts, total_delay } = self;

		if value.retry_kind().is_some() {
			Error::RetriesExhausted { attempts, total_delay, source: Box::new(value) }
		} else if attempts > 1 {
			Error::RetryAborted { attempts, total_delay, source: Box::new(value) }
		} else {
			value
		}
	}
}

/// Standard (optionally adaptive) retry strategy.
///
/// Cloning shares the quota and rate limiter, so every clone draws from one retry budget.
#[derive(Clone)]
pub struct RetryStrategy {
	config: RetryConfig,
	quota: Arc<RetryQuota>,
	rate_limiter: Option<Arc<dyn RateLimiter>>,
}
impl RetryStrategy {
	/// Builds a strategy from `config`; adaptive mode installs a [`ClientRateLimiter`].
	pub fn new(config: RetryConfig) -> Self {
		let quota = Arc::new(RetryQuota::new(config.quota_capacity));
		let rate_limiter = match config.mode {
			RetryMode::Standard => None,
			RetryMode::Adaptive =>
				Some(Arc::new(ClientRateLimiter::default()) as Arc<dyn RateLimiter>),
		};

		Self { config, quota, rate_limiter }
	}

	/// Replaces the rate limiter, enabling adaptive gating with a caller-supplied policy.
	pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
		self.rate_limiter = Some(limiter);

		self
	}

	/// Shared retry quota.
	pub fn quota(&self) -> &RetryQuota {
		&self.quota
	}

	/// Runs `operation` until it succeeds or the retry policy gives up.
	pub async fn execute<T, F, Fut>(
		&self,
		mut operation: F,
	) -> Result<Attempted<T>, Attempted<Error>>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempts = 0;
		let mut total_delay = Duration::ZERO;
		let mut last_retry_cost = None;

		loop {
			if let Some(limiter) = &self.rate_limiter {
				limiter.acquire().await;
			}

			let outcome = operation().await;

			attempts += 1;

			if let Some(limiter) = &self.rate_limiter {
				limiter.update(RateSignal::from_outcome(&outcome));
			}

			let error = match outcome {
				Ok(value) => {
					self.quota.release(last_retry_cost.unwrap_or(self.config.no_retry_increment));

					return Ok(Attempted { value, attempts, total_delay });
				},
				Err(error) => error,
			};
			let Some(kind) = error.retry_kind() else {
				return Err(Attempted { value: error, attempts, total_delay });
			};

			if attempts >= self.config.max_attempts {
				tracing::debug!(attempts, kind = kind.as_str(), "retry attempts exhausted");

				return Err(Attempted { value: error, attempts, total_delay });
			}

			let cost = self.retry_cost(kind);

			if !self.quota.try_withdraw(cost) {
				tracing::debug!(attempts, cost, "retry quota exhausted");

				return Err(Attempted { value: error, attempts, total_delay });
			}

			last_retry_cost = Some(cost);

			let delay = self.backoff(kind, attempts, error.retry_after());

			tracing::debug!(
				attempts,
				kind = kind.as_str(),
				delay_ms = delay.whole_milliseconds() as u64,
				"retrying after a retryable failure"
			);
			tokio::time::sleep(delay.unsigned_abs()).await;

			total_delay += delay;
		}
	}

	fn retry_cost(&self, kind: RetryKind) -> u32 {
		match kind {
			RetryKind::Timeout => self.config.timeout_retry_cost,
			_ => self.config.retry_cost,
		}
	}

	/// `max(retry_after, floor(min(max_delay, jitter * 2^attempts * base)))`.
	fn backoff(&self, kind: RetryKind, attempts: u32, retry_after: Option<Duration>) -> Duration {
		let base = match kind {
			RetryKind::Throttling => self.config.throttling_base_delay,
			_ => self.config.base_delay,
		};
		let exponential = self.config.jitter()
			* 2_f64.powi(attempts.min(62) as i32)
			* base.whole_milliseconds() as f64;
		let capped = exponential.min(self.config.max_delay.whole_milliseconds() as f64).floor();
		let computed = Duration::milliseconds(capped as i64);

		retry_after.map_or(computed, |hint| hint.max(computed))
	}
}
impl Debug for RetryStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryStrategy")
			.field("config", &self.config)
			.field("quota", &self.quota)
			.field("adaptive", &self.rate_limiter.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::error::{AuthError, TransientError};

	fn failure(kind: RetryKind) -> Error {
		TransientError::Endpoint {
			service: "test service",
			kind,
			code: None,
			message: "try again".into(),
			status: Some(503),
			retry_after: None,
		}
		.into()
	}

	fn strategy(max_attempts: u32) -> RetryStrategy {
		RetryStrategy::new(
			RetryConfig::default().with_max_attempts(max_attempts).with_jitter(|| 0.0),
		)
	}

	#[tokio::test]
	async fn throttling_stops_at_max_attempts() {
		let strategy = strategy(3);
		let calls = &AtomicU32::new(0);
		let failed = strategy
			.execute(move || async move {
				calls.fetch_add(1, Ordering::SeqCst);

				Err::<(), _>(failure(RetryKind::Throttling))
			})
			.await
			.expect_err("Persistent throttling should exhaust the budget.");

		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert_eq!(failed.attempts, 3);

		match failed.into_error() {
			Error::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[tokio::test]
	async fn fatal_errors_are_not_retried() {
		let strategy = strategy(3);
		let calls = &AtomicU32::new(0);
		let failed = strategy
			.execute(move || async move {
				calls.fetch_add(1, Ordering::SeqCst);

				Err::<(), _>(AuthError::SessionExpired.into())
			})
			.await
			.expect_err("Fatal errors should surface immediately.");

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(matches!(failed.into_error(), Error::Auth(AuthError::SessionExpired)));
	}

	#[tokio::test]
	async fn fatal_error_after_retries_keeps_bookkeeping() {
		let strategy = strategy(3);
		let calls = &AtomicU32::new(0);
		let failed = strategy
			.execute(move || async move {
				if calls.fetch_add(1, Ordering::SeqCst) == 0 {
					Err::<(), _>(failure(RetryKind::ServerError))
				} else {
					Err(AuthError::SessionExpired.into())
				}
			})
			.await
			.expect_err("The second attempt fails fatally.");

		assert_eq!(calls.load(Ordering::SeqCst), 2);

		match failed.into_error() {
			Error::RetryAborted { attempts, total_delay, source } => {
				assert_eq!(attempts, 2);
				assert_eq!(total_delay, Duration::ZERO);
				assert!(matches!(*source, Error::Auth(AuthError::SessionExpired)));
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}

	#[tokio::test]
	async fn eventual_success_refunds_quota() {
		let strategy = strategy(3);
		let calls = &AtomicU32::new(0);
		let attempted = strategy
			.execute(move || async move {
				if calls.fetch_add(1, Ordering::SeqCst) == 0 {
					Err(failure(RetryKind::Timeout))
				} else {
					Ok("done")
				}
			})
			.await
			.expect("Second attempt should succeed.");

		assert_eq!(attempted.value, "done");
		assert_eq!(attempted.attempts, 2);
		assert_eq!(attempted.total_delay, Duration::ZERO);
		// Timeout retry withdrew 10 and the success refunded the same amount.
		assert_eq!(strategy.quota().available(), 500);
	}

	#[tokio::test]
	async fn empty_quota_blocks_retries() {
		let mut config = RetryConfig::default().with_jitter(|| 0.0);

		config.quota_capacity = 5;

		let strategy = RetryStrategy::new(config);
		let failed = strategy
			.execute(|| async { Err::<(), _>(failure(RetryKind::Timeout)) })
			.await
			.expect_err("A timeout retry costs more than the quota holds.");

		assert_eq!(failed.attempts, 1);
		assert_eq!(strategy.quota().available(), 5);
	}

	#[derive(Default)]
	struct RecordingLimiter {
		events: Mutex<Vec<String>>,
	}
	impl RecordingLimiter {
		fn push(&self, event: impl Into<String>) {
			self.events.lock().push(event.into());
		}
	}
	impl RateLimiter for RecordingLimiter {
		fn acquire(&self) -> RateLimitFuture<'_> {
			Box::pin(async move { self.push("acquire") })
		}

		fn update(&self, signal: RateSignal) {
			self.push(format!("update:{signal:?}"));
		}
	}

	#[tokio::test]
	async fn adaptive_mode_gates_and_reports_every_attempt() {
		let limiter = Arc::new(RecordingLimiter::default());
		let strategy = strategy(3).with_rate_limiter(limiter.clone());
		let (calls, recorder) = (&AtomicU32::new(0), limiter.as_ref());
		let attempted = strategy
			.execute(move || async move {
				recorder.push("call");

				if calls.fetch_add(1, Ordering::SeqCst) < 2 {
					Err(failure(RetryKind::Throttling))
				} else {
					Ok("done")
				}
			})
			.await
			.expect("Third attempt should succeed.");

		assert_eq!(attempted.attempts, 3);
		assert_eq!(
			*limiter.events.lock(),
			[
				"acquire",
				"call",
				"update:Throttled",
				"acquire",
				"call",
				"update:Throttled",
				"acquire",
				"call",
				"update:Success",
			]
		);
	}

	#[test]
	fn adaptive_mode_installs_the_client_rate_limiter() {
		let standard = RetryStrategy::new(RetryConfig::default());
		let adaptive = RetryStrategy::new(RetryConfig::default().with_mode(RetryMode::Adaptive));

		assert!(standard.rate_limiter.is_none());
		assert!(adaptive.rate_limiter.is_some());
	}

	#[test]
	fn backoff_is_capped_and_respects_retry_after() {
		let strategy = RetryStrategy::new(RetryConfig::default().with_jitter(|| 1.0));

		assert_eq!(
			strategy.backoff(RetryKind::ServerError, 1, None),
			Duration::milliseconds(200)
		);
		assert_eq!(
			strategy.backoff(RetryKind::Throttling, 2, None),
			Duration::milliseconds(2_000)
		);
		assert_eq!(strategy.backoff(RetryKind::ServerError, 30, None), Duration::seconds(20));
		assert_eq!(
			strategy.backoff(RetryKind::ServerError, 1, Some(Duration::seconds(3))),
			Duration::seconds(3)
		);
	}
}
