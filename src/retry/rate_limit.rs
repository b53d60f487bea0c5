//! Client-side send-rate gating for the adaptive retry mode.
//!
//! [`ClientRateLimiter`] is a CUBIC token bucket: it stays disabled until the first throttling
//! response, then cuts the send rate by [`BETA`] and grows it back along a cubic curve as
//! successes arrive.

// std
use std::time::{SystemTime, UNIX_EPOCH};
// self
use crate::{_prelude::*, error::RetryKind};

const MIN_FILL_RATE: f64 = 0.5;
const MIN_CAPACITY: f64 = 1.0;
const SMOOTH: f64 = 0.8;
/// Multiplicative decrease applied to the send rate on throttling.
pub const BETA: f64 = 0.7;
const SCALE_CONSTANT: f64 = 0.4;

/// Future returned by [`RateLimiter::acquire`].
pub type RateLimitFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Clock returning seconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Outcome of one attempt as seen by a rate limiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateSignal {
	/// The attempt was not throttled.
	Success,
	/// The service asked the client to slow down.
	Throttled,
}
impl RateSignal {
	/// Derives the signal from an attempt outcome.
	pub fn from_outcome<T>(outcome: &Result<T>) -> Self {
		match outcome {
			Err(e) if e.retry_kind() == Some(RetryKind::Throttling) => Self::Throttled,
			_ => Self::Success,
		}
	}
}

/// Gate consulted before every attempt in adaptive mode.
pub trait RateLimiter
where
	Self: Send + Sync,
{
	/// Waits until the limiter allows one more request.
	fn acquire(&self) -> RateLimitFuture<'_>;

	/// Feeds the outcome of the attempt back into the limiter.
	fn update(&self, signal: RateSignal);
}

/// CUBIC token-bucket limiter.
pub struct ClientRateLimiter {
	state: Mutex<LimiterState>,
	clock: Clock,
}
impl ClientRateLimiter {
	/// Creates a limiter driven by `clock` instead of the system time.
	pub fn with_clock(clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
		let clock: Clock = Arc::new(clock);
		let now = clock();

		Self { state: Mutex::new(LimiterState::starting_at(now)), clock }
	}

	/// Returns `true` once a throttling signal switched the token bucket on.
	pub fn is_enabled(&self) -> bool {
		self.state.lock().enabled
	}

	/// Current fill rate in requests per second.
	pub fn fill_rate(&self) -> f64 {
		self.state.lock().fill_rate
	}

	/// Takes one token, or returns how long to wait before one is available.
	fn try_take(&self) -> Option<std::time::Duration> {
		let now = (self.clock)();
		let mut state = self.state.lock();

		if !state.enabled {
			return None;
		}

		state.refill(now);

		if state.current_capacity >= 1. {
			state.current_capacity -= 1.;

			None
		} else {
			let missing = 1. - state.current_capacity;

			Some(std::time::Duration::from_secs_f64(missing / state.fill_rate.max(MIN_FILL_RATE)))
		}
	}
}
impl Default for ClientRateLimiter {
	fn default() -> Self {
		Self::with_clock(unix_now)
	}
}
impl Debug for ClientRateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("ClientRateLimiter")
			.field("enabled", &state.enabled)
			.field("fill_rate", &state.fill_rate)
			.field("current_capacity", &state.current_capacity)
			.finish()
	}
}
impl RateLimiter for ClientRateLimiter {
	fn acquire(&self) -> RateLimitFuture<'_> {
		Box::pin(async move {
			while let Some(wait) = self.try_take() {
				tracing::trace!(wait_ms = wait.as_millis() as u64, "rate limiter is out of tokens");
				tokio::time::sleep(wait).await;
			}
		})
	}

	fn update(&self, signal: RateSignal) {
		let now = (self.clock)();

		self.state.lock().update_sending_rate(now, signal == RateSignal::Throttled);
	}
}

#[derive(Debug, Default)]
struct LimiterState {
	fill_rate: f64,
	max_capacity: f64,
	current_capacity: f64,
	last_timestamp: Option<f64>,
	measured_tx_rate: f64,
	last_tx_rate_bucket: f64,
	request_count: u64,
	enabled: bool,
	last_max_rate: f64,
	last_throttle_time: f64,
	time_window: f64,
	calculated_rate: f64,
}
impl LimiterState {
	fn starting_at(now: f64) -> Self {
		Self {
			max_capacity: f64::MAX,
			last_tx_rate_bucket: now.floor(),
			last_throttle_time: now,
			..Default::default()
		}
	}

	fn update_sending_rate(&mut self, now: f64, throttled: bool) {
		self.update_measured_rate(now);

		if throttled {
			let rate_to_use = if self.enabled {
				self.measured_tx_rate.min(self.fill_rate)
			} else {
				self.measured_tx_rate
			};

			self.last_max_rate = rate_to_use;
			self.calculate_time_window();
			self.last_throttle_time = now;
			self.calculated_rate = rate_to_use * BETA;
			self.enabled = true;
		} else {
			self.calculate_time_window();
			self.calculated_rate = self.cubic_success(now);
		}

		let new_rate = self.calculated_rate.min(2. * self.measured_tx_rate);

		self.update_fill_rate(now, new_rate);
	}

	fn refill(&mut self, now: f64) {
		if let Some(last) = self.last_timestamp {
			let fill_amount = (now - last).max(0.) * self.fill_rate;

			self.current_capacity = (self.current_capacity + fill_amount).min(self.max_capacity);
		}

		self.last_timestamp = Some(now);
	}

	fn update_fill_rate(&mut self, now: f64, new_rate: f64) {
		self.refill(now);

		self.fill_rate = new_rate.max(MIN_FILL_RATE);
		self.max_capacity = new_rate.max(MIN_CAPACITY);
		self.current_capacity = self.current_capacity.min(self.max_capacity);
	}

	fn update_measured_rate(&mut self, now: f64) {
		let time_bucket = (now * 2.).floor() / 2.;

		self.request_count += 1;

		if time_bucket > self.last_tx_rate_bucket {
			let current_rate = self.request_count as f64 / (time_bucket - self.last_tx_rate_bucket);

			self.measured_tx_rate = current_rate * SMOOTH + self.measured_tx_rate * (1. - SMOOTH);
			self.request_count = 0;
			self.last_tx_rate_bucket = time_bucket;
		}
	}

	fn calculate_time_window(&mut self) {
		self.time_window = (self.last_max_rate * (1. - BETA) / SCALE_CONSTANT).cbrt();
	}

	fn cubic_success(&self, now: f64) -> f64 {
		let dt = now - self.last_throttle_time - self.time_window;

		SCALE_CONSTANT * dt.powi(3) + self.last_max_rate
	}
}

fn unix_now() -> f64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_secs_f64()).unwrap_or(0.)
}
