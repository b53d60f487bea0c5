//! Resolver configuration: regions, endpoints, token cache location, and retry settings.
//!
//! Values the caller leaves unset fall back to the process environment when
//! [`ResolverConfigBuilder::build`] runs:
//!
//! - `AWS_PROFILE` selects the default profile (fallback `default`).
//! - `AWS_REGION` supplies the default region (fallback `us-east-1`).
//! - `AWS_LOGIN_CACHE_DIRECTORY` overrides the login token cache (fallback
//!   `$HOME/.aws/login/cache`).

// std
use std::{env, path::PathBuf};
// self
use crate::{_prelude::*, error::ConfigError};

/// Region used when neither the profile, the caller, nor the environment names one.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Random source returning values in `[0, 1)`, used to jitter backoff delays.
pub type Jitter = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Selects the retry strategy flavor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryMode {
	/// Quota-limited exponential backoff.
	#[default]
	Standard,
	/// Standard behavior plus a client-side token-bucket rate limiter.
	Adaptive,
}

/// Retry executor settings.
#[derive(Clone)]
pub struct RetryConfig {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Backoff base for non-throttling failures.
	pub base_delay: Duration,
	/// Backoff base for throttling failures.
	pub throttling_base_delay: Duration,
	/// Upper bound for a single computed delay.
	pub max_delay: Duration,
	/// Capacity the retry quota starts with and never exceeds.
	pub quota_capacity: u32,
	/// Capacity withdrawn for an ordinary retry.
	pub retry_cost: u32,
	/// Capacity withdrawn for a retry after a timeout.
	pub timeout_retry_cost: u32,
	/// Capacity returned after a success that needed no retry.
	pub no_retry_increment: u32,
	/// Strategy flavor.
	pub mode: RetryMode,
	jitter: Jitter,
}
impl RetryConfig {
	/// Replaces the jitter source; tests pin it to a constant.
	pub fn with_jitter(mut self, jitter: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
		self.jitter = Arc::new(jitter);

		self
	}

	/// Overrides the attempt budget.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Switches the strategy flavor.
	pub fn with_mode(mut self, mode: RetryMode) -> Self {
		self.mode = mode;

		self
	}

	/// Samples the jitter source.
	pub fn jitter(&self) -> f64 {
		(self.jitter)().clamp(0., 1.)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.max_attempts == 0 {
			return Err(ConfigError::InvalidRetryConfig { reason: "max_attempts must be at least 1" });
		}
		if self.base_delay.is_negative()
			|| self.throttling_base_delay.is_negative()
			|| self.max_delay.is_negative()
		{
			return Err(ConfigError::InvalidRetryConfig { reason: "delays must not be negative" });
		}
		if self.retry_cost > self.quota_capacity || self.timeout_retry_cost > self.quota_capacity {
			return Err(ConfigError::InvalidRetryConfig {
				reason: "retry costs must fit inside the quota capacity",
			});
		}

		Ok(())
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::milliseconds(100),
			throttling_base_delay: Duration::milliseconds(500),
			max_delay: Duration::seconds(20),
			quota_capacity: 500,
			retry_cost: 5,
			timeout_retry_cost: 10,
			no_retry_increment: 1,
			mode: RetryMode::Standard,
			jitter: Arc::new(rand::random::<f64>),
		}
	}
}
impl Debug for RetryConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryConfig")
			.field("max_attempts", &self.max_attempts)
			.field("base_delay", &self.base_delay)
			.field("throttling_base_delay", &self.throttling_base_delay)
			.field("max_delay", &self.max_delay)
			.field("quota_capacity", &self.quota_capacity)
			.field("retry_cost", &self.retry_cost)
			.field("timeout_retry_cost", &self.timeout_retry_cost)
			.field("no_retry_increment", &self.no_retry_increment)
			.field("mode", &self.mode)
			.finish()
	}
}

/// Immutable resolver settings.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
	/// Profile resolved when the caller does not name one.
	pub default_profile: String,
	/// Region used when a profile has no `region` key.
	pub region: String,
	/// Directory holding `<sha256>.json` login token files.
	pub login_cache_dir: PathBuf,
	/// Token service endpoint override; `None` uses the regional default.
	pub sts_endpoint: Option<Url>,
	/// Sign-in service endpoint override; `None` uses the regional default.
	pub sign_in_endpoint: Option<Url>,
	/// Retry executor settings shared by role assumption and login refresh.
	pub retry: RetryConfig,
}
impl ResolverConfig {
	/// Returns a builder seeded with no overrides.
	pub fn builder() -> ResolverConfigBuilder {
		ResolverConfigBuilder::default()
	}

	/// Builds a configuration purely from the environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::builder().build()
	}

	/// Picks the profile region, falling back to the configured default.
	pub fn region_for<'a>(&'a self, profile_region: Option<&'a str>) -> &'a str {
		profile_region.filter(|region| !region.is_empty()).unwrap_or(&self.region)
	}

	/// Token service endpoint for `region`.
	pub fn sts_endpoint_for(&self, region: &str) -> Result<Url, ConfigError> {
		match &self.sts_endpoint {
			Some(url) => Ok(url.clone()),
			None => parse_endpoint(&format!("https://sts.{region}.amazonaws.com/")),
		}
	}

	/// Sign-in token endpoint (`/v1/token`) for `region`.
	pub fn sign_in_token_url(&self, region: &str) -> Result<Url, ConfigError> {
		let base = match &self.sign_in_endpoint {
			Some(url) => url.clone(),
			None => parse_endpoint(&format!("https://{region}.signin.aws.amazon.com"))?,
		};

		base.join("/v1/token").map_err(|source| ConfigError::InvalidEndpoint {
			endpoint: base.to_string(),
			source,
		})
	}
}

/// Builder for [`ResolverConfig`].
#[derive(Clone, Debug, Default)]
pub struct ResolverConfigBuilder {
	default_profile: Option<String>,
	region: Option<String>,
	login_cache_dir: Option<PathBuf>,
	sts_endpoint: Option<String>,
	sign_in_endpoint: Option<String>,
	retry: Option<RetryConfig>,
}
impl ResolverConfigBuilder {
	/// Sets the profile used when callers do not name one.
	pub fn default_profile(mut self, profile: impl Into<String>) -> Self {
		self.default_profile = Some(profile.into());

		self
	}

	/// Sets the default region.
	pub fn region(mut self, region: impl Into<String>) -> Self {
		self.region = Some(region.into());

		self
	}

	/// Sets the login token cache directory.
	pub fn login_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.login_cache_dir = Some(dir.into());

		self
	}

	/// Overrides the token service endpoint.
	pub fn sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.sts_endpoint = Some(endpoint.into());

		self
	}

	/// Overrides the sign-in service endpoint.
	pub fn sign_in_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.sign_in_endpoint = Some(endpoint.into());

		self
	}

	/// Replaces the retry settings.
	pub fn retry(mut self, retry: RetryConfig) -> Self {
		self.retry = Some(retry);

		self
	}

	/// Validates overrides and fills the rest from the environment.
	pub fn build(self) -> Result<ResolverConfig, ConfigError> {
		let retry = self.retry.unwrap_or_default();

		retry.validate()?;

		let default_profile = self
			.default_profile
			.or_else(|| non_empty_env("AWS_PROFILE"))
			.unwrap_or_else(|| "default".into());
		let region = self
			.region
			.or_else(|| non_empty_env("AWS_REGION"))
			.unwrap_or_else(|| FALLBACK_REGION.into());
		let login_cache_dir = self.login_cache_dir.unwrap_or_else(default_login_cache_dir);
		let sts_endpoint = self.sts_endpoint.as_deref().map(parse_endpoint).transpose()?;
		let sign_in_endpoint = self.sign_in_endpoint.as_deref().map(parse_endpoint).transpose()?;

		Ok(ResolverConfig {
			default_profile,
			region,
			login_cache_dir,
			sts_endpoint,
			sign_in_endpoint,
			retry,
		})
	}
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint: raw.into(), source })
}

fn non_empty_env(key: &str) -> Option<String> {
	env::var(key).ok().filter(|value| !value.is_empty())
}

fn default_login_cache_dir() -> PathBuf {
	if let Some(dir) = non_empty_env("AWS_LOGIN_CACHE_DIRECTORY") {
		return PathBuf::from(dir);
	}

	let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")).unwrap_or_default();

	PathBuf::from(home).join(".aws").join("login").join("cache")
}
