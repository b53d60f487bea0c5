//! Resolver-level error types shared across the profile chain, role assumption, and login
//! refresh.
//!
//! Every error decides its [`Disposition`] where it is constructed: transient service and
//! network failures are [`Disposition::Retryable`], everything else is
//! [`Disposition::Fatal`]. The retry executor consults [`Error::disposition`] and never
//! inspects messages.

// self
use crate::{_prelude::*, login::TokenCacheError};

/// Resolver-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for opaque sources.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Whether a failure may be attempted again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// Stop immediately and surface the error.
	Fatal,
	/// Safe to retry with backoff while the retry budget allows.
	Retryable,
}

/// Reason a retryable failure happened; drives backoff base and quota cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetryKind {
	/// Upstream asked the client to slow down.
	Throttling,
	/// Request was rejected because the local clock disagrees with the service.
	ClockSkew,
	/// Upstream returned a 5xx status.
	ServerError,
	/// The request timed out before a response arrived.
	Timeout,
	/// Connection-level failure (reset, refused, DNS).
	Network,
}
impl RetryKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RetryKind::Throttling => "throttling",
			RetryKind::ClockSkew => "clock_skew",
			RetryKind::ServerError => "server_error",
			RetryKind::Timeout => "timeout",
			RetryKind::Network => "network",
		}
	}
}
impl Display for RetryKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical resolver error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Malformed or missing profile configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A profile appeared twice in one assume-role chain.
	#[error(
		"Detected a cycle attempting to resolve credentials for profile {profile}. Profiles visited: {}.",
		chain.join(", ")
	)]
	Cycle {
		/// Profiles visited so far, in visiting order.
		chain: Vec<String>,
		/// Top-level profile whose resolution looped.
		profile: String,
	},
	/// Upstream rejected the caller's identity or grant.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, IO).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Broken key material, signature encoding, or response shape.
	#[error(transparent)]
	Invariant(#[from] InvariantError),
	/// Login token cache could not be written.
	#[error(transparent)]
	TokenCache(#[from] TokenCacheError),
	/// A terminal credential provider failed.
	#[error("Credential provider `{provider}` failed.")]
	Provider {
		/// Provider label.
		provider: &'static str,
		/// Provider-specific failure.
		#[source]
		source: BoxError,
	},
	/// A retryable failure persisted until the retry budget ran out.
	#[error("Request failed after {attempts} attempt(s) and {total_delay} of backoff: {source}")]
	RetriesExhausted {
		/// Number of attempts performed, including the first.
		attempts: u32,
		/// Sum of the backoff delays slept between attempts.
		total_delay: Duration,
		/// Error returned by the final attempt.
		#[source]
		source: Box<Error>,
	},
	/// A fatal failure ended an operation that had already been retried.
	#[error("Request failed after {attempts} attempt(s) and {total_delay} of backoff: {source}")]
	RetryAborted {
		/// Number of attempts performed, including the first.
		attempts: u32,
		/// Sum of the backoff delays slept between attempts.
		total_delay: Duration,
		/// Fatal error returned by the final attempt.
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Wraps a terminal provider failure.
	pub fn provider(provider: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Provider { provider, source: Box::new(src) }
	}

	/// Classifies the error for the retry executor.
	pub fn disposition(&self) -> Disposition {
		if self.retry_kind().is_some() { Disposition::Retryable } else { Disposition::Fatal }
	}

	/// Returns the retry reason for retryable errors.
	pub fn retry_kind(&self) -> Option<RetryKind> {
		match self {
			Self::Transient(e) => Some(e.kind()),
			Self::Transport(TransportError::Network { .. }) => Some(RetryKind::Network),
			_ => None,
		}
	}

	/// Returns the server-provided Retry-After hint, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Transient(TransientError::Endpoint { retry_after, .. }) => *retry_after,
			_ => None,
		}
	}

	/// Strips retry bookkeeping and returns the error produced by the final attempt.
	pub fn root(&self) -> &Error {
		match self {
			Self::RetriesExhausted { source, .. } | Self::RetryAborted { source, .. } =>
				source.root(),
			other => other,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Requested profile is absent from the profile set.
	#[error("Profile {profile} could not be found in the provided profile set.")]
	ProfileNotFound {
		/// Missing profile name.
		profile: String,
	},
	/// Profile matches none of the known credential shapes.
	#[error("Could not resolve credentials using profile: [{profile}] in configuration/credentials file(s).")]
	UnresolvableProfile {
		/// Profile name.
		profile: String,
	},
	/// `credential_source` names an unknown provider.
	#[error(
		"Unsupported credential source in profile {profile}. Got {source_name}, expected EcsContainer or Ec2InstanceMetadata or Environment."
	)]
	UnsupportedCredentialSource {
		/// Profile name.
		profile: String,
		/// Raw `credential_source` value.
		source_name: String,
	},
	/// `mfa_serial` is set but the caller registered no MFA callback.
	#[error(
		"Profile {profile} requires multi-factor authentication, but no MFA code callback was provided."
	)]
	MissingMfaProvider {
		/// Profile name.
		profile: String,
	},
	/// `duration_seconds` is not a positive integer.
	#[error("Profile {profile} has an invalid duration_seconds value `{value}`.")]
	InvalidDurationSeconds {
		/// Profile name.
		profile: String,
		/// Raw value.
		value: String,
	},
	/// Static keys are present but unusable.
	#[error("Profile {profile} contains invalid static credentials.")]
	InvalidStaticCredentials {
		/// Profile name.
		profile: String,
		/// Builder failure.
		#[source]
		source: CredentialsBuilderError,
	},
	/// Terminal provider required by a profile has not been registered.
	#[error("No {provider} credential provider is configured.")]
	ProviderNotConfigured {
		/// Provider label.
		provider: &'static str,
	},
	/// Endpoint URL cannot be parsed.
	#[error("Endpoint `{endpoint}` is invalid.")]
	InvalidEndpoint {
		/// Raw endpoint string.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Retry settings are inconsistent.
	#[error("Retry configuration is invalid: {reason}.")]
	InvalidRetryConfig {
		/// Description of the rejected setting.
		reason: &'static str,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Upstream rejections. None of these are retried.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Service answered with a non-retryable 4xx error.
	#[error("The {service} rejected the request with {code} (HTTP {status}): {message}.")]
	Rejected {
		/// Service label.
		service: &'static str,
		/// Service error code.
		code: String,
		/// Service error message.
		message: String,
		/// HTTP status.
		status: u16,
	},
	/// Sign-in reported `TOKEN_EXPIRED`.
	#[error("Your session has expired. Please reauthenticate.")]
	SessionExpired,
	/// Sign-in reported `USER_CREDENTIALS_CHANGED`.
	#[error(
		"Unable to refresh credentials because of a change in your password. Please reauthenticate with your new password."
	)]
	CredentialsChanged,
	/// Sign-in reported `INSUFFICIENT_PERMISSIONS`.
	#[error(
		"Unable to refresh credentials due to insufficient permissions. You may be missing permission for the 'CreateOAuth2Token' action."
	)]
	InsufficientPermissions,
	/// Sign-in denied access without a known reason code.
	#[error("Failed to refresh token: {message}. Please re-authenticate using `aws login`.")]
	AccessDenied {
		/// Service-provided message.
		message: String,
	},
	/// No usable login token exists for the session.
	#[error("Failed to load a token for session {session}, please re-authenticate using aws login.")]
	LoginTokenUnavailable {
		/// Login session identifier.
		session: String,
		/// Why the token could not be used.
		#[source]
		source: TokenCacheError,
	},
	/// Login refresh failed for a reason without a dedicated remediation.
	#[error("Failed to refresh token: {source}. Please re-authenticate using aws login.")]
	LoginRefreshFailed {
		/// Underlying failure.
		#[source]
		source: Box<Error>,
	},
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Service returned a retryable error response.
	#[error("The {service} returned a retryable {kind} error: {message}.")]
	Endpoint {
		/// Service label.
		service: &'static str,
		/// Retry reason assigned when the response was classified.
		kind: RetryKind,
		/// Service error code, when available.
		code: Option<String>,
		/// Service- or resolver-supplied message.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}
impl TransientError {
	/// Returns the retry reason.
	pub fn kind(&self) -> RetryKind {
		match self {
			Self::Endpoint { kind, .. } => *kind,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {service}.")]
	Network {
		/// Service label.
		service: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(service: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { service, source: Box::new(src) }
	}
}

/// Invariant violations. Always fatal.
#[derive(Debug, ThisError)]
pub enum InvariantError {
	/// Private key PEM cannot be decoded.
	#[error("DPoP private key is invalid.")]
	InvalidPrivateKey {
		/// Decoder failure.
		#[source]
		source: BoxError,
	},
	/// Public key export lacks an uncompressed EC point.
	#[error("Public key DER does not contain an uncompressed P-256 point.")]
	MissingPublicPoint,
	/// ECDSA signature DER is malformed.
	#[error("ECDSA signature DER is malformed: {reason}.")]
	MalformedSignature {
		/// Structural problem found while parsing.
		reason: &'static str,
	},
	/// Proof header JSON could not be encoded.
	#[error("Failed to encode the DPoP proof.")]
	ProofEncoding(#[source] serde_json::Error),
	/// AssumeRole succeeded but omitted key material.
	#[error("Invalid response from STS.assumeRole call with role {role_arn}.")]
	InvalidAssumeRoleResponse {
		/// Role that was assumed.
		role_arn: String,
	},
	/// Token refresh succeeded but omitted required fields.
	#[error("Token refresh response missing required fields: {}.", fields.join(", "))]
	RefreshResponseMissingFields {
		/// Names of the missing fields.
		fields: Vec<&'static str>,
	},
	/// Service returned a body that does not parse.
	#[error("The {service} returned malformed JSON.")]
	MalformedResponse {
		/// Service label.
		service: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Expiry arithmetic overflowed.
	#[error("Credential expiration is out of the supported range.")]
	ExpirationOutOfRange,
	/// Service returned an expiration that is neither epoch seconds nor RFC 3339.
	#[error("The {service} returned an unparseable expiration `{value}`.")]
	InvalidExpiration {
		/// Service label.
		service: &'static str,
		/// Raw value.
		value: String,
	},
	/// Credentials could not be assembled.
	#[error(transparent)]
	Credentials(#[from] CredentialsBuilderError),
}

/// Errors produced by [`crate::credentials::CredentialsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialsBuilderError {
	/// No access key id was provided.
	#[error("Access key id is required.")]
	MissingAccessKeyId,
	/// No secret access key was provided.
	#[error("Secret access key is required.")]
	MissingSecretAccessKey,
}
