//! Classification of service error responses into retryable and fatal failures.

// self
use crate::{
	_prelude::*,
	error::{AuthError, RetryKind, TransientError},
};

const THROTTLING_CODES: &[&str] = &[
	"Throttling",
	"ThrottlingException",
	"ThrottledException",
	"RequestThrottledException",
	"TooManyRequestsException",
	"TooManyRequestsError",
	"ProvisionedThroughputExceededException",
	"TransactionInProgressException",
	"RequestLimitExceeded",
	"BandwidthLimitExceeded",
	"LimitExceededException",
	"RequestThrottled",
	"SlowDown",
	"PriorRequestNotComplete",
	"EC2ThrottledException",
];
const CLOCK_SKEW_CODES: &[&str] = &[
	"AuthFailure",
	"InvalidSignatureException",
	"RequestExpired",
	"RequestInTheFuture",
	"RequestTimeTooSkewed",
	"SignatureDoesNotMatch",
];
const TIMEOUT_CODES: &[&str] = &["TimeoutError", "RequestTimeout", "RequestTimeoutException"];
const SERVER_ERROR_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Decides whether an error response is worth retrying.
///
/// Error codes take precedence over the status: a 400 carrying `Throttling` is a throttling
/// failure. Returns `None` for responses that must not be retried.
pub fn classify_response(status: u16, code: Option<&str>) -> Option<RetryKind> {
	if let Some(code) = code {
		if THROTTLING_CODES.contains(&code) {
			return Some(RetryKind::Throttling);
		}
		if CLOCK_SKEW_CODES.contains(&code) {
			return Some(RetryKind::ClockSkew);
		}
		if TIMEOUT_CODES.contains(&code) {
			return Some(RetryKind::Timeout);
		}
	}

	match status {
		429 => Some(RetryKind::Throttling),
		s if SERVER_ERROR_STATUSES.contains(&s) => Some(RetryKind::ServerError),
		_ => None,
	}
}

/// Builds the error for a non-success service response.
pub fn service_error(
	service: &'static str,
	status: u16,
	code: Option<String>,
	message: Option<String>,
	retry_after: Option<Duration>,
) -> Error {
	let message = message.filter(|m| !m.is_empty()).unwrap_or_else(|| format!("HTTP {status}"));

	match classify_response(status, code.as_deref()) {
		Some(kind) =>
			TransientError::Endpoint { service, kind, code, message, status: Some(status), retry_after }
				.into(),
		None => AuthError::Rejected {
			service,
			code: code.unwrap_or_else(|| "UnknownError".into()),
			message,
			status,
		}
		.into(),
	}
}

/// Strips the namespace prefix and detail suffix some services attach to error codes.
///
/// `com.amazon.coral#ThrottlingException:http://internal` becomes `ThrottlingException`.
pub fn sanitize_error_code(raw: &str) -> &str {
	let code = raw.split(':').next().unwrap_or(raw);

	code.rsplit('#').next().unwrap_or(code).trim()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Disposition;

	#[test]
	fn codes_win_over_statuses() {
		assert_eq!(classify_response(400, Some("Throttling")), Some(RetryKind::Throttling));
		assert_eq!(classify_response(403, Some("RequestExpired")), Some(RetryKind::ClockSkew));
		assert_eq!(classify_response(400, Some("RequestTimeout")), Some(RetryKind::Timeout));
		assert_eq!(classify_response(429, None), Some(RetryKind::Throttling));
		assert_eq!(classify_response(503, Some("ServiceUnavailable")), Some(RetryKind::ServerError));
		assert_eq!(classify_response(501, None), None);
		assert_eq!(classify_response(403, Some("AccessDenied")), None);
	}

	#[test]
	fn service_errors_pick_disposition() {
		let retryable = service_error(
			"security token service",
			400,
			Some("Throttling".into()),
			Some("Rate exceeded".into()),
			None,
		);

		assert_eq!(retryable.disposition(), Disposition::Retryable);

		let fatal = service_error(
			"security token service",
			403,
			Some("AccessDenied".into()),
			Some("Not authorized to perform sts:AssumeRole".into()),
			None,
		);

		assert_eq!(fatal.disposition(), Disposition::Fatal);
		assert!(fatal.to_string().contains("AccessDenied"));

		let unnamed = service_error("sign-in service", 400, None, None, None);

		assert!(unnamed.to_string().contains("HTTP 400"));
	}

	#[test]
	fn error_codes_are_sanitized() {
		assert_eq!(
			sanitize_error_code("com.amazon.coral#ThrottlingException:http://internal"),
			"ThrottlingException"
		);
		assert_eq!(sanitize_error_code("AccessDeniedException"), "AccessDeniedException");
	}
}
