//! Mapping from transport failures to resolver errors.

// crates.io
use oauth2::HttpClientError;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, RetryKind, TransientError, TransportError},
	http::ResponseMetadata,
};

/// Maps HTTP transport failures into resolver [`Error`] values.
///
/// The mapper decides retryability: it must return a transient or network error for failures
/// worth retrying and a fatal variant for everything else.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a resolver error.
	fn map_transport_error(
		&self,
		service: &'static str,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		service: &'static str,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(service, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(service, meta, message),
			_ => map_generic_transport_error(service, meta, "unknown transport failure"),
		}
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	service: &'static str,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Endpoint {
			service,
			kind: RetryKind::Timeout,
			code: None,
			message: "Request timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::network(service, err).into()
}

/// Treats opaque transport failures as retryable network errors.
pub fn map_generic_transport_error(
	service: &'static str,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	TransientError::Endpoint {
		service,
		kind: RetryKind::Network,
		code: None,
		message: format!("HTTP client error: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::error::Disposition;

	#[test]
	fn other_failures_are_retryable() {
		let err = ReqwestTransportErrorMapper.map_transport_error(
			"sign-in service",
			Some(&ResponseMetadata { status: None, retry_after: Some(Duration::seconds(3)) }),
			HttpClientError::Other("connection closed".into()),
		);

		assert_eq!(err.disposition(), Disposition::Retryable);
		assert_eq!(err.retry_after(), Some(Duration::seconds(3)));
	}

	#[test]
	fn io_failures_are_fatal() {
		let err = ReqwestTransportErrorMapper.map_transport_error(
			"security token service",
			None,
			HttpClientError::Io(std::io::Error::other("disk on fire")),
		);

		assert_eq!(err.disposition(), Disposition::Fatal);
	}
}
