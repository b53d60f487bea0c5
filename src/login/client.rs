//! Minimal sign-in service client for the `refresh_token` grant.

// crates.io
use oauth2::http::{
	HeaderMap, Method, Request,
	header::{ACCEPT, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	error::{AuthError, ConfigError, InvariantError},
	http::{self, HttpResponse, HttpTransport, TransportErrorMapper},
	login::dpop::{DpopSigner, htu_for},
	retry::{sanitize_error_code, service_error},
};

/// Label used in errors, spans, and metrics for sign-in calls.
pub const SIGN_IN_SERVICE: &str = "sign-in service";

const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";
const ACCESS_DENIED: &str = "AccessDeniedException";

/// Body of a `refresh_token` grant.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
	/// OAuth client identifier.
	pub client_id: &'a str,
	/// Refresh token presented for rotation.
	pub refresh_token: &'a str,
	/// Always `refresh_token`.
	pub grant_type: &'static str,
}
impl<'a> RefreshRequest<'a> {
	/// Builds a refresh grant for `client_id`.
	pub fn new(client_id: &'a str, refresh_token: &'a str) -> Self {
		Self { client_id, refresh_token, grant_type: "refresh_token" }
	}
}

/// Temporary credentials returned by a refresh.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedAccessToken {
	/// Access key identifier.
	pub access_key_id: Option<String>,
	/// Secret access key.
	pub secret_access_key: Option<String>,
	/// Session token.
	pub session_token: Option<String>,
}

/// Successful refresh response.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
	/// New temporary credentials.
	pub access_token: Option<RefreshedAccessToken>,
	/// Token type, normally `aws_sigv4`.
	pub token_type: Option<String>,
	/// Lifetime of the new credentials in seconds.
	pub expires_in: Option<i64>,
	/// Rotated refresh token.
	pub refresh_token: Option<String>,
	/// Identity token, when issued.
	pub id_token: Option<String>,
}
impl Debug for RefreshResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshResponse")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.finish_non_exhaustive()
	}
}

/// Fully validated refresh output.
#[derive(Clone)]
pub struct RefreshOutput {
	/// Access key identifier.
	pub access_key_id: String,
	/// Secret access key.
	pub secret_access_key: String,
	/// Session token.
	pub session_token: String,
	/// Rotated refresh token.
	pub refresh_token: String,
	/// Lifetime in seconds, when the service reported one.
	pub expires_in: Option<i64>,
}
impl RefreshResponse {
	/// Requires the four fields a refresh must return.
	pub fn validate(self) -> Result<RefreshOutput, InvariantError> {
		let access = self.access_token.unwrap_or_default();
		let fields = [
			("accessKeyId", access.access_key_id),
			("secretAccessKey", access.secret_access_key),
			("sessionToken", access.session_token),
			("refreshToken", self.refresh_token),
		];
		let missing: Vec<&'static str> = fields
			.iter()
			.filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
			.map(|(name, _)| *name)
			.collect();

		if !missing.is_empty() {
			return Err(InvariantError::RefreshResponseMissingFields { fields: missing });
		}

		let [access_key_id, secret_access_key, session_token, refresh_token] =
			fields.map(|(_, value)| value.unwrap_or_default());

		Ok(RefreshOutput {
			access_key_id,
			secret_access_key,
			session_token,
			refresh_token,
			expires_in: self.expires_in,
		})
	}
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	#[serde(rename = "__type")]
	kind: Option<String>,
	error: Option<String>,
	#[serde(alias = "Message")]
	message: Option<String>,
}

/// Unauthenticated sign-in client that authorizes each call with a DPoP proof.
pub struct SignInClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> SignInClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client over a shared transport and error mapper.
	pub fn new(http_client: Arc<C>, transport_mapper: Arc<M>) -> Self {
		Self { http_client, transport_mapper }
	}

	/// Performs one `refresh_token` grant against `token_url`.
	///
	/// The DPoP proof is minted inside the call, so every retry carries a fresh `jti` and `iat`.
	pub async fn create_token(
		&self,
		token_url: &Url,
		signer: &DpopSigner,
		request: &RefreshRequest<'_>,
	) -> Result<RefreshResponse> {
		let proof = signer.proof(Method::POST.as_str(), &htu_for(token_url))?;
		let body = serde_json::to_vec(request).map_err(InvariantError::ProofEncoding)?;
		let http_request = Request::builder()
			.method(Method::POST)
			.uri(token_url.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.header("DPoP", proof)
			.body(body)
			.map_err(ConfigError::from)?;
		let (response, meta) = http::dispatch(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			SIGN_IN_SERVICE,
			http_request,
		)
		.await?;
		let status = response.status();

		if status.is_success() {
			let mut de = serde_json::Deserializer::from_slice(response.body());

			return serde_path_to_error::deserialize(&mut de).map_err(|source| {
				InvariantError::MalformedResponse {
					service: SIGN_IN_SERVICE,
					source,
					status: Some(status.as_u16()),
				}
				.into()
			});
		}

		Err(map_error_response(&response, meta.retry_after))
	}
}
impl<C, M> Clone for SignInClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: Arc::clone(&self.http_client),
			transport_mapper: Arc::clone(&self.transport_mapper),
		}
	}
}
impl<C, M> Debug for SignInClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SignInClient(..)")
	}
}

/// Turns a non-2xx sign-in response into a resolver error.
///
/// Access-denied reasons map to remediation messages; everything else is classified by code and
/// status.
fn map_error_response(response: &HttpResponse, retry_after: Option<Duration>) -> Error {
	let status = response.status().as_u16();
	let body: ErrorBody = serde_json::from_slice(response.body()).unwrap_or_default();
	let code = error_code(response.headers(), body.kind.as_deref());

	if code.as_deref() == Some(ACCESS_DENIED) {
		return access_denied(body.error.as_deref(), body.message.as_deref(), status).into();
	}

	service_error(SIGN_IN_SERVICE, status, code, body.message, retry_after)
}

fn access_denied(reason: Option<&str>, message: Option<&str>, status: u16) -> AuthError {
	match reason {
		Some("TOKEN_EXPIRED") => AuthError::SessionExpired,
		Some("USER_CREDENTIALS_CHANGED") => AuthError::CredentialsChanged,
		Some("INSUFFICIENT_PERMISSIONS") => AuthError::InsufficientPermissions,
		_ => AuthError::AccessDenied {
			message: message
				.filter(|m| !m.is_empty())
				.map(str::to_owned)
				.unwrap_or_else(|| format!("{ACCESS_DENIED} (HTTP {status})")),
		},
	}
}

fn error_code(headers: &HeaderMap, body_type: Option<&str>) -> Option<String> {
	headers
		.get(ERROR_TYPE_HEADER)
		.and_then(|value| value.to_str().ok())
		.or(body_type)
		.map(sanitize_error_code)
		.filter(|code| !code.is_empty())
		.map(str::to_owned)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{HeaderValue, StatusCode};
	// self
	use super::*;
	use crate::error::{Disposition, RetryKind};

	fn response(status: u16, error_type: Option<&str>, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).expect("Status should be valid.");

		if let Some(error_type) = error_type {
			response.headers_mut().insert(
				ERROR_TYPE_HEADER,
				HeaderValue::from_str(error_type).expect("Header value should be valid."),
			);
		}

		response
	}

	#[test]
	fn access_denied_reasons_map_to_remediation() {
		let expired = map_error_response(
			&response(400, Some(ACCESS_DENIED), r#"{"error":"TOKEN_EXPIRED","message":"x"}"#),
			None,
		);

		assert_eq!(expired.to_string(), "Your session has expired. Please reauthenticate.");

		let changed = map_error_response(
			&response(
				400,
				None,
				r#"{"__type":"AccessDeniedException","error":"USER_CREDENTIALS_CHANGED"}"#,
			),
			None,
		);

		assert!(matches!(changed, Error::Auth(AuthError::CredentialsChanged)));

		let other = map_error_response(
			&response(403, Some(ACCESS_DENIED), r#"{"error":"SOMETHING_NEW","message":"nope"}"#),
			None,
		);

		assert_eq!(
			other.to_string(),
			"Failed to refresh token: nope. Please re-authenticate using `aws login`."
		);
		assert_eq!(other.disposition(), Disposition::Fatal);
	}

	#[test]
	fn throttling_and_server_errors_are_retryable() {
		let throttled = map_error_response(
			&response(429, Some("TooManyRequestsError"), r#"{"message":"slow down"}"#),
			Some(Duration::seconds(1)),
		);

		assert_eq!(throttled.retry_kind(), Some(RetryKind::Throttling));
		assert_eq!(throttled.retry_after(), Some(Duration::seconds(1)));

		let internal = map_error_response(&response(500, Some("InternalServerException"), "{}"), None);

		assert_eq!(internal.retry_kind(), Some(RetryKind::ServerError));

		let invalid =
			map_error_response(&response(400, Some("ValidationException"), "not json"), None);

		assert_eq!(invalid.disposition(), Disposition::Fatal);
	}

	#[test]
	fn refresh_response_requires_all_fields() {
		let response: RefreshResponse = serde_json::from_str(
			r#"{"accessToken":{"accessKeyId":"AKIA","secretAccessKey":"s"},"expiresIn":900}"#,
		)
		.expect("Response fixture should parse.");
		let err = response.validate().err().expect("Incomplete responses should be rejected.");

		assert_eq!(
			err.to_string(),
			"Token refresh response missing required fields: sessionToken, refreshToken."
		);
	}
}
