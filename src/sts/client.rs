//! HTTP client for the token service's `AssumeRole` query action.

// crates.io
use oauth2::http::{
	Method, Request,
	header::{ACCEPT, CONTENT_TYPE},
};
use time::format_description::well_known::Rfc3339;
use url::form_urlencoded::Serializer;
// self
use crate::{
	_prelude::*,
	config::ResolverConfig,
	credentials::{Credentials, Secret},
	error::{ConfigError, InvariantError},
	http::{self, HttpResponse, HttpTransport, RequestSigner, TransportErrorMapper},
	retry::{sanitize_error_code, service_error},
	sts::{
		AssumeRoleFuture, AssumeRoleOutput, AssumeRoleParams, AssumedRoleCredentials, StsClient,
		StsClientFactory,
	},
};

/// Label used in errors, spans, and metrics for token service calls.
pub const STS_SERVICE: &str = "security token service";
/// Signing name passed to [`RequestSigner::sign`].
pub const STS_SIGNING_NAME: &str = "sts";

const API_VERSION: &str = "2011-06-15";

/// Query-protocol token service client bound to one region.
pub struct HttpStsClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	signer: Arc<dyn RequestSigner>,
	endpoint: Url,
	region: String,
}
impl<C, M> HttpStsClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client that signs every request for `region` and posts it to `endpoint`.
	pub fn new(
		http_client: Arc<C>,
		transport_mapper: Arc<M>,
		signer: Arc<dyn RequestSigner>,
		endpoint: Url,
		region: impl Into<String>,
	) -> Self {
		Self { http_client, transport_mapper, signer, endpoint, region: region.into() }
	}

	/// Endpoint the client posts to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Region used for signing.
	pub fn region(&self) -> &str {
		&self.region
	}

	async fn send(
		&self,
		credentials: &Credentials,
		params: &AssumeRoleParams,
	) -> Result<AssumeRoleOutput> {
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.endpoint.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
			.header(ACCEPT, "application/json")
			.body(encode_params(params).into_bytes())
			.map_err(ConfigError::from)?;
		let request = self.signer.sign(request, credentials, STS_SIGNING_NAME, &self.region)?;
		let (response, meta) = http::dispatch(
			self.http_client.as_ref(),
			self.transport_mapper.as_ref(),
			STS_SERVICE,
			request,
		)
		.await?;
		let status = response.status();

		if !status.is_success() {
			return Err(map_error_response(&response, meta.retry_after));
		}

		let mut de = serde_json::Deserializer::from_slice(response.body());
		let envelope: Envelope = serde_path_to_error::deserialize(&mut de).map_err(|source| {
			InvariantError::MalformedResponse {
				service: STS_SERVICE,
				source,
				status: Some(status.as_u16()),
			}
		})?;

		envelope.response.result.into_output()
	}
}
impl<C, M> StsClient for HttpStsClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn assume_role<'a>(
		&'a self,
		credentials: &'a Credentials,
		params: &'a AssumeRoleParams,
	) -> AssumeRoleFuture<'a> {
		Box::pin(self.send(credentials, params))
	}
}
impl<C, M> Debug for HttpStsClient<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpStsClient")
			.field("endpoint", &self.endpoint.as_str())
			.field("region", &self.region)
			.finish_non_exhaustive()
	}
}

/// Builds [`HttpStsClient`] instances on the configured transport.
pub struct HttpStsClientFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	signer: Arc<dyn RequestSigner>,
	config: Arc<ResolverConfig>,
}
impl<C, M> HttpStsClientFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a factory sharing the resolver's transport, signer, and endpoint settings.
	pub fn new(
		http_client: Arc<C>,
		transport_mapper: Arc<M>,
		signer: Arc<dyn RequestSigner>,
		config: Arc<ResolverConfig>,
	) -> Self {
		Self { http_client, transport_mapper, signer, config }
	}
}
impl<C, M> StsClientFactory for HttpStsClientFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn build(&self, region: &str) -> Result<Arc<dyn StsClient>> {
		let endpoint = self.config.sts_endpoint_for(region)?;

		tracing::debug!(region, endpoint = %endpoint, "building token service client");

		Ok(Arc::new(HttpStsClient::new(
			Arc::clone(&self.http_client),
			Arc::clone(&self.transport_mapper),
			Arc::clone(&self.signer),
			endpoint,
			region,
		)))
	}
}
impl<C, M> Debug for HttpStsClientFactory<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("HttpStsClientFactory(..)")
	}
}

#[derive(Deserialize)]
struct Envelope {
	#[serde(rename = "AssumeRoleResponse")]
	response: ResponseBody,
}

#[derive(Deserialize)]
struct ResponseBody {
	#[serde(rename = "AssumeRoleResult")]
	result: ResultBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultBody {
	credentials: Option<WireCredentials>,
	assumed_role_user: Option<WireAssumedRoleUser>,
}
impl ResultBody {
	fn into_output(self) -> Result<AssumeRoleOutput> {
		let credentials = self.credentials.map(WireCredentials::into_credentials).transpose()?;

		Ok(AssumeRoleOutput {
			credentials,
			assumed_role_arn: self.assumed_role_user.and_then(|user| user.arn),
		})
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCredentials {
	access_key_id: Option<String>,
	secret_access_key: Option<String>,
	session_token: Option<String>,
	expiration: Option<WireTimestamp>,
	credential_scope: Option<String>,
}
impl WireCredentials {
	fn into_credentials(self) -> Result<AssumedRoleCredentials, InvariantError> {
		Ok(AssumedRoleCredentials {
			access_key_id: self.access_key_id,
			secret_access_key: self.secret_access_key.map(Secret::new),
			session_token: self.session_token.map(Secret::new),
			expiration: self.expiration.map(WireTimestamp::into_datetime).transpose()?,
			credential_scope: self.credential_scope,
		})
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireAssumedRoleUser {
	arn: Option<String>,
}

/// JSON responses carry epoch seconds; some proxies re-encode them as RFC 3339 strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
	Epoch(f64),
	Text(String),
}
impl WireTimestamp {
	fn into_datetime(self) -> Result<OffsetDateTime, InvariantError> {
		match self {
			Self::Epoch(secs) => {
				let nanos = (secs * 1_000_000_000.).round();

				if !nanos.is_finite() {
					return Err(InvariantError::ExpirationOutOfRange);
				}

				OffsetDateTime::from_unix_timestamp_nanos(nanos as i128)
					.map_err(|_| InvariantError::ExpirationOutOfRange)
			},
			Self::Text(value) => OffsetDateTime::parse(&value, &Rfc3339)
				.map_err(|_| InvariantError::InvalidExpiration { service: STS_SERVICE, value }),
		}
	}
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
	#[serde(rename = "Error")]
	error: Option<ErrorDetail>,
	#[serde(rename = "__type")]
	kind: Option<String>,
	#[serde(alias = "Message")]
	message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDetail {
	code: Option<String>,
	message: Option<String>,
}

fn encode_params(params: &AssumeRoleParams) -> String {
	let mut form = Serializer::new(String::new());

	form.append_pair("Action", "AssumeRole")
		.append_pair("Version", API_VERSION)
		.append_pair("RoleArn", &params.role_arn)
		.append_pair("RoleSessionName", &params.role_session_name)
		.append_pair("DurationSeconds", &params.duration_seconds.to_string());

	if let Some(external_id) = &params.external_id {
		form.append_pair("ExternalId", external_id);
	}
	if let Some(serial) = &params.serial_number {
		form.append_pair("SerialNumber", serial);
	}
	if let Some(code) = &params.token_code {
		form.append_pair("TokenCode", code.expose());
	}

	form.finish()
}

fn map_error_response(response: &HttpResponse, retry_after: Option<Duration>) -> Error {
	let status = response.status().as_u16();
	let body: ErrorBody = serde_json::from_slice(response.body()).unwrap_or_default();
	let (detail_code, detail_message) =
		body.error.map(|detail| (detail.code, detail.message)).unwrap_or_default();
	let code = detail_code
		.or(body.kind)
		.map(|raw| sanitize_error_code(&raw).to_owned())
		.filter(|code| !code.is_empty());

	service_error(STS_SERVICE, status, code, detail_message.or(body.message), retry_after)
}
