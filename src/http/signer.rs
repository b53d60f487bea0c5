//! Request signing contract for calls authenticated with resolved credentials.

// self
use crate::{_prelude::*, credentials::Credentials, http::HttpRequest};

/// Signs an outbound request with source credentials before dispatch.
///
/// Wire-level signing (SigV4 or similar) lives outside this crate. Implementations receive a fully
/// built request and return it with authorization headers attached. The resolver calls the signer
/// once per attempt, so time-dependent signatures stay fresh across retries.
pub trait RequestSigner
where
	Self: Send + Sync,
{
	/// Attaches authorization derived from `credentials` for `service` in `region`.
	fn sign(
		&self,
		request: HttpRequest,
		credentials: &Credentials,
		service: &str,
		region: &str,
	) -> Result<HttpRequest>;
}
impl<F> RequestSigner for F
where
	F: Fn(HttpRequest, &Credentials, &str, &str) -> Result<HttpRequest> + Send + Sync,
{
	fn sign(
		&self,
		request: HttpRequest,
		credentials: &Credentials,
		service: &str,
		region: &str,
	) -> Result<HttpRequest> {
		self(request, credentials, service, region)
	}
}
