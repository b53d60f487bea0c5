//! Browser login sessions: cached token reuse and DPoP-bound refresh.
//!
//! A login session is identified by its session ARN. The token for a session lives in
//! `<cache_dir>/<sha256hex(session)>.json`. [`LoginTokenRefresher::load_credentials`] returns the
//! cached credentials while they have more than [`REFRESH_THRESHOLD`] left; otherwise it rotates
//! the refresh token through the sign-in service and rewrites the file before returning.
//!
//! Concurrent refreshers for the same session are not coordinated. Both may spend the same
//! refresh token and the last writer wins the file.

pub mod client;
pub mod dpop;
pub mod token;

pub use client::*;
pub use dpop::*;
pub use token::*;

// self
use crate::{
	_prelude::*,
	credentials::{Credentials, ProvenanceCode, Secret},
	error::{AuthError, InvariantError},
	http::{HttpTransport, TransportErrorMapper},
	retry::RetryStrategy,
};

/// Remaining lifetime at or below which a token is refreshed.
pub const REFRESH_THRESHOLD: Duration = Duration::minutes(5);
/// Lifetime assumed when a refresh response omits `expiresIn`.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::seconds(900);

/// Refresh decision for a loaded token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
	/// More than [`REFRESH_THRESHOLD`] remains; use the cached credentials.
	Valid,
	/// The token expires within [`REFRESH_THRESHOLD`] (or already has).
	NearExpiry,
}
impl TokenState {
	/// Classifies `token` against `now`.
	pub fn of(token: &LoginToken, now: OffsetDateTime) -> Self {
		if token.time_until_expiry(now) <= REFRESH_THRESHOLD { Self::NearExpiry } else { Self::Valid }
	}
}

/// Loads, refreshes, and persists the token for one login session.
pub struct LoginTokenRefresher<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	session: String,
	token_url: Url,
	cache: TokenCache,
	client: SignInClient<C, M>,
	retry: RetryStrategy,
}
impl<C, M> LoginTokenRefresher<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a refresher for `session` that calls `token_url` when a refresh is due.
	pub fn new(
		session: impl Into<String>,
		token_url: Url,
		cache: TokenCache,
		client: SignInClient<C, M>,
		retry: RetryStrategy,
	) -> Self {
		Self { session: session.into(), token_url, cache, client, retry }
	}

	/// Returns credentials for the session, refreshing the cached token when it is near expiry.
	pub async fn load_credentials(&self) -> Result<Credentials> {
		let token = self.cache.load(&self.session).map_err(|source| {
			AuthError::LoginTokenUnavailable { session: self.session.clone(), source }
		})?;

		match TokenState::of(&token, OffsetDateTime::now_utc()) {
			TokenState::Valid => {
				tracing::debug!(expires_at = %token.access_token.expires_at, "using cached login token");

				to_credentials(&token)
			},
			TokenState::NearExpiry => {
				tracing::debug!(
					expires_at = %token.access_token.expires_at,
					"login token is near expiry; refreshing"
				);

				self.refresh(token).await.map_err(refresh_failure)
			},
		}
	}

	async fn refresh(&self, token: LoginToken) -> Result<Credentials> {
		let signer = DpopSigner::from_pem(token.dpop_key.expose())?;
		let request = RefreshRequest::new(&token.client_id, token.refresh_token.expose());
		let (client, url) = (&self.client, &self.token_url);
		let (signer, request) = (&signer, &request);
		let attempted = self
			.retry
			.execute(move || client.create_token(url, signer, request))
			.await
			.map_err(|failed| failed.into_error())?;

		tracing::debug!(attempts = attempted.attempts, "login token refreshed");

		let output = attempted.value.validate()?;
		let lifetime = output.expires_in.map(Duration::seconds).unwrap_or(DEFAULT_EXPIRES_IN);
		let now = OffsetDateTime::now_utc();
		let expires_at = now.checked_add(lifetime).ok_or(InvariantError::ExpirationOutOfRange)?;
		let mut updated = token;

		updated.access_token.access_key_id = output.access_key_id;
		updated.access_token.secret_access_key = Secret::new(output.secret_access_key);
		updated.access_token.session_token = Secret::new(output.session_token);
		updated.access_token.expires_at = truncate_to_millis(expires_at);
		updated.refresh_token = Secret::new(output.refresh_token);

		self.cache.save(&self.session, &updated)?;

		to_credentials(&updated)
	}
}
impl<C, M> Debug for LoginTokenRefresher<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginTokenRefresher")
			.field("session", &self.session)
			.field("token_url", &self.token_url.as_str())
			.field("cache", &self.cache)
			.finish()
	}
}

fn to_credentials(token: &LoginToken) -> Result<Credentials> {
	let credentials = token.credentials().build().map_err(InvariantError::from)?;

	Ok(credentials.tagged(ProvenanceCode::Login))
}

/// Access-denied reasons keep their remediation message; every other failure becomes a fatal
/// [`AuthError::LoginRefreshFailed`].
fn refresh_failure(error: Error) -> Error {
	let denied = matches!(
		error.root(),
		Error::Auth(
			AuthError::SessionExpired
				| AuthError::CredentialsChanged
				| AuthError::InsufficientPermissions
				| AuthError::AccessDenied { .. },
		)
	);

	if denied { error } else { AuthError::LoginRefreshFailed { source: Box::new(error) }.into() }
}

fn truncate_to_millis(instant: OffsetDateTime) -> OffsetDateTime {
	instant.replace_millisecond(instant.millisecond()).unwrap_or(instant)
}
