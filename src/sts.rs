//! Role assumption through the security token service.
//!
//! [`RoleAssumer`] turns an assume-role profile into credentials: it resolves the source
//! credentials (another profile or a named provider), builds [`AssumeRoleParams`] from the
//! profile, asks the caller for an MFA code when `mfa_serial` is set, and calls `AssumeRole`
//! through the shared [`RetryStrategy`].

pub mod client;

pub use client::*;

// self
use crate::{
	_prelude::*,
	credentials::{Credentials, ProvenanceCode, Secret},
	error::{ConfigError, InvariantError},
	obs::{self, ResolveKind, ResolveOutcome, ResolveSpan},
	profile::{CredentialSource, Profile, ProfileSet, RoleSource, VisitedProfiles, keys},
	provider::{MfaCodeProvider, ProvideFuture, ProviderContext, TerminalProviders},
	retry::RetryStrategy,
};

/// Session lifetime requested when a profile has no `duration_seconds`.
pub const DEFAULT_DURATION_SECONDS: u32 = 3_600;

/// Boxed future returned by [`StsClient::assume_role`].
pub type AssumeRoleFuture<'a> =
	Pin<Box<dyn Future<Output = Result<AssumeRoleOutput>> + 'a + Send>>;

/// Input of one `AssumeRole` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssumeRoleParams {
	/// Role to assume.
	pub role_arn: String,
	/// Session name recorded by the service.
	pub role_session_name: String,
	/// External id required by the role's trust policy.
	pub external_id: Option<String>,
	/// Requested session lifetime in seconds.
	pub duration_seconds: u32,
	/// MFA device serial number.
	pub serial_number: Option<String>,
	/// One-time code for `serial_number`.
	pub token_code: Option<Secret>,
}
impl AssumeRoleParams {
	/// Reads the assume-role settings of `profile`.
	///
	/// The session name falls back to a millisecond timestamp and the duration to
	/// [`DEFAULT_DURATION_SECONDS`]. MFA fields are filled in separately.
	pub fn from_profile(
		profile_name: &str,
		profile: &Profile,
		role_arn: &str,
	) -> Result<Self, ConfigError> {
		let role_session_name = profile
			.get(keys::ROLE_SESSION_NAME)
			.filter(|name| !name.is_empty())
			.map(str::to_owned)
			.unwrap_or_else(synthetic_session_name);
		let duration_seconds = match profile.get(keys::DURATION_SECONDS) {
			None => DEFAULT_DURATION_SECONDS,
			Some(raw) => raw.trim().parse().ok().filter(|secs| *secs > 0).ok_or_else(|| {
				ConfigError::InvalidDurationSeconds {
					profile: profile_name.into(),
					value: raw.into(),
				}
			})?,
		};

		Ok(Self {
			role_arn: role_arn.into(),
			role_session_name,
			external_id: profile.get(keys::EXTERNAL_ID).map(str::to_owned),
			duration_seconds,
			serial_number: None,
			token_code: None,
		})
	}
}

/// Credentials block of an `AssumeRole` response, before validation.
#[derive(Clone, Debug, Default)]
pub struct AssumedRoleCredentials {
	/// Access key identifier.
	pub access_key_id: Option<String>,
	/// Secret access key.
	pub secret_access_key: Option<Secret>,
	/// Session token.
	pub session_token: Option<Secret>,
	/// Absolute expiry.
	pub expiration: Option<OffsetDateTime>,
	/// Credential scope.
	pub credential_scope: Option<String>,
}

/// Raw `AssumeRole` result.
#[derive(Clone, Debug, Default)]
pub struct AssumeRoleOutput {
	/// Issued credentials; `None` when the service omitted them.
	pub credentials: Option<AssumedRoleCredentials>,
	/// ARN of the assumed-role user.
	pub assumed_role_arn: Option<String>,
}
impl AssumeRoleOutput {
	/// Validates the output and builds credentials tagged with the token-service code.
	pub fn into_credentials(self, role_arn: &str) -> Result<Credentials> {
		let invalid = || InvariantError::InvalidAssumeRoleResponse { role_arn: role_arn.into() };
		let issued = self.credentials.ok_or_else(invalid)?;
		let (Some(access_key_id), Some(secret_access_key)) = (
			issued.access_key_id.filter(|v| !v.is_empty()),
			issued.secret_access_key.filter(|v| !v.expose().is_empty()),
		) else {
			return Err(invalid().into());
		};
		let credentials = Credentials::builder()
			.access_key_id(access_key_id)
			.secret_access_key(secret_access_key.expose())
			.session_token(issued.session_token.as_ref().map(Secret::expose))
			.expiration(issued.expiration)
			.credential_scope(issued.credential_scope)
			.account_id(self.assumed_role_arn.as_deref().and_then(account_id_from_arn))
			.build()
			.map_err(InvariantError::from)?;

		Ok(credentials.tagged(ProvenanceCode::StsAssumeRole))
	}
}

/// Region-bound token service client.
pub trait StsClient
where
	Self: Send + Sync,
{
	/// Calls `AssumeRole` authenticated with `credentials`.
	fn assume_role<'a>(
		&'a self,
		credentials: &'a Credentials,
		params: &'a AssumeRoleParams,
	) -> AssumeRoleFuture<'a>;
}

/// Builds the token service client the first time a role is assumed.
pub trait StsClientFactory
where
	Self: Send + Sync,
{
	/// Returns a client bound to `region`.
	fn build(&self, region: &str) -> Result<Arc<dyn StsClient>>;
}

/// Everything [`RoleAssumer::assume`] needs to know about the profile being resolved.
#[derive(Clone, Copy, Debug)]
pub struct AssumeRoleRequest<'a> {
	/// Profile being resolved.
	pub profile_name: &'a str,
	/// Its contents.
	pub profile: &'a Profile,
	/// All profiles, consulted to decide whether the source profile is a terminal alias.
	pub profiles: &'a ProfileSet,
	/// Region the profile resolves to.
	pub region: &'a str,
	/// Chain leading to `profile_name`.
	pub visited: &'a VisitedProfiles,
	/// Role to assume; `None` for a terminal alias.
	pub role_arn: Option<&'a str>,
	/// Where the source credentials come from.
	pub source: &'a RoleSource,
	/// Named providers for `credential_source`.
	pub providers: &'a TerminalProviders,
}

/// Assumes roles with source credentials resolved through the profile chain.
///
/// The token service client is built once per instance, on first use, for the region of the
/// first profile that needs it. Concurrent first calls wait for a single construction.
pub struct RoleAssumer {
	factory: Arc<dyn StsClientFactory>,
	client: OnceCell<Arc<dyn StsClient>>,
	retry: RetryStrategy,
	mfa: Option<Arc<dyn MfaCodeProvider>>,
}
impl RoleAssumer {
	/// Creates an assumer that builds its client through `factory`.
	pub fn new(factory: Arc<dyn StsClientFactory>, retry: RetryStrategy) -> Self {
		Self { factory, client: OnceCell::new(), retry, mfa: None }
	}

	/// Registers the callback that answers MFA challenges.
	pub fn with_mfa_code_provider(mut self, provider: Arc<dyn MfaCodeProvider>) -> Self {
		self.mfa = Some(provider);

		self
	}

	/// Registered MFA callback, if any.
	pub fn mfa_code_provider(&self) -> Option<Arc<dyn MfaCodeProvider>> {
		self.mfa.clone()
	}

	/// Returns `true` once the token service client has been built.
	pub fn is_client_ready(&self) -> bool {
		self.client.is_initialized()
	}

	/// Resolves the source credentials and, unless the profile is a terminal alias, exchanges them
	/// for role credentials.
	///
	/// `resolve` is the continuation used for `source_profile`; it receives the source name, the
	/// extended chain, and whether the source must be treated as an assume-role profile.
	pub async fn assume<'a, R>(
		&'a self,
		request: AssumeRoleRequest<'a>,
		resolve: R,
	) -> Result<Credentials>
	where
		R: FnOnce(&'a str, VisitedProfiles, bool) -> ProvideFuture<'a>,
	{
		let source = self.source_credentials(&request, resolve)?;
		let Some(role_arn) = request.role_arn else {
			tracing::debug!(profile = request.profile_name, "returning terminal alias credentials");

			return Ok(source.await?.tagged(ProvenanceCode::SourceProfile));
		};
		let mut params =
			AssumeRoleParams::from_profile(request.profile_name, request.profile, role_arn)?;

		if let Some(serial) = request.profile.get(keys::MFA_SERIAL) {
			let provider = self.mfa.as_ref().ok_or_else(|| ConfigError::MissingMfaProvider {
				profile: request.profile_name.into(),
			})?;
			let code = provider.mfa_code(serial).await?;

			params.serial_number = Some(serial.into());
			params.token_code = Some(Secret::new(code));
		}

		let source = source.await?;
		let client = self.client(request.region).await?;
		let (client, source_ref, params_ref) = (client.as_ref(), &source, &params);
		let attempted = self
			.retry
			.execute(move || client.assume_role(source_ref, params_ref))
			.await
			.map_err(|failed| failed.into_error())?;

		tracing::debug!(
			profile = request.profile_name,
			role_arn,
			attempts = attempted.attempts,
			"role assumed"
		);

		Ok(attempted.value.into_credentials(role_arn)?.tagged(ProvenanceCode::SourceProfile))
	}

	/// Prepares the source-credential future without polling it.
	fn source_credentials<'a, R>(
		&'a self,
		request: &AssumeRoleRequest<'a>,
		resolve: R,
	) -> Result<ProvideFuture<'a>>
	where
		R: FnOnce(&'a str, VisitedProfiles, bool) -> ProvideFuture<'a>,
	{
		match request.source {
			RoleSource::Profile(source) => {
				let visited = request.visited.visit(source)?;
				let forced = request.profiles.get(source).is_some_and(Profile::is_terminal_alias);

				Ok(resolve(source.as_str(), visited, forced))
			},
			RoleSource::Named(raw) => {
				let named = CredentialSource::parse(request.profile_name, raw)?;
				let provider = request.providers.named(named)?;
				let context = ProviderContext {
					profile_name: request.profile_name,
					profile: request.profile,
					region: request.region,
				};

				Ok(Box::pin(async move {
					let kind = ResolveKind::NamedProvider;
					let span = ResolveSpan::new(kind, "source_credentials", context.profile_name);

					tracing::debug!(
						profile = context.profile_name,
						source = named.as_str(),
						"resolving named source credentials"
					);
					obs::record_resolve_outcome(kind, ResolveOutcome::Attempt);

					let outcome = span.instrument(provider.provide(context)).await;
					let recorded =
						if outcome.is_ok() { ResolveOutcome::Success } else { ResolveOutcome::Failure };

					obs::record_resolve_outcome(kind, recorded);

					Ok(outcome?.tagged(ProvenanceCode::NamedProvider))
				}))
			},
		}
	}

	async fn client(&self, region: &str) -> Result<&Arc<dyn StsClient>> {
		self.client.get_or_try_init(|| async { self.factory.build(region) }).await
	}
}
impl Debug for RoleAssumer {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RoleAssumer")
			.field("client_ready", &self.is_client_ready())
			.field("mfa_configured", &self.mfa.is_some())
			.finish()
	}
}

/// Extracts the account id (fifth `:`-separated segment) from an ARN.
pub fn account_id_from_arn(arn: &str) -> Option<&str> {
	let segments: Vec<&str> = arn.split(':').collect();

	segments.get(4).copied().filter(|account| segments.len() > 4 && !account.is_empty())
}

fn synthetic_session_name() -> String {
	let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

	format!("credential-chain-{millis}")
}
