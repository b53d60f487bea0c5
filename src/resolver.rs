//! Top-level credential resolver that walks profile chains.

// self
use crate::{
	_prelude::*,
	config::ResolverConfig,
	credentials::{Credentials, ProvenanceCode},
	error::ConfigError,
	http::{HttpTransport, RequestSigner, TransportErrorMapper},
	login::{LoginTokenRefresher, SignInClient, TokenCache},
	obs::{self, ResolveKind, ResolveOutcome, ResolveSpan},
	profile::{Profile, ProfileKind, ProfileSet, VisitedProfiles, keys},
	provider::{
		MfaCodeProvider, ProvideFuture, ProviderContext, SharedProvider, TerminalProviders,
	},
	retry::RetryStrategy,
	sts::{AssumeRoleRequest, HttpStsClientFactory, RoleAssumer, StsClientFactory},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Resolver specialized for the crate's default reqwest transport stack.
pub type ReqwestResolver = CredentialResolver<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Resolves named profiles into credentials.
///
/// The resolver owns the HTTP transport, the profile set, the terminal providers, and one
/// [`RoleAssumer`], so every resolution shares the same token service client and retry budget.
/// Each call to [`CredentialResolver::resolve`] starts a fresh visited chain; nothing else is
/// mutated between calls apart from the login token files.
pub struct CredentialResolver<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for token service and sign-in calls.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	profiles: Arc<ProfileSet>,
	config: Arc<ResolverConfig>,
	providers: TerminalProviders,
	retry: RetryStrategy,
	role_assumer: RoleAssumer,
}
impl<C, M> CredentialResolver<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a resolver that reuses the caller-provided transport + mapper pair.
	///
	/// `signer` authenticates `AssumeRole` calls with the source credentials.
	pub fn with_http_client(
		profiles: ProfileSet,
		config: ResolverConfig,
		signer: impl RequestSigner + 'static,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		let http_client = http_client.into();
		let transport_mapper = mapper.into();
		let config = Arc::new(config);
		let retry = RetryStrategy::new(config.retry.clone());
		let factory = HttpStsClientFactory::new(
			Arc::clone(&http_client),
			Arc::clone(&transport_mapper),
			Arc::new(signer),
			Arc::clone(&config),
		);
		let role_assumer = RoleAssumer::new(Arc::new(factory), retry.clone());

		Self {
			http_client,
			transport_mapper,
			profiles: Arc::new(profiles),
			config,
			providers: TerminalProviders::default(),
			retry,
			role_assumer,
		}
	}

	/// Installs the terminal providers consulted by named sources and external branches.
	pub fn with_providers(mut self, providers: TerminalProviders) -> Self {
		self.providers = providers;

		self
	}

	/// Registers the callback that answers MFA challenges during role assumption.
	pub fn with_mfa_code_provider(mut self, provider: impl MfaCodeProvider + 'static) -> Self {
		self.role_assumer = self.role_assumer.with_mfa_code_provider(Arc::new(provider));

		self
	}

	/// Replaces the token service client factory, for example with an SDK-backed client.
	///
	/// Any MFA callback registered earlier is kept.
	pub fn with_sts_client_factory(mut self, factory: impl StsClientFactory + 'static) -> Self {
		let mut role_assumer = RoleAssumer::new(Arc::new(factory), self.retry.clone());

		if let Some(mfa) = self.role_assumer.mfa_code_provider() {
			role_assumer = role_assumer.with_mfa_code_provider(mfa);
		}

		self.role_assumer = role_assumer;

		self
	}

	/// Profiles the resolver walks.
	pub fn profiles(&self) -> &ProfileSet {
		&self.profiles
	}

	/// Resolver settings.
	pub fn config(&self) -> &ResolverConfig {
		&self.config
	}

	/// Retry strategy shared by role assumption and login refresh.
	pub fn retry_strategy(&self) -> &RetryStrategy {
		&self.retry
	}

	/// Resolves the configured default profile.
	pub async fn resolve_default(&self) -> Result<Credentials> {
		self.resolve(&self.config.default_profile).await
	}

	/// Resolves `profile` into credentials.
	pub async fn resolve(&self, profile: &str) -> Result<Credentials> {
		let visited = VisitedProfiles::root(profile);
		let credentials = self.resolve_profile(profile, visited, false).await?;

		tracing::debug!(
			profile,
			provenance = ?credentials.provenance,
			expiration = ?credentials.expiration,
			"credentials resolved"
		);

		Ok(credentials)
	}

	/// One recursion step. `visited` already contains `name`.
	fn resolve_profile<'a>(
		&'a self,
		name: &'a str,
		visited: VisitedProfiles,
		forced_assume_role: bool,
	) -> ProvideFuture<'a> {
		Box::pin(async move {
			let profile = self.profiles.require(name)?;
			let kind = ProfileKind::classify(profile, visited.is_source(), forced_assume_role);
			let Some(resolve_kind) = ResolveKind::for_profile(&kind) else {
				return Err(ConfigError::UnresolvableProfile { profile: name.into() }.into());
			};
			let span = ResolveSpan::new(resolve_kind, "resolve_profile", name);

			obs::record_resolve_outcome(resolve_kind, ResolveOutcome::Attempt);

			let outcome = span.instrument(self.dispatch(name, profile, &kind, &visited)).await;
			let recorded =
				if outcome.is_ok() { ResolveOutcome::Success } else { ResolveOutcome::Failure };

			obs::record_resolve_outcome(resolve_kind, recorded);

			outcome
		})
	}

	async fn dispatch(
		&self,
		name: &str,
		profile: &Profile,
		kind: &ProfileKind,
		visited: &VisitedProfiles,
	) -> Result<Credentials> {
		let region = self.config.region_for(profile.get(keys::REGION));
		let context = ProviderContext { profile_name: name, profile, region };

		match kind {
			ProfileKind::Static => static_credentials(name, profile),
			ProfileKind::AssumeRole { role_arn, source } => {
				let request = AssumeRoleRequest {
					profile_name: name,
					profile,
					profiles: &self.profiles,
					region,
					visited,
					role_arn: role_arn.as_deref(),
					source,
					providers: &self.providers,
				};

				self.role_assumer
					.assume(request, |source, chain, forced| {
						self.resolve_profile(source, chain, forced)
					})
					.await
			},
			ProfileKind::WebIdentity =>
				provide(self.providers.web_identity()?, context, ProvenanceCode::ProfileWebIdentity)
					.await,
			ProfileKind::Process =>
				provide(self.providers.process()?, context, ProvenanceCode::ProfileProcess).await,
			ProfileKind::Sso { legacy } => {
				let code =
					if *legacy { ProvenanceCode::ProfileSsoLegacy } else { ProvenanceCode::ProfileSso };

				provide(self.providers.sso()?, context, code).await
			},
			ProfileKind::Login { session } => {
				let refresher = LoginTokenRefresher::new(
					session.as_str(),
					self.config.sign_in_token_url(region)?,
					TokenCache::new(&self.config.login_cache_dir),
					SignInClient::new(
						Arc::clone(&self.http_client),
						Arc::clone(&self.transport_mapper),
					),
					self.retry.clone(),
				);

				Ok(refresher.load_credentials().await?.tagged(ProvenanceCode::ProfileLogin))
			},
			ProfileKind::Unresolvable =>
				Err(ConfigError::UnresolvableProfile { profile: name.into() }.into()),
		}
	}
}
#[cfg(feature = "reqwest")]
impl CredentialResolver<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a resolver on the crate's default reqwest transport.
	pub fn new(
		profiles: ProfileSet,
		config: ResolverConfig,
		signer: impl RequestSigner + 'static,
	) -> Self {
		Self::with_http_client(
			profiles,
			config,
			signer,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> Debug for CredentialResolver<C, M>
where
	C: ?Sized + HttpTransport,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialResolver")
			.field("profiles", &self.profiles.len())
			.field("config", &self.config)
			.field("providers", &self.providers)
			.field("role_assumer", &self.role_assumer)
			.finish()
	}
}

fn static_credentials(name: &str, profile: &Profile) -> Result<Credentials> {
	let credentials = Credentials::builder()
		.access_key_id(profile.get(keys::ACCESS_KEY_ID).unwrap_or_default())
		.secret_access_key(profile.get(keys::SECRET_ACCESS_KEY).unwrap_or_default())
		.session_token(profile.get(keys::SESSION_TOKEN))
		.credential_scope(profile.get(keys::CREDENTIAL_SCOPE))
		.account_id(profile.get(keys::ACCOUNT_ID))
		.build()
		.map_err(|source| ConfigError::InvalidStaticCredentials { profile: name.into(), source })?;

	Ok(credentials.tagged(ProvenanceCode::Profile))
}

async fn provide(
	provider: &SharedProvider,
	context: ProviderContext<'_>,
	code: ProvenanceCode,
) -> Result<Credentials> {
	Ok(provider.provide(context).await?.tagged(code))
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		credentials::ProvenanceCode,
		error::InvariantError,
		http::HttpRequest,
		provider::{ProvideCredentials, provide_credentials_fn},
		sts::{AssumeRoleFuture, AssumeRoleParams, StsClient},
	};

	struct CountingFactory(Arc<AtomicU32>);
	impl StsClientFactory for CountingFactory {
		fn build(&self, _region: &str) -> Result<Arc<dyn StsClient>> {
			self.0.fetch_add(1, Ordering::SeqCst);

			Ok(Arc::new(UnreachableSts))
		}
	}

	struct UnreachableSts;
	impl StsClient for UnreachableSts {
		fn assume_role<'a>(
			&'a self,
			_: &'a Credentials,
			_: &'a AssumeRoleParams,
		) -> AssumeRoleFuture<'a> {
			Box::pin(async { panic!("No test in this module reaches the token service.") })
		}
	}

	fn passthrough_signer(
		request: HttpRequest,
		_: &Credentials,
		_: &str,
		_: &str,
	) -> Result<HttpRequest> {
		Ok(request)
	}

	fn resolver(profiles: ProfileSet, builds: Arc<AtomicU32>) -> ReqwestResolver {
		let config = test_config("https://127.0.0.1:9/", temp_cache_dir("resolver_unit"));

		CredentialResolver::with_http_client(
			profiles,
			config,
			passthrough_signer,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.with_sts_client_factory(CountingFactory(builds))
	}

	fn fixed(access_key_id: &'static str) -> impl ProvideCredentials + 'static {
		provide_credentials_fn(move |_| {
			Credentials::builder()
				.access_key_id(access_key_id)
				.secret_access_key("secret")
				.build()
				.map_err(|e| Error::from(InvariantError::from(e)))
		})
	}

	#[tokio::test]
	async fn static_profile_is_tagged() {
		let profiles = profile_set([(
			"default",
			vec![
				(keys::ACCESS_KEY_ID, "AKIA"),
				(keys::SECRET_ACCESS_KEY, "secret"),
				(keys::SESSION_TOKEN, "token"),
				(keys::ACCOUNT_ID, "123456789012"),
			],
		)]);
		let credentials = resolver(profiles, Default::default())
			.resolve("default")
			.await
			.expect("Static profile should resolve.");

		assert_eq!(credentials.access_key_id, "AKIA");
		assert_eq!(credentials.session_token.as_ref().map(|t| t.expose()), Some("token"));
		assert_eq!(credentials.account_id.as_deref(), Some("123456789012"));
		assert_eq!(credentials.provenance.iter().collect::<Vec<_>>(), [ProvenanceCode::Profile]);
	}

	#[tokio::test]
	async fn cycles_fail_before_any_network_call() {
		let builds = Arc::new(AtomicU32::new(0));
		let profiles = profile_set([
			("A", vec![(keys::ROLE_ARN, "arn:aws:iam::111:role/A"), (keys::SOURCE_PROFILE, "B")]),
			("B", vec![(keys::ROLE_ARN, "arn:aws:iam::111:role/B"), (keys::SOURCE_PROFILE, "A")]),
		]);
		let err = resolver(profiles, Arc::clone(&builds))
			.resolve("A")
			.await
			.expect_err("A and B reference each other.");

		match err {
			Error::Cycle { chain, profile } => {
				assert_eq!(chain, ["A", "B"]);
				assert_eq!(profile, "A");
			},
			other => panic!("Unexpected error: {other:?}."),
		}

		assert_eq!(builds.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn external_branches_use_registered_providers() {
		let profiles = profile_set([
			("web", vec![
				(keys::WEB_IDENTITY_TOKEN_FILE, "/tmp/token"),
				(keys::ROLE_ARN, "arn:aws:iam::111:role/Web"),
			]),
			("tool", vec![(keys::CREDENTIAL_PROCESS, "/usr/bin/creds")]),
			("portal", vec![(keys::SSO_SESSION, "corp"), (keys::SSO_ACCOUNT_ID, "111")]),
			("legacy", vec![(keys::SSO_START_URL, "https://corp.awsapps.com/start")]),
		]);
		let resolver = resolver(profiles, Default::default()).with_providers(
			TerminalProviders::default()
				.with_web_identity(fixed("AKIA-WEB"))
				.with_process(fixed("AKIA-PROC"))
				.with_sso(fixed("AKIA-SSO")),
		);
		let cases = [
			("web", "AKIA-WEB", ProvenanceCode::ProfileWebIdentity),
			("tool", "AKIA-PROC", ProvenanceCode::ProfileProcess),
			("portal", "AKIA-SSO", ProvenanceCode::ProfileSso),
			("legacy", "AKIA-SSO", ProvenanceCode::ProfileSsoLegacy),
		];

		for (profile, key, code) in cases {
			let credentials =
				resolver.resolve(profile).await.expect("Registered provider should answer.");

			assert_eq!(credentials.access_key_id, key);
			assert!(credentials.provenance.contains(code), "{profile} should carry {code}.");
		}
	}

	#[tokio::test]
	async fn configuration_failures_are_reported() {
		let profiles = profile_set([
			("empty", vec![(keys::REGION, "us-west-2")]),
			("tool", vec![(keys::CREDENTIAL_PROCESS, "/usr/bin/creds")]),
			("bad-source", vec![
				(keys::ROLE_ARN, "arn:aws:iam::111:role/Dev"),
				(keys::CREDENTIAL_SOURCE, "Lambda"),
			]),
			("half-static", vec![(keys::ACCESS_KEY_ID, ""), (keys::SECRET_ACCESS_KEY, "secret")]),
		]);
		let resolver = resolver(profiles, Default::default());

		assert_eq!(
			resolver.resolve("empty").await.expect_err("Empty profile").to_string(),
			"Could not resolve credentials using profile: [empty] in configuration/credentials file(s)."
		);
		assert!(matches!(
			resolver.resolve("missing").await,
			Err(Error::Config(ConfigError::ProfileNotFound { .. }))
		));
		assert!(matches!(
			resolver.resolve("tool").await,
			Err(Error::Config(ConfigError::ProviderNotConfigured { provider: "credential process" }))
		));
		assert!(matches!(
			resolver.resolve("bad-source").await,
			Err(Error::Config(ConfigError::UnsupportedCredentialSource { .. }))
		));
		assert!(matches!(
			resolver.resolve("half-static").await,
			Err(Error::Config(ConfigError::InvalidStaticCredentials { .. }))
		));
	}

	#[tokio::test]
	async fn forced_terminal_alias_uses_named_provider() {
		let builds = Arc::new(AtomicU32::new(0));
		let profiles = profile_set([
			("dev", vec![
				(keys::ROLE_ARN, "arn:aws:iam::111:role/Dev"),
				(keys::SOURCE_PROFILE, "alias"),
			]),
			("alias", vec![(keys::CREDENTIAL_SOURCE, "Ec2InstanceMetadata")]),
		]);
		let resolver = resolver(profiles, Arc::clone(&builds)).with_providers(
			TerminalProviders::default().with_instance_metadata(fixed("AKIA-IMDS")),
		);

		assert!(matches!(
			resolver.resolve("alias").await,
			Err(Error::Config(ConfigError::UnresolvableProfile { .. }))
		));

		let chain = VisitedProfiles::root("dev").visit("alias").expect("Alias is new to the chain.");
		let credentials = resolver
			.resolve_profile("alias", chain, true)
			.await
			.expect("Terminal alias should resolve through its named provider.");

		assert_eq!(credentials.access_key_id, "AKIA-IMDS");
		assert!(credentials.provenance.contains(ProvenanceCode::NamedProvider));
		assert!(credentials.provenance.contains(ProvenanceCode::SourceProfile));
		assert_eq!(builds.load(Ordering::SeqCst), 0);
	}
}
