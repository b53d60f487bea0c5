//! Terminal credential providers consumed by the resolver as black boxes.
//!
//! Static keys and role assumption are handled in-crate. Every other source (environment,
//! container, instance metadata, external process, SSO, web identity) is supplied by the caller
//! through [`TerminalProviders`]. A profile that needs an unregistered provider fails with
//! [`ConfigError::ProviderNotConfigured`].

pub mod environment;
pub mod mfa;

pub use environment::*;
pub use mfa::*;

// self
use crate::{
	_prelude::*,
	credentials::Credentials,
	error::ConfigError,
	profile::{CredentialSource, Profile},
};

/// Boxed future returned by [`ProvideCredentials::provide`].
pub type ProvideFuture<'a> = Pin<Box<dyn Future<Output = Result<Credentials>> + 'a + Send>>;

/// Shared handle to a terminal provider.
pub type SharedProvider = Arc<dyn ProvideCredentials>;

/// Input handed to a terminal provider.
#[derive(Clone, Copy, Debug)]
pub struct ProviderContext<'a> {
	/// Profile whose branch selected the provider.
	pub profile_name: &'a str,
	/// Profile contents (web-identity file, process command, SSO settings, and so on).
	pub profile: &'a Profile,
	/// Region resolved for the profile.
	pub region: &'a str,
}

/// Black-box source of credentials.
pub trait ProvideCredentials
where
	Self: Send + Sync,
{
	/// Produces credentials for `context`.
	fn provide<'a>(&'a self, context: ProviderContext<'a>) -> ProvideFuture<'a>;
}

/// Adapter turning a synchronous closure into a [`ProvideCredentials`] implementation.
#[derive(Clone)]
pub struct ProvideCredentialsFn<F>(F);
impl<F> ProvideCredentials for ProvideCredentialsFn<F>
where
	F: Fn(ProviderContext<'_>) -> Result<Credentials> + Send + Sync,
{
	fn provide<'a>(&'a self, context: ProviderContext<'a>) -> ProvideFuture<'a> {
		let outcome = (self.0)(context);

		Box::pin(async move { outcome })
	}
}
impl<F> Debug for ProvideCredentialsFn<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ProvideCredentialsFn(..)")
	}
}

/// Wraps `f` as a [`ProvideCredentials`] implementation.
pub fn provide_credentials_fn<F>(f: F) -> ProvideCredentialsFn<F>
where
	F: Fn(ProviderContext<'_>) -> Result<Credentials> + Send + Sync,
{
	ProvideCredentialsFn(f)
}

/// Terminal provider slots keyed by the profile shape that selects them.
#[derive(Clone, Default)]
pub struct TerminalProviders {
	environment: Option<SharedProvider>,
	ecs_container: Option<SharedProvider>,
	instance_metadata: Option<SharedProvider>,
	process: Option<SharedProvider>,
	sso: Option<SharedProvider>,
	web_identity: Option<SharedProvider>,
}
impl TerminalProviders {
	/// Registers the `Environment` credential source.
	pub fn with_environment(mut self, provider: impl ProvideCredentials + 'static) -> Self {
		self.environment = Some(Arc::new(provider));

		self
	}

	/// Registers the `EcsContainer` credential source.
	pub fn with_ecs_container(mut self, provider: impl ProvideCredentials + 'static) -> Self {
		self.ecs_container = Some(Arc::new(provider));

		self
	}

	/// Registers the `Ec2InstanceMetadata` credential source.
	pub fn with_instance_metadata(mut self, provider: impl ProvideCredentials + 'static) -> Self {
		self.instance_metadata = Some(Arc::new(provider));

		self
	}

	/// Registers the `credential_process` executor.
	pub fn with_process(mut self, provider: impl ProvideCredentials + 'static) -> Self {
		self.process = Some(Arc::new(provider));

		self
	}

	/// Registers the SSO portal client.
	pub fn with_sso(mut self, provider: impl ProvideCredentials + 'static) -> Self {
		self.sso = Some(Arc::new(provider));

		self
	}

	/// Registers the web-identity token reader.
	pub fn with_web_identity(mut self, provider: impl ProvideCredentials + 'static) -> Self {
		self.web_identity = Some(Arc::new(provider));

		self
	}

	/// Provider backing a `credential_source` value.
	pub fn named(&self, source: CredentialSource) -> Result<&SharedProvider, ConfigError> {
		match source {
			CredentialSource::Environment => require(&self.environment, "environment"),
			CredentialSource::EcsContainer => require(&self.ecs_container, "container"),
			CredentialSource::Ec2InstanceMetadata =>
				require(&self.instance_metadata, "instance metadata"),
		}
	}

	/// Provider for `credential_process` profiles.
	pub fn process(&self) -> Result<&SharedProvider, ConfigError> {
		require(&self.process, "credential process")
	}

	/// Provider for SSO profiles.
	pub fn sso(&self) -> Result<&SharedProvider, ConfigError> {
		require(&self.sso, "SSO")
	}

	/// Provider for web-identity profiles.
	pub fn web_identity(&self) -> Result<&SharedProvider, ConfigError> {
		require(&self.web_identity, "web identity")
	}
}
impl Debug for TerminalProviders {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TerminalProviders")
			.field("environment", &self.environment.is_some())
			.field("ecs_container", &self.ecs_container.is_some())
			.field("instance_metadata", &self.instance_metadata.is_some())
			.field("process", &self.process.is_some())
			.field("sso", &self.sso.is_some())
			.field("web_identity", &self.web_identity.is_some())
			.finish()
	}
}

fn require<'a>(
	slot: &'a Option<SharedProvider>,
	provider: &'static str,
) -> Result<&'a SharedProvider, ConfigError> {
	slot.as_ref().ok_or(ConfigError::ProviderNotConfigured { provider })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn registered_closure_provides_credentials() {
		let providers = TerminalProviders::default().with_process(provide_credentials_fn(|cx| {
			Credentials::builder()
				.access_key_id(format!("AKIA-{}", cx.profile_name))
				.secret_access_key("secret")
				.build()
				.map_err(|e| crate::error::InvariantError::from(e).into())
		}));
		let profile = Profile::default();
		let context = ProviderContext { profile_name: "tool", profile: &profile, region: "us-east-1" };
		let credentials = providers
			.process()
			.expect("Process provider should be registered.")
			.provide(context)
			.await
			.expect("Closure provider should succeed.");

		assert_eq!(credentials.access_key_id, "AKIA-tool");
	}

	#[test]
	fn missing_slots_are_configuration_errors() {
		let providers = TerminalProviders::default();
		let err = providers
			.named(CredentialSource::Ec2InstanceMetadata)
			.err()
			.expect("Unregistered providers should be rejected.");

		assert_eq!(err.to_string(), "No instance metadata credential provider is configured.");
		assert!(providers.sso().is_err());
	}
}
