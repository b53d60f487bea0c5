//! Walks a small profile set offline.
//!
//! 1. Build a [`ProfileSet`] the way a configuration loader would.
//! 2. Register terminal providers (here, an injected environment).
//! 3. Swap the token service for an in-process [`StsClientFactory`] so no network is needed.
//! 4. Resolve a static profile, a role chain, a named-source role, and a cycle.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
// self
use credential_chain::{
	config::ResolverConfig,
	credentials::{Credentials, Secret},
	http::HttpRequest,
	profile::{Profile, ProfileSet, keys},
	provider::{EnvironmentProvider, TerminalProviders},
	resolver::CredentialResolver,
	sts::{
		AssumeRoleFuture, AssumeRoleOutput, AssumeRoleParams, AssumedRoleCredentials, StsClient,
		StsClientFactory,
	},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let profiles: ProfileSet = [
		("base", profile(&[
			(keys::ACCESS_KEY_ID, "AKIADEMOBASE"),
			(keys::SECRET_ACCESS_KEY, "base"),
		])),
		("dev", profile(&[
			(keys::ROLE_ARN, "arn:aws:iam::111122223333:role/Dev"),
			(keys::SOURCE_PROFILE, "base"),
			(keys::ROLE_SESSION_NAME, "demo"),
		])),
		("ci", profile(&[
			(keys::ROLE_ARN, "arn:aws:iam::111122223333:role/Ci"),
			(keys::CREDENTIAL_SOURCE, "Environment"),
		])),
		("loop-a", profile(&[
			(keys::ROLE_ARN, "arn:aws:iam::111122223333:role/A"),
			(keys::SOURCE_PROFILE, "loop-b"),
		])),
		("loop-b", profile(&[
			(keys::ROLE_ARN, "arn:aws:iam::111122223333:role/B"),
			(keys::SOURCE_PROFILE, "loop-a"),
		])),
	]
	.into_iter()
	.collect();
	let config = ResolverConfig::builder().region("eu-west-1").build()?;
	let environment = EnvironmentProvider::from_vars([
		("AWS_ACCESS_KEY_ID", "AKIADEMOENV"),
		("AWS_SECRET_ACCESS_KEY", "env"),
	]);
	let resolver = CredentialResolver::new(profiles, config, unsigned)
		.with_providers(TerminalProviders::default().with_environment(environment))
		.with_sts_client_factory(EchoStsFactory);

	for name in ["base", "dev", "ci", "loop-a"] {
		match resolver.resolve(name).await {
			Ok(credentials) => println!(
				"{name}: {} (account {:?}, provenance {:?})",
				credentials.access_key_id, credentials.account_id, credentials.provenance
			),
			Err(e) => println!("{name}: {e}"),
		}
	}

	Ok(())
}

fn profile(pairs: &[(&str, &str)]) -> Profile {
	pairs.iter().copied().collect()
}

/// Real deployments plug a SigV4 signer in here.
fn unsigned(
	request: HttpRequest,
	_: &Credentials,
	_: &str,
	_: &str,
) -> credential_chain::error::Result<HttpRequest> {
	Ok(request)
}

struct EchoStsFactory;
impl StsClientFactory for EchoStsFactory {
	fn build(&self, region: &str) -> credential_chain::error::Result<Arc<dyn StsClient>> {
		println!("Building a token service client for {region}.");

		Ok(Arc::new(EchoSts))
	}
}

/// Issues credentials derived from the caller and the role name.
struct EchoSts;
impl StsClient for EchoSts {
	fn assume_role<'a>(
		&'a self,
		credentials: &'a Credentials,
		params: &'a AssumeRoleParams,
	) -> AssumeRoleFuture<'a> {
		Box::pin(async move {
			let role = params.role_arn.rsplit('/').next().unwrap_or_default();
			let secret = format!("from-{}", credentials.access_key_id);

			Ok(AssumeRoleOutput {
				credentials: Some(AssumedRoleCredentials {
					access_key_id: Some(format!("ASIA{}", role.to_uppercase())),
					secret_access_key: Some(Secret::new(secret)),
					session_token: Some(Secret::new(params.role_session_name.clone())),
					expiration: None,
					credential_scope: None,
				}),
				assumed_role_arn: Some(format!(
					"arn:aws:sts::111122223333:assumed-role/{role}/{}",
					params.role_session_name
				)),
			})
		})
	}
}
