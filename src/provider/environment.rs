//! Credentials read from `AWS_*` environment variables.

// std
use std::env;
// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	credentials::Credentials,
	error::InvariantError,
	provider::{ProvideCredentials, ProvideFuture, ProviderContext},
};

const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const CREDENTIAL_EXPIRATION: &str = "AWS_CREDENTIAL_EXPIRATION";
const ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";

/// Environment variable lookups failed or produced unusable values.
#[derive(Debug, ThisError)]
pub enum EnvironmentError {
	/// A required variable is unset or empty.
	#[error("Environment variable {0} is not set.")]
	Missing(&'static str),
	/// `AWS_CREDENTIAL_EXPIRATION` is not an RFC 3339 timestamp.
	#[error("Environment variable {CREDENTIAL_EXPIRATION} is not an RFC 3339 timestamp.")]
	InvalidExpiration(#[source] time::error::Parse),
}

/// Reads credentials from the process environment or an injected variable map.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentProvider {
	vars: Option<HashMap<String, String>>,
}
impl EnvironmentProvider {
	/// Reads from the real process environment.
	pub fn new() -> Self {
		Self::default()
	}

	/// Reads from `vars` instead of the process environment.
	pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self { vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()) }
	}

	fn var(&self, key: &str) -> Option<String> {
		let value = match &self.vars {
			Some(vars) => vars.get(key).cloned(),
			None => env::var(key).ok(),
		};

		value.filter(|v| !v.is_empty())
	}

	fn load(&self) -> Result<Credentials> {
		let access_key_id = self
			.var(ACCESS_KEY_ID)
			.ok_or_else(|| Error::provider("environment", EnvironmentError::Missing(ACCESS_KEY_ID)))?;
		let secret_access_key = self.var(SECRET_ACCESS_KEY).ok_or_else(|| {
			Error::provider("environment", EnvironmentError::Missing(SECRET_ACCESS_KEY))
		})?;
		let expiration = self
			.var(CREDENTIAL_EXPIRATION)
			.map(|raw| OffsetDateTime::parse(&raw, &Rfc3339))
			.transpose()
			.map_err(|e| Error::provider("environment", EnvironmentError::InvalidExpiration(e)))?;

		Credentials::builder()
			.access_key_id(access_key_id)
			.secret_access_key(secret_access_key)
			.session_token(self.var(SESSION_TOKEN))
			.expiration(expiration)
			.account_id(self.var(ACCOUNT_ID))
			.build()
			.map_err(|e| InvariantError::from(e).into())
	}
}
impl ProvideCredentials for EnvironmentProvider {
	fn provide<'a>(&'a self, _: ProviderContext<'a>) -> ProvideFuture<'a> {
		let outcome = self.load();

		Box::pin(async move { outcome })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn reads_injected_variables() {
		let provider = EnvironmentProvider::from_vars([
			(ACCESS_KEY_ID, "AKIAENV"),
			(SECRET_ACCESS_KEY, "env-secret"),
			(SESSION_TOKEN, "env-session"),
			(CREDENTIAL_EXPIRATION, "2030-01-01T00:00:00Z"),
			(ACCOUNT_ID, "123456789012"),
		]);
		let credentials = provider.load().expect("Complete environment should load.");

		assert_eq!(credentials.access_key_id, "AKIAENV");
		assert_eq!(credentials.secret_access_key.expose(), "env-secret");
		assert_eq!(credentials.expiration, Some(datetime!(2030-01-01 00:00:00 UTC)));
		assert_eq!(credentials.account_id.as_deref(), Some("123456789012"));
	}

	#[test]
	fn missing_secret_is_a_provider_error() {
		let provider = EnvironmentProvider::from_vars([(ACCESS_KEY_ID, "AKIAENV")]);
		let err = provider.load().expect_err("A missing secret should fail.");

		assert!(matches!(err, Error::Provider { provider: "environment", .. }));
	}
}
