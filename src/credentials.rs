//! Credential value records produced by every resolution branch.

pub mod provenance;
pub mod secret;

pub use provenance::*;
pub use secret::*;

// self
use crate::{_prelude::*, error::CredentialsBuilderError};

/// Temporary or long-lived access credentials.
///
/// Values are built once per resolution through [`CredentialsBuilder`]; the only later mutation
/// is provenance tagging via [`Credentials::tagged`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	/// Access key identifier.
	pub access_key_id: String,
	/// Secret access key; callers must avoid logging it.
	pub secret_access_key: Secret,
	/// Session token for temporary credentials.
	pub session_token: Option<Secret>,
	/// Absolute expiry instant, when the credentials are temporary.
	pub expiration: Option<OffsetDateTime>,
	/// Credential scope reported by the issuer.
	pub credential_scope: Option<String>,
	/// Account that owns the credentials.
	pub account_id: Option<String>,
	/// Codes recording which resolution branches produced the credentials.
	pub provenance: ProvenanceTags,
}
impl Credentials {
	/// Returns a builder for constructing credentials.
	pub fn builder() -> CredentialsBuilder {
		CredentialsBuilder::default()
	}

	/// Returns `true` if the credentials carry an expiry at or before `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expiration.is_some_and(|expiration| expiration <= instant)
	}

	/// Adds a provenance code and returns the credentials.
	pub fn tagged(mut self, code: ProvenanceCode) -> Self {
		self.provenance.insert(code);

		self
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("access_key_id", &self.access_key_id)
			.field("secret_access_key", &"<redacted>")
			.field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
			.field("expiration", &self.expiration)
			.field("credential_scope", &self.credential_scope)
			.field("account_id", &self.account_id)
			.field("provenance", &self.provenance)
			.finish()
	}
}

/// Builder for [`Credentials`].
#[derive(Clone, Debug, Default)]
pub struct CredentialsBuilder {
	access_key_id: Option<String>,
	secret_access_key: Option<Secret>,
	session_token: Option<Secret>,
	expiration: Option<OffsetDateTime>,
	credential_scope: Option<String>,
	account_id: Option<String>,
	provenance: ProvenanceTags,
}
impl CredentialsBuilder {
	/// Sets the access key id.
	pub fn access_key_id(mut self, value: impl Into<String>) -> Self {
		self.access_key_id = Some(value.into());

		self
	}

	/// Sets the secret access key.
	pub fn secret_access_key(mut self, value: impl Into<String>) -> Self {
		self.secret_access_key = Some(Secret::new(value));

		self
	}

	/// Sets the session token; empty strings are ignored.
	pub fn session_token(mut self, value: Option<impl Into<String>>) -> Self {
		self.session_token = value.map(Into::into).filter(|v| !v.is_empty()).map(Secret::new);

		self
	}

	/// Sets the absolute expiry.
	pub fn expiration(mut self, instant: Option<OffsetDateTime>) -> Self {
		self.expiration = instant;

		self
	}

	/// Sets the credential scope.
	pub fn credential_scope(mut self, value: Option<impl Into<String>>) -> Self {
		self.credential_scope = value.map(Into::into);

		self
	}

	/// Sets the owning account id; empty strings are ignored.
	pub fn account_id(mut self, value: Option<impl Into<String>>) -> Self {
		self.account_id = value.map(Into::into).filter(|v| !v.is_empty());

		self
	}

	/// Consumes the builder and produces [`Credentials`].
	///
	/// Empty key material is rejected so partially populated credentials never escape.
	pub fn build(self) -> Result<Credentials, CredentialsBuilderError> {
		let access_key_id = self
			.access_key_id
			.filter(|v| !v.is_empty())
			.ok_or(CredentialsBuilderError::MissingAccessKeyId)?;
		let secret_access_key = self
			.secret_access_key
			.filter(|v| !v.expose().is_empty())
			.ok_or(CredentialsBuilderError::MissingSecretAccessKey)?;

		Ok(Credentials {
			access_key_id,
			secret_access_key,
			session_token: self.session_token,
			expiration: self.expiration,
			credential_scope: self.credential_scope,
			account_id: self.account_id,
			provenance: self.provenance,
		})
	}
}
