//! Pre-parsed configuration profiles and the single classification pass that drives dispatch.

pub mod visited;

pub use visited::*;

// self
use crate::{_prelude::*, error::ConfigError};

/// Well-known profile keys.
pub mod keys {
	/// Static access key id.
	pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
	/// Static secret access key.
	pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
	/// Static session token.
	pub const SESSION_TOKEN: &str = "aws_session_token";
	/// Account owning the static keys.
	pub const ACCOUNT_ID: &str = "aws_account_id";
	/// Credential scope of the static keys.
	pub const CREDENTIAL_SCOPE: &str = "aws_credential_scope";
	/// Role to assume.
	pub const ROLE_ARN: &str = "role_arn";
	/// Profile supplying source credentials for role assumption.
	pub const SOURCE_PROFILE: &str = "source_profile";
	/// Named provider supplying source credentials for role assumption.
	pub const CREDENTIAL_SOURCE: &str = "credential_source";
	/// Explicit role session name.
	pub const ROLE_SESSION_NAME: &str = "role_session_name";
	/// External id passed to AssumeRole.
	pub const EXTERNAL_ID: &str = "external_id";
	/// Requested session duration in seconds.
	pub const DURATION_SECONDS: &str = "duration_seconds";
	/// MFA device serial number.
	pub const MFA_SERIAL: &str = "mfa_serial";
	/// Region for regional endpoints.
	pub const REGION: &str = "region";
	/// Web identity token file path.
	pub const WEB_IDENTITY_TOKEN_FILE: &str = "web_identity_token_file";
	/// External credential process command.
	pub const CREDENTIAL_PROCESS: &str = "credential_process";
	/// SSO session reference.
	pub const SSO_SESSION: &str = "sso_session";
	/// Legacy SSO start URL.
	pub const SSO_START_URL: &str = "sso_start_url";
	/// SSO account id.
	pub const SSO_ACCOUNT_ID: &str = "sso_account_id";
	/// SSO region.
	pub const SSO_REGION: &str = "sso_region";
	/// SSO role name.
	pub const SSO_ROLE_NAME: &str = "sso_role_name";
	/// Browser login session identifier.
	pub const LOGIN_SESSION: &str = "login_session";
}

const SSO_KEYS: [&str; 5] = [
	keys::SSO_START_URL,
	keys::SSO_ACCOUNT_ID,
	keys::SSO_SESSION,
	keys::SSO_REGION,
	keys::SSO_ROLE_NAME,
];
const SECRET_KEYS: [&str; 2] = [keys::SECRET_ACCESS_KEY, keys::SESSION_TOKEN];

/// Immutable, flat key/value profile.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Profile(BTreeMap<String, String>);
impl Profile {
	/// Returns the value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// Returns `true` if `key` is present.
	pub fn contains(&self, key: &str) -> bool {
		self.0.contains_key(key)
	}

	/// Returns `true` if the profile carries both static key fields.
	pub fn has_static_keys(&self) -> bool {
		self.contains(keys::ACCESS_KEY_ID) && self.contains(keys::SECRET_ACCESS_KEY)
	}

	/// Returns `true` for a `credential_source` profile without `role_arn`.
	pub fn is_terminal_alias(&self) -> bool {
		!self.contains(keys::ROLE_ARN) && self.contains(keys::CREDENTIAL_SOURCE)
	}
}
impl Debug for Profile {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_map()
			.entries(self.0.iter().map(|(k, v)| {
				let shown = if SECRET_KEYS.contains(&k.as_str()) { "<redacted>" } else { v.as_str() };

				(k, shown)
			}))
			.finish()
	}
}
impl<K, V> FromIterator<(K, V)> for Profile
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

/// Read-only set of named profiles supplied by the configuration loader.
#[derive(Clone, Debug, Default)]
pub struct ProfileSet(HashMap<String, Profile>);
impl ProfileSet {
	/// Returns the profile stored under `name`.
	pub fn get(&self, name: &str) -> Option<&Profile> {
		self.0.get(name)
	}

	/// Returns the profile stored under `name` or a [`ConfigError::ProfileNotFound`].
	pub fn require(&self, name: &str) -> Result<&Profile, ConfigError> {
		self.get(name).ok_or_else(|| ConfigError::ProfileNotFound { profile: name.into() })
	}

	/// Number of profiles in the set.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when the set holds no profiles.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<K> FromIterator<(K, Profile)> for ProfileSet
where
	K: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, Profile)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}
}

/// Named provider accepted by `credential_source`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialSource {
	/// Container credentials endpoint.
	EcsContainer,
	/// Instance metadata service.
	Ec2InstanceMetadata,
	/// Process environment variables.
	Environment,
}
impl CredentialSource {
	/// Parses a `credential_source` value for `profile`.
	pub fn parse(profile: &str, value: &str) -> Result<Self, ConfigError> {
		match value {
			"EcsContainer" => Ok(Self::EcsContainer),
			"Ec2InstanceMetadata" => Ok(Self::Ec2InstanceMetadata),
			"Environment" => Ok(Self::Environment),
			other => Err(ConfigError::UnsupportedCredentialSource {
				profile: profile.into(),
				source_name: other.into(),
			}),
		}
	}

	/// Returns the configuration spelling.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialSource::EcsContainer => "EcsContainer",
			CredentialSource::Ec2InstanceMetadata => "Ec2InstanceMetadata",
			CredentialSource::Environment => "Environment",
		}
	}
}

/// Where an assume-role profile obtains its source credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoleSource {
	/// Resolve another profile.
	Profile(String),
	/// Ask a named provider. The raw value is validated when the branch runs.
	Named(String),
}

/// Closed set of profile shapes, checked in dispatch order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProfileKind {
	/// Static keys.
	Static,
	/// Role assumption, or a terminal alias when `role_arn` is absent.
	AssumeRole {
		/// Role to assume; `None` returns the source credentials directly.
		role_arn: Option<String>,
		/// Source credential origin.
		source: RoleSource,
	},
	/// Web identity token exchange.
	WebIdentity,
	/// External credential process.
	Process,
	/// SSO portal credentials.
	Sso {
		/// `true` when the profile has no `sso_session` reference.
		legacy: bool,
	},
	/// Browser login session.
	Login {
		/// Login session identifier.
		session: String,
	},
	/// No known shape matched.
	Unresolvable,
}
impl ProfileKind {
	/// Classifies `profile` once, in dispatch order.
	///
	/// `as_source` marks a profile reached through `source_profile`; static keys then win over any
	/// other field. `forced_assume_role` routes a terminal alias to role assumption.
	pub fn classify(profile: &Profile, as_source: bool, forced_assume_role: bool) -> Self {
		if as_source && profile.has_static_keys() {
			return Self::Static;
		}
		if let Some(kind) = Self::assume_role(profile, forced_assume_role) {
			return kind;
		}
		if profile.has_static_keys() {
			return Self::Static;
		}
		if profile.contains(keys::WEB_IDENTITY_TOKEN_FILE) && profile.contains(keys::ROLE_ARN) {
			return Self::WebIdentity;
		}
		if profile.contains(keys::CREDENTIAL_PROCESS) {
			return Self::Process;
		}
		if SSO_KEYS.iter().any(|key| profile.contains(key)) {
			return Self::Sso { legacy: !profile.contains(keys::SSO_SESSION) };
		}
		if let Some(session) = profile.get(keys::LOGIN_SESSION) {
			return Self::Login { session: session.into() };
		}

		Self::Unresolvable
	}

	fn assume_role(profile: &Profile, forced: bool) -> Option<Self> {
		let role_arn = profile.get(keys::ROLE_ARN).map(str::to_owned);
		let source = match (profile.get(keys::SOURCE_PROFILE), profile.get(keys::CREDENTIAL_SOURCE))
		{
			(Some(name), None) => RoleSource::Profile(name.into()),
			(None, Some(named)) => RoleSource::Named(named.into()),
			(Some(name), Some(_)) if forced => RoleSource::Profile(name.into()),
			_ => return None,
		};

		if forced || role_arn.is_some() { Some(Self::AssumeRole { role_arn, source }) } else { None }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn profile(pairs: &[(&str, &str)]) -> Profile {
		pairs.iter().copied().collect()
	}

	#[test]
	fn source_profile_with_static_keys_is_terminal() {
		let base = profile(&[
			(keys::ACCESS_KEY_ID, "AKIA"),
			(keys::SECRET_ACCESS_KEY, "secret"),
			(keys::ROLE_ARN, "arn:aws:iam::111:role/Other"),
			(keys::SOURCE_PROFILE, "elsewhere"),
		]);

		assert_eq!(ProfileKind::classify(&base, true, false), ProfileKind::Static);
		assert!(matches!(
			ProfileKind::classify(&base, false, false),
			ProfileKind::AssumeRole { role_arn: Some(_), source: RoleSource::Profile(_) }
		));
	}

	#[test]
	fn assume_role_requires_exactly_one_source() {
		let both = profile(&[
			(keys::ROLE_ARN, "arn:aws:iam::111:role/Dev"),
			(keys::SOURCE_PROFILE, "base"),
			(keys::CREDENTIAL_SOURCE, "Environment"),
		]);
		let named = profile(&[
			(keys::ROLE_ARN, "arn:aws:iam::111:role/Dev"),
			(keys::CREDENTIAL_SOURCE, "Environment"),
		]);

		assert_eq!(ProfileKind::classify(&both, false, false), ProfileKind::Unresolvable);
		assert_eq!(
			ProfileKind::classify(&named, false, false),
			ProfileKind::AssumeRole {
				role_arn: Some("arn:aws:iam::111:role/Dev".into()),
				source: RoleSource::Named("Environment".into()),
			}
		);
	}

	#[test]
	fn terminal_alias_only_assumes_when_forced() {
		let alias = profile(&[(keys::CREDENTIAL_SOURCE, "Ec2InstanceMetadata")]);

		assert!(alias.is_terminal_alias());
		assert_eq!(ProfileKind::classify(&alias, true, false), ProfileKind::Unresolvable);
		assert_eq!(
			ProfileKind::classify(&alias, true, true),
			ProfileKind::AssumeRole {
				role_arn: None,
				source: RoleSource::Named("Ec2InstanceMetadata".into()),
			}
		);
	}

	#[test]
	fn later_branches_follow_dispatch_order() {
		let web = profile(&[
			(keys::WEB_IDENTITY_TOKEN_FILE, "/tmp/token"),
			(keys::ROLE_ARN, "arn:aws:iam::111:role/Web"),
			(keys::CREDENTIAL_PROCESS, "echo"),
		]);
		let process = profile(&[(keys::CREDENTIAL_PROCESS, "echo"), (keys::SSO_SESSION, "corp")]);
		let sso = profile(&[(keys::SSO_START_URL, "https://corp.awsapps.com/start")]);
		let login = profile(&[(keys::LOGIN_SESSION, "arn:aws:sts::111:assumed-role/r/s")]);

		assert_eq!(ProfileKind::classify(&web, false, false), ProfileKind::WebIdentity);
		assert_eq!(ProfileKind::classify(&process, false, false), ProfileKind::Process);
		assert_eq!(ProfileKind::classify(&sso, false, false), ProfileKind::Sso { legacy: true });
		assert!(matches!(ProfileKind::classify(&login, false, false), ProfileKind::Login { .. }));
		assert_eq!(
			ProfileKind::classify(&Profile::default(), false, false),
			ProfileKind::Unresolvable
		);
	}

	#[test]
	fn credential_source_rejects_unknown_values() {
		let err = CredentialSource::parse("dev", "Lambda")
			.expect_err("Unknown credential sources should be rejected.");

		assert_eq!(
			err.to_string(),
			"Unsupported credential source in profile dev. Got Lambda, expected EcsContainer or Ec2InstanceMetadata or Environment."
		);
	}

	#[test]
	fn debug_redacts_secret_fields() {
		let base = profile(&[(keys::ACCESS_KEY_ID, "AKIA"), (keys::SECRET_ACCESS_KEY, "hunter2")]);

		assert!(!format!("{base:?}").contains("hunter2"));
	}
}
