//! On-disk login token cache keyed by the SHA-256 of the login session identifier.

// std
use std::{
	fs::{self, File},
	io::{self, Write},
	path::{Path, PathBuf},
	process,
};
// crates.io
use serde::Serializer;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::{UtcOffset, format_description::well_known::Rfc3339, macros::format_description};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	credentials::{Credentials, CredentialsBuilder, Secret},
};

/// Failures reading or writing the token cache.
#[derive(Debug, ThisError)]
pub enum TokenCacheError {
	/// The token file is missing, unreadable, or incomplete.
	#[error("Failed to load token from {}: {source}", path.display())]
	Load {
		/// Token file path.
		path: PathBuf,
		/// Reason the token is unusable.
		#[source]
		source: TokenLoadError,
	},
	/// The refreshed token could not be persisted.
	#[error("Failed to save token to {}: {source}", path.display())]
	Save {
		/// Path that was being written.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: io::Error,
	},
	/// The refreshed token could not be encoded.
	#[error("Failed to encode the refreshed token.")]
	Encode(#[source] serde_json::Error),
}

/// Reasons a cached token cannot be used.
#[derive(Debug, ThisError)]
pub enum TokenLoadError {
	/// File could not be read.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// File is not valid token JSON.
	#[error("{0}")]
	Parse(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Required fields are absent or empty.
	#[error("Token validation failed, missing fields: {}", .0.join(", "))]
	MissingFields(Vec<&'static str>),
	/// `accessToken.expiresAt` is not an ISO-8601 timestamp.
	#[error("accessToken.expiresAt is not an ISO-8601 timestamp: {0}")]
	InvalidExpiry(#[from] time::error::Parse),
}

/// Temporary credentials stored inside a [`LoginToken`].
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
	/// Access key identifier.
	pub access_key_id: String,
	/// Secret access key.
	pub secret_access_key: Secret,
	/// Session token.
	pub session_token: Secret,
	/// Account owning the session.
	pub account_id: String,
	/// Absolute expiry, written as UTC with millisecond precision.
	#[serde(serialize_with = "serialize_expires_at")]
	pub expires_at: OffsetDateTime,
	/// Fields this crate does not interpret, kept verbatim across rewrites.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("access_key_id", &self.access_key_id)
			.field("account_id", &self.account_id)
			.field("expires_at", &self.expires_at)
			.finish_non_exhaustive()
	}
}

/// Validated login session token.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginToken {
	/// Current temporary credentials.
	pub access_token: AccessToken,
	/// OAuth client identifier used for refresh.
	pub client_id: String,
	/// Single-use refresh token; rotates on every refresh.
	pub refresh_token: Secret,
	/// PEM-encoded P-256 private key bound to the session.
	pub dpop_key: Secret,
	/// Fields this crate does not interpret, kept verbatim across rewrites.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl LoginToken {
	/// Maps the stored access token into [`Credentials`] without provenance.
	pub fn credentials(&self) -> CredentialsBuilder {
		let access = &self.access_token;

		Credentials::builder()
			.access_key_id(&access.access_key_id)
			.secret_access_key(access.secret_access_key.expose())
			.session_token(Some(access.session_token.expose()))
			.account_id(Some(&access.account_id))
			.expiration(Some(access.expires_at))
	}

	/// Time left before the access token expires; negative once expired.
	pub fn time_until_expiry(&self, now: OffsetDateTime) -> Duration {
		self.access_token.expires_at - now
	}
}
impl Debug for LoginToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginToken")
			.field("access_token", &self.access_token)
			.field("client_id", &self.client_id)
			.field("refresh_token", &self.refresh_token)
			.field("dpop_key", &self.dpop_key)
			.finish_non_exhaustive()
	}
}

/// Directory of cached login tokens.
#[derive(Clone, Debug)]
pub struct TokenCache {
	dir: PathBuf,
}
impl TokenCache {
	/// Uses `dir` as the cache directory; it is created on first save.
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	/// Cache directory.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// `<dir>/<sha256hex(session)>.json`.
	pub fn path_for(&self, session: &str) -> PathBuf {
		self.dir.join(format!("{:x}.json", Sha256::digest(session.as_bytes())))
	}

	/// Reads and validates the token for `session`.
	pub fn load(&self, session: &str) -> Result<LoginToken, TokenCacheError> {
		let path = self.path_for(session);

		read_token(&path).map_err(|source| TokenCacheError::Load { path, source })
	}

	/// Persists `token` for `session`, replacing the file atomically.
	pub fn save(&self, session: &str, token: &LoginToken) -> Result<(), TokenCacheError> {
		let path = self.path_for(session);
		let serialized = serde_json::to_vec_pretty(token).map_err(TokenCacheError::Encode)?;

		write_atomically(&path, &serialized)
			.map_err(|source| TokenCacheError::Save { path, source })
	}
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAccessToken {
	access_key_id: Option<String>,
	secret_access_key: Option<String>,
	session_token: Option<String>,
	account_id: Option<String>,
	expires_at: Option<String>,
	#[serde(flatten)]
	extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
	access_token: Option<StoredAccessToken>,
	client_id: Option<String>,
	refresh_token: Option<String>,
	dpop_key: Option<String>,
	#[serde(flatten)]
	extra: Map<String, Value>,
}
impl StoredToken {
	fn validate(self) -> Result<LoginToken, TokenLoadError> {
		let mut missing = Vec::new();
		let has_access = self.access_token.is_some();

		if !has_access {
			missing.push("accessToken");
		}

		let client_id = required(self.client_id, "clientId", &mut missing);
		let refresh_token = required(self.refresh_token, "refreshToken", &mut missing);
		let dpop_key = required(self.dpop_key, "dpopKey", &mut missing);
		let access = self.access_token.unwrap_or_default();
		let account_id = required(access.account_id, "accountId", &mut missing);
		// Key fields are only reported once the access token object itself exists.
		let mut unreported = Vec::new();
		let inner = if has_access { &mut missing } else { &mut unreported };
		let access_key_id = required(access.access_key_id, "accessKeyId", inner);
		let secret_access_key = required(access.secret_access_key, "secretAccessKey", inner);
		let session_token = required(access.session_token, "sessionToken", inner);
		let expires_at = required(access.expires_at, "expiresAt", inner);

		if !missing.is_empty() {
			return Err(TokenLoadError::MissingFields(missing));
		}

		Ok(LoginToken {
			access_token: AccessToken {
				access_key_id,
				secret_access_key: Secret::new(secret_access_key),
				session_token: Secret::new(session_token),
				account_id,
				expires_at: OffsetDateTime::parse(&expires_at, &Rfc3339)?,
				extra: access.extra,
			},
			client_id,
			refresh_token: Secret::new(refresh_token),
			dpop_key: Secret::new(dpop_key),
			extra: self.extra,
		})
	}
}

fn required(value: Option<String>, name: &'static str, missing: &mut Vec<&'static str>) -> String {
	match value.filter(|v| !v.is_empty()) {
		Some(value) => value,
		None => {
			missing.push(name);

			String::new()
		},
	}
}

fn serialize_expires_at<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	let formatted = value
		.to_offset(UtcOffset::UTC)
		.format(format_description!(
			"[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
		))
		.map_err(serde::ser::Error::custom)?;

	serializer.serialize_str(&formatted)
}

fn read_token(path: &Path) -> Result<LoginToken, TokenLoadError> {
	let bytes = fs::read(path)?;
	let mut de = serde_json::Deserializer::from_slice(&bytes);
	let stored: StoredToken = serde_path_to_error::deserialize(&mut de)?;

	stored.validate()
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent)?;
	}

	// Concurrent refreshers of one session each stage their own file; the last rename wins.
	let mut tmp_path = path.to_path_buf();

	tmp_path.set_extension(format!("json.{}.{}.tmp", process::id(), Uuid::new_v4().simple()));

	let written = File::create(&tmp_path).and_then(|mut file| {
		file.write_all(contents)?;
		file.sync_all()
	});
	let replaced = written.and_then(|()| fs::rename(&tmp_path, path));

	if replaced.is_err() {
		let _ = fs::remove_file(&tmp_path);
	}

	replaced
}
