//! Async credential chain resolver: walk named profiles through static keys, role assumption,
//! terminal providers, and DPoP-bound login sessions, with cycle detection and retry budgets.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod login;
pub mod obs;
pub mod profile;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod sts;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{env, path::PathBuf, process};
	// self
	use crate::{
		config::{ResolverConfig, RetryConfig},
		http::ReqwestHttpClient,
		profile::{Profile, ProfileSet},
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Returns a fresh, not-yet-created directory under the system temp dir.
	pub fn temp_cache_dir(label: &str) -> PathBuf {
		let unique = format!(
			"credential_chain_{label}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	/// Builds a [`ProfileSet`] from `(name, [(key, value)])` fixtures.
	pub fn profile_set(
		profiles: impl IntoIterator<Item = (&'static str, Vec<(&'static str, &'static str)>)>,
	) -> ProfileSet {
		profiles.into_iter().map(|(name, pairs)| (name, Profile::from_iter(pairs))).collect()
	}

	/// Resolver configuration pointing every endpoint at `base_url` with zero-jitter retries.
	pub fn test_config(base_url: &str, cache_dir: PathBuf) -> ResolverConfig {
		ResolverConfig::builder()
			.region("us-east-1")
			.sts_endpoint(base_url)
			.sign_in_endpoint(base_url)
			.login_cache_dir(cache_dir)
			.retry(RetryConfig::default().with_jitter(|| 0.0))
			.build()
			.expect("Failed to build resolver configuration for tests.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::OnceCell;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, credential_chain as _, httpmock as _};
