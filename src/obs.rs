//! Observability helpers for credential resolution.
//!
//! Every resolution stage runs inside a `credential_chain.resolve` span carrying the `kind`
//! (profile branch) and `stage` (call site) fields.
//!
//! # Feature Flags
//!
//! - Enable `metrics` to increment the `credential_chain_resolve_total` counter for every
//!   attempt/success/failure, labeled by `kind` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::{_prelude::*, profile::ProfileKind};

/// Resolution branches observed by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolveKind {
	/// Static profile keys.
	Static,
	/// Role assumption through the token service.
	AssumeRole,
	/// Web-identity provider.
	WebIdentity,
	/// External credential process.
	Process,
	/// SSO portal provider.
	Sso,
	/// Browser login session refresh.
	Login,
	/// Named `credential_source` provider.
	NamedProvider,
}
impl ResolveKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ResolveKind::Static => "static",
			ResolveKind::AssumeRole => "assume_role",
			ResolveKind::WebIdentity => "web_identity",
			ResolveKind::Process => "process",
			ResolveKind::Sso => "sso",
			ResolveKind::Login => "login",
			ResolveKind::NamedProvider => "named_provider",
		}
	}

	/// Maps a classified profile to its observability label; unresolvable profiles have none.
	pub fn for_profile(kind: &ProfileKind) -> Option<Self> {
		match kind {
			ProfileKind::Static => Some(Self::Static),
			ProfileKind::AssumeRole { .. } => Some(Self::AssumeRole),
			ProfileKind::WebIdentity => Some(Self::WebIdentity),
			ProfileKind::Process => Some(Self::Process),
			ProfileKind::Sso { .. } => Some(Self::Sso),
			ProfileKind::Login { .. } => Some(Self::Login),
			ProfileKind::Unresolvable => None,
		}
	}
}
impl Display for ResolveKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolveOutcome {
	/// Entry to a resolution stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl ResolveOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ResolveOutcome::Attempt => "attempt",
			ResolveOutcome::Success => "success",
			ResolveOutcome::Failure => "failure",
		}
	}
}
impl Display for ResolveOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
