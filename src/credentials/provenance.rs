//! Provenance codes attached to credentials for observability.
//!
//! Tags record which resolution branch fired. They never influence control flow.

// self
use crate::_prelude::*;

/// Short code identifying the branch that produced credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvenanceCode {
	/// Static keys read from a profile.
	Profile,
	/// Static keys read from a profile referenced through `source_profile`.
	SourceProfile,
	/// Source credentials came from a named `credential_source` provider.
	NamedProvider,
	/// Credentials were issued by AssumeRole.
	StsAssumeRole,
	/// Web-identity token configured in a profile.
	ProfileWebIdentity,
	/// External process configured in a profile.
	ProfileProcess,
	/// SSO session configured in a profile.
	ProfileSso,
	/// Legacy (session-less) SSO configured in a profile.
	ProfileSsoLegacy,
	/// Login session configured in a profile.
	ProfileLogin,
	/// Credentials produced by the login refresher.
	Login,
}
impl ProvenanceCode {
	/// Returns the wire code used in user-agent feature metadata.
	pub const fn as_str(self) -> &'static str {
		match self {
			ProvenanceCode::Profile => "n",
			ProvenanceCode::SourceProfile => "o",
			ProvenanceCode::NamedProvider => "p",
			ProvenanceCode::StsAssumeRole => "i",
			ProvenanceCode::ProfileWebIdentity => "q",
			ProvenanceCode::ProfileProcess => "v",
			ProvenanceCode::ProfileSso => "r",
			ProvenanceCode::ProfileSsoLegacy => "t",
			ProvenanceCode::ProfileLogin => "AC",
			ProvenanceCode::Login => "AD",
		}
	}
}
impl Display for ProvenanceCode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Ordered set of provenance codes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProvenanceTags(BTreeSet<ProvenanceCode>);
impl ProvenanceTags {
	/// Inserts a code; duplicates are ignored.
	pub fn insert(&mut self, code: ProvenanceCode) {
		self.0.insert(code);
	}

	/// Returns `true` if `code` was recorded.
	pub fn contains(&self, code: ProvenanceCode) -> bool {
		self.0.contains(&code)
	}

	/// Iterates the recorded codes in a stable order.
	pub fn iter(&self) -> impl Iterator<Item = ProvenanceCode> + '_ {
		self.0.iter().copied()
	}

	/// Returns `true` when nothing has been recorded.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for ProvenanceTags {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.0.iter().map(|code| code.as_str())).finish()
	}
}
impl FromIterator<ProvenanceCode> for ProvenanceTags {
	fn from_iter<I: IntoIterator<Item = ProvenanceCode>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}
