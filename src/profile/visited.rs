//! Immutable record of the profiles visited during one top-level resolution.

// self
use crate::_prelude::*;

/// Ordered, duplicate-free chain of visited profile names.
///
/// Each recursion step receives a new value from [`VisitedProfiles::visit`]; callers never mutate
/// a chain shared with another branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitedProfiles(Arc<[String]>);
impl VisitedProfiles {
	/// Starts a chain at the top-level profile.
	pub fn root(profile: impl Into<String>) -> Self {
		Self(Arc::from([profile.into()]))
	}

	/// Top-level profile that started the chain.
	pub fn origin(&self) -> &str {
		self.0.first().map(String::as_str).unwrap_or_default()
	}

	/// Returns `true` when the chain already holds `profile`.
	pub fn contains(&self, profile: &str) -> bool {
		self.0.iter().any(|visited| visited == profile)
	}

	/// Returns `true` once the chain has followed at least one `source_profile` link.
	pub fn is_source(&self) -> bool {
		self.0.len() > 1
	}

	/// Visited names in visiting order.
	pub fn names(&self) -> &[String] {
		&self.0
	}

	/// Returns a new chain extended with `profile`, or the cycle error if it was already visited.
	pub fn visit(&self, profile: &str) -> Result<Self> {
		if self.contains(profile) {
			return Err(Error::Cycle { chain: self.0.to_vec(), profile: self.origin().into() });
		}

		Ok(Self(self.0.iter().cloned().chain([profile.to_owned()]).collect()))
	}
}
