// self
use crate::obs::{ResolveKind, ResolveOutcome};

/// Records a resolution outcome via the global metrics recorder (when enabled).
pub fn record_resolve_outcome(kind: ResolveKind, outcome: ResolveOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"credential_chain_resolve_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_resolve_outcome_noop_without_recorder() {
		record_resolve_outcome(ResolveKind::Login, ResolveOutcome::Failure);
	}
}
