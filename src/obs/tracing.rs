// crates.io
use tracing::{Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::ResolveKind};

/// A span builder used by resolution stages.
#[derive(Clone, Debug)]
pub struct ResolveSpan {
	span: Span,
}
impl ResolveSpan {
	/// Creates a new span tagged with the branch kind, stage, and profile name.
	pub fn new(kind: ResolveKind, stage: &'static str, profile: &str) -> Self {
		let span = tracing::info_span!(
			"credential_chain.resolve",
			kind = kind.as_str(),
			stage,
			profile = profile,
		);

		Self { span }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future_in_the_resolve_span() {
		let span = ResolveSpan::new(ResolveKind::AssumeRole, "instrument_wraps_future", "dev");
		let instrumented: Instrumented<_> = span.instrument(async { 42 });

		assert_eq!(instrumented.span().id(), span.span.id());
		assert_eq!(instrumented.await, 42);
	}
}
