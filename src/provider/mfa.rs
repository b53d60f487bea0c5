//! Caller-supplied multi-factor authentication codes.

// self
use crate::_prelude::*;

/// Boxed future returned by [`MfaCodeProvider::mfa_code`].
pub type MfaCodeFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + 'a + Send>>;

/// Produces the one-time code for an MFA device, typically by prompting the user.
pub trait MfaCodeProvider
where
	Self: Send + Sync,
{
	/// Returns the current code for the device identified by `serial`.
	fn mfa_code<'a>(&'a self, serial: &'a str) -> MfaCodeFuture<'a>;
}
impl<F> MfaCodeProvider for F
where
	F: Fn(&str) -> Result<String> + Send + Sync,
{
	fn mfa_code<'a>(&'a self, serial: &'a str) -> MfaCodeFuture<'a> {
		let outcome = self(serial);

		Box::pin(async move { outcome })
	}
}
