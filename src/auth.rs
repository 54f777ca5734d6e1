//! Credential injection: token sources, the shared token cache, and the auth interceptor that
//! ties them to outgoing requests.

pub mod cache;
pub mod interceptor;
pub mod oauth;
pub mod saml;
pub mod secret;
pub mod session;
pub mod source;

pub use cache::*;
pub use interceptor::*;
pub use oauth::*;
pub use saml::*;
pub use secret::*;
pub use session::*;
pub use source::*;

// crates.io
use base64::{Engine, prelude::BASE64_STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, request::RequestDescriptor};

/// Future returned by [`Reauthenticate::reauthenticate`].
pub type ReauthFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// `Authorization` scheme prefixed to injected credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
	/// `Basic <b64>`.
	Basic,
	/// `Bearer <token>`.
	Bearer,
	/// `SSWS <token>` used by session-style APIs.
	Ssws,
}
impl AuthScheme {
	/// Scheme token as written on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthScheme::Basic => "Basic",
			AuthScheme::Bearer => "Bearer",
			AuthScheme::Ssws => "SSWS",
		}
	}

	/// Renders the full header value for `token`.
	pub fn header_value(self, token: &TokenSecret) -> String {
		format!("{} {}", self.as_str(), token.expose())
	}
}
impl Display for AuthScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Handle the retry engine uses to force re-authentication before the next attempt.
pub trait Reauthenticate
where
	Self: Send + Sync,
{
	/// Cache key whose entry [`Reauthenticate::invalidate`] drops.
	fn cache_key(&self) -> &str;

	/// Drops the cached credential so the next pass acquires a new one.
	fn invalidate(&self);

	/// Drops the cached credential, acquires a new one, and writes it onto `request`.
	///
	/// The replay then carries the new credential even when this handle's interceptor wraps
	/// the retry engine and never runs again for the replay.
	fn reauthenticate<'a>(&'a self, request: &'a mut RequestDescriptor) -> ReauthFuture<'a>;
}

/// Derives a stable cache key from a source kind and its identifying material.
///
/// The material is hashed so secrets never appear in keys or logs.
pub fn compute_fingerprint(kind: &str, identity: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(kind.as_bytes());
	hasher.update([0]);
	hasher.update(identity.as_bytes());

	format!("{kind}:{}", BASE64_STANDARD_NO_PAD.encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn fingerprint_is_stable_and_hides_material() {
		let a = compute_fingerprint("basic", "user:secret");
		let b = compute_fingerprint("basic", "user:secret");
		let c = compute_fingerprint("basic", "user:other");

		assert_eq!(a, b);
		assert_ne!(a, c);
		assert!(a.starts_with("basic:"));
		assert!(!a.contains("secret"));
	}

	#[test]
	fn schemes_render_header_values() {
		let token = TokenSecret::new("abc");

		assert_eq!(AuthScheme::Bearer.header_value(&token), "Bearer abc");
		assert_eq!(AuthScheme::Ssws.header_value(&token), "SSWS abc");
		assert_eq!(
			serde_json::from_str::<AuthScheme>("\"ssws\"").expect("Scheme should parse."),
			AuthScheme::Ssws
		);
	}
}
