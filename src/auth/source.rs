//! Credential sources: grant-specific ways of obtaining the token an auth interceptor injects.

// crates.io
use base64::{Engine, prelude::BASE64_STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{CachedToken, TokenSecret},
	error::AuthExchangeError,
};

/// Boxed future returned by [`TokenSource::acquire`].
pub type TokenFuture<'a> =
	Pin<Box<dyn Future<Output = Result<AcquiredToken, AuthExchangeError>> + 'a + Send>>;

/// Freshly obtained credential, before the cache margin is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcquiredToken {
	/// Credential value.
	pub access_token: TokenSecret,
	/// Refresh secret, when the issuer returned one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime reported by the issuer; `None` never expires.
	pub expires_in: Option<Duration>,
}
impl AcquiredToken {
	/// Creates a non-expiring credential.
	pub fn new(access_token: TokenSecret) -> Self {
		Self { access_token, refresh_token: None, expires_in: None }
	}

	/// Sets the reported lifetime.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}

	/// Sets the refresh secret.
	pub fn with_refresh_token(mut self, refresh_token: TokenSecret) -> Self {
		self.refresh_token = Some(refresh_token);

		self
	}

	/// Converts into a cache entry expiring `margin` before the reported lifetime ends.
	///
	/// The margin never exceeds half the lifetime, so short-lived tokens are still reused.
	pub fn into_cached(self, now: OffsetDateTime, margin: Duration) -> CachedToken {
		let mut cached = CachedToken::new(self.access_token);

		cached.acquired_at = now;
		cached.refresh_token = self.refresh_token;
		cached.expires_at = self.expires_in.map(|ttl| now + ttl - margin.min(ttl / 2));

		cached
	}
}

/// Grant-specific credential acquisition.
pub trait TokenSource
where
	Self: 'static + Send + Sync,
{
	/// Stable label used for cache-key derivation and metrics.
	fn kind(&self) -> &'static str;

	/// Material identifying these credentials; hashed into the derived cache key so distinct
	/// credentials for one service never share an entry.
	fn identity(&self) -> String;

	/// Obtains a new credential; `previous` is the expired entry, if any.
	fn acquire<'a>(&'a self, previous: Option<&'a CachedToken>) -> TokenFuture<'a>;
}

/// Username/password pair encoded locally as `base64(user:pass)`.
#[derive(Clone, Debug)]
pub struct BasicCredentials {
	username: String,
	password: TokenSecret,
}
impl BasicCredentials {
	/// Creates Basic credentials.
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self { username: username.into(), password: TokenSecret::new(password) }
	}

	/// Encoded `user:pass` value.
	pub fn encode(&self) -> TokenSecret {
		TokenSecret::new(
			BASE64_STANDARD.encode(format!("{}:{}", self.username, self.password.expose())),
		)
	}
}
impl TokenSource for BasicCredentials {
	fn kind(&self) -> &'static str {
		"basic"
	}

	fn identity(&self) -> String {
		format!("{}:{}", self.username, self.password.expose())
	}

	fn acquire<'a>(&'a self, _: Option<&'a CachedToken>) -> TokenFuture<'a> {
		Box::pin(async move { Ok(AcquiredToken::new(self.encode())) })
	}
}

/// Pre-issued token (JWT or API key), optionally with a known lifetime.
#[derive(Clone, Debug)]
pub struct StaticToken {
	kind: &'static str,
	token: TokenSecret,
	expires_in: Option<Duration>,
}
impl StaticToken {
	/// Wraps a pre-issued bearer token.
	pub fn bearer(token: impl Into<String>) -> Self {
		Self { kind: "bearer", token: TokenSecret::new(token), expires_in: None }
	}

	/// Wraps a pre-issued session token.
	pub fn session(token: impl Into<String>) -> Self {
		Self { kind: "session", token: TokenSecret::new(token), expires_in: None }
	}

	/// Sets the token lifetime.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_in = Some(expires_in);

		self
	}
}
impl TokenSource for StaticToken {
	fn kind(&self) -> &'static str {
		self.kind
	}

	fn identity(&self) -> String {
		self.token.expose().to_owned()
	}

	fn acquire<'a>(&'a self, _: Option<&'a CachedToken>) -> TokenFuture<'a> {
		Box::pin(async move {
			let mut token = AcquiredToken::new(self.token.clone());

			token.expires_in = self.expires_in;

			Ok(token)
		})
	}
}

/// Token source backed by an async closure.
pub struct FnTokenSource<F> {
	kind: &'static str,
	identity: String,
	acquire: F,
}
impl<F, Fut> FnTokenSource<F>
where
	F: 'static + Send + Sync + Fn(Option<CachedToken>) -> Fut,
	Fut: 'static + Send + Future<Output = Result<AcquiredToken, AuthExchangeError>>,
{
	/// Wraps `acquire`; `identity` distinguishes its cache entries from other sources of the same
	/// kind.
	pub fn new(kind: &'static str, identity: impl Into<String>, acquire: F) -> Self {
		Self { kind, identity: identity.into(), acquire }
	}
}
impl<F, Fut> TokenSource for FnTokenSource<F>
where
	F: 'static + Send + Sync + Fn(Option<CachedToken>) -> Fut,
	Fut: 'static + Send + Future<Output = Result<AcquiredToken, AuthExchangeError>>,
{
	fn kind(&self) -> &'static str {
		self.kind
	}

	fn identity(&self) -> String {
		self.identity.clone()
	}

	fn acquire<'a>(&'a self, previous: Option<&'a CachedToken>) -> TokenFuture<'a> {
		Box::pin((self.acquire)(previous.cloned()))
	}
}
impl<F> Debug for FnTokenSource<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FnTokenSource").field("kind", &self.kind).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn basic_credentials_encode_locally() {
		let token = BasicCredentials::new("Aladdin", "open sesame")
			.acquire(None)
			.await
			.expect("Basic encoding should not fail.");

		assert_eq!(token.access_token.expose(), "QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
		assert_eq!(token.expires_in, None);
	}

	#[test]
	fn cache_entries_expire_before_the_issuer_deadline() {
		let now = OffsetDateTime::now_utc();
		let cached = AcquiredToken::new(TokenSecret::new("t"))
			.with_expires_in(Duration::seconds(3600))
			.into_cached(now, Duration::minutes(1));

		assert_eq!(cached.expires_at, Some(now + Duration::seconds(3540)));
		assert!(!cached.is_expired_at(now + Duration::seconds(3539)));
		assert!(cached.is_expired_at(now + Duration::seconds(3540)));
	}

	#[test]
	fn short_lifetimes_keep_half_their_window() {
		let now = OffsetDateTime::now_utc();
		let cached = AcquiredToken::new(TokenSecret::new("t"))
			.with_expires_in(Duration::seconds(30))
			.into_cached(now, Duration::minutes(1));

		assert_eq!(cached.expires_at, Some(now + Duration::seconds(15)));
		assert!(!cached.is_expired_at(now));
	}
}
