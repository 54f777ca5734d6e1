//! Process-wide keyed token cache with single-flight acquisition.

// self
use crate::{_prelude::*, auth::TokenSecret, obs::TokenOutcome};

/// Cached credential plus its (already margin-adjusted) expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedToken {
	/// Credential injected into requests.
	pub token: TokenSecret,
	/// Refresh secret, when the issuer returned one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant after which the token must be re-acquired; `None` never expires.
	pub expires_at: Option<OffsetDateTime>,
	/// When the token was stored.
	pub acquired_at: OffsetDateTime,
}
impl CachedToken {
	/// Creates a non-expiring token.
	pub fn new(token: TokenSecret) -> Self {
		Self {
			token,
			refresh_token: None,
			expires_at: None,
			acquired_at: OffsetDateTime::now_utc(),
		}
	}

	/// Sets the expiry.
	pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Sets the refresh secret.
	pub fn with_refresh_token(mut self, refresh_token: TokenSecret) -> Self {
		self.refresh_token = Some(refresh_token);

		self
	}

	/// Returns `true` once `now` reached the expiry.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

/// Keyed store of credentials shared by every request using the same key.
///
/// Concurrent misses for one key collapse into a single acquisition: the first caller acquires
/// while the rest wait on the key's guard and then read the stored result. The guard is released
/// on success, failure, and cancellation alike.
#[derive(Debug, Default)]
pub struct TokenCache {
	entries: RwLock<HashMap<String, CachedToken>>,
	flow_guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}
impl TokenCache {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Stored entry, expired or not.
	pub fn get(&self, key: &str) -> Option<CachedToken> {
		self.entries.read().get(key).cloned()
	}

	/// Stored entry if it is still valid at `now`.
	pub fn fresh(&self, key: &str, now: OffsetDateTime) -> Option<CachedToken> {
		self.entries.read().get(key).filter(|token| !token.is_expired_at(now)).cloned()
	}

	/// Stores `token` under `key`, replacing any previous entry.
	pub fn store(&self, key: &str, token: CachedToken) {
		self.entries.write().insert(key.to_owned(), token);
	}

	/// Removes the entry under `key`.
	pub fn invalidate(&self, key: &str) -> Option<CachedToken> {
		self.entries.write().remove(key)
	}

	/// Removes the entry under `key` only if it still holds `token`, so a credential refreshed by
	/// another caller in the meantime survives.
	pub fn invalidate_if_current(&self, key: &str, token: &TokenSecret) -> bool {
		let mut entries = self.entries.write();

		if entries.get(key).is_some_and(|current| current.token == *token) {
			entries.remove(key);

			return true;
		}

		false
	}

	/// Marks the entry under `key` as expired while keeping its refresh secret for the next
	/// acquisition.
	pub fn expire(&self, key: &str) -> bool {
		self.expire_where(key, |_| true)
	}

	/// Like [`TokenCache::expire`], but only while the entry still holds `token`.
	pub fn expire_if_current(&self, key: &str, token: &TokenSecret) -> bool {
		self.expire_where(key, |current| current.token == *token)
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Number of stored entries.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Returns the fresh entry under `key`, or runs `acquire` (at most once across concurrent
	/// callers) and stores its result.
	///
	/// `acquire` receives the previous, possibly expired, entry so refresh-capable sources can
	/// use its refresh secret.
	pub async fn get_or_acquire<F, Fut>(
		&self,
		key: &str,
		acquire: F,
	) -> Result<(CachedToken, TokenOutcome)>
	where
		F: FnOnce(Option<CachedToken>) -> Fut,
		Fut: Future<Output = Result<CachedToken>>,
	{
		if let Some(token) = self.fresh(key, OffsetDateTime::now_utc()) {
			return Ok((token, TokenOutcome::Hit));
		}

		let guard = self.flow_guard(key);
		let _singleflight = guard.lock().await;

		// Another caller may have stored a token while this one waited.
		if let Some(token) = self.fresh(key, OffsetDateTime::now_utc()) {
			return Ok((token, TokenOutcome::Hit));
		}

		let token = acquire(self.get(key)).await?;

		self.store(key, token.clone());

		Ok((token, TokenOutcome::Acquired))
	}

	fn expire_where(&self, key: &str, pred: impl FnOnce(&CachedToken) -> bool) -> bool {
		let mut entries = self.entries.write();

		match entries.get_mut(key) {
			Some(current) if pred(current) => {
				current.expires_at = Some(OffsetDateTime::UNIX_EPOCH);

				true
			},
			_ => false,
		}
	}

	fn flow_guard(&self, key: &str) -> Arc<AsyncMutex<()>> {
		let mut guards = self.flow_guards.lock();

		guards.entry(key.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
