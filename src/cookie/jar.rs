// crates.io
use parking_lot::MutexGuard;
// self
use crate::{
	_prelude::*,
	cookie::{CookieEntry, CookieError},
	http::Headers,
};

/// Ordered cookie set, unique by `(name, domain, path)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieJar {
	entries: Vec<CookieEntry>,
	strict: bool,
}
impl CookieJar {
	/// Creates an empty jar; `strict` rejects expired or malformed cookies instead of dropping
	/// them.
	pub fn new(strict: bool) -> Self {
		Self { entries: Vec::new(), strict }
	}

	/// Returns `true` when the jar runs in strict mode.
	pub fn is_strict(&self) -> bool {
		self.strict
	}

	/// Inserts or replaces a cookie.
	///
	/// An already-expired cookie removes any stored cookie with the same identity; strict jars
	/// also report it.
	pub fn set(&mut self, cookie: CookieEntry) -> Result<(), CookieError> {
		let position = self.entries.iter().position(|existing| same_identity(existing, &cookie));

		if cookie.is_expired(OffsetDateTime::now_utc()) {
			if let Some(idx) = position {
				self.entries.remove(idx);
			}
			if self.strict {
				return Err(CookieError::Expired { name: cookie.name });
			}

			return Ok(());
		}

		match position {
			Some(idx) => self.entries[idx] = cookie,
			None => self.entries.push(cookie),
		}

		Ok(())
	}

	/// Inserts every cookie, stopping at the first strict-mode failure.
	pub fn extend(
		&mut self,
		cookies: impl IntoIterator<Item = CookieEntry>,
	) -> Result<(), CookieError> {
		for cookie in cookies {
			self.set(cookie)?;
		}

		Ok(())
	}

	/// Parses every `set-cookie` header of a response into the jar.
	///
	/// Cookies without a `Domain` attribute are scoped to `host`.
	pub fn absorb(&mut self, headers: &Headers, host: &str) -> Result<usize, CookieError> {
		let mut absorbed = 0;

		for raw in headers.get_all("set-cookie") {
			let mut cookie = match CookieEntry::parse(raw, self.strict) {
				Ok(cookie) => cookie,
				Err(e) if self.strict => return Err(e),
				Err(_) => continue,
			};

			if cookie.domain.is_none() {
				cookie.domain = Some(host.to_ascii_lowercase());
			}

			self.set(cookie)?;

			absorbed += 1;
		}

		Ok(absorbed)
	}

	/// Live cookies that should accompany a request to `host` + `path`.
	pub fn matching(&self, host: &str, path: &str, secure_scheme: bool) -> Vec<&CookieEntry> {
		let now = OffsetDateTime::now_utc();

		self.entries
			.iter()
			.filter(|cookie| !cookie.is_expired(now) && cookie.matches(host, path, secure_scheme))
			.collect()
	}

	/// Renders the `Cookie` request header for `host` + `path`, if any cookie matches.
	pub fn header_value(&self, host: &str, path: &str, secure_scheme: bool) -> Option<String> {
		let pairs = self
			.matching(host, path, secure_scheme)
			.into_iter()
			.map(CookieEntry::pair)
			.collect::<Vec<_>>();

		(!pairs.is_empty()).then(|| pairs.join("; "))
	}

	/// First cookie stored under `name`.
	pub fn get(&self, name: &str) -> Option<&CookieEntry> {
		self.entries.iter().find(|cookie| cookie.name == name)
	}

	/// Removes every cookie stored under `name`.
	pub fn remove(&mut self, name: &str) {
		self.entries.retain(|cookie| cookie.name != name);
	}

	/// Drops cookies that expired at or before `now`.
	pub fn purge_expired(&mut self, now: OffsetDateTime) {
		self.entries.retain(|cookie| !cookie.is_expired(now));
	}

	/// Removes every cookie.
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// Stored cookies in insertion order.
	pub fn entries(&self) -> &[CookieEntry] {
		&self.entries
	}

	/// Number of stored cookies.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` when the jar is empty.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Bridge-owned handle to a cookie jar.
///
/// A private handle deep-copies its jar when cloned; a shared handle (the "keep cookies across
/// calls" policy) keeps pointing at the same jar.
#[derive(Debug)]
pub struct JarHandle {
	inner: Arc<Mutex<CookieJar>>,
	shared: bool,
}
impl JarHandle {
	/// Wraps a jar owned by a single bridge.
	pub fn private(jar: CookieJar) -> Self {
		Self { inner: Arc::new(Mutex::new(jar)), shared: false }
	}

	/// Wraps a jar shared by every bridge created from the same service.
	pub fn shared(inner: Arc<Mutex<CookieJar>>) -> Self {
		Self { inner, shared: true }
	}

	/// Returns `true` when the jar is shared across bridges.
	pub fn is_shared(&self) -> bool {
		self.shared
	}

	/// Locks the jar.
	pub fn lock(&self) -> MutexGuard<'_, CookieJar> {
		self.inner.lock()
	}

	/// Copies every stored cookie.
	pub fn snapshot(&self) -> Vec<CookieEntry> {
		self.inner.lock().entries().to_vec()
	}

	/// Returns `true` when both handles point at the same jar.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}
impl Clone for JarHandle {
	fn clone(&self) -> Self {
		if self.shared {
			Self { inner: self.inner.clone(), shared: true }
		} else {
			Self::private(self.inner.lock().clone())
		}
	}
}
impl Default for JarHandle {
	fn default() -> Self {
		Self::private(CookieJar::default())
	}
}

fn same_identity(a: &CookieEntry, b: &CookieEntry) -> bool {
	a.name == b.name && a.domain == b.domain && a.path == b.path
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identity_is_name_domain_and_path() {
		let mut jar = CookieJar::new(false);

		jar.set(CookieEntry::new("a", "1").with_domain("x.test")).expect("Insert should succeed.");
		jar.set(CookieEntry::new("a", "2").with_domain("x.test")).expect("Replace should succeed.");
		jar.set(CookieEntry::new("a", "3").with_domain("x.test").with_path("/v2"))
			.expect("Distinct path should be a new cookie.");

		assert_eq!(jar.len(), 2);
		assert_eq!(jar.get("a").map(|c| c.value.as_str()), Some("2"));
	}

	#[test]
	fn expired_cookies_evict_and_strict_jars_complain() {
		let past = OffsetDateTime::now_utc() - Duration::hours(1);
		let mut jar = CookieJar::new(false);

		jar.set(CookieEntry::new("a", "1")).expect("Insert should succeed.");
		jar.set(CookieEntry::new("a", "1").with_expires_at(past))
			.expect("Permissive jar should accept expiring cookies silently.");

		assert!(jar.is_empty());

		let mut strict = CookieJar::new(true);

		assert!(strict.set(CookieEntry::new("a", "1").with_expires_at(past)).is_err());
	}

	#[test]
	fn absorb_reads_set_cookie_headers() {
		let mut headers = Headers::default();

		headers.append("Set-Cookie", "sid=1; Path=/");
		headers.append("set-cookie", "theme=dark");

		let mut jar = CookieJar::new(false);

		assert_eq!(jar.absorb(&headers, "API.test"), Ok(2));
		assert_eq!(
			jar.header_value("api.test", "/users", true).as_deref(),
			Some("sid=1; theme=dark")
		);
		assert_eq!(jar.header_value("other.test", "/", true), None);
	}

	#[test]
	fn private_handles_deep_copy_and_shared_handles_alias() {
		let private = JarHandle::default();
		let copy = private.clone();

		copy.lock().set(CookieEntry::new("a", "1")).expect("Insert should succeed.");

		assert!(private.lock().is_empty());
		assert!(!private.ptr_eq(&copy));

		let shared = JarHandle::shared(Arc::new(Mutex::new(CookieJar::default())));
		let alias = shared.clone();

		alias.lock().set(CookieEntry::new("a", "1")).expect("Insert should succeed.");

		assert_eq!(shared.lock().len(), 1);
		assert!(shared.ptr_eq(&alias));
	}
}
