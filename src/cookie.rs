//! Cookie records, `Set-Cookie` parsing, and normalization of loosely-typed cookie inputs.

mod jar;

pub use jar::*;

// crates.io
use time::format_description::well_known::{Rfc2822, Rfc3339};
// self
use crate::_prelude::*;

/// Cookie failures surfaced in strict mode.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CookieError {
	/// Cookie string lacks a `name=value` pair.
	#[error("Cookie `{raw}` is malformed.")]
	Malformed {
		/// Raw cookie string.
		raw: String,
	},
	/// Cookie attribute value cannot be parsed.
	#[error("Cookie `{name}` has an invalid `{attribute}` attribute.")]
	InvalidAttribute {
		/// Cookie name.
		name: String,
		/// Attribute label.
		attribute: &'static str,
	},
	/// Cookie has already expired.
	#[error("Cookie `{name}` has expired.")]
	Expired {
		/// Cookie name.
		name: String,
	},
}

/// Single cookie with its scoping attributes; unique in a jar by `(name, domain, path)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
	/// Cookie name.
	pub name: String,
	/// Cookie value.
	pub value: String,
	/// Domain the cookie is scoped to; `None` matches every host.
	#[serde(default)]
	pub domain: Option<String>,
	/// Path prefix the cookie is scoped to.
	#[serde(default = "default_path")]
	pub path: String,
	/// Absolute expiry; `None` marks a session cookie.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
	/// Only send over secure schemes.
	#[serde(default)]
	pub secure: bool,
	/// Hidden from scripts; informational for an outbound client.
	#[serde(default)]
	pub http_only: bool,
}
impl CookieEntry {
	/// Creates a session cookie scoped to `/` on every host.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: None,
			path: default_path(),
			expires_at: None,
			secure: false,
			http_only: false,
		}
	}

	/// Scopes the cookie to a domain.
	pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = Some(normalize_domain(&domain.into()));

		self
	}

	/// Scopes the cookie to a path prefix.
	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = path.into();

		self
	}

	/// Sets an absolute expiry.
	pub fn with_expires_at(mut self, expires_at: OffsetDateTime) -> Self {
		self.expires_at = Some(expires_at);

		self
	}

	/// Marks the cookie as secure-only.
	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = secure;

		self
	}

	/// Marks the cookie as HTTP-only.
	pub fn with_http_only(mut self, http_only: bool) -> Self {
		self.http_only = http_only;

		self
	}

	/// Parses a `Set-Cookie` header value.
	///
	/// `strict` rejects malformed attributes instead of skipping them.
	pub fn parse(raw: &str, strict: bool) -> Result<Self, CookieError> {
		let mut parts = raw.split(';');
		let pair = parts.next().unwrap_or_default().trim();
		let Some((name, value)) = pair.split_once('=') else {
			return Err(CookieError::Malformed { raw: raw.to_owned() });
		};
		let name = name.trim();

		if name.is_empty() {
			return Err(CookieError::Malformed { raw: raw.to_owned() });
		}

		let mut cookie = Self::new(name, value.trim().trim_matches('"'));
		let mut max_age = None;

		for attribute in parts {
			let (key, value) = match attribute.split_once('=') {
				Some((key, value)) => (key.trim(), value.trim()),
				None => (attribute.trim(), ""),
			};

			match key.to_ascii_lowercase().as_str() {
				"domain" if !value.is_empty() => cookie.domain = Some(normalize_domain(value)),
				"path" if !value.is_empty() => cookie.path = value.to_owned(),
				"secure" => cookie.secure = true,
				"httponly" => cookie.http_only = true,
				"expires" => match parse_expires(value) {
					Some(at) => cookie.expires_at = Some(at),
					None if strict => return Err(cookie.invalid("expires")),
					None => {},
				},
				"max-age" => match value.parse::<i64>() {
					Ok(secs) => max_age = Some(secs),
					Err(_) if strict => return Err(cookie.invalid("max-age")),
					Err(_) => {},
				},
				_ => {},
			}
		}

		// Max-Age wins over Expires when both are present.
		if let Some(secs) = max_age {
			cookie.expires_at = Some(OffsetDateTime::now_utc() + Duration::seconds(secs));
		}

		Ok(cookie)
	}

	/// Returns `true` when the cookie expired at or before `now`.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}

	/// Returns `true` when the cookie should accompany a request to `host` + `path`.
	pub fn matches(&self, host: &str, path: &str, secure_scheme: bool) -> bool {
		if self.secure && !secure_scheme {
			return false;
		}

		let domain_ok = match &self.domain {
			None => true,
			Some(domain) => {
				let host = host.to_ascii_lowercase();

				host == *domain || host.ends_with(&format!(".{domain}"))
			},
		};
		let path_ok = path.starts_with(&self.path)
			&& (self.path.ends_with('/')
				|| path.len() == self.path.len()
				|| path[self.path.len()..].starts_with('/'));

		domain_ok && path_ok
	}

	/// Renders the `name=value` pair used in a `Cookie` request header.
	pub fn pair(&self) -> String {
		format!("{}={}", self.name, self.value)
	}

	/// Renders the cookie as a `Set-Cookie` header value.
	pub fn to_set_cookie(&self) -> String {
		let mut out = self.pair();

		if let Some(domain) = &self.domain {
			out.push_str(&format!("; Domain={domain}"));
		}

		out.push_str(&format!("; Path={}", self.path));

		if let Some(at) = self.expires_at
			&& let Ok(formatted) = at.format(&Rfc2822)
		{
			out.push_str(&format!("; Expires={formatted}"));
		}
		if self.secure {
			out.push_str("; Secure");
		}
		if self.http_only {
			out.push_str("; HttpOnly");
		}

		out
	}

	fn invalid(&self, attribute: &'static str) -> CookieError {
		CookieError::InvalidAttribute { name: self.name.clone(), attribute }
	}
}

/// Loosely-typed cookie representations accepted by descriptors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CookieInput {
	/// Bare `name` + `value`.
	Pair {
		/// Cookie name.
		name: String,
		/// Cookie value.
		value: String,
	},
	/// `Set-Cookie` style string (`name=value; Path=/; ...`).
	Header(String),
	/// Already-typed entry.
	Entry(CookieEntry),
}
impl CookieInput {
	/// Normalizes the input into a [`CookieEntry`], defaulting its domain to `host`.
	pub fn normalize(&self, host: &str, strict: bool) -> Result<CookieEntry, CookieError> {
		let mut entry = match self {
			Self::Pair { name, value } => CookieEntry::new(name.clone(), value.clone()),
			Self::Header(raw) => CookieEntry::parse(raw, strict)?,
			Self::Entry(entry) => entry.clone(),
		};

		if entry.domain.is_none() && !host.is_empty() {
			entry.domain = Some(normalize_domain(host));
		}

		Ok(entry)
	}

	/// Name of the cookie, when it can be determined without parsing attributes.
	pub fn name(&self) -> Option<&str> {
		match self {
			Self::Pair { name, .. } => Some(name),
			Self::Header(raw) =>
				raw.split(';').next()?.split_once('=').map(|(name, _)| name.trim()),
			Self::Entry(entry) => Some(&entry.name),
		}
	}
}
impl From<CookieEntry> for CookieInput {
	fn from(entry: CookieEntry) -> Self {
		Self::Entry(entry)
	}
}
impl From<&str> for CookieInput {
	fn from(raw: &str) -> Self {
		Self::Header(raw.to_owned())
	}
}
impl<N, V> From<(N, V)> for CookieInput
where
	N: Into<String>,
	V: Into<String>,
{
	fn from((name, value): (N, V)) -> Self {
		Self::Pair { name: name.into(), value: value.into() }
	}
}

/// Normalizes every input, dropping (permissive) or rejecting (strict) malformed ones.
pub fn normalize_all(
	inputs: &[CookieInput],
	host: &str,
	strict: bool,
) -> Result<Vec<CookieEntry>, CookieError> {
	let mut out = Vec::with_capacity(inputs.len());

	for input in inputs {
		match input.normalize(host, strict) {
			Ok(entry) => out.push(entry),
			Err(e) if strict => return Err(e),
			Err(_) => {},
		}
	}

	Ok(out)
}

fn default_path() -> String {
	"/".into()
}

fn normalize_domain(domain: &str) -> String {
	domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn parse_expires(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	OffsetDateTime::parse(raw, &Rfc2822)
		.or_else(|_| OffsetDateTime::parse(&raw.replace('-', " "), &Rfc2822))
		.or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
		.ok()
}
