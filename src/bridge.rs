//! Transport bridges: the boundary that turns a resolved request into a wire call.
//!
//! A bridge owns its transport client, its cookie jar handle, and the last transport failure it
//! captured. The failure is cleared at the start of every send. Network failures are returned as
//! errors; HTTP error statuses are returned as responses with the failure captured so the chain
//! can inspect it and decide whether to retry.

mod client;
mod mock;

pub use client::*;
pub use mock::*;

// self
use crate::{
	_prelude::*,
	cookie::{CookieJar, JarHandle},
	error::TransportError,
	http::{RawResponse, WireRequest},
};

/// Boxed future returned by [`Bridge::send`].
pub type BridgeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + 'a + Send>>;

/// Transport boundary bound to exactly one descriptor at a time.
pub trait Bridge
where
	Self: 'static + Send + Sync + Debug,
{
	/// Sends `request`, capturing any transport failure on the bridge.
	fn send<'a>(&'a mut self, request: &'a WireRequest) -> BridgeFuture<'a>;

	/// Failure captured by the most recent send.
	fn error(&self) -> Option<&TransportError>;

	/// Cookie jar, or `None` when cookies are disabled.
	fn cookie_jar(&self) -> Option<&JarHandle>;

	/// Deep copy used when a descriptor is cloned.
	fn box_clone(&self) -> Box<dyn Bridge>;

	/// Downcasting support.
	fn as_any(&self) -> &dyn Any;
}

/// Transport-level options shared by every bridge built for a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
	/// Verify TLS certificates.
	pub verify_tls: bool,
	/// Whole-request timeout in milliseconds.
	pub timeout_ms: Option<u64>,
	/// Connect timeout in milliseconds.
	pub connect_timeout_ms: Option<u64>,
	/// Proxy URL applied to every scheme.
	pub proxy: Option<String>,
	/// Headers sent with every request unless the request overrides them.
	pub default_headers: BTreeMap<String, String>,
	/// `User-Agent` header value.
	pub user_agent: Option<String>,
	/// Redirect limit; `Some(0)` disables redirects.
	pub max_redirects: Option<usize>,
	/// Maintain a cookie jar.
	pub cookies: bool,
	/// Share one jar across every bridge of the service.
	pub keep_cookies: bool,
	/// Reject malformed or expired cookies.
	pub strict_cookies: bool,
	/// Capture 4xx/5xx responses as transport failures.
	pub http_errors: bool,
}
impl TransportConfig {
	/// Builds the jar handle this configuration calls for; `shared` is used when
	/// `keep_cookies` is on.
	pub fn jar(&self, shared: Option<&Arc<Mutex<CookieJar>>>) -> Option<JarHandle> {
		if !self.cookies {
			return None;
		}

		Some(match shared {
			Some(shared) if self.keep_cookies => JarHandle::shared(shared.clone()),
			_ => JarHandle::private(CookieJar::new(self.strict_cookies)),
		})
	}
}
impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			verify_tls: true,
			timeout_ms: None,
			connect_timeout_ms: None,
			proxy: None,
			default_headers: BTreeMap::new(),
			user_agent: None,
			max_redirects: None,
			cookies: true,
			keep_cookies: false,
			strict_cookies: false,
			http_errors: true,
		}
	}
}

// Merges request cookies into the jar and renders the `Cookie` header for the target.
fn prepare_cookies(
	jar: Option<&JarHandle>,
	request: &WireRequest,
) -> Result<Option<String>, TransportError> {
	let Some(jar) = jar else {
		return Ok(None);
	};
	let mut jar = jar.lock();

	jar.extend(request.cookies.iter().cloned())?;

	let path = if request.path.is_empty() { "/" } else { request.path.as_str() };

	Ok(jar.header_value(request.hostname(), path, request.scheme.is_secure()))
}

// Records the failure the response represents, if any.
fn capture_status(
	config: &TransportConfig,
	request: &WireRequest,
	response: &RawResponse,
) -> Option<TransportError> {
	(config.http_errors && response.is_error())
		.then(|| TransportError::Status { status: response.status, url: request.uri() })
}
