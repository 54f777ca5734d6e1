//! Session-cookie login: a login request whose response sets the session cookie.

// self
use crate::{
	_prelude::*,
	auth::{AcquiredToken, CachedToken, TokenFuture, TokenSecret, TokenSource},
	cookie::CookieEntry,
	error::AuthExchangeError,
	request::{Params, RequestDescriptor},
};

/// Token source that logs in with a prepared descriptor and keeps the named session cookie.
///
/// Each acquisition sends a fresh clone of the login descriptor, so the template never carries
/// state from an earlier login.
#[derive(Debug)]
pub struct SessionSource {
	login: RequestDescriptor,
	params: Params,
	cookie_name: String,
}
impl SessionSource {
	/// Creates a source reading `cookie_name` from the login response.
	pub fn new(login: RequestDescriptor, cookie_name: impl Into<String>) -> Self {
		Self { login, params: Params::new(), cookie_name: cookie_name.into() }
	}

	/// Path parameters used when sending the login descriptor.
	pub fn with_params(mut self, params: Params) -> Self {
		self.params = params;

		self
	}

	/// Name of the session cookie.
	pub fn cookie_name(&self) -> &str {
		&self.cookie_name
	}

	async fn login(&self) -> Result<AcquiredToken, AuthExchangeError> {
		let mut login = self.login.clone();
		let response = login
			.send(&self.params)
			.await
			.map_err(|e| AuthExchangeError::Source { message: e.to_string() })?;

		if response.is_error() {
			return Err(AuthExchangeError::Endpoint {
				message: format!("login answered {}", response.status),
				status: Some(response.status),
			});
		}

		let from_headers = response
			.headers
			.get_all("set-cookie")
			.iter()
			.filter_map(|raw| CookieEntry::parse(raw, false).ok())
			.find(|cookie| cookie.name == self.cookie_name);
		let cookie = from_headers
			.or_else(|| {
				login
					.bridge()
					.cookie_jar()
					.and_then(|jar| jar.lock().get(&self.cookie_name).cloned())
			})
			.ok_or_else(|| AuthExchangeError::Source {
				message: format!("login response did not set `{}`", self.cookie_name),
			})?;
		let mut token = AcquiredToken::new(TokenSecret::new(cookie.value));

		token.expires_in = cookie.expires_at.map(|at| at - OffsetDateTime::now_utc());

		Ok(token)
	}
}
impl TokenSource for SessionSource {
	fn kind(&self) -> &'static str {
		"session"
	}

	fn identity(&self) -> String {
		format!("{}|{}|{}", self.login.uri(), self.login.body().to_value(), self.cookie_name)
	}

	fn acquire<'a>(&'a self, _: Option<&'a CachedToken>) -> TokenFuture<'a> {
		Box::pin(self.login())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		bridge::{MockBridge, MockRule},
		http::RawResponse,
		request::Method,
	};

	fn login(rule: MockRule) -> RequestDescriptor {
		let mut descriptor =
			RequestDescriptor::new(Box::new(MockBridge::default().with_rule(rule)));

		descriptor
			.set_method_kind(Method::Post)
			.set_host("idp.test")
			.set_path("/login")
			.set_body(serde_json::json!({ "user": "ada" }));

		descriptor
	}

	#[tokio::test]
	async fn session_cookie_becomes_the_token() {
		let rule = MockRule::new()
			.when("path", "/login")
			.with_cookie(CookieEntry::new("sid", "s-1"))
			.with_cookie(CookieEntry::new("other", "x"));
		let token = SessionSource::new(login(rule), "sid")
			.acquire(None)
			.await
			.expect("Login should yield the session cookie.");

		assert_eq!(token.access_token.expose(), "s-1");
		assert_eq!(token.expires_in, None);
	}

	#[tokio::test]
	async fn missing_cookie_fails() {
		let rule = MockRule::new().respond(RawResponse::new(200));
		let err = SessionSource::new(login(rule), "sid")
			.acquire(None)
			.await
			.expect_err("Login without the cookie should fail.");

		assert!(matches!(err, AuthExchangeError::Source { .. }));
	}
}
