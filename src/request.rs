//! The request descriptor: a mutable, cloneable description of one logical outbound call.

pub mod body;
pub mod path;

pub use body::{Body, FilePart};
pub use path::Params;

// self
use crate::{
	_prelude::*,
	bridge::Bridge,
	chain::{InterceptFuture, Interceptor, NamedInterceptor, Next},
	cookie::{self, CookieInput},
	error::{TransportError, ValidationError},
	http::{Headers, RawResponse, WireRequest},
	obs::{self, RequestOutcome, RequestSpan},
};

/// Supported request methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
	/// `OPTIONS`
	Options,
}
impl Method {
	/// Returns the upper-case wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
			Method::Options => "OPTIONS",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Method {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_uppercase().as_str() {
			"GET" => Ok(Method::Get),
			"POST" => Ok(Method::Post),
			"PUT" => Ok(Method::Put),
			"PATCH" => Ok(Method::Patch),
			"DELETE" => Ok(Method::Delete),
			"OPTIONS" => Ok(Method::Options),
			_ => Err(ValidationError::InvalidMethod { method: s.to_owned() }),
		}
	}
}

/// Supported URI schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
	/// `http`
	Http,
	/// `https`
	Https,
	/// `ftp`
	Ftp,
	/// `sftp`
	Sftp,
	/// `smtp`
	Smtp,
}
impl Scheme {
	/// Returns the lower-case label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Scheme::Http => "http",
			Scheme::Https => "https",
			Scheme::Ftp => "ftp",
			Scheme::Sftp => "sftp",
			Scheme::Smtp => "smtp",
		}
	}

	/// Returns `true` for schemes whose transport is encrypted.
	pub const fn is_secure(self) -> bool {
		matches!(self, Scheme::Https | Scheme::Sftp)
	}
}
impl Display for Scheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Scheme {
	type Err = ValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"http" => Ok(Scheme::Http),
			"https" => Ok(Scheme::Https),
			"ftp" => Ok(Scheme::Ftp),
			"sftp" => Ok(Scheme::Sftp),
			"smtp" => Ok(Scheme::Smtp),
			_ => Err(ValidationError::InvalidScheme { scheme: s.to_owned() }),
		}
	}
}

/// Mutable description of one logical call, its interceptor chain, and its bound bridge.
///
/// Cloning deep-copies the bridge, so a clone never shares transport or cookie state with its
/// source (unless the bridge was built over a deliberately shared cookie jar).
pub struct RequestDescriptor {
	method: Method,
	scheme: Scheme,
	host: String,
	path: String,
	query: BTreeMap<String, Value>,
	body: Body,
	headers: Headers,
	cookies: Vec<CookieInput>,
	interceptors: Vec<NamedInterceptor>,
	bridge: Box<dyn Bridge>,
	resolved_path: Option<String>,
	sent: Option<WireRequest>,
	response: Option<RawResponse>,
	sent_at: Option<OffsetDateTime>,
	received_at: Option<OffsetDateTime>,
}
impl RequestDescriptor {
	/// Creates a `GET https://` descriptor bound to `bridge`.
	pub fn new(bridge: Box<dyn Bridge>) -> Self {
		Self {
			method: Method::Get,
			scheme: Scheme::Https,
			host: String::new(),
			path: String::new(),
			query: BTreeMap::new(),
			body: Body::Empty,
			headers: Headers::default(),
			cookies: Vec::new(),
			interceptors: Vec::new(),
			bridge,
			resolved_path: None,
			sent: None,
			response: None,
			sent_at: None,
			received_at: None,
		}
	}

	/// Parses, normalizes, and sets the method.
	pub fn set_method(&mut self, method: impl AsRef<str>) -> Result<&mut Self> {
		self.method = method.as_ref().parse()?;

		Ok(self)
	}

	/// Sets an already-validated method.
	pub fn set_method_kind(&mut self, method: Method) -> &mut Self {
		self.method = method;

		self
	}

	/// Parses, normalizes, and sets the scheme.
	pub fn set_scheme(&mut self, scheme: impl AsRef<str>) -> Result<&mut Self> {
		self.scheme = scheme.as_ref().parse()?;

		Ok(self)
	}

	/// Sets an already-validated scheme.
	pub fn set_scheme_kind(&mut self, scheme: Scheme) -> &mut Self {
		self.scheme = scheme;

		self
	}

	/// Sets the host (optionally with a port).
	pub fn set_host(&mut self, host: impl Into<String>) -> &mut Self {
		self.host = host.into();

		self
	}

	/// Sets the path template; `{name}` and `{name?}` placeholders resolve at send time.
	pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
		self.path = path.into();

		self
	}

	/// Replaces the query.
	pub fn set_query(&mut self, query: BTreeMap<String, Value>) -> &mut Self {
		self.query = query;

		self
	}

	/// Sets one query value.
	pub fn add_query(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
		self.query.insert(name.into(), value.into());

		self
	}

	/// Replaces the body.
	pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
		self.body = body.into();

		self
	}

	/// Attaches a file, promoting the body to multipart.
	pub fn attach_file(&mut self, part: FilePart) -> &mut Self {
		self.body.attach(part);

		self
	}

	/// Replaces every header.
	pub fn set_headers(&mut self, headers: Headers) -> &mut Self {
		self.headers = headers;

		self
	}

	/// Replaces one header.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
		self.headers.set(name, value);

		self
	}

	/// Removes one header.
	pub fn remove_header(&mut self, name: &str) -> &mut Self {
		self.headers.remove(name);

		self
	}

	/// Replaces every cookie.
	pub fn set_cookies(&mut self, cookies: Vec<CookieInput>) -> &mut Self {
		self.cookies = cookies;

		self
	}

	/// Adds or replaces a cookie by name.
	pub fn add_cookie(&mut self, cookie: impl Into<CookieInput>) -> &mut Self {
		let cookie = cookie.into();

		if let Some(name) = cookie.name().map(str::to_owned) {
			self.cookies.retain(|existing| existing.name() != Some(name.as_str()));
		}

		self.cookies.push(cookie);

		self
	}

	/// Registers an interceptor; the first registered interceptor is the outermost wrapper.
	///
	/// Without an explicit name the interceptor's label is used.
	pub fn push_interceptor(
		&mut self,
		handler: Arc<dyn Interceptor>,
		name: Option<String>,
	) -> &mut Self {
		let name = name.unwrap_or_else(|| handler.label().to_owned());

		self.interceptors.push(NamedInterceptor { name, handler });

		self
	}

	/// Removes every interceptor registered under `name`.
	pub fn remove_interceptor(&mut self, name: &str) -> &mut Self {
		self.interceptors.retain(|interceptor| interceptor.name != name);

		self
	}

	/// Interceptor registered under `name`.
	pub fn interceptor(&self, name: &str) -> Option<&Arc<dyn Interceptor>> {
		self.interceptors.iter().find(|i| i.name == name).map(|i| &i.handler)
	}

	/// Binds a new bridge, dropping the previous one.
	pub fn set_bridge(&mut self, bridge: Box<dyn Bridge>) -> &mut Self {
		self.bridge = bridge;

		self
	}

	/// Method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Scheme.
	pub fn scheme(&self) -> Scheme {
		self.scheme
	}

	/// Host.
	pub fn host(&self) -> &str {
		&self.host
	}

	/// Path template.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Path as resolved by the most recent send.
	pub fn resolved_path(&self) -> Option<&str> {
		self.resolved_path.as_deref()
	}

	/// Query values.
	pub fn query(&self) -> &BTreeMap<String, Value> {
		&self.query
	}

	/// Body.
	pub fn body(&self) -> &Body {
		&self.body
	}

	/// Headers.
	pub fn headers(&self) -> &Headers {
		&self.headers
	}

	/// Mutable headers.
	pub fn headers_mut(&mut self) -> &mut Headers {
		&mut self.headers
	}

	/// Cookies, including those written back from the bridge jar after a send.
	pub fn cookies(&self) -> &[CookieInput] {
		&self.cookies
	}

	/// Registered interceptors in registration order.
	pub fn interceptors(&self) -> &[NamedInterceptor] {
		&self.interceptors
	}

	/// Bound bridge.
	pub fn bridge(&self) -> &dyn Bridge {
		self.bridge.as_ref()
	}

	/// Mutable bound bridge.
	pub fn bridge_mut(&mut self) -> &mut dyn Bridge {
		self.bridge.as_mut()
	}

	/// Bound bridge downcast to its concrete type.
	pub fn bridge_as<B>(&self) -> Option<&B>
	where
		B: Bridge,
	{
		self.bridge.as_any().downcast_ref::<B>()
	}

	/// Transport failure captured by the bridge during the most recent transport call.
	pub fn error(&self) -> Option<&TransportError> {
		self.bridge.error()
	}

	/// Wire request handed to the bridge by the most recent transport call.
	pub fn sent_request(&self) -> Option<&WireRequest> {
		self.sent.as_ref()
	}

	/// Raw response of the most recent transport call.
	pub fn response(&self) -> Option<&RawResponse> {
		self.response.as_ref()
	}

	/// When the most recent send started.
	pub fn sent_at(&self) -> Option<OffsetDateTime> {
		self.sent_at
	}

	/// When the most recent send finished.
	pub fn received_at(&self) -> Option<OffsetDateTime> {
		self.received_at
	}

	/// Absolute URI of the call as it stands now.
	pub fn uri(&self) -> String {
		self.build_wire().map(|wire| wire.uri()).unwrap_or_else(|_| {
			let path = self.resolved_path.as_deref().unwrap_or(&self.path);

			format!("{}://{}{path}", self.scheme, self.host)
		})
	}

	/// Builds the wire request from the current field values.
	pub fn build_wire(&self) -> Result<WireRequest> {
		let strict = self.bridge.cookie_jar().is_some_and(|jar| jar.lock().is_strict());
		let cookies =
			cookie::normalize_all(&self.cookies, &self.host, strict).map_err(TransportError::from)?;

		Ok(WireRequest {
			method: self.method,
			scheme: self.scheme,
			host: self.host.clone(),
			path: self.resolved_path.clone().unwrap_or_else(|| self.path.clone()),
			query: self.query.clone(),
			headers: self.headers.clone(),
			body: self.body.clone(),
			cookies,
		})
	}

	/// Resolves the path from `params` and runs the interceptor chain, terminating at the bound
	/// bridge.
	///
	/// Network failures come back as [`Error::Transport`]; HTTP error statuses come back as
	/// responses with the failure readable through [`RequestDescriptor::error`].
	pub async fn send(&mut self, params: &Params) -> Result<RawResponse> {
		self.resolved_path = Some(path::resolve(&self.path, params)?);
		self.sent_at = Some(OffsetDateTime::now_utc());
		self.received_at = None;
		self.response = None;
		self.sent = None;

		let span = RequestSpan::new(self.method.as_str(), &self.uri());
		let chain = self.interceptors.clone();
		let result = span.instrument(Next::new(&chain).run(self)).await;

		self.received_at = Some(OffsetDateTime::now_utc());

		obs::record_request_outcome(match &result {
			Ok(response) if response.is_error() => RequestOutcome::ErrorStatus,
			Ok(_) => RequestOutcome::Success,
			Err(_) => RequestOutcome::Failure,
		});

		result
	}

	/// Performs one transport call with the descriptor as it stands; the innermost step of every
	/// chain.
	pub(crate) fn dispatch(&mut self) -> InterceptFuture<'_> {
		Box::pin(async move {
			let wire = self.build_wire()?;
			let result = self.bridge.send(&wire).await;

			if let Some(jar) = self.bridge.cookie_jar() {
				self.cookies = jar.snapshot().into_iter().map(CookieInput::Entry).collect();
			}
			if let Ok(response) = &result {
				self.response = Some(response.clone());
			}

			self.sent = Some(wire);

			Ok(result?)
		})
	}
}
impl Clone for RequestDescriptor {
	fn clone(&self) -> Self {
		Self {
			method: self.method,
			scheme: self.scheme,
			host: self.host.clone(),
			path: self.path.clone(),
			query: self.query.clone(),
			body: self.body.clone(),
			headers: self.headers.clone(),
			cookies: self.cookies.clone(),
			interceptors: self.interceptors.clone(),
			bridge: self.bridge.box_clone(),
			resolved_path: self.resolved_path.clone(),
			sent: self.sent.clone(),
			response: self.response.clone(),
			sent_at: self.sent_at,
			received_at: self.received_at,
		}
	}
}
impl Debug for RequestDescriptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDescriptor")
			.field("method", &self.method)
			.field("scheme", &self.scheme)
			.field("host", &self.host)
			.field("path", &self.path)
			.field("query", &self.query)
			.field("interceptors", &self.interceptors)
			.field("bridge", &self.bridge)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::bridge::{MockBridge, MockRule};

	fn descriptor() -> RequestDescriptor {
		let mut bridge = MockBridge::default();

		bridge.push_rule(
			MockRule::new()
				.when("path", "/users/42")
				.respond(RawResponse::new(201).with_body(b"found".to_vec())),
		);

		let mut descriptor = RequestDescriptor::new(Box::new(bridge));

		descriptor.set_host("api.test").set_path("/users/{id}");

		descriptor
	}

	#[test]
	fn method_and_scheme_are_normalized() {
		let mut descriptor = descriptor();

		descriptor.set_method(" patch ").expect("Lower-case method should normalize.");
		descriptor.set_scheme("HTTP").expect("Upper-case scheme should normalize.");

		assert_eq!(descriptor.method(), Method::Patch);
		assert_eq!(descriptor.scheme(), Scheme::Http);
		assert!(matches!(
			descriptor.set_method("TRACE"),
			Err(Error::Validation(ValidationError::InvalidMethod { .. }))
		));
		assert!(matches!(
			descriptor.set_scheme("gopher"),
			Err(Error::Validation(ValidationError::InvalidScheme { .. }))
		));
	}

	#[tokio::test]
	async fn send_resolves_placeholders_and_records_timestamps() {
		let mut descriptor = descriptor();
		let params = Params::from([("id".to_owned(), "42".to_owned())]);
		let response = descriptor.send(&params).await.expect("Mock send should succeed.");

		assert_eq!(response.status, 201);
		assert_eq!(descriptor.resolved_path(), Some("/users/42"));
		assert!(descriptor.sent_at().is_some() && descriptor.received_at().is_some());
		assert_eq!(descriptor.response().map(|r| r.status), Some(201));
		assert_eq!(descriptor.sent_request().map(|w| w.path.as_str()), Some("/users/42"));
	}

	#[tokio::test]
	async fn missing_parameter_fails_before_the_wire() {
		let mut descriptor = descriptor();
		let err = descriptor.send(&Params::new()).await.expect_err("Missing id should fail fast.");

		assert!(matches!(err, Error::Validation(ValidationError::MissingParameter { .. })));
		assert!(descriptor.sent_request().is_none());
	}

	#[test]
	fn clones_own_independent_bridges() {
		let mut original = descriptor();

		original.add_query("page", json!(1)).set_header("x-a", "1");

		let mut copy = original.clone();

		copy.set_header("x-a", "2");

		assert_eq!(original.headers().get("x-a"), Some("1"));
		assert!(!std::ptr::addr_eq(
			original.bridge() as *const dyn Bridge,
			copy.bridge() as *const dyn Bridge
		));
	}

	#[test]
	fn cookies_replace_by_name() {
		let mut descriptor = descriptor();

		descriptor
			.add_cookie(("sid", "1"))
			.add_cookie("sid=2; Path=/")
			.add_cookie(("theme", "dark"));

		assert_eq!(descriptor.cookies().len(), 2);
	}
}
