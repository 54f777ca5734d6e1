//! Wire-level request/response shapes shared by bridges, interceptors, and decoders, plus the
//! instrumented reqwest handle used for token-endpoint exchanges.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
// self
use crate::{
	_prelude::*,
	cookie::CookieEntry,
	error::TransportError,
	request::{
		Method, Scheme,
		body::{self, Body, DEFAULT_CONTENT_TYPE, EncodedBody},
	},
};

/// Case-insensitive header map; names are stored lowercased and may repeat.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<String>>);
impl Headers {
	/// First value stored under `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.get(&name.to_ascii_lowercase()).and_then(|values| values.first()).map(String::as_str)
	}

	/// Every value stored under `name`.
	pub fn get_all(&self, name: &str) -> &[String] {
		self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice).unwrap_or_default()
	}

	/// Returns `true` when `name` carries at least one value.
	pub fn contains(&self, name: &str) -> bool {
		!self.get_all(name).is_empty()
	}

	/// Replaces every value of `name` with `value`.
	pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
		self.0.insert(name.to_ascii_lowercase(), vec![value.into()]);

		self
	}

	/// Replaces every value of `name` with `values`.
	pub fn set_all(&mut self, name: &str, values: Vec<String>) -> &mut Self {
		if values.is_empty() {
			self.0.remove(&name.to_ascii_lowercase());
		} else {
			self.0.insert(name.to_ascii_lowercase(), values);
		}

		self
	}

	/// Appends a value to `name`.
	pub fn append(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
		self.0.entry(name.to_ascii_lowercase()).or_default().push(value.into());

		self
	}

	/// Removes `name`, returning its values.
	pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
		self.0.remove(&name.to_ascii_lowercase())
	}

	/// Overlays `other` onto `self`; names present in `other` replace existing values.
	pub fn merge(&mut self, other: &Headers) {
		for (name, values) in &other.0 {
			self.0.insert(name.clone(), values.clone());
		}
	}

	/// Iterates `(name, values)` pairs in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
		self.0.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
	}

	/// Number of distinct header names.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no header is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// JSON view: single values as strings, repeated values as lists.
	pub fn to_value(&self) -> Value {
		Value::Object(
			self.0
				.iter()
				.map(|(name, values)| {
					let value = match values.as_slice() {
						[single] => Value::String(single.clone()),
						many => Value::Array(many.iter().cloned().map(Value::String).collect()),
					};

					(name.clone(), value)
				})
				.collect(),
		)
	}
}
impl<N, V> FromIterator<(N, V)> for Headers
where
	N: AsRef<str>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
		let mut headers = Self::default();

		for (name, value) in iter {
			headers.append(name.as_ref(), value);
		}

		headers
	}
}

/// Raw response returned by a bridge before decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers, including repeated `set-cookie`.
	pub headers: Headers,
	/// Body bytes.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// Creates an empty response with `status`.
	pub fn new(status: u16) -> Self {
		Self { status, headers: Headers::default(), body: Vec::new() }
	}

	/// Appends a header.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// `content-type` header, if present.
	pub fn content_type(&self) -> Option<&str> {
		self.headers.get("content-type")
	}

	/// Lossy UTF-8 view of the body.
	pub fn text(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for 4xx and 5xx statuses.
	pub fn is_error(&self) -> bool {
		self.status >= 400
	}
}

/// Fully-resolved request handed to a bridge.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRequest {
	/// Normalized method.
	pub method: Method,
	/// Normalized scheme.
	pub scheme: Scheme,
	/// Target host, optionally with a port.
	pub host: String,
	/// Resolved path (placeholders already substituted).
	pub path: String,
	/// Query values; nested values flatten with bracket keys.
	pub query: BTreeMap<String, Value>,
	/// Outgoing headers.
	pub headers: Headers,
	/// Structured body.
	pub body: Body,
	/// Descriptor cookies, already normalized.
	pub cookies: Vec<CookieEntry>,
}
impl WireRequest {
	/// Declared content type, falling back to form encoding.
	pub fn content_type(&self) -> &str {
		self.headers.get("content-type").unwrap_or(DEFAULT_CONTENT_TYPE)
	}

	/// Host without its port; cookie domains are matched against this.
	pub fn hostname(&self) -> &str {
		self.host.split(':').next().unwrap_or_default()
	}

	/// Absolute URI rendered as `scheme://host/path?query`.
	pub fn uri(&self) -> String {
		let host = self.host.trim_end_matches('/');
		let path = self.path.trim_start_matches('/');
		let mut uri = if path.is_empty() {
			format!("{}://{host}", self.scheme)
		} else {
			format!("{}://{host}/{path}", self.scheme)
		};
		let query = body::encode_pairs(&body::flatten(&Value::Object(
			self.query.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
		)));

		if !query.is_empty() {
			uri.push('?');
			uri.push_str(&query);
		}

		uri
	}

	/// Parsed absolute URL.
	pub fn url(&self) -> Result<Url, TransportError> {
		let uri = self.uri();

		Url::parse(&uri).map_err(|_| TransportError::InvalidUrl { url: uri })
	}

	/// Body encoded for the declared content type.
	pub fn encoded_body(&self) -> EncodedBody {
		self.body.encode(self.content_type())
	}

	/// JSON view consumed by mock rules and archives.
	pub fn snapshot(&self) -> Value {
		let cookies = self
			.cookies
			.iter()
			.map(|cookie| (cookie.name.clone(), Value::String(cookie.value.clone())))
			.collect::<serde_json::Map<_, _>>();

		serde_json::json!({
			"method": self.method.as_str(),
			"scheme": self.scheme.as_str(),
			"host": self.host,
			"path": self.path,
			"uri": self.uri(),
			"query": self.query,
			"headers": self.headers.to_value(),
			"body": self.body.to_value(),
			"cookies": cookies,
		})
	}
}

/// Metadata captured from the most recent token-endpoint response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot sharing [`ResponseMetadata`] between the token transport and error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current exchange.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Reqwest-backed [`AsyncHttpClient`] handle used by OAuth2 token exchanges.
///
/// Token endpoints answer directly, so the wrapped client should not follow redirects.
#[derive(Clone)]
pub struct TokenHttpHandle(Arc<TokenHttpInner>);
impl TokenHttpHandle {
	/// Wraps `client`, recording response metadata into `slot`.
	pub fn new(client: ReqwestClient, slot: ResponseMetadataSlot) -> Self {
		Self(Arc::new(TokenHttpInner { client, slot }))
	}
}
impl<'c> AsyncHttpClient<'c> for TokenHttpHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner
				.client
				.execute(request.try_into().map_err(Box::new)?)
				.await
				.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();

			inner.slot.store(ResponseMetadata { status: Some(status.as_u16()) });

			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

struct TokenHttpInner {
	client: ReqwestClient,
	slot: ResponseMetadataSlot,
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn wire() -> WireRequest {
		WireRequest {
			method: Method::Get,
			scheme: Scheme::Https,
			host: "api.test/".into(),
			path: "/users/42".into(),
			query: BTreeMap::from([("filter".to_owned(), json!({ "role": "admin" }))]),
			headers: Headers::default(),
			body: Body::Empty,
			cookies: vec![CookieEntry::new("sid", "1")],
		}
	}

	#[test]
	fn headers_are_case_insensitive() {
		let mut headers = Headers::default();

		headers
			.set("Content-Type", "application/json")
			.append("X-Trace", "a")
			.append("x-trace", "b");

		assert_eq!(headers.get("content-type"), Some("application/json"));
		assert_eq!(headers.get_all("X-TRACE"), ["a", "b"]);
		assert_eq!(
			headers.to_value(),
			json!({ "content-type": "application/json", "x-trace": ["a", "b"] })
		);
	}

	#[test]
	fn uri_joins_parts_and_flattens_query() {
		let request = wire();

		assert_eq!(request.uri(), "https://api.test/users/42?filter%5Brole%5D=admin");
		assert!(request.url().is_ok());
		assert_eq!(request.content_type(), DEFAULT_CONTENT_TYPE);
	}

	#[test]
	fn snapshot_exposes_rule_fields() {
		let snapshot = wire().snapshot();

		assert_eq!(snapshot["method"], "GET");
		assert_eq!(snapshot["path"], "/users/42");
		assert_eq!(snapshot["cookies"]["sid"], "1");
	}
}
