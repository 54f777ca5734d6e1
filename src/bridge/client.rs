// std
use std::time::Duration as StdDuration;
// crates.io
use reqwest::{
	Method as ReqwestMethod, Proxy, redirect,
	header::{HeaderMap, HeaderName, HeaderValue},
	multipart::{Form, Part},
};
// self
use crate::{
	_prelude::*,
	bridge::{Bridge, BridgeFuture, TransportConfig, capture_status, prepare_cookies},
	cookie::{CookieJar, JarHandle},
	error::{ConfigError, TransportError},
	http::{Headers, RawResponse, WireRequest},
	request::{
		Method, Scheme,
		body::{EncodedBody, MultipartField},
	},
};

/// Bridge backed by a [`ReqwestClient`]; speaks `http` and `https`.
#[derive(Debug)]
pub struct ReqwestBridge {
	config: TransportConfig,
	client: ReqwestClient,
	jar: Option<JarHandle>,
	error: Option<TransportError>,
}
impl ReqwestBridge {
	/// Builds a bridge with a private cookie jar.
	pub fn new(config: TransportConfig) -> Result<Self, ConfigError> {
		Self::with_shared_jar(config, None)
	}

	/// Builds a bridge that uses `shared` when the config keeps cookies across calls.
	pub fn with_shared_jar(
		config: TransportConfig,
		shared: Option<&Arc<Mutex<CookieJar>>>,
	) -> Result<Self, ConfigError> {
		let client = build_client(&config)?;
		let jar = config.jar(shared);

		Ok(Self { config, client, jar, error: None })
	}

	/// Wraps a prebuilt client; `config` still drives cookies and error capture.
	pub fn with_client(
		client: ReqwestClient,
		config: TransportConfig,
		shared: Option<&Arc<Mutex<CookieJar>>>,
	) -> Self {
		let jar = config.jar(shared);

		Self { config, client, jar, error: None }
	}

	/// Transport configuration.
	pub fn config(&self) -> &TransportConfig {
		&self.config
	}

	async fn execute(&self, request: &WireRequest) -> Result<RawResponse, TransportError> {
		match request.scheme {
			Scheme::Http | Scheme::Https => {},
			other => return Err(TransportError::UnsupportedScheme { scheme: other.as_str() }),
		}

		let url = request.url()?;
		let uri = url.to_string();
		let cookie_header = prepare_cookies(self.jar.as_ref(), request)?;
		let encoded = request.encoded_body();
		let mut builder = self.client.request(reqwest_method(request.method), url.clone());

		for (name, values) in request.headers.iter() {
			// Multipart bodies carry their own boundary-bearing content type.
			if name == "content-type" && matches!(encoded, EncodedBody::Multipart(_)) {
				continue;
			}

			for value in values {
				builder = builder.header(name, value.as_str());
			}
		}

		if let Some(cookie) = cookie_header {
			let cookie = match request.headers.get("cookie") {
				Some(existing) => format!("{existing}; {cookie}"),
				None => cookie,
			};

			builder = builder.header("cookie", cookie);
		}

		// Undeclared bodies go out with the type they were encoded as.
		if matches!(encoded, EncodedBody::Bytes(_)) && !request.headers.contains("content-type") {
			builder = builder.header("content-type", request.content_type());
		}

		builder = match encoded {
			EncodedBody::Empty => builder,
			EncodedBody::Bytes(bytes) => builder.body(bytes),
			EncodedBody::Multipart(fields) => builder.multipart(multipart_form(fields, &uri)?),
		};

		let response = builder.send().await.map_err(|e| TransportError::network(&uri, e))?;
		let status = response.status().as_u16();
		let headers = convert_headers(response.headers());
		let body = response.bytes().await.map_err(|e| TransportError::network(&uri, e))?.to_vec();

		if let Some(jar) = &self.jar {
			jar.lock().absorb(&headers, url.host_str().unwrap_or_default())?;
		}

		Ok(RawResponse { status, headers, body })
	}
}
impl Bridge for ReqwestBridge {
	fn send<'a>(&'a mut self, request: &'a WireRequest) -> BridgeFuture<'a> {
		self.error = None;

		Box::pin(async move {
			let result = self.execute(request).await;

			self.error = match &result {
				Ok(response) => capture_status(&self.config, request, response),
				Err(e) => Some(e.clone()),
			};

			#[cfg(feature = "tracing")]
			if let Some(error) = &self.error {
				tracing::debug!(uri = %request.uri(), %error, "transport failure captured");
			}

			result
		})
	}

	fn error(&self) -> Option<&TransportError> {
		self.error.as_ref()
	}

	fn cookie_jar(&self) -> Option<&JarHandle> {
		self.jar.as_ref()
	}

	fn box_clone(&self) -> Box<dyn Bridge> {
		Box::new(Self {
			config: self.config.clone(),
			client: self.client.clone(),
			jar: self.jar.clone(),
			error: self.error.clone(),
		})
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

pub(crate) fn build_client(config: &TransportConfig) -> Result<ReqwestClient, ConfigError> {
	let mut default_headers = HeaderMap::new();

	for (name, value) in &config.default_headers {
		let name = HeaderName::from_bytes(name.as_bytes()).map_err(ConfigError::http_client_build)?;
		let value = HeaderValue::from_str(value).map_err(ConfigError::http_client_build)?;

		default_headers.insert(name, value);
	}

	let mut builder = ReqwestClient::builder()
		.danger_accept_invalid_certs(!config.verify_tls)
		.default_headers(default_headers)
		.redirect(match config.max_redirects {
			Some(0) => redirect::Policy::none(),
			Some(limit) => redirect::Policy::limited(limit),
			None => redirect::Policy::default(),
		});

	if let Some(ms) = config.timeout_ms {
		builder = builder.timeout(StdDuration::from_millis(ms));
	}
	if let Some(ms) = config.connect_timeout_ms {
		builder = builder.connect_timeout(StdDuration::from_millis(ms));
	}
	if let Some(proxy) = &config.proxy {
		builder = builder.proxy(Proxy::all(proxy)?);
	}
	if let Some(agent) = &config.user_agent {
		builder = builder.user_agent(agent);
	}

	Ok(builder.build()?)
}

fn reqwest_method(method: Method) -> ReqwestMethod {
	match method {
		Method::Get => ReqwestMethod::GET,
		Method::Post => ReqwestMethod::POST,
		Method::Put => ReqwestMethod::PUT,
		Method::Patch => ReqwestMethod::PATCH,
		Method::Delete => ReqwestMethod::DELETE,
		Method::Options => ReqwestMethod::OPTIONS,
	}
}

fn multipart_form(fields: Vec<MultipartField>, uri: &str) -> Result<Form, TransportError> {
	let mut form = Form::new();

	for field in fields {
		form = match field {
			MultipartField::Text { name, value } => form.text(name, value),
			MultipartField::File(file) => {
				let mut part = Part::bytes(file.bytes).file_name(file.file_name);

				if let Some(content_type) = &file.content_type {
					part = part
						.mime_str(content_type)
						.map_err(|e| TransportError::network(uri, e))?;
				}

				form.part(file.field, part)
			},
		};
	}

	Ok(form)
}

fn convert_headers(map: &HeaderMap) -> Headers {
	map.iter()
		.map(|(name, value)| {
			(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned())
		})
		.collect()
}

#[cfg(test)]
mod tests {
	// crates.io
	use httpmock::prelude::{MockServer, POST};
	// self
	use super::*;
	use crate::{cookie::CookieEntry, request::Body};

	fn wire(server: &MockServer, path: &str) -> WireRequest {
		WireRequest {
			method: Method::Post,
			scheme: Scheme::Http,
			host: server.address().to_string(),
			path: path.into(),
			query: BTreeMap::new(),
			headers: Headers::from_iter([("content-type", "application/json")]),
			body: Body::Structured(serde_json::json!({ "name": "Ada" })),
			cookies: vec![CookieEntry::new("sid", "abc")],
		}
	}

	#[tokio::test]
	async fn sends_json_and_absorbs_cookies() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/users")
					.header("cookie", "sid=abc")
					.json_body(serde_json::json!({ "name": "Ada" }));
				then.status(201).header("set-cookie", "session=s1; Path=/").body("{}");
			})
			.await;
		let mut bridge =
			ReqwestBridge::new(TransportConfig::default()).expect("Default bridge should build.");
		let response =
			bridge.send(&wire(&server, "/users")).await.expect("Request should succeed.");

		mock.assert_calls_async(1).await;

		assert_eq!(response.status, 201);
		assert!(bridge.error().is_none());
		assert!(bridge.cookie_jar().is_some_and(|jar| jar.lock().get("session").is_some()));
	}

	#[tokio::test]
	async fn error_statuses_are_captured_not_thrown() {
		let server = MockServer::start_async().await;

		server
			.mock_async(|when, then| {
				when.path("/broken");
				then.status(503);
			})
			.await;

		let mut bridge =
			ReqwestBridge::new(TransportConfig::default()).expect("Default bridge should build.");
		let response =
			bridge.send(&wire(&server, "/broken")).await.expect("Status errors should not throw.");

		assert_eq!(response.status, 503);
		assert_eq!(bridge.error().and_then(TransportError::status), Some(503));

		let mut ftp = wire(&server, "/x");

		ftp.scheme = Scheme::Ftp;

		assert!(matches!(
			bridge.send(&ftp).await,
			Err(TransportError::UnsupportedScheme { scheme: "ftp" })
		));
		assert!(bridge.error().is_some());
	}

	#[tokio::test]
	async fn undeclared_bodies_carry_the_form_content_type() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST)
					.path("/form")
					.header("content-type", "application/x-www-form-urlencoded")
					.body("name=Ada&tags%5B0%5D=x");
				then.status(204);
			})
			.await;
		let mut request = wire(&server, "/form");

		request.headers = Headers::default();
		request.body = Body::Structured(serde_json::json!({ "name": "Ada", "tags": ["x"] }));
		request.cookies.clear();

		let mut bridge =
			ReqwestBridge::new(TransportConfig::default()).expect("Default bridge should build.");
		let response = bridge.send(&request).await.expect("Request should succeed.");

		assert_eq!(response.status, 204);

		mock.assert_calls_async(1).await;
	}
}
