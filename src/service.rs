//! Composition root: owns the process-wide shared state and hands out configured endpoints.

pub mod config;
pub mod operation;

pub use config::*;
pub use operation::*;

// self
use crate::{
	_prelude::*,
	auth::{
		AuthInterceptor, AuthScheme, BasicCredentials, OAuth2Source, Reauthenticate, SamlSource,
		SessionSource, StaticToken, TokenCache, TokenSource,
	},
	bridge::{self, Bridge, ReqwestBridge, TransportConfig},
	chain::{Interceptor, NamedInterceptor},
	cookie::CookieJar,
	endpoint::{Endpoint, EndpointResponse},
	error::ConfigError,
	http::Headers,
	observe::{Archive, ArchiveInterceptor, LoggingInterceptor, TransactionLog},
	request::{Params, RequestDescriptor, Scheme},
	response::StructRegistry,
	retry::RetryInterceptor,
};

/// Builds the bridge for each new descriptor; receives the shared jar.
pub type BridgeFactory = Arc<
	dyn Fn(&TransportConfig, Option<&Arc<Mutex<CookieJar>>>) -> Result<Box<dyn Bridge>, ConfigError>
		+ Send
		+ Sync,
>;

/// Built-in retry policy that receives every credential interceptor's re-auth handle.
const UNAUTHORIZED_POLICY: &str = "unauthorized";

/// Constructor-injection builder for [`Service`].
pub struct ServiceBuilder {
	config: ServiceConfig,
	cache: Option<Arc<TokenCache>>,
	jar: Option<Arc<Mutex<CookieJar>>>,
	log: Option<Arc<TransactionLog>>,
	archive: Option<Arc<Archive>>,
	registry: Option<Arc<StructRegistry>>,
	bridge_factory: Option<BridgeFactory>,
	token_client: Option<ReqwestClient>,
	extra: Vec<NamedInterceptor>,
}
impl ServiceBuilder {
	/// Starts from `config`; every shared component defaults to a fresh instance.
	pub fn new(config: ServiceConfig) -> Self {
		Self {
			config,
			cache: None,
			jar: None,
			log: None,
			archive: None,
			registry: None,
			bridge_factory: None,
			token_client: None,
			extra: Vec::new(),
		}
	}

	/// Shares `cache` with other services.
	pub fn token_cache(mut self, cache: Arc<TokenCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Jar used by bridges when `keep_cookies` is on.
	pub fn cookie_jar(mut self, jar: Arc<Mutex<CookieJar>>) -> Self {
		self.jar = Some(jar);

		self
	}

	/// Log fed by `logging` interceptors.
	pub fn transaction_log(mut self, log: Arc<TransactionLog>) -> Self {
		self.log = Some(log);

		self
	}

	/// Archive fed by `archive` interceptors.
	pub fn archive(mut self, archive: Arc<Archive>) -> Self {
		self.archive = Some(archive);

		self
	}

	/// Decoder table.
	pub fn registry(mut self, registry: StructRegistry) -> Self {
		self.registry = Some(Arc::new(registry));

		self
	}

	/// Replaces the reqwest-backed bridge factory.
	pub fn bridge_factory<F>(mut self, factory: F) -> Self
	where
		F: 'static
			+ Send
			+ Sync
			+ Fn(
				&TransportConfig,
				Option<&Arc<Mutex<CookieJar>>>,
			) -> Result<Box<dyn Bridge>, ConfigError>,
	{
		self.bridge_factory = Some(Arc::new(factory));

		self
	}

	/// Client used for OAuth 2.0 and SAML token exchanges.
	pub fn token_client(mut self, client: ReqwestClient) -> Self {
		self.token_client = Some(client);

		self
	}

	/// Appends an interceptor after the configured ones.
	pub fn interceptor(mut self, handler: Arc<dyn Interceptor>, name: Option<String>) -> Self {
		let name = name.unwrap_or_else(|| handler.label().to_owned());

		self.extra.push(NamedInterceptor { name, handler });

		self
	}

	/// Validates the configuration and wires the interceptors.
	pub fn build(self) -> Result<Service> {
		let scheme = self.config.scheme.parse::<Scheme>()?;
		let operations = OperationTable::compile(&self.config.operations)?;
		let headers = self.config.headers.iter().collect::<Headers>();
		let bridge_factory = match self.bridge_factory {
			Some(factory) => factory,
			None => reqwest_factory(&self.config.transport)?,
		};
		let log = match self.log {
			Some(log) => log,
			None => Arc::new(configured_log(&self.config.interceptors)),
		};
		let mut service = Service {
			scheme,
			headers,
			operations,
			interceptors: Vec::new(),
			reauthenticators: Vec::new(),
			cache: self.cache.unwrap_or_default(),
			jar: self.jar.unwrap_or_else(|| {
				Arc::new(Mutex::new(CookieJar::new(self.config.transport.strict_cookies)))
			}),
			log,
			archive: self.archive.unwrap_or_default(),
			registry: self.registry.unwrap_or_default(),
			bridge_factory,
			config: self.config,
		};
		let token_client = match self.token_client {
			Some(client) => client,
			None => token_client(&service.config.transport)?,
		};

		service.wire(&token_client)?;
		service.interceptors.extend(self.extra);

		Ok(service)
	}
}
impl Debug for ServiceBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceBuilder")
			.field("config", &self.config)
			.field("extra", &self.extra)
			.finish_non_exhaustive()
	}
}

/// A configured remote service: named operations over shared credentials, cookies, and logs.
pub struct Service {
	config: ServiceConfig,
	scheme: Scheme,
	headers: Headers,
	operations: OperationTable,
	interceptors: Vec<NamedInterceptor>,
	reauthenticators: Vec<Arc<dyn Reauthenticate>>,
	cache: Arc<TokenCache>,
	jar: Arc<Mutex<CookieJar>>,
	log: Arc<TransactionLog>,
	archive: Arc<Archive>,
	registry: Arc<StructRegistry>,
	bridge_factory: BridgeFactory,
}
impl Service {
	/// Starts a builder for `config`.
	pub fn builder(config: ServiceConfig) -> ServiceBuilder {
		ServiceBuilder::new(config)
	}

	/// Builds a service with default shared components.
	pub fn from_config(config: ServiceConfig) -> Result<Self> {
		ServiceBuilder::new(config).build()
	}

	/// Parses a JSON document and builds a service from it.
	pub fn from_json(raw: &str) -> Result<Self> {
		Self::from_config(ServiceConfig::from_json(raw)?)
	}

	/// Descriptor for `name` with the service interceptors attached.
	pub fn descriptor(&self, name: &str) -> Result<RequestDescriptor> {
		let operation = self.operation(name)?;
		let mut descriptor = self.bare_descriptor(operation)?;

		for interceptor in &self.interceptors {
			descriptor
				.push_interceptor(interceptor.handler.clone(), Some(interceptor.name.clone()));
		}

		Ok(descriptor)
	}

	/// Endpoint for `name`.
	pub fn endpoint(&self, name: &str) -> Result<Endpoint> {
		let operation = self.operation(name)?;
		let mut endpoint = Endpoint::new(self.descriptor(name)?, self.registry.clone())
			.with_strict(operation.strict().unwrap_or(self.config.strict));

		if let Some(transformer) = operation.transformer() {
			endpoint = endpoint.with_transformer(transformer);
		}

		Ok(endpoint)
	}

	/// One-shot call of `name` with `params`.
	pub async fn send(&self, name: &str, params: &Params) -> Result<EndpointResponse> {
		self.endpoint(name)?.send(params).await
	}

	/// Configuration the service was built from.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Compiled operations.
	pub fn operations(&self) -> &OperationTable {
		&self.operations
	}

	/// Interceptors attached to every descriptor, outermost first.
	pub fn interceptors(&self) -> &[NamedInterceptor] {
		&self.interceptors
	}

	/// Re-auth handles of the configured credential interceptors.
	pub fn reauthenticators(&self) -> &[Arc<dyn Reauthenticate>] {
		&self.reauthenticators
	}

	/// Token cache.
	pub fn token_cache(&self) -> &Arc<TokenCache> {
		&self.cache
	}

	/// Jar shared by bridges when `keep_cookies` is on.
	pub fn cookie_jar(&self) -> &Arc<Mutex<CookieJar>> {
		&self.jar
	}

	/// Transaction log.
	pub fn transaction_log(&self) -> &Arc<TransactionLog> {
		&self.log
	}

	/// Transaction archive.
	pub fn archive(&self) -> &Arc<Archive> {
		&self.archive
	}

	/// Decoder table.
	pub fn registry(&self) -> &Arc<StructRegistry> {
		&self.registry
	}

	fn operation(&self, name: &str) -> Result<&Operation, ConfigError> {
		self.operations
			.get(name)
			.ok_or_else(|| ConfigError::UnknownOperation { name: name.to_owned() })
	}

	fn bare_descriptor(&self, operation: &Operation) -> Result<RequestDescriptor> {
		let bridge = (self.bridge_factory)(&self.config.transport, Some(&self.jar))?;
		let mut descriptor = RequestDescriptor::new(bridge);

		descriptor
			.set_scheme_kind(self.scheme)
			.set_host(self.config.host.clone())
			.set_headers(self.headers.clone());
		operation.apply(&mut descriptor);

		Ok(descriptor)
	}

	fn wire(&mut self, token_client: &ReqwestClient) -> Result<()> {
		let mut retries = Vec::new();

		for config in self.config.interceptors.clone() {
			let handler: Arc<dyn Interceptor> = match config {
				InterceptorConfig::Basic { username, password, auth } => self.credential(
					auth.apply(
						AuthScheme::Basic,
						BasicCredentials::new(username, password.expose()),
						self.cache.clone(),
					),
				),
				InterceptorConfig::Bearer { token, expires_in_secs, auth } => {
					let mut source = StaticToken::bearer(token.expose());

					if let Some(secs) = expires_in_secs {
						source = source.with_expires_in(Duration::seconds(secs));
					}

					self.credential(auth.apply(AuthScheme::Bearer, source, self.cache.clone()))
				},
				InterceptorConfig::Oauth2 { config, auth } => {
					let source = OAuth2Source::new(config, token_client.clone())?;

					self.credential(auth.apply(AuthScheme::Bearer, source, self.cache.clone()))
				},
				InterceptorConfig::Saml { config, auth } => {
					let source = SamlSource::new(config, token_client.clone());

					self.credential(auth.apply(AuthScheme::Bearer, source, self.cache.clone()))
				},
				InterceptorConfig::Session { login, cookie_name, params, auth } => {
					let login = self.bare_descriptor(self.operation(&login)?)?;
					let source = SessionSource::new(login, cookie_name).with_params(params);

					self.credential(auth.apply(AuthScheme::Ssws, source, self.cache.clone()))
				},
				InterceptorConfig::Retry(retry) => {
					retries.push(self.interceptors.len());

					Arc::new(RetryInterceptor::from_config(&retry, self.cache.clone())?)
				},
				InterceptorConfig::Logging { .. } =>
					Arc::new(LoggingInterceptor::new(self.log.clone())),
				InterceptorConfig::Archive =>
					Arc::new(ArchiveInterceptor::new(self.archive.clone())),
			};
			let name = handler.label().to_owned();

			self.interceptors.push(NamedInterceptor { name, handler });
		}

		// Retry engines are rebuilt with the full handle list; credentials may be configured
		// after them.
		for idx in retries {
			let InterceptorConfig::Retry(retry) = &self.config.interceptors[idx] else {
				continue;
			};
			let mut engine = RetryInterceptor::from_config(retry, self.cache.clone())?;

			for handle in &self.reauthenticators {
				engine.reauthenticate_on(UNAUTHORIZED_POLICY, handle.clone());
			}

			self.interceptors[idx].handler = Arc::new(engine);
		}

		Ok(())
	}

	fn credential<S>(&mut self, interceptor: AuthInterceptor<S>) -> Arc<dyn Interceptor>
	where
		S: TokenSource,
	{
		let shared = Arc::new(interceptor);

		self.reauthenticators.push(shared.clone());

		shared
	}
}
impl Debug for Service {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Service")
			.field("scheme", &self.scheme)
			.field("host", &self.config.host)
			.field("operations", &self.operations)
			.field("interceptors", &self.interceptors)
			.finish_non_exhaustive()
	}
}

fn reqwest_factory(transport: &TransportConfig) -> Result<BridgeFactory, ConfigError> {
	let client = bridge::build_client(transport)?;

	Ok(Arc::new(
		move |transport: &TransportConfig,
		      jar: Option<&Arc<Mutex<CookieJar>>>|
		      -> Result<Box<dyn Bridge>, ConfigError> {
			Ok(Box::new(ReqwestBridge::with_client(client.clone(), transport.clone(), jar)))
		},
	))
}

fn token_client(transport: &TransportConfig) -> Result<ReqwestClient, ConfigError> {
	Ok(ReqwestClient::builder()
		.danger_accept_invalid_certs(!transport.verify_tls)
		.redirect(reqwest::redirect::Policy::none())
		.build()?)
}

fn configured_log(interceptors: &[InterceptorConfig]) -> TransactionLog {
	let mut log = TransactionLog::new();
	let settings = interceptors.iter().find_map(|config| match config {
		InterceptorConfig::Logging { enabled, format, truncate } =>
			Some((*enabled, format, truncate)),
		_ => None,
	});

	if let Some((enabled, format, truncate)) = settings {
		if let Some(format) = format {
			log = log.with_format(format.clone());
		}
		if let Some(limit) = truncate {
			log = log.with_truncate(*limit);
		}
		if enabled {
			log.enable();
		}
	}

	log
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		bridge::{MockBridge, MockLedger, MockRule},
		cookie::CookieEntry,
		http::RawResponse,
		request::Method,
	};

	fn mock_service(config: Value, ledger: MockLedger, rules: Vec<MockRule>) -> Service {
		Service::builder(ServiceConfig::from_value(config).expect("Configuration should parse."))
			.bridge_factory(move |transport, jar| {
				let mut bridge =
					MockBridge::new(transport.clone(), jar).with_ledger(ledger.clone());

				for rule in &rules {
					bridge.push_rule(rule.clone());
				}

				Ok(Box::new(bridge))
			})
			.build()
			.expect("Service should build.")
	}

	#[test]
	fn unknown_operations_are_config_errors() {
		let service =
			mock_service(json!({ "host": "api.test" }), MockLedger::default(), Vec::new());

		assert!(matches!(
			service.endpoint("missing"),
			Err(Error::Config(ConfigError::UnknownOperation { name })) if name == "missing"
		));
	}

	#[test]
	fn invalid_scheme_fails_at_build_time() {
		let config = ServiceConfig { scheme: "gopher".into(), ..Default::default() };

		assert!(matches!(
			Service::builder(config)
				.bridge_factory(|_, _| Ok(Box::new(MockBridge::default())))
				.build(),
			Err(Error::Validation(_))
		));
	}

	#[tokio::test]
	async fn endpoints_carry_service_defaults_and_credentials() {
		let ledger = MockLedger::default();
		let service = mock_service(
			json!({
				"host": "api.test",
				"headers": { "x-client": "conduit" },
				"interceptors": [{ "kind": "bearer", "token": "abc" }, { "kind": "archive" }],
				"operations": {
					"get_user": { "path": "/users/{id}", "accept": "application/json" }
				}
			}),
			ledger.clone(),
			vec![MockRule::new().when("path", "/users/7").respond(
				RawResponse::new(200)
					.with_header("content-type", "application/json")
					.with_body(br#"{"name":"Ada"}"#.to_vec()),
			)],
		);
		let response = service
			.send("get_user", &Params::from([("id".to_owned(), "7".to_owned())]))
			.await
			.expect("Send should succeed.");

		assert_eq!(response.get("name"), Some(Value::String("Ada".into())));

		let requests = ledger.requests();

		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0]["headers"]["authorization"], json!("Bearer abc"));
		assert_eq!(requests[0]["headers"]["x-client"], json!("conduit"));
		assert_eq!(service.archive().len(), 1);
		assert_eq!(service.reauthenticators().len(), 1);
		assert_eq!(
			service.descriptor("get_user").expect("Operation exists.").method(),
			Method::Get
		);
	}

	#[tokio::test]
	async fn unauthorized_retry_reauthenticates_configured_credentials() {
		let ledger = MockLedger::default();
		let service = mock_service(
			json!({
				"host": "api.test",
				"interceptors": [
					{ "kind": "retry", "policies": ["unauthorized"], "max_retries": 1,
					  "base_delay_ms": 0, "max_delay_ms": 0 },
					{ "kind": "bearer", "token": "abc", "cache_key": "svc" }
				],
				"operations": { "ping": { "path": "/ping" } }
			}),
			ledger.clone(),
			vec![MockRule::new().respond(RawResponse::new(401)).times(1)],
		);
		let cache = service.token_cache().clone();
		let response = service.send("ping", &Params::new()).await.expect("Send should succeed.");

		assert_eq!(response.status(), 200);
		assert_eq!(ledger.len(), 2);
		assert!(cache.get("svc").is_some());
	}

	#[tokio::test]
	async fn session_login_runs_through_its_own_operation() {
		let ledger = MockLedger::default();
		let service = mock_service(
			json!({
				"host": "api.test",
				"transport": { "keep_cookies": true },
				"interceptors": [{ "kind": "session", "login": "login", "cookie_name": "sid" }],
				"operations": {
					"login": { "method": "POST", "path": "/session" },
					"me": { "path": "/me" }
				}
			}),
			ledger.clone(),
			vec![
				MockRule::new()
					.when("path", "/session")
					.respond(RawResponse::new(204))
					.with_cookie(CookieEntry::new("sid", "s3ss10n")),
			],
		);

		service.send("me", &Params::new()).await.expect("Send should succeed.");

		let requests = ledger.requests();

		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0]["path"], json!("/session"));
		assert_eq!(requests[1]["headers"]["authorization"], json!("SSWS s3ss10n"));
	}
}
