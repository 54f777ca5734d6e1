// self
use crate::{
	_prelude::*,
	bridge::{Bridge, BridgeFuture, TransportConfig, capture_status, prepare_cookies},
	cookie::{CookieEntry, CookieJar, JarHandle},
	error::TransportError,
	http::{RawResponse, WireRequest},
};

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// How a rule combines its conditions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
	/// Every condition must hold.
	#[default]
	All,
	/// At least one condition must hold.
	Any,
}

/// Test applied to the value found at a condition's field path.
#[derive(Clone)]
pub enum Operator {
	/// Loose equality; scalars compare by their text form.
	Equals(Value),
	/// Field is present and not null.
	Exists,
	/// Field is missing or null.
	Absent,
	/// String field contains the needle, or list field contains the value.
	Contains(Value),
	/// Custom predicate; receives `Value::Null` when the field is missing.
	Predicate(Predicate),
}
impl Operator {
	fn test(&self, found: Option<&Value>) -> bool {
		match (self, found) {
			(Operator::Exists, found) => found.is_some_and(|v| !v.is_null()),
			(Operator::Absent, found) => found.is_none_or(Value::is_null),
			(Operator::Predicate(f), found) => f(found.unwrap_or(&Value::Null)),
			(_, None) => false,
			(Operator::Equals(expected), Some(found)) => loose_eq(expected, found),
			(Operator::Contains(needle), Some(Value::String(haystack))) =>
				scalar_text(needle).is_some_and(|needle| haystack.contains(&needle)),
			(Operator::Contains(needle), Some(Value::Array(items))) =>
				items.iter().any(|item| loose_eq(needle, item)),
			(Operator::Contains(Value::String(key)), Some(Value::Object(map))) =>
				map.contains_key(key),
			(Operator::Contains(_), Some(_)) => false,
		}
	}
}
impl Debug for Operator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Operator::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
			Operator::Exists => f.write_str("Exists"),
			Operator::Absent => f.write_str("Absent"),
			Operator::Contains(v) => f.debug_tuple("Contains").field(v).finish(),
			Operator::Predicate(_) => f.write_str("Predicate(..)"),
		}
	}
}

/// Field-path predicate, e.g. `path`, `query.page`, `headers.x-api-key`, `cookies.sid`.
#[derive(Clone, Debug)]
pub struct Condition {
	/// Dot-separated path into the request snapshot.
	pub field: String,
	/// Test applied to the value found there.
	pub op: Operator,
}
impl Condition {
	/// Evaluates the condition against a request snapshot.
	pub fn matches(&self, snapshot: &Value) -> bool {
		self.op.test(lookup(snapshot, &self.field))
	}
}

/// What a matched rule produces.
#[derive(Clone, Debug)]
pub enum MockOutcome {
	/// Canned response.
	Respond(RawResponse),
	/// Simulated network failure.
	Fail(String),
}

/// Canned answer selected when a request satisfies the rule's conditions.
#[derive(Clone, Debug)]
pub struct MockRule {
	conditions: Vec<Condition>,
	policy: MatchPolicy,
	outcome: MockOutcome,
	remaining: Option<usize>,
}
impl MockRule {
	/// Creates a rule matching every request and answering `200` with an empty body.
	pub fn new() -> Self {
		Self {
			conditions: Vec::new(),
			policy: MatchPolicy::All,
			outcome: MockOutcome::Respond(RawResponse::new(200)),
			remaining: None,
		}
	}

	/// Requires `field` to equal `value`.
	pub fn when(self, field: &str, value: impl Into<Value>) -> Self {
		self.condition(field, Operator::Equals(value.into()))
	}

	/// Requires `field` to be present.
	pub fn when_exists(self, field: &str) -> Self {
		self.condition(field, Operator::Exists)
	}

	/// Requires `field` to be missing.
	pub fn when_absent(self, field: &str) -> Self {
		self.condition(field, Operator::Absent)
	}

	/// Requires `field` to contain `needle`.
	pub fn when_contains(self, field: &str, needle: impl Into<Value>) -> Self {
		self.condition(field, Operator::Contains(needle.into()))
	}

	/// Requires `predicate` to accept the value at `field`.
	pub fn when_fn<F>(self, field: &str, predicate: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&Value) -> bool,
	{
		self.condition(field, Operator::Predicate(Arc::new(predicate)))
	}

	/// Adds an arbitrary condition.
	pub fn condition(mut self, field: &str, op: Operator) -> Self {
		self.conditions.push(Condition { field: field.to_owned(), op });

		self
	}

	/// Matches when any condition holds instead of all of them.
	pub fn any(mut self) -> Self {
		self.policy = MatchPolicy::Any;

		self
	}

	/// Answers with `response`.
	pub fn respond(mut self, response: RawResponse) -> Self {
		self.outcome = MockOutcome::Respond(response);

		self
	}

	/// Adds a `set-cookie` header to the canned response.
	pub fn with_cookie(mut self, cookie: CookieEntry) -> Self {
		if let MockOutcome::Respond(response) = &mut self.outcome {
			response.headers.append("set-cookie", cookie.to_set_cookie());
		}

		self
	}

	/// Fails with a simulated network error instead of answering.
	pub fn fail(mut self, message: impl Into<String>) -> Self {
		self.outcome = MockOutcome::Fail(message.into());

		self
	}

	/// Retires the rule after it matched `count` times.
	pub fn times(mut self, count: usize) -> Self {
		self.remaining = Some(count);

		self
	}

	/// Returns `true` when `snapshot` satisfies the rule.
	pub fn matches(&self, snapshot: &Value) -> bool {
		if self.remaining == Some(0) {
			return false;
		}
		if self.conditions.is_empty() {
			return true;
		}

		match self.policy {
			MatchPolicy::All => self.conditions.iter().all(|c| c.matches(snapshot)),
			MatchPolicy::Any => self.conditions.iter().any(|c| c.matches(snapshot)),
		}
	}
}
impl Default for MockRule {
	fn default() -> Self {
		Self::new()
	}
}

/// Record of every request a family of mock bridges handled; clones share the record.
#[derive(Clone, Debug, Default)]
pub struct MockLedger(Arc<Mutex<Vec<Value>>>);
impl MockLedger {
	/// Request snapshots in arrival order.
	pub fn requests(&self) -> Vec<Value> {
		self.0.lock().clone()
	}

	/// Number of recorded requests.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns `true` when nothing was recorded.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}

	/// Forgets every recorded request.
	pub fn clear(&self) {
		self.0.lock().clear();
	}

	fn record(&self, snapshot: Value) {
		self.0.lock().push(snapshot);
	}
}

/// Bridge answering from a rule table instead of the network.
///
/// Rules are evaluated in registration order against the request snapshot (`method`, `scheme`,
/// `host`, `path`, `uri`, `query`, `body`, `headers`, `cookies`); the first match wins and
/// unmatched requests receive the default response.
#[derive(Debug)]
pub struct MockBridge {
	config: TransportConfig,
	rules: Vec<MockRule>,
	default_response: RawResponse,
	jar: Option<JarHandle>,
	ledger: MockLedger,
	last_request: Option<WireRequest>,
	error: Option<TransportError>,
}
impl MockBridge {
	/// Creates a mock bridge for `config`, sharing `shared` when the config keeps cookies.
	pub fn new(config: TransportConfig, shared: Option<&Arc<Mutex<CookieJar>>>) -> Self {
		let jar = config.jar(shared);

		Self {
			config,
			rules: Vec::new(),
			default_response: RawResponse::new(200),
			jar,
			ledger: MockLedger::default(),
			last_request: None,
			error: None,
		}
	}

	/// Appends a rule.
	pub fn push_rule(&mut self, rule: MockRule) -> &mut Self {
		self.rules.push(rule);

		self
	}

	/// Appends a rule, consuming builder style.
	pub fn with_rule(mut self, rule: MockRule) -> Self {
		self.rules.push(rule);

		self
	}

	/// Replaces the response used when no rule matches.
	pub fn with_default_response(mut self, response: RawResponse) -> Self {
		self.default_response = response;

		self
	}

	/// Records into `ledger` instead of a fresh one.
	pub fn with_ledger(mut self, ledger: MockLedger) -> Self {
		self.ledger = ledger;

		self
	}

	/// Ledger shared with every clone of this bridge.
	pub fn ledger(&self) -> &MockLedger {
		&self.ledger
	}

	/// Last request this bridge handled.
	pub fn last_request(&self) -> Option<&WireRequest> {
		self.last_request.as_ref()
	}

	fn answer(&mut self, request: &WireRequest) -> Result<RawResponse, TransportError> {
		let cookie_header = prepare_cookies(self.jar.as_ref(), request)?;
		let mut snapshot = request.snapshot();

		if let (Some(cookie), Some(headers)) =
			(cookie_header, snapshot.get_mut("headers").and_then(Value::as_object_mut))
		{
			headers.entry("cookie").or_insert(Value::String(cookie));
		}

		self.ledger.record(snapshot.clone());
		self.last_request = Some(request.clone());

		let outcome = match self.rules.iter_mut().find(|rule| rule.matches(&snapshot)) {
			Some(rule) => {
				if let Some(remaining) = &mut rule.remaining {
					*remaining -= 1;
				}

				rule.outcome.clone()
			},
			None => MockOutcome::Respond(self.default_response.clone()),
		};
		match outcome {
			MockOutcome::Respond(response) => {
				if let Some(jar) = &self.jar {
					jar.lock().absorb(&response.headers, request.hostname())?;
				}

				Ok(response)
			},
			MockOutcome::Fail(message) =>
				Err(TransportError::network(request.uri(), MockNetworkError(message))),
		}
	}
}
impl Default for MockBridge {
	fn default() -> Self {
		Self::new(TransportConfig::default(), None)
	}
}
impl Bridge for MockBridge {
	fn send<'a>(&'a mut self, request: &'a WireRequest) -> BridgeFuture<'a> {
		self.error = None;

		let result = self.answer(request);

		self.error = match &result {
			Ok(response) => capture_status(&self.config, request, response),
			Err(e) => Some(e.clone()),
		};

		Box::pin(async move { result })
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
			rules: self.rules.clone(),
			default_response: self.default_response.clone(),
			jar: self.jar.clone(),
			ledger: self.ledger.clone(),
			last_request: self.last_request.clone(),
			error: self.error.clone(),
		})
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// Network failure simulated by a [`MockRule::fail`] rule.
#[derive(Debug, ThisError)]
#[error("{0}")]
pub struct MockNetworkError(String);

fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
	path.split('.').filter(|segment| !segment.is_empty()).try_fold(value, |current, segment| {
		match current {
			Value::Object(map) =>
				map.get(segment).or_else(|| map.get(&segment.to_ascii_lowercase())),
			Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
			_ => None,
		}
	})
}

fn loose_eq(expected: &Value, found: &Value) -> bool {
	if expected == found {
		return true;
	}

	match (scalar_text(expected), scalar_text(found)) {
		(Some(a), Some(b)) => a == b,
		_ => false,
	}
}

fn scalar_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		http::Headers,
		request::{Body, Method, Scheme},
	};

	fn wire(path: &str) -> WireRequest {
		WireRequest {
			method: Method::Get,
			scheme: Scheme::Https,
			host: "api.test".into(),
			path: path.into(),
			query: BTreeMap::from([("page".to_owned(), json!(2))]),
			headers: Headers::from_iter([("X-Api-Key", "k1")]),
			body: Body::Empty,
			cookies: Vec::new(),
		}
	}

	#[tokio::test]
	async fn first_matching_rule_wins_and_unmatched_falls_back() {
		let mut bridge = MockBridge::default()
			.with_rule(
				MockRule::new()
					.when("path", "/users/42")
					.when("query.page", "2")
					.when_exists("headers.x-api-key")
					.respond(RawResponse::new(200).with_body(b"user".to_vec())),
			)
			.with_rule(MockRule::new().when("path", "/users/42").respond(RawResponse::new(500)));
		let hit = bridge.send(&wire("/users/42")).await.expect("Rule should answer.");
		let miss = bridge.send(&wire("/users/7")).await.expect("Default should answer.");

		assert_eq!(hit.body, b"user");
		assert_eq!(miss.status, 200);
		assert!(miss.body.is_empty());
		assert_eq!(bridge.ledger().len(), 2);
		assert_eq!(bridge.last_request().map(|r| r.path.as_str()), Some("/users/7"));
	}

	#[tokio::test]
	async fn any_policy_and_operators() {
		let mut bridge = MockBridge::default().with_rule(
			MockRule::new()
				.when("method", "POST")
				.when_fn("path", |v| v.as_str().is_some_and(|p| p.ends_with("/9")))
				.any()
				.respond(RawResponse::new(202)),
		);

		assert_eq!(bridge.send(&wire("/items/9")).await.map(|r| r.status).ok(), Some(202));
		assert_eq!(bridge.send(&wire("/items/8")).await.map(|r| r.status).ok(), Some(200));
		assert!(Operator::Absent.test(None));
		assert!(Operator::Contains(json!("pi")).test(Some(&json!("api"))));
		assert!(Operator::Contains(json!(3)).test(Some(&json!([1, 3]))));
	}

	#[tokio::test]
	async fn limited_rules_retire_and_failures_are_captured() {
		let mut bridge = MockBridge::default()
			.with_rule(MockRule::new().fail("connection reset").times(1))
			.with_rule(MockRule::new().respond(RawResponse::new(503)));

		assert!(matches!(bridge.send(&wire("/")).await, Err(TransportError::Network { .. })));
		assert!(bridge.error().is_some());

		let response = bridge.send(&wire("/")).await.expect("Second rule should answer.");

		assert_eq!(response.status, 503);
		assert_eq!(bridge.error().and_then(TransportError::status), Some(503));
	}

	#[tokio::test]
	async fn canned_cookies_land_in_the_jar_and_clones_are_isolated() {
		let mut bridge = MockBridge::default()
			.with_rule(MockRule::new().with_cookie(CookieEntry::new("sid", "s1")));

		bridge.send(&wire("/login")).await.expect("Login should answer.");

		let copy = bridge.box_clone();

		bridge.cookie_jar().expect("Cookies are enabled by default.").lock().clear();

		assert!(copy.cookie_jar().is_some_and(|jar| jar.lock().get("sid").is_some()));
	}

	#[tokio::test]
	async fn host_only_cookies_ignore_the_port() {
		let mut bridge = MockBridge::default().with_rule(
			MockRule::new().when("path", "/login").with_cookie(CookieEntry::new("sid", "s1")),
		);
		let mut login = wire("/login");

		login.host = "api.test:8443".into();

		bridge.send(&login).await.expect("Login should answer.");

		let stored = bridge.cookie_jar().and_then(|jar| jar.lock().get("sid").cloned());

		assert_eq!(stored.and_then(|cookie| cookie.domain).as_deref(), Some("api.test"));

		let mut follow_up = wire("/me");

		follow_up.host = "api.test:8443".into();

		bridge.send(&follow_up).await.expect("Follow-up should answer.");

		let requests = bridge.ledger().requests();

		assert_eq!(requests[1]["headers"]["cookie"], "sid=s1");
	}
}
