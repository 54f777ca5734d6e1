//! Named operations compiled once from configuration.

// crates.io
use reqwest::header::HeaderName;
// self
use crate::{
	_prelude::*,
	error::ValidationError,
	request::{Method, RequestDescriptor},
};

type BuildFn = Arc<dyn Fn(&mut RequestDescriptor) + Send + Sync>;

/// Serializable shape of one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
	/// Request method.
	pub method: String,
	/// Path template with `{name}` and `{name?}` placeholders.
	pub path: String,
	/// Request `content-type`.
	pub content_type: Option<String>,
	/// Request `accept`; also the decoder fallback.
	pub accept: Option<String>,
	/// Query values merged into every call.
	pub query: BTreeMap<String, Value>,
	/// Headers merged into every call.
	pub headers: BTreeMap<String, String>,
	/// Per-operation strict decoding override.
	pub strict: Option<bool>,
	/// Content type every response is decoded as.
	pub transformer: Option<String>,
}
impl Default for OperationConfig {
	fn default() -> Self {
		Self {
			method: "GET".into(),
			path: String::new(),
			content_type: None,
			accept: None,
			query: BTreeMap::new(),
			headers: BTreeMap::new(),
			strict: None,
			transformer: None,
		}
	}
}

/// Validated operation plus the closure that configures its descriptor.
#[derive(Clone)]
pub struct Operation {
	name: String,
	method: Method,
	path: String,
	strict: Option<bool>,
	transformer: Option<String>,
	build: Option<BuildFn>,
}
impl Operation {
	/// Creates an operation with no extra configuration.
	pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			method,
			path: path.into(),
			strict: None,
			transformer: None,
			build: None,
		}
	}

	/// Validates `config` and captures it.
	pub fn from_config(name: &str, config: &OperationConfig) -> Result<Self, ValidationError> {
		let method = config.method.parse()?;

		for header in config.headers.keys() {
			HeaderName::from_bytes(header.as_bytes())
				.map_err(|_| ValidationError::InvalidHeader { name: header.clone() })?;
		}

		let content_type = config.content_type.clone();
		let accept = config.accept.clone();
		let query = config.query.clone();
		let headers = config.headers.clone();
		let mut operation = Self::new(name, method, config.path.clone()).with_builder(move |d| {
			for (name, value) in &headers {
				d.set_header(name, value.clone());
			}
			if let Some(content_type) = &content_type {
				d.set_header("content-type", content_type.clone());
			}
			if let Some(accept) = &accept {
				d.set_header("accept", accept.clone());
			}
			for (name, value) in &query {
				d.add_query(name.clone(), value.clone());
			}
		});

		operation.strict = config.strict;
		operation.transformer = config.transformer.clone();

		Ok(operation)
	}

	/// Runs `build` after method and path are applied.
	pub fn with_builder<F>(mut self, build: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&mut RequestDescriptor),
	{
		self.build = Some(Arc::new(build));

		self
	}

	/// Overrides the service-wide strict mode.
	pub fn with_strict(mut self, strict: bool) -> Self {
		self.strict = Some(strict);

		self
	}

	/// Decodes every response as `content_type`.
	pub fn with_transformer(mut self, content_type: impl Into<String>) -> Self {
		self.transformer = Some(content_type.into());

		self
	}

	/// Logical name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Request method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Path template.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Strict-mode override.
	pub fn strict(&self) -> Option<bool> {
		self.strict
	}

	/// Transformer content type.
	pub fn transformer(&self) -> Option<&str> {
		self.transformer.as_deref()
	}

	/// Writes the operation onto `descriptor`.
	pub fn apply(&self, descriptor: &mut RequestDescriptor) {
		descriptor.set_method_kind(self.method).set_path(self.path.clone());

		if let Some(build) = &self.build {
			build(descriptor);
		}
	}
}
impl Debug for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Operation")
			.field("name", &self.name)
			.field("method", &self.method)
			.field("path", &self.path)
			.field("strict", &self.strict)
			.field("transformer", &self.transformer)
			.finish_non_exhaustive()
	}
}

/// Operations by logical name.
#[derive(Clone, Debug, Default)]
pub struct OperationTable {
	operations: BTreeMap<String, Operation>,
}
impl OperationTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Validates every configured operation; the first invalid one fails the whole table.
	pub fn compile(configs: &BTreeMap<String, OperationConfig>) -> Result<Self, ValidationError> {
		let mut table = Self::new();

		for (name, config) in configs {
			table.insert(Operation::from_config(name, config)?);
		}

		Ok(table)
	}

	/// Adds or replaces an operation.
	pub fn insert(&mut self, operation: Operation) -> &mut Self {
		self.operations.insert(operation.name.clone(), operation);

		self
	}

	/// Operation registered as `name`.
	pub fn get(&self, name: &str) -> Option<&Operation> {
		self.operations.get(name)
	}

	/// Registered names in order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.operations.keys().map(String::as_str)
	}

	/// Number of operations.
	pub fn len(&self) -> usize {
		self.operations.len()
	}

	/// Returns `true` when no operation is registered.
	pub fn is_empty(&self) -> bool {
		self.operations.is_empty()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::bridge::MockBridge;

	#[test]
	fn compile_fails_fast_on_bad_methods() {
		let mut configs = BTreeMap::new();

		configs
			.insert("ok".to_owned(), OperationConfig { path: "/a".into(), ..Default::default() });
		configs.insert(
			"bad".to_owned(),
			OperationConfig { method: "TRACE".into(), ..Default::default() },
		);

		assert_eq!(
			OperationTable::compile(&configs).expect_err("TRACE is unsupported."),
			ValidationError::InvalidMethod { method: "TRACE".into() }
		);
	}

	#[test]
	fn apply_writes_the_configured_fields() {
		let config = OperationConfig {
			method: "post".into(),
			path: "/users/{id}".into(),
			content_type: Some("application/json".into()),
			accept: Some("application/json".into()),
			query: BTreeMap::from([("verbose".to_owned(), Value::Bool(true))]),
			headers: BTreeMap::from([("X-Trace".to_owned(), "1".to_owned())]),
			..Default::default()
		};
		let operation = Operation::from_config("create", &config).expect("Config is valid.");
		let mut descriptor = RequestDescriptor::new(Box::new(MockBridge::default()));

		operation.apply(&mut descriptor);

		assert_eq!(descriptor.method(), Method::Post);
		assert_eq!(descriptor.path(), "/users/{id}");
		assert_eq!(descriptor.headers().get("content-type"), Some("application/json"));
		assert_eq!(descriptor.headers().get("x-trace"), Some("1"));
		assert_eq!(descriptor.query().get("verbose"), Some(&Value::Bool(true)));
	}

	#[test]
	fn invalid_header_names_are_rejected() {
		let config = OperationConfig {
			headers: BTreeMap::from([("bad header".to_owned(), "x".to_owned())]),
			..Default::default()
		};

		assert!(matches!(
			Operation::from_config("x", &config),
			Err(ValidationError::InvalidHeader { .. })
		));
	}
}
