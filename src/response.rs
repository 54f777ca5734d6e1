//! Content-type-aware response structs behind one access contract.
//!
//! [`StructRegistry::make`] picks the decoder: an exact registered content type first, then the
//! registered essence (the part before `;`), then the built-in mapping (JSON, XML, HTML,
//! everything else raw). Struct output always re-serializes the in-memory state, so mutations
//! show up in `to_string()`.

pub mod html;
pub mod json;
pub mod markup;
pub mod raw;
pub mod xml;

pub use html::*;
pub use json::*;
pub use raw::*;
pub use xml::*;

// self
use crate::{_prelude::*, error::DecodeError, http::RawResponse, request::body};

/// Address of a value inside a response struct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Offset {
	/// Object key for JSON; path query (`/a/b`, `//b[@id='1']`, `@attr`) for XML and HTML.
	Key(String),
	/// Position among list items (JSON) or root children (XML and HTML), zero-based.
	Index(usize),
}
impl Display for Offset {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Offset::Key(key) => f.write_str(key),
			Offset::Index(idx) => write!(f, "{idx}"),
		}
	}
}
impl From<&str> for Offset {
	fn from(key: &str) -> Self {
		Self::Key(key.to_owned())
	}
}
impl From<String> for Offset {
	fn from(key: String) -> Self {
		Self::Key(key)
	}
}
impl From<usize> for Offset {
	fn from(idx: usize) -> Self {
		Self::Index(idx)
	}
}

/// Uniform view over a decoded response body.
pub trait ResponseStruct
where
	Self: 'static + Send + Sync + Debug + Display,
{
	/// Decoder label: `json`, `xml`, `html`, `raw`, or `error`.
	fn kind(&self) -> &'static str;

	/// Content type the struct was made for.
	fn content_type(&self) -> &str;

	/// Parses `response` into the in-memory shape, replacing any previous content.
	fn decode(&mut self, response: &RawResponse) -> Result<(), DecodeError>;

	/// Returns `true` when `offset` addresses something.
	fn has(&self, offset: &Offset) -> bool {
		self.get(offset).is_some()
	}

	/// Value at `offset`.
	fn get(&self, offset: &Offset) -> Option<Value>;

	/// Writes `value` at `offset`.
	fn set(&mut self, offset: &Offset, value: Value) -> Result<(), DecodeError>;

	/// Removes whatever `offset` addresses.
	fn unset(&mut self, offset: &Offset) -> Result<(), DecodeError>;

	/// Number of top-level items.
	fn count(&self) -> usize;

	/// Top-level items in order; call again for a fresh pass.
	fn items(&self) -> Vec<Value>;

	/// JSON view of the whole content.
	fn to_value(&self) -> Value;

	/// Downcasting support.
	fn as_any(&self) -> &dyn Any;
}

type StructFactory = Arc<dyn Fn(&str) -> Box<dyn ResponseStruct> + Send + Sync>;

/// Content-type to decoder table.
#[derive(Clone, Default)]
pub struct StructRegistry {
	registered: HashMap<String, StructFactory>,
}
impl StructRegistry {
	/// Creates a registry with only the built-in mapping.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `factory` for `content_type`; takes priority over the built-in mapping.
	pub fn register<F>(&mut self, content_type: &str, factory: F) -> &mut Self
	where
		F: 'static + Send + Sync + Fn(&str) -> Box<dyn ResponseStruct>,
	{
		self.registered.insert(normalize(content_type), Arc::new(factory));

		self
	}

	/// Returns `true` when `content_type` has an explicit registration.
	pub fn is_registered(&self, content_type: &str) -> bool {
		self.registered.contains_key(&normalize(content_type))
	}

	/// Creates an empty struct for `content_type`.
	pub fn make(&self, content_type: &str) -> Box<dyn ResponseStruct> {
		let exact = normalize(content_type);

		if let Some(factory) = self.registered.get(&exact) {
			return factory(content_type);
		}

		let essence = body::essence(&exact).to_owned();

		if let Some(factory) = self.registered.get(&essence) {
			return factory(content_type);
		}

		match builtin_kind(&essence) {
			"json" => Box::new(JsonStruct::new(content_type)),
			"xml" => Box::new(XmlStruct::new(content_type)),
			"html" => Box::new(HtmlStruct::new(content_type)),
			_ => Box::new(RawStruct::new(content_type)),
		}
	}

	/// Makes a struct for `content_type` and decodes `response` into it.
	pub fn decode(
		&self,
		content_type: &str,
		response: &RawResponse,
	) -> Result<Box<dyn ResponseStruct>, DecodeError> {
		let mut content = self.make(content_type);

		content.decode(response)?;

		Ok(content)
	}
}
impl Debug for StructRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.registered.keys()).finish()
	}
}

fn normalize(content_type: &str) -> String {
	content_type.trim().to_ascii_lowercase()
}

fn builtin_kind(essence: &str) -> &'static str {
	if body::is_json(essence) {
		"json"
	} else if essence == "application/xml" || essence == "text/xml" || essence.ends_with("+xml") {
		"xml"
	} else if essence == "text/html" {
		"html"
	} else {
		"raw"
	}
}
