//! Structured request bodies and their content-type driven wire encodings.

// crates.io
use url::form_urlencoded::Serializer;
// self
use crate::_prelude::*;

/// Content type assumed when the caller declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Structured request body; the wire encoding is chosen at send time from `content-type`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
	/// No payload.
	#[default]
	Empty,
	/// Map, list, or scalar payload.
	Structured(Value),
	/// Raw text passed through untouched (XML, pre-encoded JSON, plain text).
	Text(String),
	/// Form fields plus file parts; always sent as `multipart/form-data`.
	Multipart {
		/// Plain fields, flattened with bracket keys.
		fields: Value,
		/// Attached file parts.
		files: Vec<FilePart>,
	},
}
impl Body {
	/// Returns `true` when the body carries no payload.
	pub fn is_empty(&self) -> bool {
		match self {
			Self::Empty => true,
			Self::Structured(value) => value.is_null(),
			Self::Text(text) => text.is_empty(),
			Self::Multipart { fields, files } => fields.is_null() && files.is_empty(),
		}
	}

	/// Adds a file part, promoting the body to multipart.
	pub fn attach(&mut self, part: FilePart) {
		let current = std::mem::take(self);

		*self = match current {
			Self::Multipart { fields, mut files } => {
				files.push(part);

				Self::Multipart { fields, files }
			},
			Self::Structured(fields) => Self::Multipart { fields, files: vec![part] },
			Self::Text(text) => Self::Multipart { fields: Value::String(text), files: vec![part] },
			Self::Empty => Self::Multipart { fields: Value::Null, files: vec![part] },
		};
	}

	/// JSON view of the body used by mock rules and archives.
	pub fn to_value(&self) -> Value {
		match self {
			Self::Empty => Value::Null,
			Self::Structured(value) => value.clone(),
			Self::Text(text) => Value::String(text.clone()),
			Self::Multipart { fields, files } => {
				let mut map = match fields {
					Value::Object(map) => map.clone(),
					Value::Null => serde_json::Map::new(),
					other => {
						let mut map = serde_json::Map::new();

						map.insert("_".into(), other.clone());

						map
					},
				};

				for file in files {
					map.insert(file.field.clone(), Value::String(file.file_name.clone()));
				}

				Value::Object(map)
			},
		}
	}

	/// Encodes the body for the wire according to `content_type`.
	pub fn encode(&self, content_type: &str) -> EncodedBody {
		let essence = essence(content_type);

		match self {
			Self::Empty => EncodedBody::Empty,
			Self::Text(text) => EncodedBody::Bytes(text.clone().into_bytes()),
			Self::Multipart { fields, files } => {
				let mut parts = flatten(fields)
					.into_iter()
					.map(|(name, value)| MultipartField::Text { name, value })
					.collect::<Vec<_>>();

				parts.extend(files.iter().cloned().map(MultipartField::File));

				EncodedBody::Multipart(parts)
			},
			Self::Structured(value) =>
				if is_json(essence) {
					EncodedBody::Bytes(value.to_string().into_bytes())
				} else if essence.eq_ignore_ascii_case("multipart/form-data") {
					EncodedBody::Multipart(
						flatten(value)
							.into_iter()
							.map(|(name, value)| MultipartField::Text { name, value })
							.collect(),
					)
				} else if essence.eq_ignore_ascii_case(DEFAULT_CONTENT_TYPE) {
					EncodedBody::Bytes(encode_pairs(&flatten(value)).into_bytes())
				} else {
					match value {
						Value::String(text) => EncodedBody::Bytes(text.clone().into_bytes()),
						other => EncodedBody::Bytes(other.to_string().into_bytes()),
					}
				},
		}
	}
}
impl From<Value> for Body {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Self::Empty,
			value => Self::Structured(value),
		}
	}
}
impl From<String> for Body {
	fn from(text: String) -> Self {
		Self::Text(text)
	}
}
impl From<&str> for Body {
	fn from(text: &str) -> Self {
		Self::Text(text.to_owned())
	}
}

/// File attached to a multipart body.
#[derive(Clone, PartialEq, Eq)]
pub struct FilePart {
	/// Form field name.
	pub field: String,
	/// File name announced to the server.
	pub file_name: String,
	/// Optional MIME type of the part.
	pub content_type: Option<String>,
	/// File contents.
	pub bytes: Vec<u8>,
}
impl FilePart {
	/// Creates a new file part.
	pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
		Self { field: field.into(), file_name: file_name.into(), content_type: None, bytes }
	}

	/// Sets the MIME type of the part.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}
}
impl Debug for FilePart {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FilePart")
			.field("field", &self.field)
			.field("file_name", &self.file_name)
			.field("content_type", &self.content_type)
			.field("len", &self.bytes.len())
			.finish()
	}
}

/// Wire-ready body produced by [`Body::encode`].
#[derive(Clone, Debug, PartialEq)]
pub enum EncodedBody {
	/// Nothing to send.
	Empty,
	/// Encoded bytes.
	Bytes(Vec<u8>),
	/// Multipart fields; the transport picks the boundary.
	Multipart(Vec<MultipartField>),
}
impl EncodedBody {
	/// Lossy text rendering used by transaction logs.
	pub fn to_text(&self) -> String {
		match self {
			Self::Empty => String::new(),
			Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
			Self::Multipart(fields) => fields
				.iter()
				.map(|field| match field {
					MultipartField::Text { name, value } => format!("{name}={value}"),
					MultipartField::File(part) => format!("{}=@{}", part.field, part.file_name),
				})
				.collect::<Vec<_>>()
				.join("&"),
		}
	}
}

/// One multipart field.
#[derive(Clone, Debug, PartialEq)]
pub enum MultipartField {
	/// Plain text field.
	Text {
		/// Field name.
		name: String,
		/// Field value.
		value: String,
	},
	/// File field.
	File(FilePart),
}

/// Flattens nested maps and lists into bracket-keyed pairs (`a[b]=1`, `a[0]=x`).
///
/// Nulls are skipped and booleans render as `1`/`0`.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
	let mut out = Vec::new();

	match value {
		Value::Object(map) =>
			for (key, value) in map {
				flatten_into(key.clone(), value, &mut out);
			},
		Value::Array(items) =>
			for (idx, value) in items.iter().enumerate() {
				flatten_into(idx.to_string(), value, &mut out);
			},
		Value::Null => {},
		scalar =>
			if let Some(text) = scalar_text(scalar) {
				out.push((text, String::new()));
			},
	}

	out
}

/// URL-encodes flattened pairs.
pub fn encode_pairs(pairs: &[(String, String)]) -> String {
	let mut serializer = Serializer::new(String::new());

	for (key, value) in pairs {
		serializer.append_pair(key, value);
	}

	serializer.finish()
}

/// Returns the part of a content type before any `;` parameters, trimmed.
pub fn essence(content_type: &str) -> &str {
	content_type.split(';').next().unwrap_or_default().trim()
}

pub(crate) fn is_json(essence: &str) -> bool {
	essence.eq_ignore_ascii_case("application/json")
		|| essence.to_ascii_lowercase().ends_with("+json")
}

fn flatten_into(key: String, value: &Value, out: &mut Vec<(String, String)>) {
	match value {
		Value::Object(map) =>
			for (child, value) in map {
				flatten_into(format!("{key}[{child}]"), value, out);
			},
		Value::Array(items) =>
			for (idx, value) in items.iter().enumerate() {
				flatten_into(format!("{key}[{idx}]"), value, out);
			},
		scalar =>
			if let Some(text) = scalar_text(scalar) {
				out.push((key, text));
			},
	}
}

fn scalar_text(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_owned()),
		Value::String(text) => Some(text.clone()),
		other => Some(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn nested_values_flatten_with_bracket_keys() {
		let pairs =
			flatten(&json!({ "a": { "b": 1 }, "list": ["x", "y"], "skip": null, "on": true }));

		assert_eq!(
			pairs,
			vec![
				("a[b]".to_owned(), "1".to_owned()),
				("list[0]".to_owned(), "x".to_owned()),
				("list[1]".to_owned(), "y".to_owned()),
				("on".to_owned(), "1".to_owned()),
			]
		);
		assert_eq!(encode_pairs(&pairs), "a%5Bb%5D=1&list%5B0%5D=x&list%5B1%5D=y&on=1");
	}

	#[test]
	fn content_type_selects_encoding() {
		let body = Body::from(json!({ "name": "Ada" }));

		assert_eq!(
			body.encode("application/json; charset=utf-8"),
			EncodedBody::Bytes(br#"{"name":"Ada"}"#.to_vec())
		);
		assert_eq!(body.encode(DEFAULT_CONTENT_TYPE), EncodedBody::Bytes(b"name=Ada".to_vec()));
		assert!(matches!(body.encode("multipart/form-data"), EncodedBody::Multipart(_)));
		assert_eq!(
			Body::from("<a/>").encode("application/xml"),
			EncodedBody::Bytes(b"<a/>".to_vec())
		);
	}

	#[test]
	fn attaching_a_file_promotes_to_multipart() {
		let mut body = Body::from(json!({ "kind": "avatar" }));

		body.attach(FilePart::new("file", "a.png", vec![1, 2, 3]).with_content_type("image/png"));

		let EncodedBody::Multipart(fields) = body.encode(DEFAULT_CONTENT_TYPE) else {
			panic!("File parts should force a multipart encoding.");
		};

		assert_eq!(fields.len(), 2);
		assert_eq!(body.to_value(), json!({ "kind": "avatar", "file": "a.png" }));
	}
}
