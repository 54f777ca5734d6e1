//! JSON response struct.

// self
use crate::{
	_prelude::*,
	error::DecodeError,
	http::RawResponse,
	response::{Offset, ResponseStruct},
};

/// Decoded JSON tree.
///
/// Keys address object members; indexes address list items (or the member named by the index
/// on objects). An empty body decodes to `null`.
#[derive(Clone, Debug, PartialEq)]
pub struct JsonStruct {
	content_type: String,
	value: Value,
}
impl JsonStruct {
	/// Creates an empty (`null`) struct.
	pub fn new(content_type: impl Into<String>) -> Self {
		Self { content_type: content_type.into(), value: Value::Null }
	}

	/// Wraps an existing tree.
	pub fn from_value(content_type: impl Into<String>, value: Value) -> Self {
		Self { content_type: content_type.into(), value }
	}

	/// Decoded tree.
	pub fn value(&self) -> &Value {
		&self.value
	}

	/// Looks up an RFC 6901 pointer such as `/b/0`.
	pub fn pointer(&self, pointer: &str) -> Option<&Value> {
		self.value.pointer(pointer)
	}

	/// Deserializes the tree into `T`.
	pub fn deserialize<T>(&self) -> Result<T, DecodeError>
	where
		T: serde::de::DeserializeOwned,
	{
		Ok(T::deserialize(&self.value)?)
	}
}
impl ResponseStruct for JsonStruct {
	fn kind(&self) -> &'static str {
		"json"
	}

	fn content_type(&self) -> &str {
		&self.content_type
	}

	fn decode(&mut self, response: &RawResponse) -> Result<(), DecodeError> {
		self.value = if response.body.iter().all(u8::is_ascii_whitespace) {
			Value::Null
		} else {
			serde_json::from_slice(&response.body)?
		};

		Ok(())
	}

	fn get(&self, offset: &Offset) -> Option<Value> {
		match (&self.value, offset) {
			(Value::Object(map), Offset::Key(key)) => map.get(key).cloned(),
			(Value::Object(map), Offset::Index(idx)) => map.get(&idx.to_string()).cloned(),
			(Value::Array(items), Offset::Index(idx)) => items.get(*idx).cloned(),
			(Value::Array(items), Offset::Key(key)) =>
				key.parse::<usize>().ok().and_then(|idx| items.get(idx)).cloned(),
			_ => None,
		}
	}

	fn set(&mut self, offset: &Offset, value: Value) -> Result<(), DecodeError> {
		if self.value.is_null() {
			self.value = match offset {
				Offset::Key(_) => Value::Object(Default::default()),
				Offset::Index(_) => Value::Array(Vec::new()),
			};
		}

		match (&mut self.value, offset) {
			(Value::Object(map), Offset::Key(key)) => {
				map.insert(key.clone(), value);
			},
			(Value::Object(map), Offset::Index(idx)) => {
				map.insert(idx.to_string(), value);
			},
			(Value::Array(items), Offset::Index(idx)) if *idx < items.len() => items[*idx] = value,
			(Value::Array(items), Offset::Index(idx)) if *idx == items.len() => items.push(value),
			(Value::Array(_), Offset::Index(_)) =>
				return Err(DecodeError::InvalidOffset {
					offset: offset.to_string(),
					reason: "index is past the end of the list",
				}),
			(Value::Array(_), Offset::Key(_)) =>
				return Err(DecodeError::Incompatible { expected: "an index for a list" }),
			_ => return Err(DecodeError::Incompatible { expected: "an object or a list" }),
		}

		Ok(())
	}

	fn unset(&mut self, offset: &Offset) -> Result<(), DecodeError> {
		match (&mut self.value, offset) {
			(Value::Object(map), Offset::Key(key)) => {
				map.remove(key);
			},
			(Value::Object(map), Offset::Index(idx)) => {
				map.remove(&idx.to_string());
			},
			(Value::Array(items), Offset::Index(idx)) if *idx < items.len() => {
				items.remove(*idx);
			},
			(Value::Array(_), Offset::Index(_)) | (Value::Null, _) => {},
			_ => return Err(DecodeError::Incompatible { expected: "an object or a list" }),
		}

		Ok(())
	}

	fn count(&self) -> usize {
		match &self.value {
			Value::Null => 0,
			Value::Object(map) => map.len(),
			Value::Array(items) => items.len(),
			_ => 1,
		}
	}

	fn items(&self) -> Vec<Value> {
		match &self.value {
			Value::Null => Vec::new(),
			Value::Object(map) => map.values().cloned().collect(),
			Value::Array(items) => items.clone(),
			scalar => vec![scalar.clone()],
		}
	}

	fn to_value(&self) -> Value {
		self.value.clone()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
impl Display for JsonStruct {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		if self.value.is_null() {
			return Ok(());
		}

		Display::fmt(&self.value, f)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn decoded(body: &str) -> JsonStruct {
		let mut content = JsonStruct::new("application/json");

		content
			.decode(&RawResponse::new(200).with_body(body.as_bytes().to_vec()))
			.expect("Body should be valid JSON.");

		content
	}

	#[test]
	fn set_is_reflected_in_the_serialized_form() {
		let mut content = decoded(r#"{"a":1,"b":[2,3]}"#);

		assert_eq!(content.get(&"a".into()), Some(serde_json::json!(1)));

		content.set(&"a".into(), serde_json::json!(9)).expect("Object keys are settable.");

		let reparsed = serde_json::from_str::<Value>(&content.to_string())
			.expect("Serialized form should be JSON.");

		assert_eq!(reparsed, serde_json::json!({ "a": 9, "b": [2, 3] }));
	}

	#[test]
	fn lists_support_index_access() {
		let mut content = decoded("[1,2]");

		content.set(&2.into(), serde_json::json!(3)).expect("Appending at len is allowed.");

		assert_eq!(content.count(), 3);
		assert!(content.set(&5.into(), Value::Null).is_err());

		content.unset(&0.into()).expect("In-range removal succeeds.");

		assert_eq!(content.items(), vec![serde_json::json!(2), serde_json::json!(3)]);
		assert!(!content.has(&"x".into()));
	}

	#[test]
	fn malformed_bodies_fail_and_empty_bodies_are_null() {
		let mut content = JsonStruct::new("application/json");

		assert!(matches!(
			content.decode(&RawResponse::new(200).with_body(b"{oops".to_vec())),
			Err(DecodeError::Json(_))
		));
		assert_eq!(decoded("  ").count(), 0);
		assert_eq!(decoded("  ").to_string(), "");
	}
}
