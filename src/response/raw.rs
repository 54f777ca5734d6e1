//! Raw passthrough struct and the error struct substituted for undecodable bodies.

// self
use crate::{
	_prelude::*,
	error::DecodeError,
	http::RawResponse,
	response::{Offset, ResponseStruct},
};

/// Body kept as text; index `0` addresses the whole body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawStruct {
	content_type: String,
	body: String,
}
impl RawStruct {
	/// Creates an empty struct.
	pub fn new(content_type: impl Into<String>) -> Self {
		Self { content_type: content_type.into(), body: String::new() }
	}

	/// Body text.
	pub fn body(&self) -> &str {
		&self.body
	}
}
impl ResponseStruct for RawStruct {
	fn kind(&self) -> &'static str {
		"raw"
	}

	fn content_type(&self) -> &str {
		&self.content_type
	}

	fn decode(&mut self, response: &RawResponse) -> Result<(), DecodeError> {
		self.body = response.text().into_owned();

		Ok(())
	}

	fn get(&self, offset: &Offset) -> Option<Value> {
		match offset {
			Offset::Index(0) if !self.body.is_empty() => Some(Value::String(self.body.clone())),
			_ => None,
		}
	}

	fn set(&mut self, offset: &Offset, value: Value) -> Result<(), DecodeError> {
		match (offset, value) {
			(Offset::Index(0), Value::String(body)) => self.body = body,
			(Offset::Index(0), other) => self.body = other.to_string(),
			_ =>
				return Err(DecodeError::InvalidOffset {
					offset: offset.to_string(),
					reason: "raw content is addressed by index 0 only",
				}),
		}

		Ok(())
	}

	fn unset(&mut self, offset: &Offset) -> Result<(), DecodeError> {
		if *offset == Offset::Index(0) {
			self.body.clear();
		}

		Ok(())
	}

	fn count(&self) -> usize {
		usize::from(!self.body.is_empty())
	}

	fn items(&self) -> Vec<Value> {
		self.get(&Offset::Index(0)).into_iter().collect()
	}

	fn to_value(&self) -> Value {
		Value::String(self.body.clone())
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
impl Display for RawStruct {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.body)
	}
}

/// Stand-in content for a body that failed to decode: the raw body plus the failure.
///
/// Keys `error`, `body`, `status`, and `decoder` are readable; the struct is read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
	content_type: String,
	decoder: &'static str,
	status: u16,
	error: String,
	body: String,
}
impl ErrorResponse {
	/// Captures `error` raised by the `decoder` struct while decoding `response`.
	pub fn new(
		content_type: impl Into<String>,
		decoder: &'static str,
		response: &RawResponse,
		error: &DecodeError,
	) -> Self {
		Self {
			content_type: content_type.into(),
			decoder,
			status: response.status,
			error: error.to_string(),
			body: response.text().into_owned(),
		}
	}

	/// Decode failure message.
	pub fn error(&self) -> &str {
		&self.error
	}

	/// Undecoded body.
	pub fn body(&self) -> &str {
		&self.body
	}

	/// Decoder that failed.
	pub fn decoder(&self) -> &'static str {
		self.decoder
	}
}
impl ResponseStruct for ErrorResponse {
	fn kind(&self) -> &'static str {
		"error"
	}

	fn content_type(&self) -> &str {
		&self.content_type
	}

	fn decode(&mut self, response: &RawResponse) -> Result<(), DecodeError> {
		self.status = response.status;
		self.body = response.text().into_owned();

		Ok(())
	}

	fn get(&self, offset: &Offset) -> Option<Value> {
		match offset {
			Offset::Key(key) => match key.as_str() {
				"error" => Some(Value::String(self.error.clone())),
				"body" => Some(Value::String(self.body.clone())),
				"status" => Some(Value::from(self.status)),
				"decoder" => Some(Value::String(self.decoder.to_owned())),
				_ => None,
			},
			Offset::Index(_) => None,
		}
	}

	fn set(&mut self, _: &Offset, _: Value) -> Result<(), DecodeError> {
		Err(DecodeError::Incompatible { expected: "a decoded response" })
	}

	fn unset(&mut self, _: &Offset) -> Result<(), DecodeError> {
		Err(DecodeError::Incompatible { expected: "a decoded response" })
	}

	fn count(&self) -> usize {
		0
	}

	fn items(&self) -> Vec<Value> {
		Vec::new()
	}

	fn to_value(&self) -> Value {
		serde_json::json!({
			"error": self.error,
			"body": self.body,
			"status": self.status,
			"decoder": self.decoder,
		})
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
impl Display for ErrorResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.body)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn raw_struct_round_trips_text() {
		let mut content = RawStruct::new("text/plain");

		content.decode(&RawResponse::new(200).with_body(b"hello".to_vec())).expect("Text decodes.");

		assert_eq!(content.count(), 1);
		assert_eq!(content.get(&0.into()), Some(Value::String("hello".into())));
		assert!(content.set(&"k".into(), Value::Null).is_err());

		content.set(&0.into(), Value::String("bye".into())).expect("Index 0 is settable.");

		assert_eq!(content.to_string(), "bye");
	}

	#[test]
	fn error_response_exposes_the_failure() {
		let response = RawResponse::new(502).with_body(b"<html>bad gateway</html>".to_vec());
		let failure = DecodeError::Incompatible { expected: "JSON" };
		let content = ErrorResponse::new("application/json", "json", &response, &failure);

		assert_eq!(content.get(&"status".into()), Some(Value::from(502)));
		assert_eq!(content.get(&"decoder".into()), Some(Value::String("json".into())));
		assert_eq!(content.to_string(), "<html>bad gateway</html>");
		assert!(content.error().contains("JSON"));
	}
}
