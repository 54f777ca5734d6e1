//! Response transformation boundary: sends a descriptor and decodes what came back.

// self
use crate::{
	_prelude::*,
	cookie::CookieInput,
	error::{DecodeError, TransportError},
	http::RawResponse,
	request::{Body, FilePart, Params, RequestDescriptor},
	response::{ErrorResponse, Offset, ResponseStruct, StructRegistry},
};

type ErrorTransformer =
	Arc<
		dyn Fn(&str, &'static str, &RawResponse, &DecodeError) -> Box<dyn ResponseStruct>
			+ Send
			+ Sync,
	>;

/// One named operation: a descriptor plus the rules for decoding its responses.
///
/// The decoder is chosen by the explicit transformer content type, else the response
/// `content-type`, else the descriptor's `accept` header. A decode failure yields the error
/// transformer's output (an [`ErrorResponse`] by default), or propagates in strict mode.
#[derive(Clone)]
pub struct Endpoint {
	descriptor: RequestDescriptor,
	registry: Arc<StructRegistry>,
	transformer: Option<String>,
	error_transformer: Option<ErrorTransformer>,
	strict: bool,
}
impl Endpoint {
	/// Wraps `descriptor`, decoding through `registry`.
	pub fn new(descriptor: RequestDescriptor, registry: Arc<StructRegistry>) -> Self {
		Self { descriptor, registry, transformer: None, error_transformer: None, strict: false }
	}

	/// Decodes every response as `content_type`, ignoring headers.
	pub fn with_transformer(mut self, content_type: impl Into<String>) -> Self {
		self.transformer = Some(content_type.into());

		self
	}

	/// Replaces the default [`ErrorResponse`] substitution.
	pub fn with_error_transformer<F>(mut self, transformer: F) -> Self
	where
		F: 'static
			+ Send
			+ Sync
			+ Fn(&str, &'static str, &RawResponse, &DecodeError) -> Box<dyn ResponseStruct>,
	{
		self.error_transformer = Some(Arc::new(transformer));

		self
	}

	/// Propagates decode failures instead of substituting error content.
	pub fn with_strict(mut self, strict: bool) -> Self {
		self.strict = strict;

		self
	}

	/// Returns `true` in strict mode.
	pub fn is_strict(&self) -> bool {
		self.strict
	}

	/// Wrapped descriptor.
	pub fn descriptor(&self) -> &RequestDescriptor {
		&self.descriptor
	}

	/// Mutable access to the wrapped descriptor.
	pub fn descriptor_mut(&mut self) -> &mut RequestDescriptor {
		&mut self.descriptor
	}

	/// Sets a query value.
	pub fn add_query(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
		self.descriptor.add_query(name, value);

		self
	}

	/// Sets the body.
	pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
		self.descriptor.set_body(body);

		self
	}

	/// Attaches a file, promoting the body to multipart.
	pub fn attach_file(&mut self, part: FilePart) -> &mut Self {
		self.descriptor.attach_file(part);

		self
	}

	/// Sets a header.
	pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
		self.descriptor.set_header(name, value);

		self
	}

	/// Adds or replaces a cookie.
	pub fn add_cookie(&mut self, cookie: impl Into<CookieInput>) -> &mut Self {
		self.descriptor.add_cookie(cookie);

		self
	}

	/// Content type the decoder is chosen by for `response`.
	pub fn decode_type(&self, response: &RawResponse) -> String {
		self.transformer
			.clone()
			.or_else(|| response.content_type().map(str::to_owned))
			.or_else(|| {
				self.descriptor
					.headers()
					.get("accept")
					.and_then(|accept| accept.split(',').next())
					.map(|accept| accept.trim().to_owned())
			})
			.unwrap_or_default()
	}

	/// Sends the descriptor and decodes the response.
	pub async fn send(&mut self, params: &Params) -> Result<EndpointResponse> {
		let raw = self.descriptor.send(params).await?;
		let content_type = self.decode_type(&raw);
		let mut content = self.registry.make(&content_type);
		let content = match content.decode(&raw) {
			Ok(()) => content,
			Err(e) if self.strict => return Err(e.into()),
			Err(e) => match &self.error_transformer {
				Some(transform) => transform(&content_type, content.kind(), &raw, &e),
				None =>
					Box::new(ErrorResponse::new(content_type.clone(), content.kind(), &raw, &e)),
			},
		};

		Ok(EndpointResponse { raw, content, error: self.descriptor.error().cloned() })
	}
}
impl Debug for Endpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Endpoint")
			.field("descriptor", &self.descriptor)
			.field("transformer", &self.transformer)
			.field("strict", &self.strict)
			.finish_non_exhaustive()
	}
}

/// Decoded response plus the raw response and any captured transport failure.
#[derive(Debug)]
pub struct EndpointResponse {
	raw: RawResponse,
	content: Box<dyn ResponseStruct>,
	error: Option<TransportError>,
}
impl EndpointResponse {
	/// HTTP status.
	pub fn status(&self) -> u16 {
		self.raw.status
	}

	/// Undecoded response.
	pub fn raw(&self) -> &RawResponse {
		&self.raw
	}

	/// Decoded content.
	pub fn content(&self) -> &dyn ResponseStruct {
		self.content.as_ref()
	}

	/// Mutable decoded content.
	pub fn content_mut(&mut self) -> &mut dyn ResponseStruct {
		self.content.as_mut()
	}

	/// Takes the decoded content.
	pub fn into_content(self) -> Box<dyn ResponseStruct> {
		self.content
	}

	/// Downcasts the content to a concrete struct.
	pub fn content_as<T>(&self) -> Option<&T>
	where
		T: ResponseStruct,
	{
		self.content.as_any().downcast_ref()
	}

	/// Shorthand for `content().get(offset)`.
	pub fn get(&self, offset: impl Into<Offset>) -> Option<Value> {
		self.content.get(&offset.into())
	}

	/// Returns `true` when decoding failed and error content was substituted.
	pub fn is_decode_failure(&self) -> bool {
		self.content.kind() == "error"
	}

	/// Transport failure captured during the send (for example an error status).
	pub fn error(&self) -> Option<&TransportError> {
		self.error.as_ref()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		bridge::{MockBridge, MockRule},
		response::{JsonStruct, RawStruct},
	};

	fn endpoint(response: RawResponse) -> Endpoint {
		let mut descriptor = RequestDescriptor::new(Box::new(
			MockBridge::default().with_rule(MockRule::new().respond(response)),
		));

		descriptor.set_host("api.test").set_path("/thing");

		Endpoint::new(descriptor, Arc::new(StructRegistry::new()))
	}

	#[tokio::test]
	async fn content_type_header_picks_the_decoder() {
		let mut endpoint = endpoint(
			RawResponse::new(200)
				.with_header("content-type", "application/json; charset=utf-8")
				.with_body(br#"{"id":3}"#.to_vec()),
		);
		let response = endpoint.send(&Params::new()).await.expect("Send should succeed.");

		assert_eq!(response.get("id"), Some(serde_json::json!(3)));
		assert!(response.content_as::<JsonStruct>().is_some());
		assert!(response.error().is_none());
	}

	#[tokio::test]
	async fn accept_header_is_the_last_resort() {
		let mut endpoint = endpoint(RawResponse::new(200).with_body(b"[1,2]".to_vec()));

		endpoint.set_header("accept", "application/json, text/plain");

		let response = endpoint.send(&Params::new()).await.expect("Send should succeed.");

		assert_eq!(response.content().count(), 2);
	}

	#[tokio::test]
	async fn decode_failures_become_error_content_unless_strict() {
		let broken = RawResponse::new(500)
			.with_header("content-type", "application/json")
			.with_body(b"<html>oops</html>".to_vec());
		let mut lenient = endpoint(broken.clone());
		let response = lenient.send(&Params::new()).await.expect("Lenient mode substitutes.");

		assert!(response.is_decode_failure());
		assert_eq!(response.get("decoder"), Some(Value::String("json".into())));
		assert_eq!(response.error().and_then(TransportError::status), Some(500));

		let mut strict = endpoint(broken).with_strict(true);

		assert!(matches!(
			strict.send(&Params::new()).await,
			Err(Error::Decode(DecodeError::Json(_)))
		));
	}

	#[tokio::test]
	async fn transformer_overrides_headers() {
		let mut endpoint = endpoint(
			RawResponse::new(200)
				.with_header("content-type", "application/json")
				.with_body(b"not json".to_vec()),
		)
		.with_transformer("text/plain");
		let response = endpoint.send(&Params::new()).await.expect("Send should succeed.");

		assert_eq!(response.content_as::<RawStruct>().map(RawStruct::body), Some("not json"));
	}
}
