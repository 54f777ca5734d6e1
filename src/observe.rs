//! Observer interceptors: transaction logging, archival, and lifecycle events.
//!
//! Observers record every outcome, including failures and cancelled sends, and never turn a
//! failure into a success. Register them first so they wrap everything else and see the request
//! that actually went out.

pub mod archive;
pub mod events;
pub mod logging;

pub use archive::*;
pub use events::*;
pub use logging::*;

// self
use crate::{_prelude::*, auth::redact_headers, http::RawResponse, request::RequestDescriptor};

const CANCELLED: &str = "cancelled before completion";

/// One request/response exchange as seen by an observer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
	/// Request snapshot (method, uri, headers, body, cookies); credentials are redacted.
	pub request: Value,
	/// Response, when one arrived.
	pub response: Option<ResponseRecord>,
	/// Failure message, when no response arrived.
	pub error: Option<String>,
	/// When the observer saw the send start.
	#[serde(with = "time::serde::rfc3339")]
	pub started_at: OffsetDateTime,
	/// When the send finished.
	#[serde(with = "time::serde::rfc3339::option")]
	pub finished_at: Option<OffsetDateTime>,
}
impl TransactionRecord {
	fn started(request: &RequestDescriptor) -> Self {
		Self {
			request: request_snapshot(request),
			response: None,
			error: Some(CANCELLED.to_owned()),
			started_at: OffsetDateTime::now_utc(),
			finished_at: None,
		}
	}

	fn finish(&mut self, request: &RequestDescriptor, result: &Result<RawResponse>) {
		self.request = request_snapshot(request);
		self.finished_at = Some(OffsetDateTime::now_utc());

		match result {
			Ok(response) => {
				self.response = Some(ResponseRecord::from(response));
				self.error = None;
			},
			Err(e) => {
				self.response = request.response().map(ResponseRecord::from);
				self.error = Some(e.to_string());
			},
		}
	}

	/// Request method.
	pub fn method(&self) -> &str {
		self.request.get("method").and_then(Value::as_str).unwrap_or_default()
	}

	/// Request URI.
	pub fn uri(&self) -> &str {
		self.request.get("uri").and_then(Value::as_str).unwrap_or_default()
	}

	/// Response status, when a response arrived.
	pub fn status(&self) -> Option<u16> {
		self.response.as_ref().map(|response| response.status)
	}
}

/// Response half of a [`TransactionRecord`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
	/// HTTP status code.
	pub status: u16,
	/// Response headers as JSON.
	pub headers: Value,
	/// Response body as lossy UTF-8.
	pub body: String,
}
impl From<&RawResponse> for ResponseRecord {
	fn from(response: &RawResponse) -> Self {
		Self {
			status: response.status,
			headers: response.headers.to_value(),
			body: response.text().into_owned(),
		}
	}
}

/// Deferred record that is handed to `commit` when dropped, whether the send finished, failed, or
/// was cancelled.
struct Pending<F>
where
	F: FnMut(TransactionRecord),
{
	record: Option<TransactionRecord>,
	commit: F,
}
impl<F> Pending<F>
where
	F: FnMut(TransactionRecord),
{
	fn new(request: &RequestDescriptor, commit: F) -> Self {
		Self { record: Some(TransactionRecord::started(request)), commit }
	}

	fn finish(&mut self, request: &RequestDescriptor, result: &Result<RawResponse>) {
		if let Some(record) = &mut self.record {
			record.finish(request, result);
		}
	}
}
impl<F> Drop for Pending<F>
where
	F: FnMut(TransactionRecord),
{
	fn drop(&mut self) {
		if let Some(record) = self.record.take() {
			(self.commit)(record);
		}
	}
}

fn request_snapshot(request: &RequestDescriptor) -> Value {
	let mut snapshot = match request.sent_request() {
		Some(wire) => wire.snapshot(),
		None => request.build_wire().map(|wire| wire.snapshot()).unwrap_or_else(|_| {
			serde_json::json!({ "method": request.method().as_str(), "uri": request.uri() })
		}),
	};

	if let Some(headers) = snapshot.get_mut("headers").and_then(Value::as_object_mut) {
		redact_headers(headers);
	}

	snapshot
}
