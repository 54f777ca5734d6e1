//! Archive of request snapshots with their responses attached.

// self
use crate::{
	_prelude::*,
	chain::{InterceptFuture, Interceptor, Next},
	observe::{Pending, TransactionRecord},
	request::RequestDescriptor,
};

/// Flushable bucket of archived exchanges.
#[derive(Debug, Default)]
pub struct Archive {
	entries: Mutex<Vec<TransactionRecord>>,
}
impl Archive {
	/// Creates an empty archive.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends `record`.
	pub fn push(&self, record: TransactionRecord) {
		self.entries.lock().push(record);
	}

	/// Archived exchanges, oldest first.
	pub fn entries(&self) -> Vec<TransactionRecord> {
		self.entries.lock().clone()
	}

	/// Removes and returns every archived exchange.
	pub fn flush(&self) -> Vec<TransactionRecord> {
		std::mem::take(&mut *self.entries.lock())
	}

	/// Number of archived exchanges.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` when nothing is archived.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// JSON list of `{ request, response, error, started_at, finished_at }` objects.
	pub fn to_value(&self) -> Value {
		serde_json::to_value(&*self.entries.lock()).unwrap_or(Value::Array(Vec::new()))
	}
}

/// Interceptor archiving every exchange.
#[derive(Clone, Debug)]
pub struct ArchiveInterceptor {
	archive: Arc<Archive>,
}
impl ArchiveInterceptor {
	/// Archives into `archive`.
	pub fn new(archive: Arc<Archive>) -> Self {
		Self { archive }
	}
}
impl Interceptor for ArchiveInterceptor {
	fn intercept<'a>(
		&'a self,
		request: &'a mut RequestDescriptor,
		next: Next<'a>,
	) -> InterceptFuture<'a> {
		Box::pin(async move {
			let mut pending = Pending::new(request, |record| self.archive.push(record));
			let result = next.run(request).await;

			pending.finish(request, &result);

			result
		})
	}

	fn label(&self) -> &'static str {
		"archive"
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{bridge::MockBridge, request::Params};

	#[tokio::test]
	async fn archive_serializes_sent_requests() {
		let archive = Arc::new(Archive::new());
		let mut request = RequestDescriptor::new(Box::new(MockBridge::default()));

		request
			.set_host("api.test")
			.set_path("/users/{id}")
			.push_interceptor(Arc::new(ArchiveInterceptor::new(archive.clone())), None);
		request
			.send(&Params::from([("id".to_owned(), "7".to_owned())]))
			.await
			.expect("Mock should answer.");

		let value = archive.to_value();

		assert_eq!(value[0]["request"]["path"], "/users/7");
		assert_eq!(value[0]["response"]["status"], 200);
		assert!(value[0]["error"].is_null());
		assert_eq!(archive.flush().len(), 1);
		assert!(archive.is_empty());
	}
}
