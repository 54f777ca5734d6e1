//! Transaction logging with a formatted log line per exchange and an optional in-memory log.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use crate::{
	_prelude::*,
	chain::{InterceptFuture, Interceptor, Next},
	obs,
	observe::{Pending, TransactionRecord},
	request::RequestDescriptor,
};

/// Log-line template used when none is configured.
pub const DEFAULT_FORMAT: &str = concat!(
	"METHOD:{method}; URI:{uri}; HEADERS:{req_headers}; BODY:{req_body}",
	" ----- ",
	"CODE:{code}; HEADERS:{res_headers}; BODY:{res_body}",
);

type Sink = Box<dyn Fn(&TransactionRecord, &str) + Send + Sync>;

/// Shared transaction log.
///
/// Every exchange is formatted and emitted as a `conduit::transaction` event and handed to the
/// sink; records are kept in memory only while the log is enabled.
pub struct TransactionLog {
	enabled: AtomicBool,
	entries: Mutex<Vec<TransactionRecord>>,
	format: String,
	truncate: Option<usize>,
	sink: Option<Sink>,
}
impl TransactionLog {
	/// Creates a disabled log with the default format.
	pub fn new() -> Self {
		Self {
			enabled: AtomicBool::new(false),
			entries: Mutex::new(Vec::new()),
			format: DEFAULT_FORMAT.to_owned(),
			truncate: None,
			sink: None,
		}
	}

	/// Overrides the log-line template.
	///
	/// Placeholders: `{method}`, `{uri}`, `{req_headers}`, `{req_body}`, `{code}`,
	/// `{res_headers}`, `{res_body}`, `{error}`.
	pub fn with_format(mut self, format: impl Into<String>) -> Self {
		self.format = format.into();

		self
	}

	/// Truncates bodies longer than `limit` bytes in log lines, appending `...`.
	pub fn with_truncate(mut self, limit: usize) -> Self {
		self.truncate = (limit > 0).then_some(limit);

		self
	}

	/// Forwards every record and its formatted line to `sink`.
	pub fn with_sink<F>(mut self, sink: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&TransactionRecord, &str),
	{
		self.sink = Some(Box::new(sink));

		self
	}

	/// Starts keeping records in memory.
	pub fn enable(&self) {
		self.enabled.store(true, Ordering::SeqCst);
	}

	/// Stops keeping records in memory; already kept records stay.
	pub fn disable(&self) {
		self.enabled.store(false, Ordering::SeqCst);
	}

	/// Returns `true` while records are kept.
	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::SeqCst)
	}

	/// Kept records.
	pub fn entries(&self) -> Vec<TransactionRecord> {
		self.entries.lock().clone()
	}

	/// Removes and returns every kept record.
	pub fn flush(&self) -> Vec<TransactionRecord> {
		std::mem::take(&mut *self.entries.lock())
	}

	/// Number of kept records.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Returns `true` when nothing is kept.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Renders `record` with the configured template.
	pub fn format_line(&self, record: &TransactionRecord) -> String {
		let request = &record.request;
		let response = record.response.as_ref();
		let req_body = match request.get("body") {
			Some(Value::String(text)) => text.clone(),
			Some(Value::Null) | None => String::new(),
			Some(other) => other.to_string(),
		};
		let replacements = [
			("{method}", record.method().to_owned()),
			("{uri}", record.uri().to_owned()),
			("{req_headers}", request.get("headers").map(Value::to_string).unwrap_or_default()),
			("{req_body}", self.truncated(req_body)),
			("{code}", response.map(|r| r.status.to_string()).unwrap_or_default()),
			("{res_headers}", response.map(|r| r.headers.to_string()).unwrap_or_default()),
			("{res_body}", self.truncated(response.map(|r| r.body.clone()).unwrap_or_default())),
			("{error}", record.error.clone().unwrap_or_default()),
		];

		replacements
			.iter()
			.fold(self.format.clone(), |line, (placeholder, value)| {
				line.replace(placeholder, value)
			})
	}

	/// Formats, emits, and (when enabled) keeps `record`.
	pub fn record(&self, record: TransactionRecord) {
		let line = self.format_line(&record);

		obs::transaction_logged(&line);

		if let Some(sink) = &self.sink {
			sink(&record, &line);
		}
		if self.is_enabled() {
			self.entries.lock().push(record);
		}
	}

	fn truncated(&self, mut text: String) -> String {
		if let Some(limit) = self.truncate
			&& text.len() > limit
		{
			let mut cut = limit;

			while !text.is_char_boundary(cut) {
				cut -= 1;
			}

			text.truncate(cut);
			text.push_str("...");
		}

		text
	}
}
impl Default for TransactionLog {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for TransactionLog {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TransactionLog")
			.field("enabled", &self.is_enabled())
			.field("entries", &self.len())
			.field("format", &self.format)
			.field("truncate", &self.truncate)
			.finish_non_exhaustive()
	}
}

/// Interceptor feeding every exchange into a [`TransactionLog`].
#[derive(Clone, Debug)]
pub struct LoggingInterceptor {
	log: Arc<TransactionLog>,
}
impl LoggingInterceptor {
	/// Logs into `log`.
	pub fn new(log: Arc<TransactionLog>) -> Self {
		Self { log }
	}

	/// Target log.
	pub fn log(&self) -> &Arc<TransactionLog> {
		&self.log
	}
}
impl Interceptor for LoggingInterceptor {
	fn intercept<'a>(
		&'a self,
		request: &'a mut RequestDescriptor,
		next: Next<'a>,
	) -> InterceptFuture<'a> {
		Box::pin(async move {
			let mut pending = Pending::new(request, |record| self.log.record(record));
			let result = next.run(request).await;

			pending.finish(request, &result);

			result
		})
	}

	fn label(&self) -> &'static str {
		"logging"
	}
}
