// self
use crate::_prelude::*;

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedSend<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedSend<F> = F;

/// Span wrapping one descriptor send.
#[derive(Clone, Debug)]
pub struct RequestSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RequestSpan {
	/// Creates a span tagged with the method and target URL.
	pub fn new(method: &'static str, url: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("conduit.send", method, url);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, url);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedSend<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a warning for a retry the engine is about to wait for.
pub fn retry_scheduled(
	uri: &str,
	status: Option<u16>,
	attempt: u32,
	policy: &str,
	delay: std::time::Duration,
) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			uri,
			status,
			attempt,
			policy,
			delay_ms = delay.as_millis() as u64,
			"retrying request"
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (uri, status, attempt, policy, delay);
	}
}

/// Emits a debug event for a token stored under `cache_key`.
pub fn token_acquired(kind: &'static str, cache_key: &str, expires_at: Option<OffsetDateTime>) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(kind, cache_key, expires_at = ?expires_at, "token acquired");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, cache_key, expires_at);
	}
}

/// Emits an info event carrying a formatted transaction line.
pub fn transaction_logged(line: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(target: "conduit::transaction", "{line}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = line;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = RequestSpan::new("GET", "https://api.test/");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}

	#[test]
	fn event_helpers_are_callable_without_a_subscriber() {
		retry_scheduled("https://api.test/", Some(503), 1, "rate_limit", std::time::Duration::ZERO);
		token_acquired("basic", "key", None);
		transaction_logged("METHOD:GET");
	}
}
