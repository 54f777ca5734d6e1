//! Lifecycle events emitted around each pass through the chain.

// self
use crate::{
	_prelude::*,
	chain::{InterceptFuture, Interceptor, Next},
	request::RequestDescriptor,
};

/// Lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
	/// The request is about to enter the rest of the chain.
	Sending {
		/// Method.
		method: &'static str,
		/// Absolute URI.
		uri: String,
	},
	/// A response came back.
	Completed {
		/// Absolute URI.
		uri: String,
		/// Response status.
		status: u16,
		/// Time spent in the rest of the chain.
		elapsed: Duration,
	},
	/// The send failed without a response.
	Failed {
		/// Absolute URI.
		uri: String,
		/// Failure message.
		error: String,
	},
}

/// Receiver of lifecycle events.
pub trait EventSink
where
	Self: Send + Sync,
{
	/// Handles one event.
	fn emit(&self, event: &Event);
}
impl<F> EventSink for F
where
	F: Send + Sync + Fn(&Event),
{
	fn emit(&self, event: &Event) {
		self(event)
	}
}

/// Interceptor emitting [`Event`]s to an injected sink.
#[derive(Clone)]
pub struct EventInterceptor {
	sink: Arc<dyn EventSink>,
}
impl EventInterceptor {
	/// Emits into `sink`.
	pub fn new(sink: Arc<dyn EventSink>) -> Self {
		Self { sink }
	}
}
impl Interceptor for EventInterceptor {
	fn intercept<'a>(
		&'a self,
		request: &'a mut RequestDescriptor,
		next: Next<'a>,
	) -> InterceptFuture<'a> {
		Box::pin(async move {
			let started = OffsetDateTime::now_utc();

			self.sink
				.emit(&Event::Sending { method: request.method().as_str(), uri: request.uri() });

			let result = next.run(request).await;
			let uri = request.uri();

			match &result {
				Ok(response) => self.sink.emit(&Event::Completed {
					uri,
					status: response.status,
					elapsed: OffsetDateTime::now_utc() - started,
				}),
				Err(e) => self.sink.emit(&Event::Failed { uri, error: e.to_string() }),
			}

			result
		})
	}

	fn label(&self) -> &'static str {
		"events"
	}
}
impl Debug for EventInterceptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EventInterceptor").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		bridge::{MockBridge, MockRule},
		request::Params,
	};

	#[tokio::test]
	async fn events_bracket_each_send() {
		let events = Arc::new(Mutex::new(Vec::new()));
		let seen = events.clone();
		let sink = move |event: &Event| seen.lock().push(event.clone());
		let mut bridge = MockBridge::default();

		bridge.push_rule(MockRule::new().when("path", "/down").fail("refused"));

		let mut request = RequestDescriptor::new(Box::new(bridge));

		request
			.set_host("api.test")
			.set_path("/{target}")
			.push_interceptor(Arc::new(EventInterceptor::new(Arc::new(sink))), None);
		request
			.send(&Params::from([("target".to_owned(), "up".to_owned())]))
			.await
			.expect("Unmatched path should get the default response.");

		assert!(
			request.send(&Params::from([("target".to_owned(), "down".to_owned())])).await.is_err()
		);

		let events = events.lock();

		assert_eq!(events.len(), 4);
		assert_eq!(
			events[0],
			Event::Sending { method: "GET", uri: "https://api.test/up".into() }
		);
		assert!(matches!(events[1], Event::Completed { status: 200, .. }));
		assert!(matches!(&events[3], Event::Failed { error, .. } if error.contains("refused")));
	}
}
