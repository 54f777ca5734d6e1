//! Onion-ordered interceptor chain.
//!
//! The first registered interceptor is the outermost wrapper: it runs first on the way in and
//! last on the way out, so it observes the final request and response. Each interceptor receives
//! a [`Next`] handle that runs the remainder of the chain and may call it zero, one, or many
//! times.

// self
use crate::{_prelude::*, http::RawResponse, request::RequestDescriptor};

/// Boxed future returned by interceptors and the terminal transport call.
pub type InterceptFuture<'a> = Pin<Box<dyn Future<Output = Result<RawResponse>> + 'a + Send>>;

/// Cross-cutting handler wrapping the remainder of a chain.
pub trait Interceptor
where
	Self: 'static + Send + Sync,
{
	/// Handles `request`, typically delegating to `next.run(request)`.
	fn intercept<'a>(
		&'a self,
		request: &'a mut RequestDescriptor,
		next: Next<'a>,
	) -> InterceptFuture<'a>;

	/// Name used when the interceptor is registered without one.
	fn label(&self) -> &'static str {
		std::any::type_name::<Self>().rsplit("::").next().unwrap_or("interceptor")
	}
}

/// Interceptor registered on a descriptor under a name.
#[derive(Clone)]
pub struct NamedInterceptor {
	/// Registration name.
	pub name: String,
	/// Shared handler.
	pub handler: Arc<dyn Interceptor>,
}
impl Debug for NamedInterceptor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("NamedInterceptor").field(&self.name).finish()
	}
}

/// Handle to the remainder of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
	chain: &'a [NamedInterceptor],
}
impl<'a> Next<'a> {
	/// Wraps the interceptors that remain to run.
	pub fn new(chain: &'a [NamedInterceptor]) -> Self {
		Self { chain }
	}

	/// Number of interceptors left before the transport call.
	pub fn remaining(&self) -> usize {
		self.chain.len()
	}

	/// Runs the remaining interceptors and, finally, the bound bridge.
	pub fn run<'r>(self, request: &'r mut RequestDescriptor) -> InterceptFuture<'r>
	where
		'a: 'r,
	{
		match self.chain.split_first() {
			Some((first, rest)) => first.handler.intercept(request, Next { chain: rest }),
			None => request.dispatch(),
		}
	}
}
impl Debug for Next<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_list().entries(self.chain.iter().map(|i| &i.name)).finish()
	}
}

/// Interceptor that mutates the descriptor before delegating.
pub struct BeforeSend<F>(F);
impl<F> BeforeSend<F>
where
	F: 'static + Send + Sync + Fn(&mut RequestDescriptor) -> Result<()>,
{
	/// Wraps `hook`.
	pub fn new(hook: F) -> Self {
		Self(hook)
	}
}
impl<F> Interceptor for BeforeSend<F>
where
	F: 'static + Send + Sync + Fn(&mut RequestDescriptor) -> Result<()>,
{
	fn intercept<'a>(
		&'a self,
		request: &'a mut RequestDescriptor,
		next: Next<'a>,
	) -> InterceptFuture<'a> {
		Box::pin(async move {
			(self.0)(request)?;

			next.run(request).await
		})
	}

	fn label(&self) -> &'static str {
		"before_send"
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

	struct Tag(&'static str, Arc<Mutex<Vec<String>>>);
	impl Interceptor for Tag {
		fn intercept<'a>(
			&'a self,
			request: &'a mut RequestDescriptor,
			next: Next<'a>,
		) -> InterceptFuture<'a> {
			Box::pin(async move {
				self.1.lock().push(format!("in:{}", self.0));
				request.headers_mut().append("x-order", self.0);

				let result = next.run(request).await;

				self.1.lock().push(format!("out:{}", self.0));

				result
			})
		}
	}

	struct ShortCircuit;
	impl Interceptor for ShortCircuit {
		fn intercept<'a>(
			&'a self,
			_: &'a mut RequestDescriptor,
			_: Next<'a>,
		) -> InterceptFuture<'a> {
			Box::pin(async { Ok(RawResponse::new(418)) })
		}
	}

	fn descriptor() -> RequestDescriptor {
		let mut bridge = MockBridge::default();

		bridge.push_rule(
			MockRule::new()
				.when("headers.x-order", serde_json::json!(["outer", "inner"]))
				.respond(RawResponse::new(204)),
		);

		let mut descriptor = RequestDescriptor::new(Box::new(bridge));

		descriptor.set_host("api.test").set_path("/");

		descriptor
	}

	#[tokio::test]
	async fn first_registered_is_outermost() {
		let log = Arc::new(Mutex::new(Vec::new()));
		let mut descriptor = descriptor();

		descriptor
			.push_interceptor(Arc::new(Tag("outer", log.clone())), None)
			.push_interceptor(Arc::new(Tag("inner", log.clone())), Some("inner".into()));

		let response =
			descriptor.send(&Params::new()).await.expect("Chain should reach the bridge.");

		assert_eq!(response.status, 204);
		assert_eq!(*log.lock(), ["in:outer", "in:inner", "out:inner", "out:outer"]);
		assert_eq!(descriptor.interceptors()[0].name, "Tag");
		assert!(descriptor.interceptor("inner").is_some());
	}

	#[tokio::test]
	async fn short_circuit_skips_the_bridge() {
		let mut descriptor = descriptor();

		descriptor.push_interceptor(Arc::new(ShortCircuit), None);

		let response = descriptor.send(&Params::new()).await.expect("Short circuit should answer.");

		assert_eq!(response.status, 418);
		assert!(descriptor.sent_request().is_none());
	}

	#[tokio::test]
	async fn before_send_mutates_and_can_fail_fast() {
		let mut descriptor = descriptor();

		descriptor.push_interceptor(
			Arc::new(BeforeSend::new(|request: &mut RequestDescriptor| {
				request.set_method("DELETE")?;

				Ok(())
			})),
			None,
		);
		descriptor.send(&Params::new()).await.expect("Hook should pass.");

		assert_eq!(descriptor.sent_request().map(|w| w.method.as_str()), Some("DELETE"));

		let mut failing = descriptor.clone();

		failing.remove_interceptor("before_send").push_interceptor(
			Arc::new(BeforeSend::new(|request: &mut RequestDescriptor| {
				request.set_method("BREW")?;

				Ok(())
			})),
			None,
		);

		assert!(failing.send(&Params::new()).await.is_err());
	}
}
