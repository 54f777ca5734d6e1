// std
use std::{
	sync::atomic::{AtomicUsize, Ordering},
	time::Duration as StdDuration,
};
// self
use conduit::{
	_preludet::*,
	auth::{AcquiredToken, AuthInterceptor, AuthScheme, FnTokenSource, TokenCache, TokenSecret},
	bridge::{MockBridge, MockRule},
	chain::Interceptor,
	http::RawResponse,
	request::Params,
	retry::{Backoff, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RetryInterceptor, RetryPolicy},
};

fn immediate() -> Backoff {
	Backoff { base: StdDuration::ZERO, max: StdDuration::ZERO, jitter: 0.0 }
}

#[tokio::test]
async fn retry_makes_exactly_k_plus_one_attempts() {
	let engine = RetryInterceptor::new(vec![RetryPolicy::server_errors()])
		.with_max_retries(2)
		.with_backoff(immediate());
	let mut descriptor = with_interceptors(
		mock_descriptor("api.test", vec![MockRule::new().respond(RawResponse::new(503))]),
		vec![Arc::new(engine) as Arc<dyn Interceptor>],
	);
	let response = descriptor.send(&Params::new()).await.expect("Final 503 is still a response.");

	assert_eq!(response.status, 503);
	assert_eq!(descriptor.bridge_as::<MockBridge>().map(|b| b.ledger().len()), Some(3));
}

#[tokio::test]
async fn network_failures_surface_after_the_last_attempt() {
	let engine = RetryInterceptor::new(vec![RetryPolicy::server_errors()])
		.with_max_retries(1)
		.with_backoff(immediate());
	let mut descriptor = with_interceptors(
		mock_descriptor("api.test", vec![MockRule::new().fail("connection reset")]),
		vec![Arc::new(engine) as Arc<dyn Interceptor>],
	);
	let err = descriptor.send(&Params::new()).await.expect_err("Every attempt fails.");

	assert!(matches!(err, Error::Transport(_)));
	assert_eq!(descriptor.bridge_as::<MockBridge>().map(|b| b.ledger().len()), Some(2));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_until_the_advertised_reset() {
	let reset = OffsetDateTime::now_utc().unix_timestamp() + 30;
	let limited = RawResponse::new(503)
		.with_header(RATE_LIMIT_REMAINING, "0")
		.with_header(RATE_LIMIT_RESET, reset.to_string());
	let engine = RetryInterceptor::new(vec![RetryPolicy::rate_limit()]).with_max_retries(1);
	let mut descriptor = with_interceptors(
		mock_descriptor("api.test", vec![MockRule::new().respond(limited).times(1)]),
		vec![Arc::new(engine) as Arc<dyn Interceptor>],
	);
	let started = tokio::time::Instant::now();
	let response = descriptor.send(&Params::new()).await.expect("Replay should succeed.");
	let waited = started.elapsed();

	assert_eq!(response.status, 200);
	assert!(waited >= StdDuration::from_secs(28), "Waited {waited:?}.");
	assert!(waited <= StdDuration::from_secs(30), "Waited {waited:?}.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_share_one_acquisition() {
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = calls.clone();
	let source = FnTokenSource::new("bearer", "shared", move |_| {
		counter.fetch_add(1, Ordering::SeqCst);

		async {
			tokio::time::sleep(StdDuration::from_millis(50)).await;

			Ok(AcquiredToken::new(TokenSecret::new("once")))
		}
	});
	let cache = Arc::new(TokenCache::new());
	let auth = AuthInterceptor::new(source, AuthScheme::Bearer, cache.clone());
	let template = with_interceptors(
		mock_descriptor(
			"api.test",
			vec![
				MockRule::new()
					.when("headers.authorization", "Bearer once")
					.respond(RawResponse::new(200)),
			],
		),
		vec![Arc::new(auth) as Arc<dyn Interceptor>],
	);
	let mut tasks = Vec::new();

	for _ in 0..8 {
		let mut descriptor = template.clone();

		tasks.push(tokio::spawn(async move {
			descriptor.send(&Params::new()).await.map(|r| r.status)
		}));
	}
	for task in tasks {
		let status = task.await.expect("Task should join.").expect("Send should succeed.");

		assert_eq!(status, 200);
	}

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(cache.len(), 1);
}
