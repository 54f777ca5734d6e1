//! Retry engine: named policies deciding whether, and how long, to wait before replaying the
//! remainder of the chain.
//!
//! A policy fires only when all of its rules pass. A retry is approved when any policy fires and
//! attempts remain; otherwise the last response or error is returned untouched.

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	auth::{Reauthenticate, TokenCache},
	chain::{InterceptFuture, Interceptor, Next},
	error::ConfigError,
	http::RawResponse,
	obs,
	request::RequestDescriptor,
};

/// Header carrying the remaining request quota.
pub const RATE_LIMIT_REMAINING: &str = "x-rate-limit-remaining";
/// Header carrying the quota reset instant in epoch seconds.
pub const RATE_LIMIT_RESET: &str = "x-rate-limit-reset";

type Rule = Arc<dyn Fn(&RetryContext) -> bool + Send + Sync>;
type DelayFn = Arc<dyn Fn(&RetryContext, &Backoff) -> StdDuration + Send + Sync>;

/// Everything a policy sees about the attempt that just finished.
#[derive(Debug)]
pub struct RetryContext<'a> {
	/// Attempts made so far, starting at 1.
	pub attempt: u32,
	/// Descriptor as it was sent.
	pub request: &'a RequestDescriptor,
	/// Response, when one arrived.
	pub response: Option<&'a RawResponse>,
	/// Error, when no response arrived.
	pub error: Option<&'a Error>,
	/// Evaluation instant.
	pub now: OffsetDateTime,
}
impl RetryContext<'_> {
	/// Response status, if any.
	pub fn status(&self) -> Option<u16> {
		self.response.map(|response| response.status)
	}
}

/// Exponential backoff with an upper bound and optional proportional jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
	/// Delay before the first retry.
	pub base: StdDuration,
	/// Upper bound for any computed delay.
	pub max: StdDuration,
	/// Fraction (0.0 to 1.0) of the delay that may be randomly shaved off.
	pub jitter: f64,
}
impl Backoff {
	/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped, then
	/// jittered.
	pub fn delay(&self, attempt: u32) -> StdDuration {
		let exp = attempt.saturating_sub(1).min(31);
		let raw = self.base.saturating_mul(1_u32 << exp).min(self.max);

		if self.jitter <= f64::EPSILON || raw.is_zero() {
			return raw;
		}

		let shave = rand::rng().random_range(0.0..=self.jitter.min(1.0));

		raw.mul_f64(1.0 - shave)
	}
}
impl Default for Backoff {
	fn default() -> Self {
		Self { base: StdDuration::from_secs(1), max: StdDuration::from_secs(30), jitter: 0.0 }
	}
}

/// Named rule set deciding whether a failed attempt is replayed.
#[derive(Clone)]
pub struct RetryPolicy {
	name: String,
	rules: Vec<Rule>,
	delay: Option<DelayFn>,
	invalidate_keys: Vec<String>,
	reauthenticate: Vec<Arc<dyn Reauthenticate>>,
}
impl RetryPolicy {
	/// Creates a policy with no rules; it fires on every attempt until rules are added.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			rules: Vec::new(),
			delay: None,
			invalidate_keys: Vec::new(),
			reauthenticate: Vec::new(),
		}
	}

	/// Built-in policy by name: `rate_limit`, `server_errors`, or `unauthorized`.
	pub fn builtin(name: &str) -> Result<Self, ConfigError> {
		match name {
			"rate_limit" => Ok(Self::rate_limit()),
			"server_errors" => Ok(Self::server_errors()),
			"unauthorized" => Ok(Self::unauthorized()),
			_ => Err(ConfigError::UnknownPolicy { name: name.to_owned() }),
		}
	}

	/// Fires on `503` with an exhausted quota and waits until the advertised reset.
	pub fn rate_limit() -> Self {
		Self::new("rate_limit")
			.rule(|ctx| ctx.response.is_some_and(is_rate_limited))
			.with_delay(|ctx, backoff| {
				ctx.response
					.and_then(|response| rate_limit_delay(response, ctx.now))
					.unwrap_or_else(|| backoff.delay(ctx.attempt))
			})
	}

	/// Fires on network failures and `5xx` answers.
	pub fn server_errors() -> Self {
		Self::new("server_errors").rule(|ctx| {
			ctx.error.is_some_and(|e| e.as_transport().is_some())
				|| ctx.status().is_some_and(|status| status >= 500)
		})
	}

	/// Fires on `401`; pair it with [`RetryPolicy::reauthenticate`] so the replay carries a new
	/// credential.
	pub fn unauthorized() -> Self {
		Self::new("unauthorized").rule(|ctx| ctx.status() == Some(401))
	}

	/// Adds a rule; every rule must pass for the policy to fire.
	pub fn rule<F>(mut self, rule: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&RetryContext) -> bool,
	{
		self.rules.push(Arc::new(rule));

		self
	}

	/// Replaces exponential backoff with a custom delay.
	pub fn with_delay<F>(mut self, delay: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&RetryContext, &Backoff) -> StdDuration,
	{
		self.delay = Some(Arc::new(delay));

		self
	}

	/// Drops the cache entry under `key` before the replay.
	pub fn invalidate(mut self, key: impl Into<String>) -> Self {
		self.invalidate_keys.push(key.into());

		self
	}

	/// Forces `handle` to re-authenticate before the replay.
	pub fn reauthenticate(mut self, handle: Arc<dyn Reauthenticate>) -> Self {
		self.reauthenticate.push(handle);

		self
	}

	/// Policy name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns `true` when every rule passes.
	pub fn fires(&self, ctx: &RetryContext) -> bool {
		self.rules.iter().all(|rule| rule(ctx))
	}

	/// Delay before the replay.
	pub fn delay(&self, ctx: &RetryContext, backoff: &Backoff) -> StdDuration {
		match &self.delay {
			Some(delay) => delay(ctx, backoff),
			None => backoff.delay(ctx.attempt),
		}
	}

	async fn prepare(
		&self,
		cache: Option<&TokenCache>,
		request: &mut RequestDescriptor,
	) -> Result<()> {
		if let Some(cache) = cache {
			for key in &self.invalidate_keys {
				cache.invalidate(key);
			}
		}
		for handle in &self.reauthenticate {
			handle.reauthenticate(request).await?;
		}

		Ok(())
	}
}
impl Debug for RetryPolicy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPolicy")
			.field("name", &self.name)
			.field("rules", &self.rules.len())
			.field("custom_delay", &self.delay.is_some())
			.field("invalidate_keys", &self.invalidate_keys)
			.field(
				"reauthenticate",
				&self.reauthenticate.iter().map(|h| h.cache_key()).collect::<Vec<_>>(),
			)
			.finish()
	}
}

/// Returns `true` for a `503` whose remaining quota is below one.
pub fn is_rate_limited(response: &RawResponse) -> bool {
	response.status == 503
		&& response
			.headers
			.get(RATE_LIMIT_REMAINING)
			.and_then(|raw| raw.trim().parse::<f64>().ok())
			.is_some_and(|remaining| remaining < 1.0)
}

/// Time left until the advertised quota reset; zero when the reset already passed.
pub fn rate_limit_delay(response: &RawResponse, now: OffsetDateTime) -> Option<StdDuration> {
	let reset = response.headers.get(RATE_LIMIT_RESET)?.trim().parse::<i64>().ok()?;
	let reset = OffsetDateTime::from_unix_timestamp(reset).ok()?;

	Some(StdDuration::try_from(reset - now).unwrap_or(StdDuration::ZERO))
}

/// Serializable retry settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Maximum replays after the initial attempt.
	pub max_retries: u32,
	/// Built-in policy names.
	pub policies: Vec<String>,
	/// Backoff base in milliseconds.
	pub base_delay_ms: u64,
	/// Backoff cap in milliseconds.
	pub max_delay_ms: u64,
	/// Backoff jitter fraction.
	pub jitter: f64,
	/// Cache keys dropped before each replay.
	pub invalidate: Vec<String>,
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: DEFAULT_MAX_RETRIES,
			policies: vec!["rate_limit".into(), "server_errors".into()],
			base_delay_ms: 1_000,
			max_delay_ms: 30_000,
			jitter: 0.0,
			invalidate: Vec::new(),
		}
	}
}

/// Default number of replays.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Interceptor replaying the remainder of the chain while a policy fires.
#[derive(Clone, Debug)]
pub struct RetryInterceptor {
	policies: Vec<RetryPolicy>,
	max_retries: u32,
	backoff: Backoff,
	cache: Option<Arc<TokenCache>>,
}
impl RetryInterceptor {
	/// Creates an engine with the given policies and the default limits.
	pub fn new(policies: Vec<RetryPolicy>) -> Self {
		Self {
			policies,
			max_retries: DEFAULT_MAX_RETRIES,
			backoff: Backoff::default(),
			cache: None,
		}
	}

	/// Builds an engine from configuration; policy invalidations act on `cache`.
	pub fn from_config(config: &RetryConfig, cache: Arc<TokenCache>) -> Result<Self, ConfigError> {
		let policies = config
			.policies
			.iter()
			.map(|name| {
				RetryPolicy::builtin(name).map(|policy| {
					config
						.invalidate
						.iter()
						.fold(policy, |policy, key| policy.invalidate(key.clone()))
				})
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self::new(policies)
			.with_max_retries(config.max_retries)
			.with_backoff(Backoff {
				base: StdDuration::from_millis(config.base_delay_ms),
				max: StdDuration::from_millis(config.max_delay_ms),
				jitter: config.jitter,
			})
			.with_cache(cache))
	}

	/// Sets the maximum number of replays.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Sets the backoff used by policies without a custom delay.
	pub fn with_backoff(mut self, backoff: Backoff) -> Self {
		self.backoff = backoff;

		self
	}

	/// Cache targeted by policy invalidations.
	pub fn with_cache(mut self, cache: Arc<TokenCache>) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Appends a policy.
	pub fn push_policy(&mut self, policy: RetryPolicy) -> &mut Self {
		self.policies.push(policy);

		self
	}

	/// Registers `handle` on every policy named `policy`; returns how many policies took it.
	pub fn reauthenticate_on(&mut self, policy: &str, handle: Arc<dyn Reauthenticate>) -> usize {
		let mut registered = 0;

		for p in self.policies.iter_mut().filter(|p| p.name == policy) {
			p.reauthenticate.push(handle.clone());

			registered += 1;
		}

		registered
	}

	/// Registered policies.
	pub fn policies(&self) -> &[RetryPolicy] {
		&self.policies
	}

	/// Maximum number of replays.
	pub fn max_retries(&self) -> u32 {
		self.max_retries
	}
}
impl Interceptor for RetryInterceptor {
	fn intercept<'a>(
		&'a self,
		request: &'a mut RequestDescriptor,
		next: Next<'a>,
	) -> InterceptFuture<'a> {
		Box::pin(async move {
			let mut attempt = 0_u32;

			loop {
				let result = next.run(request).await;

				attempt += 1;

				if attempt > self.max_retries {
					return result;
				}

				let decision = {
					let ctx = RetryContext {
						attempt,
						request: &*request,
						response: result.as_ref().ok(),
						error: result.as_ref().err(),
						now: OffsetDateTime::now_utc(),
					};

					self.policies
						.iter()
						.find(|policy| policy.fires(&ctx))
						.map(|policy| (policy, policy.delay(&ctx, &self.backoff), ctx.status()))
				};
				let Some((policy, delay, status)) = decision else {
					return result;
				};

				obs::retry_scheduled(&request.uri(), status, attempt, policy.name(), delay);
				policy.prepare(self.cache.as_deref(), request).await?;
				tokio::time::sleep(delay).await;
			}
		})
	}

	fn label(&self) -> &'static str {
		"retry"
	}
}
