//! Optional observability helpers for the request pipeline.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `conduit.send` (fields `method`, `url`) around every
//!   send, plus events for scheduled retries, token acquisitions, and logged transactions.
//! - Enable `metrics` to increment `conduit_request_total{outcome}` per send and
//!   `conduit_token_total{kind,outcome}` per token acquisition.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestOutcome {
	/// Response with a non-error status.
	Success,
	/// Response with a 4xx/5xx status.
	ErrorStatus,
	/// No response; the error propagated to the caller.
	Failure,
}
impl RequestOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestOutcome::Success => "success",
			RequestOutcome::ErrorStatus => "error_status",
			RequestOutcome::Failure => "failure",
		}
	}
}
impl Display for RequestOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each token acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenOutcome {
	/// Served from the cache.
	Hit,
	/// Freshly acquired and stored.
	Acquired,
	/// Acquisition failed.
	Failure,
}
impl TokenOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenOutcome::Hit => "hit",
			TokenOutcome::Acquired => "acquired",
			TokenOutcome::Failure => "failure",
		}
	}
}
impl Display for TokenOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
