// self
use crate::obs::{RequestOutcome, TokenOutcome};

/// Records a send outcome via the global metrics recorder (when enabled).
pub fn record_request_outcome(outcome: RequestOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("conduit_request_total", "outcome" => outcome.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = outcome;
	}
}

/// Records a token acquisition outcome for a credential kind (when enabled).
pub fn record_token_outcome(kind: &'static str, outcome: TokenOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"conduit_token_total",
			"kind" => kind,
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}
