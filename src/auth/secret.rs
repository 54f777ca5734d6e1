//! Credential redaction: the `TokenSecret` wrapper and header scrubbing for recorded requests.

// self
use crate::_prelude::*;

/// Placeholder written wherever a credential would have been printed.
pub const REDACTED: &str = "<redacted>";

/// Header names whose values are scrubbed from request snapshots.
pub const CREDENTIAL_HEADERS: &[&str] = &["authorization", "proxy-authorization"];

/// Password, token, or assertion that never reaches `Debug`/`Display` output.
///
/// Serializes as the plain string so it can sit inside service configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps `value`.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw credential; only header and form builders should call this.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when nothing was configured.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for TokenSecret {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret({REDACTED})")
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}

/// Replaces credential header values in a snapshot `headers` object; returns how many were hit.
pub fn redact_headers(headers: &mut serde_json::Map<String, Value>) -> usize {
	let mut redacted = 0;

	for name in CREDENTIAL_HEADERS {
		if let Some(value) = headers.get_mut(*name) {
			*value = Value::String(REDACTED.into());
			redacted += 1;
		}
	}

	redacted
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn formatting_never_leaks_the_secret() {
		let secret = TokenSecret::from("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(<redacted>)");
		assert_eq!(secret.to_string(), REDACTED);
	}

	#[test]
	fn config_strings_become_secrets() {
		let secret = serde_json::from_str::<TokenSecret>("\"p@ss\"")
			.expect("Secrets should deserialize from JSON strings.");

		assert_eq!(secret.expose(), "p@ss");
		assert!(!secret.is_empty());
	}

	#[test]
	fn only_credential_headers_are_scrubbed() {
		let mut headers = json!({
			"authorization": "Bearer t",
			"proxy-authorization": "Basic x",
			"accept": "application/json"
		});
		let map = headers.as_object_mut().expect("Fixture is an object.");

		assert_eq!(redact_headers(map), 2);
		assert_eq!(headers["authorization"], REDACTED);
		assert_eq!(headers["accept"], "application/json");
	}
}
