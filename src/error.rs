//! Pipeline-level error types shared across descriptors, bridges, interceptors, and decoders.

// self
use crate::{_prelude::*, cookie::CookieError};

/// Pipeline-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;
type SharedError = Arc<dyn StdError + Send + Sync>;

/// Canonical pipeline error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Malformed caller input; raised before anything reaches the wire.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// Transport failure captured on the bridge.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body does not match the declared or inferred content type.
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// Credential acquisition failed.
	#[error(transparent)]
	AuthExchange(#[from] AuthExchangeError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Returns the captured transport failure, if this error carries one.
	pub fn as_transport(&self) -> Option<&TransportError> {
		match self {
			Self::Transport(e) => Some(e),
			_ => None,
		}
	}
}

/// Input validation failures; these always fail fast.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Method is outside the supported set.
	#[error("Method `{method}` is not supported.")]
	InvalidMethod {
		/// Raw method string supplied by the caller.
		method: String,
	},
	/// Scheme is outside the supported set.
	#[error("Scheme `{scheme}` is not supported.")]
	InvalidScheme {
		/// Raw scheme string supplied by the caller.
		scheme: String,
	},
	/// Required path placeholder has no value.
	#[error("Path parameter `{name}` is required by `{template}`.")]
	MissingParameter {
		/// Placeholder name.
		name: String,
		/// Path template containing the placeholder.
		template: String,
	},
	/// Header name or value cannot be sent on the wire.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
}

/// Transport-level failures; cloneable so the bridge can keep a copy while the caller inspects
/// another.
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure and produced no response.
	#[error("Network error occurred while calling {url}: {message}.")]
	Network {
		/// Target URL.
		url: String,
		/// Short description of the failure.
		message: String,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Server answered with a client or server error status.
	#[error("Server answered {url} with status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Target URL.
		url: String,
	},
	/// Bridge cannot speak the requested scheme.
	#[error("Scheme `{scheme}` is not supported by this bridge.")]
	UnsupportedScheme {
		/// Scheme label.
		scheme: &'static str,
	},
	/// Final URI could not be assembled.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// Raw URL string.
		url: String,
	},
	/// Cookie could not be accepted by the jar.
	#[error(transparent)]
	Cookie(#[from] CookieError),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { url: url.into(), message: src.to_string(), source: Arc::new(src) }
	}

	/// Returns the HTTP status when the failure came with a response.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Response decoding and response-struct access failures.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Body is not valid JSON.
	#[error("Response body is not valid JSON.")]
	Json(#[from] serde_json::Error),
	/// Body is not well-formed XML.
	#[error("Response body is not well-formed XML.")]
	Xml(#[from] roxmltree::Error),
	/// Offset does not address anything in the decoded content.
	#[error("Offset `{offset}` is not addressable: {reason}.")]
	InvalidOffset {
		/// Offset rendered as text.
		offset: String,
		/// Why the offset was rejected.
		reason: &'static str,
	},
	/// Value shape is incompatible with the decoder.
	#[error("Value is incompatible with the decoder; expected {expected}.")]
	Incompatible {
		/// Expected shape.
		expected: &'static str,
	},
	/// Path query could not be parsed.
	#[error("Path query `{query}` is invalid.")]
	Query {
		/// Raw query string.
		query: String,
	},
}

/// Credential acquisition failures.
#[derive(Debug, ThisError)]
pub enum AuthExchangeError {
	/// Authorization server rejected the grant.
	#[error("Authorization server rejected the grant: {error}.")]
	Rejected {
		/// OAuth error code.
		error: String,
		/// Optional human-readable description.
		description: Option<String>,
	},
	/// Authorization server returned an unexpected response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	Endpoint {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON.
	#[error("Token endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Network failure while calling the token endpoint.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Custom token source failed.
	#[error("Token source failed: {message}.")]
	Source {
		/// Message supplied by the token source.
		message: String,
	},
}
impl AuthExchangeError {
	/// Wraps a network failure raised while talking to a token endpoint.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for AuthExchangeError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Configuration failures raised while assembling services and transports.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL cannot be parsed.
	#[error("Configured URL `{url}` is invalid.")]
	InvalidUrl {
		/// Raw URL string.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Service configuration document is malformed.
	#[error("Service configuration is malformed.")]
	Parse(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Operation name is not registered on the service.
	#[error("Operation `{name}` is not registered.")]
	UnknownOperation {
		/// Requested operation name.
		name: String,
	},
	/// Retry policy name is not built in.
	#[error("Retry policy `{name}` is unknown.")]
	UnknownPolicy {
		/// Requested policy name.
		name: String,
	},
	/// Interceptor configuration is missing a required field.
	#[error("Interceptor `{interceptor}` requires `{field}`.")]
	MissingField {
		/// Interceptor kind.
		interceptor: &'static str,
		/// Missing field name.
		field: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_url(url: &str, source: url::ParseError) -> Self {
		Self::InvalidUrl { url: url.to_owned(), source }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
