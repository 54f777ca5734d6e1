//! Serializable service configuration.

// self
use crate::{
	_prelude::*,
	auth::{
		AuthInterceptor, AuthScheme, OAuth2Config, Placement, SamlConfig, TokenCache, TokenSecret,
		TokenSource,
	},
	bridge::TransportConfig,
	error::ConfigError,
	request::Params,
	retry::RetryConfig,
	service::OperationConfig,
};

/// Top-level service document.
///
/// ```json
/// {
///   "scheme": "https",
///   "host": "api.example.com",
///   "interceptors": [{ "kind": "bearer", "token": "t0k3n" }, { "kind": "retry" }],
///   "operations": { "get_user": { "method": "GET", "path": "/users/{id}" } }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
	/// URI scheme applied to every operation.
	pub scheme: String,
	/// Host (with optional port) applied to every operation.
	pub host: String,
	/// Headers applied to every operation; operation headers win.
	pub headers: BTreeMap<String, String>,
	/// Propagate decode failures instead of substituting error content.
	pub strict: bool,
	/// Transport options.
	pub transport: TransportConfig,
	/// Interceptors in registration order; the first is the outermost.
	pub interceptors: Vec<InterceptorConfig>,
	/// Operations by logical name.
	pub operations: BTreeMap<String, OperationConfig>,
}
impl ServiceConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);

		Ok(serde_path_to_error::deserialize(de)?)
	}

	/// Parses an already-decoded JSON value.
	pub fn from_value(value: Value) -> Result<Self, ConfigError> {
		Ok(serde_path_to_error::deserialize(value)?)
	}
}
impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			scheme: "https".into(),
			host: String::new(),
			headers: BTreeMap::new(),
			strict: false,
			transport: TransportConfig::default(),
			interceptors: Vec::new(),
			operations: BTreeMap::new(),
		}
	}
}

/// One configured interceptor, tagged by `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterceptorConfig {
	/// Basic credentials encoded locally.
	Basic {
		/// Username.
		username: String,
		/// Password.
		password: TokenSecret,
		/// Shared credential options.
		#[serde(flatten)]
		auth: AuthOptions,
	},
	/// Pre-issued bearer token.
	Bearer {
		/// Token value.
		token: TokenSecret,
		/// Lifetime in seconds, when known.
		#[serde(default)]
		expires_in_secs: Option<i64>,
		/// Shared credential options.
		#[serde(flatten)]
		auth: AuthOptions,
	},
	/// OAuth 2.0 token exchange.
	Oauth2 {
		/// Client and grant settings.
		#[serde(flatten)]
		config: OAuth2Config,
		/// Shared credential options.
		#[serde(flatten)]
		auth: AuthOptions,
	},
	/// SAML assertion exchange.
	Saml {
		/// Assertion and endpoint settings.
		#[serde(flatten)]
		config: SamlConfig,
		/// Shared credential options.
		#[serde(flatten)]
		auth: AuthOptions,
	},
	/// Session login through another operation of the same service.
	Session {
		/// Operation sent to log in.
		login: String,
		/// Cookie carrying the session token.
		cookie_name: String,
		/// Path parameters for the login operation.
		#[serde(default)]
		params: Params,
		/// Shared credential options.
		#[serde(flatten)]
		auth: AuthOptions,
	},
	/// Retry engine.
	Retry(RetryConfig),
	/// Transaction logging into the service log.
	Logging {
		/// Keep records in memory from the start.
		#[serde(default)]
		enabled: bool,
		/// Log-line template.
		#[serde(default)]
		format: Option<String>,
		/// Body truncation limit in bytes.
		#[serde(default)]
		truncate: Option<usize>,
	},
	/// Transaction archival into the service archive.
	Archive,
}
impl InterceptorConfig {
	/// The `kind` tag.
	pub const fn kind(&self) -> &'static str {
		match self {
			InterceptorConfig::Basic { .. } => "basic",
			InterceptorConfig::Bearer { .. } => "bearer",
			InterceptorConfig::Oauth2 { .. } => "oauth2",
			InterceptorConfig::Saml { .. } => "saml",
			InterceptorConfig::Session { .. } => "session",
			InterceptorConfig::Retry(_) => "retry",
			InterceptorConfig::Logging { .. } => "logging",
			InterceptorConfig::Archive => "archive",
		}
	}
}

/// Options every credential interceptor accepts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
	/// Cache key override; derived from the credentials when absent.
	pub cache_key: Option<String>,
	/// Scheme override.
	pub scheme: Option<AuthScheme>,
	/// Expiry safety margin in seconds.
	pub margin_secs: Option<i64>,
	/// Inject the credential as this cookie instead of the `Authorization` header.
	pub cookie: Option<String>,
	/// Re-acquire and replay once on `401`.
	pub reauth_on_unauthorized: bool,
}
impl AuthOptions {
	pub(crate) fn apply<S>(
		&self,
		default_scheme: AuthScheme,
		source: S,
		cache: Arc<TokenCache>,
	) -> AuthInterceptor<S>
	where
		S: TokenSource,
	{
		let mut interceptor =
			AuthInterceptor::new(source, self.scheme.unwrap_or(default_scheme), cache)
				.with_reauth_on_unauthorized(self.reauth_on_unauthorized);

		if let Some(key) = &self.cache_key {
			interceptor = interceptor.with_cache_key(key.clone());
		}
		if let Some(secs) = self.margin_secs {
			interceptor = interceptor.with_margin(Duration::seconds(secs));
		}
		if let Some(cookie) = &self.cookie {
			interceptor = interceptor.with_placement(Placement::Cookie(cookie.clone()));
		}

		interceptor
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::auth::OAuth2Grant;

	#[test]
	fn interceptors_parse_by_kind() {
		let config = ServiceConfig::from_value(json!({
			"host": "api.test",
			"interceptors": [
				{
					"kind": "oauth2",
					"client_id": "cli",
					"access_token_url": "https://idp.test/token",
				  	"grant_type": "password",
				  	"username": "ada",
				  	"password": "pw",
				  	"cache_key": "svc"
				  },
				{ "kind": "retry", "max_retries": 5, "policies": ["unauthorized"] },
				{ "kind": "logging", "enabled": true, "truncate": 64 },
				{ "kind": "archive" }
			]
		}))
		.expect("Configuration should parse.");

		assert_eq!(config.scheme, "https");

		let InterceptorConfig::Oauth2 { config: oauth, auth } = &config.interceptors[0] else {
			panic!("First interceptor should be oauth2.");
		};

		assert!(matches!(
			&oauth.grant,
			OAuth2Grant::Password { username, .. } if username == "ada"
		));
		assert_eq!(auth.cache_key.as_deref(), Some("svc"));
		assert!(matches!(
			&config.interceptors[1],
			InterceptorConfig::Retry(retry) if retry.max_retries == 5
		));
		assert_eq!(
			config.interceptors.iter().map(InterceptorConfig::kind).collect::<Vec<_>>(),
			["oauth2", "retry", "logging", "archive"]
		);
	}

	#[test]
	fn parse_errors_carry_the_field_path() {
		let err = ServiceConfig::from_json(r#"{"operations":{"get":{"method":7}}}"#)
			.expect_err("A numeric method should be rejected.");
		let ConfigError::Parse(inner) = err else {
			panic!("Parse failures should map to ConfigError::Parse.");
		};

		assert_eq!(inner.path().to_string(), "operations.get.method");
	}
}
