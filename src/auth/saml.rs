//! SAML 2.0 bearer-assertion exchange (RFC 7522).

// crates.io
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{AcquiredToken, CachedToken, TokenFuture, TokenSecret, TokenSource},
	error::AuthExchangeError,
};

const SAML2_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:saml2-bearer";

/// SAML exchange configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamlConfig {
	/// Token endpoint accepting the saml2-bearer grant.
	pub access_token_url: String,
	/// Raw assertion XML issued by the identity provider.
	pub assertion: TokenSecret,
	/// Client identifier, when the endpoint requires one.
	#[serde(default)]
	pub client_id: Option<String>,
	/// Client secret, when the endpoint requires one.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Requested scopes.
	#[serde(default)]
	pub scopes: Vec<String>,
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenEndpointError {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

/// Token source trading a SAML assertion for an access token.
#[derive(Debug)]
pub struct SamlSource {
	config: SamlConfig,
	http: ReqwestClient,
}
impl SamlSource {
	/// Builds a source that posts to the token endpoint with `http`.
	pub fn new(config: SamlConfig, http: ReqwestClient) -> Self {
		Self { config, http }
	}

	/// Configuration.
	pub fn config(&self) -> &SamlConfig {
		&self.config
	}

	fn form(&self) -> Vec<(&'static str, String)> {
		let mut form = vec![
			("grant_type", SAML2_BEARER_GRANT.to_owned()),
			("assertion", BASE64_URL_SAFE_NO_PAD.encode(self.config.assertion.expose())),
		];

		if let Some(client_id) = &self.config.client_id {
			form.push(("client_id", client_id.clone()));
		}
		if let Some(secret) = &self.config.client_secret {
			form.push(("client_secret", secret.expose().to_owned()));
		}
		if !self.config.scopes.is_empty() {
			form.push(("scope", self.config.scopes.join(" ")));
		}

		form
	}

	async fn exchange(&self) -> Result<AcquiredToken, AuthExchangeError> {
		let response = self
			.http
			.post(&self.config.access_token_url)
			.header("accept", "application/json")
			.form(&self.form())
			.send()
			.await?;
		let status = response.status().as_u16();
		let bytes = response.bytes().await?;

		if status >= 400 {
			return Err(match serde_json::from_slice::<TokenEndpointError>(&bytes) {
				Ok(err) => AuthExchangeError::Rejected {
					error: err.error,
					description: err.error_description,
				},
				Err(_) => AuthExchangeError::Endpoint {
					message: String::from_utf8_lossy(&bytes).into_owned(),
					status: Some(status),
				},
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
		let parsed: TokenEndpointResponse = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| AuthExchangeError::Parse { source, status: Some(status) })?;
		let mut token = AcquiredToken::new(TokenSecret::new(parsed.access_token));

		token.refresh_token = parsed.refresh_token.map(TokenSecret::new);
		token.expires_in = parsed.expires_in.map(Duration::seconds);

		Ok(token)
	}
}
impl TokenSource for SamlSource {
	fn kind(&self) -> &'static str {
		"saml"
	}

	fn identity(&self) -> String {
		format!(
			"{}|{}|{}",
			self.config.access_token_url,
			self.config.client_id.as_deref().unwrap_or_default(),
			self.config.assertion.expose()
		)
	}

	fn acquire<'a>(&'a self, _: Option<&'a CachedToken>) -> TokenFuture<'a> {
		Box::pin(self.exchange())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn form_carries_encoded_assertion() {
		let source = SamlSource::new(
			SamlConfig {
				access_token_url: "https://idp.test/token".into(),
				assertion: TokenSecret::new("<saml:Assertion/>"),
				client_id: Some("client".into()),
				client_secret: None,
				scopes: vec!["api".into()],
			},
			ReqwestClient::new(),
		);
		let form = source.form().into_iter().collect::<HashMap<_, _>>();

		assert_eq!(form["grant_type"], SAML2_BEARER_GRANT);
		assert_eq!(form["assertion"], BASE64_URL_SAFE_NO_PAD.encode("<saml:Assertion/>"));
		assert_eq!(form["client_id"], "client");
		assert_eq!(form["scope"], "api");
		assert!(!form.contains_key("client_secret"));
	}
}
