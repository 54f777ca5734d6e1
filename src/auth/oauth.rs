//! OAuth 2.0 token source built on the `oauth2` crate.
//!
//! Supports the client-credentials, password, authorization-code (optionally with PKCE), and
//! refresh-token grants. When the previous cache entry carries a refresh secret, the refresh
//! grant is tried first and the configured grant is used as the fallback.

// crates.io
use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use oauth2::{
	AuthType, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError,
	ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{AcquiredToken, CachedToken, TokenFuture, TokenSecret, TokenSource},
	error::{AuthExchangeError, ConfigError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpHandle},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Grant used when no refresh secret is available.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum OAuth2Grant {
	/// Client-credentials grant.
	ClientCredentials,
	/// Resource-owner password grant.
	Password {
		/// Resource owner username.
		username: String,
		/// Resource owner password.
		password: TokenSecret,
	},
	/// Authorization-code grant; the code is obtained out of band.
	AuthorizationCode {
		/// Authorization code.
		code: TokenSecret,
		/// Redirect URI registered for the client.
		#[serde(default)]
		redirect_uri: Option<String>,
		/// PKCE verifier matching the challenge sent to the authorization endpoint.
		#[serde(default)]
		pkce_verifier: Option<TokenSecret>,
	},
	/// Refresh-token grant with a pre-issued refresh secret.
	RefreshToken {
		/// Refresh secret.
		refresh_token: TokenSecret,
	},
}
impl OAuth2Grant {
	/// Returns a stable label for the grant.
	pub const fn as_str(&self) -> &'static str {
		match self {
			OAuth2Grant::ClientCredentials => "client_credentials",
			OAuth2Grant::Password { .. } => "password",
			OAuth2Grant::AuthorizationCode { .. } => "authorization_code",
			OAuth2Grant::RefreshToken { .. } => "refresh_token",
		}
	}
}

/// OAuth 2.0 client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Config {
	/// Client identifier.
	pub client_id: String,
	/// Client secret; public clients omit it.
	#[serde(default)]
	pub client_secret: Option<TokenSecret>,
	/// Token endpoint.
	pub access_token_url: String,
	/// Authorization endpoint, used to build authorization-code redirects.
	#[serde(default)]
	pub authorization_url: Option<String>,
	/// Requested scopes.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Send client credentials in the request body instead of a Basic header.
	#[serde(default)]
	pub auth_in_body: bool,
	/// Primary grant.
	#[serde(flatten)]
	pub grant: OAuth2Grant,
}

/// Token source performing OAuth 2.0 exchanges against a token endpoint.
pub struct OAuth2Source {
	config: OAuth2Config,
	client: ConfiguredBasicClient,
	http: ReqwestClient,
}
impl OAuth2Source {
	/// Builds a source that talks to the token endpoint with `http`.
	///
	/// `http` should not follow redirects; token endpoints answer directly.
	pub fn new(config: OAuth2Config, http: ReqwestClient) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(config.access_token_url.clone())
			.map_err(|source| ConfigError::invalid_url(&config.access_token_url, source))?;
		let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_token_uri(token_url);

		if let Some(secret) = &config.client_secret {
			client = client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}
		if config.auth_in_body {
			client = client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { config, client, http })
	}

	/// Builds a source with a default non-redirecting reqwest client.
	pub fn with_default_client(config: OAuth2Config) -> Result<Self, ConfigError> {
		let http =
			ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Self::new(config, http)
	}

	/// Configuration.
	pub fn config(&self) -> &OAuth2Config {
		&self.config
	}

	/// Authorization-endpoint URL the resource owner should visit for the authorization-code
	/// grant; includes an S256 PKCE challenge when the grant carries a verifier.
	pub fn authorize_url(&self, state: &str) -> Result<Url, ConfigError> {
		let raw = self
			.config
			.authorization_url
			.as_deref()
			.ok_or(ConfigError::MissingField {
				interceptor: "oauth2",
				field: "authorization_url",
			})?;
		let mut url = Url::parse(raw).map_err(|source| ConfigError::invalid_url(raw, source))?;

		{
			let mut query = url.query_pairs_mut();

			query
				.append_pair("response_type", "code")
				.append_pair("client_id", &self.config.client_id)
				.append_pair("state", state);

			if !self.config.scopes.is_empty() {
				query.append_pair("scope", &self.config.scopes.join(" "));
			}
			if let OAuth2Grant::AuthorizationCode { redirect_uri, pkce_verifier, .. } =
				&self.config.grant
			{
				if let Some(redirect) = redirect_uri {
					query.append_pair("redirect_uri", redirect);
				}
				if let Some(verifier) = pkce_verifier {
					query
						.append_pair("code_challenge", &pkce_challenge(verifier.expose()))
						.append_pair("code_challenge_method", "S256");
				}
			}
		}

		Ok(url)
	}

	async fn exchange(&self, grant: &OAuth2Grant) -> Result<AcquiredToken, AuthExchangeError> {
		let meta = ResponseMetadataSlot::default();
		let handle = TokenHttpHandle::new(self.http.clone(), meta.clone());
		let scopes = self.config.scopes.iter().map(|s| Scope::new(s.clone()));
		let response = match grant {
			OAuth2Grant::ClientCredentials =>
				self.client
					.exchange_client_credentials()
					.add_scopes(scopes)
					.request_async(&handle)
					.await,
			OAuth2Grant::Password { username, password } => {
				let username = ResourceOwnerUsername::new(username.clone());
				let password = ResourceOwnerPassword::new(password.expose().to_owned());

				self.client
					.exchange_password(&username, &password)
					.add_scopes(scopes)
					.request_async(&handle)
					.await
			},
			OAuth2Grant::AuthorizationCode { code, redirect_uri, pkce_verifier } => {
				let mut request =
					self.client.exchange_code(AuthorizationCode::new(code.expose().to_owned()));

				if let Some(verifier) = pkce_verifier {
					request = request
						.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_owned()));
				}
				if let Some(redirect) = redirect_uri {
					let redirect = RedirectUrl::new(redirect.clone())
						.map_err(|e| AuthExchangeError::Source { message: e.to_string() })?;

					request = request.set_redirect_uri(std::borrow::Cow::Owned(redirect));
				}
				if !self.config.scopes.is_empty() {
					request = request.add_extra_param("scope", self.config.scopes.join(" "));
				}

				request.request_async(&handle).await
			},
			OAuth2Grant::RefreshToken { refresh_token } => {
				let refresh = RefreshToken::new(refresh_token.expose().to_owned());

				self.client
					.exchange_refresh_token(&refresh)
					.add_scopes(scopes)
					.request_async(&handle)
					.await
			},
		};

		response.map(map_token_response).map_err(|err| map_request_error(meta.take(), err))
	}
}
impl TokenSource for OAuth2Source {
	fn kind(&self) -> &'static str {
		"oauth2"
	}

	fn identity(&self) -> String {
		format!(
			"{}|{}|{}|{}|{}",
			self.config.access_token_url,
			self.config.client_id,
			self.config.client_secret.as_ref().map(TokenSecret::expose).unwrap_or_default(),
			self.config.grant.as_str(),
			self.config.scopes.join(" ")
		)
	}

	fn acquire<'a>(&'a self, previous: Option<&'a CachedToken>) -> TokenFuture<'a> {
		Box::pin(async move {
			if let Some(refresh_token) = previous.and_then(|p| p.refresh_token.clone()) {
				let refreshed = self
					.exchange(&OAuth2Grant::RefreshToken { refresh_token: refresh_token.clone() })
					.await;

				match refreshed {
					// Issuers that do not rotate refresh secrets keep the old one valid.
					Ok(mut token) => {
						token.refresh_token.get_or_insert(refresh_token);

						return Ok(token);
					},
					Err(e) if matches!(self.config.grant, OAuth2Grant::RefreshToken { .. }) =>
						return Err(e),
					Err(_) => {},
				}
			}

			self.exchange(&self.config.grant).await
		})
	}
}
impl Debug for OAuth2Source {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Source")
			.field("client_id", &self.config.client_id)
			.field("access_token_url", &self.config.access_token_url)
			.field("grant", &self.config.grant.as_str())
			.finish_non_exhaustive()
	}
}

/// Derives the S256 PKCE challenge for `verifier`.
pub fn pkce_challenge(verifier: &str) -> String {
	BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn map_token_response(response: BasicTokenResponse) -> AcquiredToken {
	let mut token =
		AcquiredToken::new(TokenSecret::new(response.access_token().secret().to_owned()));

	token.refresh_token =
		response.refresh_token().map(|refresh| TokenSecret::new(refresh.secret().to_owned()));
	token.expires_in = response
		.expires_in()
		.and_then(|ttl| i64::try_from(ttl.as_secs()).ok())
		.map(Duration::seconds);

	token
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> AuthExchangeError {
	let status = meta.and_then(|meta| meta.status);

	match err {
		RequestTokenError::ServerResponse(response) => AuthExchangeError::Rejected {
			error: response.error().as_ref().to_string(),
			description: response.error_description().cloned(),
		},
		RequestTokenError::Request(HttpClientError::Reqwest(inner)) =>
			AuthExchangeError::network(*inner),
		RequestTokenError::Request(other) =>
			AuthExchangeError::Endpoint { message: other.to_string(), status },
		RequestTokenError::Parse(source, _body) => AuthExchangeError::Parse { source, status },
		RequestTokenError::Other(message) => AuthExchangeError::Endpoint { message, status },
	}
}
