/// OIDC Identity Provider Client
///
/// Discovers the provider from its issuer URL, builds PKCE authorization
/// URLs, exchanges authorization codes and verifies the returned ID token.
/// Every network call runs inside the caller's future; dropping that future
/// aborts the call. Nothing here retries.
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header, jwk::JwkSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use super::config::OidcConfig;
use super::error::AuthError;
use super::pkce::{CODE_CHALLENGE_METHOD, code_challenge, generate_code_verifier};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Label used when the provider returned no usable identity claim
pub const FALLBACK_DISPLAY_NAME: &str = "user";

/// Longest token lifetime accepted from a provider (ten years)
const MAX_EXPIRES_IN: i64 = 10 * 365 * 24 * 60 * 60;

/// Provider metadata from the discovery document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

/// Authorization redirect plus the verifier the caller must keep
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub code_verifier: String,
}

/// Result of a successful code exchange
///
/// Claim fields are empty when the provider returned no ID token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OidcTokenPayload {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expiry: Option<DateTime<Utc>>,
    pub subject: String,
    pub email: String,
    pub name: String,
}

impl fmt::Debug for OidcTokenPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcTokenPayload")
            .field("token_type", &self.token_type)
            .field("expiry", &self.expiry)
            .field("subject", &self.subject)
            .field("email", &self.email)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl OidcTokenPayload {
    /// Best label for the session: email, then name, then subject.
    pub fn display_name(&self) -> &str {
        [&self.email, &self.name, &self.subject]
            .into_iter()
            .find(|value| !value.is_empty())
            .map(String::as_str)
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }
}

/// Token endpoint request (authorization_code grant with PKCE)
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    code_verifier: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Identity claims read from a verified ID token
#[derive(Debug, Clone, Default, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Client for one discovered OIDC provider
pub struct OidcClient {
    config: OidcConfig,
    metadata: ProviderMetadata,
    http_client: reqwest::Client,
}

impl fmt::Debug for OidcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcClient")
            .field("issuer", &self.metadata.issuer)
            .field("client_id", &self.config.client_id)
            .finish_non_exhaustive()
    }
}

impl OidcClient {
    /// Validate `config` and fetch the provider's discovery document
    pub async fn discover(config: OidcConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let issuer = config.issuer_url.trim_end_matches('/');
        let discovery_url = format!("{}{}", issuer, DISCOVERY_PATH);

        let response = http_client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| AuthError::DiscoveryFailed(format!("request to {} failed: {}", discovery_url, e)))?;

        if !response.status().is_success() {
            return Err(AuthError::DiscoveryFailed(format!(
                "{} returned status {}",
                discovery_url,
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response.json().await.map_err(|e| {
            AuthError::DiscoveryFailed(format!("Failed to parse discovery document: {}", e))
        })?;

        if metadata.issuer.trim_end_matches('/') != issuer {
            return Err(AuthError::DiscoveryFailed(format!(
                "issuer mismatch: configured {}, provider reports {}",
                issuer, metadata.issuer
            )));
        }

        if !metadata.code_challenge_methods_supported.is_empty()
            && !metadata
                .code_challenge_methods_supported
                .iter()
                .any(|m| m == CODE_CHALLENGE_METHOD)
        {
            warn!(
                "Provider {} does not advertise S256 PKCE support",
                metadata.issuer
            );
        }

        info!("Discovered OIDC provider {}", metadata.issuer);

        Ok(Self {
            config,
            metadata,
            http_client,
        })
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    /// Build the authorization redirect for `state` with a fresh PKCE verifier
    pub fn authorization_url(&self, state: &str) -> Result<AuthorizationRequest, AuthError> {
        let code_verifier = generate_code_verifier();
        let url = self.authorization_url_with_verifier(state, &code_verifier)?;

        Ok(AuthorizationRequest { url, code_verifier })
    }

    fn authorization_url_with_verifier(
        &self,
        state: &str,
        code_verifier: &str,
    ) -> Result<String, AuthError> {
        let mut url = url::Url::parse(&self.metadata.authorization_endpoint)
            .map_err(|e| AuthError::ConfigError(format!("Invalid authorization endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("code_challenge", &code_challenge(code_verifier))
            .append_pair("code_challenge_method", CODE_CHALLENGE_METHOD);

        Ok(url.to_string())
    }

    /// Trade an authorization code and its PKCE verifier for tokens
    pub async fn exchange(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<OidcTokenPayload, AuthError> {
        let request = TokenRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.config.redirect_url,
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            code_verifier,
        };

        let response = self
            .http_client
            .post(&self.metadata.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&request)
            .send()
            .await
            .map_err(|e| exchange_transport_error(e, "Token request failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => body,
            };
            return Err(AuthError::CodeExchangeFailed(format!(
                "token endpoint returned status {}: {}",
                status, reason
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| exchange_transport_error(e, "Failed to parse token response"))?;

        let claims = match tokens.id_token.as_deref() {
            Some(id_token) if !id_token.is_empty() => self.verify_id_token(id_token).await?,
            _ => {
                debug!("Token response carried no ID token");
                IdTokenClaims::default()
            }
        };

        let expiry = tokens
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs.min(MAX_EXPIRES_IN)));

        Ok(OidcTokenPayload {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.filter(|t| !t.is_empty()),
            token_type: tokens.token_type,
            expiry,
            subject: claims.sub,
            email: claims.email.unwrap_or_default(),
            name: claims.name.unwrap_or_default(),
        })
    }

    /// Verify signature, issuer, audience and expiry of an ID token
    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, AuthError> {
        let header = decode_header(id_token).map_err(|e| {
            AuthError::IdTokenVerificationFailed(format!("Failed to decode ID token header: {}", e))
        })?;

        let decoding_key = self.decoding_key(&header).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_issuer(&[&self.metadata.issuer]);

        let token_data = decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| AuthError::IdTokenVerificationFailed(format!("ID token validation failed: {}", e)))?;

        Ok(token_data.claims)
    }

    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey, AuthError> {
        // OIDC Core 10.1: symmetric ID tokens are keyed with the client secret
        if matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Ok(DecodingKey::from_secret(
                self.config.client_secret.as_bytes(),
            ));
        }

        let jwks_uri = self.metadata.jwks_uri.as_deref().ok_or_else(|| {
            AuthError::IdTokenVerificationFailed("provider publishes no jwks_uri".to_string())
        })?;

        let response = self
            .http_client
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| verification_transport_error(e, "Failed to fetch JWKS"))?;

        if !response.status().is_success() {
            return Err(AuthError::IdTokenVerificationFailed(format!(
                "JWKS request failed with status {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| verification_transport_error(e, "Failed to parse JWKS"))?;

        let jwk = match header.kid.as_deref() {
            Some(kid) => jwks.find(kid).ok_or_else(|| {
                AuthError::IdTokenVerificationFailed(format!("Key ID {} not found in JWKS", kid))
            })?,
            None if jwks.keys.len() == 1 => &jwks.keys[0],
            None => {
                return Err(AuthError::IdTokenVerificationFailed(
                    "ID token missing key ID (kid)".to_string(),
                ));
            }
        };

        DecodingKey::from_jwk(jwk).map_err(|e| {
            AuthError::IdTokenVerificationFailed(format!("Failed to create decoding key: {}", e))
        })
    }
}

fn exchange_transport_error(err: reqwest::Error, context: &str) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::CodeExchangeFailed(format!("{}: {}", context, err))
    }
}

fn verification_transport_error(err: reqwest::Error, context: &str) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::IdTokenVerificationFailed(format!("{}: {}", context, err))
    }
}
