//! Authenticator implementation
//!
//! Applies Google bearer tokens to requests and manages token refresh.

use super::types::{CachedToken, GoogleCredentials, ServiceAccountKey, BIGQUERY_SCOPE};
use crate::error::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifetime requested for service-account assertions
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Authenticator for Google APIs
pub struct GoogleAuthenticator {
    /// Credential source
    credentials: GoogleCredentials,
    /// Cached access token for service accounts
    cached_token: Arc<RwLock<Option<CachedToken>>>,
    /// HTTP client for token requests
    http_client: Client,
}

impl std::fmt::Debug for GoogleAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAuthenticator")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl GoogleAuthenticator {
    /// Create a new authenticator with the given credentials
    pub fn new(credentials: GoogleCredentials) -> Self {
        Self::with_client(credentials, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(credentials: GoogleCredentials, http_client: Client) -> Self {
        Self {
            credentials,
            cached_token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Resolve credentials from the environment
    ///
    /// `GOOGLE_OAUTH_ACCESS_TOKEN` wins; otherwise the service-account key
    /// named by `GOOGLE_APPLICATION_CREDENTIALS` is read.
    pub fn from_env() -> Result<Self> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                tracing::debug!("Using access token from GOOGLE_OAUTH_ACCESS_TOKEN");
                return Ok(Self::new(GoogleCredentials::AccessToken(token)));
            }
        }

        let path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").map_err(|_| {
            Error::auth(
                "No Google credentials: set GOOGLE_OAUTH_ACCESS_TOKEN or GOOGLE_APPLICATION_CREDENTIALS",
            )
        })?;
        Self::from_key_file(&path)
    }

    /// Load a service-account key file
    pub fn from_key_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|_| Error::FileNotFound {
            path: path.to_string(),
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&contents)
            .map_err(|e| Error::auth(format!("Invalid service account key {path}: {e}")))?;
        tracing::debug!("Using service account {}", key.client_email);
        Ok(Self::new(GoogleCredentials::ServiceAccount(key)))
    }

    /// Apply authentication to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(req.bearer_auth(token))
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn access_token(&self) -> Result<String> {
        let key = match &self.credentials {
            GoogleCredentials::AccessToken(token) => return Ok(token.clone()),
            GoogleCredentials::ServiceAccount(key) => key,
        };

        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    return Ok(token.token.clone());
                }
            }
        }

        let mut cached = self.cached_token.write().await;

        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.token.clone());
            }
        }

        let new_token = self.exchange_assertion(key).await?;
        let token_str = new_token.token.clone();
        *cached = Some(new_token);

        Ok(token_str)
    }

    /// Sign a JWT assertion and exchange it for an access token
    async fn exchange_assertion(&self, key: &ServiceAccountKey) -> Result<CachedToken> {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: key.client_email.clone(),
            scope: BIGQUERY_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::auth(format!("Invalid private key: {e}")))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| Error::auth(format!("Failed to encode JWT: {e}")))?;

        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ];

        let response = self
            .http_client
            .post(&key.token_uri)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "JWT token exchange failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response.json().await?;
        tracing::debug!("Obtained access token for {}", key.client_email);
        Ok(token_response.into_cached_token())
    }

    /// Clear the cached token (forces a new exchange)
    pub async fn clear_cache(&self) {
        let mut cached = self.cached_token.write().await;
        *cached = None;
    }

    /// Get the credential source
    pub fn credentials(&self) -> &GoogleCredentials {
        &self.credentials
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_cached_token(self) -> CachedToken {
        match self.expires_in {
            Some(secs) => CachedToken::expires_in(self.access_token, secs),
            None => CachedToken::new(self.access_token, None),
        }
    }
}

/// JWT claims for the `jwt-bearer` grant
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}
