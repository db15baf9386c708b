//! Service-account access tokens with domain-wide delegation.
//!
//! A signed JWT assertion (RS256) is exchanged at the key's `token_uri` for a
//! short-lived bearer token. Tokens are cached until shortly before expiry.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::config::ServiceAccountKey;
use crate::error::{ProviderError, ProviderResult};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion; Google caps it at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_BUFFER_SECS: i64 = 60;

/// JWT claims of a service-account assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Impersonated Workspace user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl AssertionClaims {
    pub fn new(
        key: &ServiceAccountKey,
        scopes: &[&str],
        subject: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let iat = now.timestamp();
        Self {
            iss: key.client_email.clone(),
            scope: scopes.join(" "),
            aud: key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            sub: subject.map(str::to_string),
        }
    }
}

/// A bearer token and the instant it should no longer be used.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token from a token-endpoint response, applying the expiry buffer.
    pub fn new(token: impl Into<String>, expires_in_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: now + Duration::seconds(expires_in_secs)
                - Duration::seconds(EXPIRY_BUFFER_SECS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

/// Issues and caches delegated access tokens.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    subject: String,
    scopes: Vec<&'static str>,
    cached: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.key.client_email)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountAuth {
    /// Prepares token issuance for `key`, impersonating `subject`.
    ///
    /// Fails if the private key is not a valid RSA PEM.
    pub fn new(
        key: ServiceAccountKey,
        subject: impl Into<String>,
        scopes: &[&'static str],
    ) -> ProviderResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ProviderError::configuration(format!("invalid service account private key: {e}"))
                .with_source(e)
        })?;
        Ok(Self {
            key,
            encoding_key,
            subject: subject.into(),
            scopes: scopes.to_vec(),
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid access token, exchanging a new assertion if needed.
    ///
    /// Concurrent callers wait on the same exchange.
    pub async fn access_token(&self, http: &reqwest::Client) -> ProviderResult<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired(now)) {
            return Ok(token.token.clone());
        }

        let token = self.exchange(http, now).await?;
        let value = token.token.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drops the cached token, e.g. after the API rejected it.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> ProviderResult<String> {
        let claims = AssertionClaims::new(&self.key, &self.scopes, Some(&self.subject), now);
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            ProviderError::internal(format!("failed to sign assertion: {e}")).with_source(e)
        })
    }

    async fn exchange(&self, http: &reqwest::Client, now: DateTime<Utc>) -> ProviderResult<AccessToken> {
        let assertion = self.sign_assertion(now)?;
        debug!(subject = %self.subject, "exchanging service account assertion");

        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let response = http
            .post(&self.key.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            // The token endpoint answers 400/401 for bad grants; keep 429/5xx transient.
            let err = ProviderError::from_http_status(status.as_u16(), &body);
            return Err(if err.is_retryable() {
                err
            } else {
                ProviderError::authentication(format!("token exchange rejected: {}", err.message()))
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {e}"))
        })?;

        info!(
            subject = %self.subject,
            expires_in = parsed.expires_in,
            "obtained delegated access token"
        );
        Ok(AccessToken::new(parsed.access_token, parsed.expires_in, now))
    }
}
