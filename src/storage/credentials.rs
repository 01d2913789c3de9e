// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service-account credentials and OAuth access tokens for Google APIs
//!
//! Tokens are obtained with the JWT-bearer grant: an RS256 assertion signed
//! with the service-account key is exchanged at the key's token URI. The
//! resulting access token is cached until shortly before it expires.

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::error::{status_error, StorageError};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime requested for each assertion (Google caps it at one hour)
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh a cached token this long before it expires
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The JSON key file downloaded for a service account
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let key: ServiceAccountKey = serde_json::from_str(json).map_err(|e| {
            StorageError::ConfigError(format!("Invalid service account key: {}", e))
        })?;

        if key.private_key.trim().is_empty() || key.client_email.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "Service account key is missing private_key or client_email".to_string(),
            ));
        }

        Ok(key)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            StorageError::ConfigError(format!(
                "Cannot read credentials {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

/// Claims of the JWT-bearer assertion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Build and sign the assertion for `key` issued at `issued_at` (unix seconds)
pub fn build_assertion(
    key: &ServiceAccountKey,
    scope: &str,
    issued_at: u64,
) -> Result<String, StorageError> {
    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: scope.to_string(),
        aud: key.token_uri.clone(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| StorageError::AuthError(format!("Invalid private key: {}", e)))?;

    encode(&header, &claims, &encoding_key)
        .map_err(|e| StorageError::AuthError(format!("Failed to sign assertion: {}", e)))
}

/// Supplies bearer tokens for outgoing API calls
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, StorageError>;
}

/// A fixed token, for emulators and tests
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, StorageError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    /// Unix seconds
    pub expires_at: u64,
}

impl CachedToken {
    pub fn is_fresh(&self, now: u64) -> bool {
        now + REFRESH_MARGIN.as_secs() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

/// Exchanges signed assertions for access tokens and caches the result
pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    scope: String,
    client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountTokenProvider")
            .field("client_email", &self.key.client_email)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Self {
        Self {
            key,
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            client,
            cache: RwLock::new(None),
        }
    }

    async fn fetch_token(&self) -> Result<CachedToken, StorageError> {
        let now = unix_now();
        let assertion = build_assertion(&self.key, &self.scope, now)?;

        debug!("Requesting access token for {}", self.key.client_email);

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status_error(status, "Token exchange", &body) {
                StorageError::ServerError(detail) if status.is_client_error() => {
                    StorageError::AuthError(detail)
                }
                other => other,
            });
        }

        let token: TokenResponse = response.json().await?;
        info!(
            "Obtained access token for {} (expires in {}s)",
            self.key.client_email, token.expires_in
        );

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + token.expires_in,
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, StorageError> {
        let now = unix_now();

        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh(unix_now()) {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}
