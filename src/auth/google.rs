//! Google ID token verification
//!
//! Verifies the RS256 signature against Google's published JWKS, checks the
//! issuer, then compares the audience with the configured OAuth client id.
//! Only addresses Google marks as verified are accepted.

use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::TrackerError;
use crate::Result;

pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];
const CERTS_TTL: Duration = Duration::from_secs(60 * 60);

/// Identity asserted by a verified ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Trait for third-party identity token verification
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Fails with `AudienceMismatch` or `Verification`.
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity>;
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    aud: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

/// Verifier backed by Google's certificate endpoint (certificates cached for an hour).
pub struct GoogleVerifier {
    client: Client,
    client_id: String,
    certs_url: String,
    certs: RwLock<Option<(JwkSet, Instant)>>,
}

impl GoogleVerifier {
    pub fn new(client_id: String) -> Self {
        Self::with_certs_url(client_id, GOOGLE_CERTS_URL.to_string())
    }

    pub fn with_certs_url(client_id: String, certs_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            client_id,
            certs_url,
            certs: RwLock::new(None),
        }
    }

    async fn cached_certs(&self) -> Option<JwkSet> {
        let cached = self.certs.read().await;
        cached
            .as_ref()
            .filter(|(_, fetched_at)| fetched_at.elapsed() < CERTS_TTL)
            .map(|(set, _)| set.clone())
    }

    async fn fetch_certs(&self) -> Result<JwkSet> {
        info!("Fetching Google signing certificates");

        let response = self.client.get(&self.certs_url).send().await.map_err(|e| {
            error!("Google certificate request failed: {}", e);
            TrackerError::Verification(format!("could not fetch certificates: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(TrackerError::Verification(format!(
                "certificate endpoint returned {}",
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| TrackerError::Verification(format!("invalid certificate set: {}", e)))?;

        *self.certs.write().await = Some((set.clone(), Instant::now()));
        Ok(set)
    }

    /// Decoding key for `kid`. A key id missing from the cached set triggers
    /// one refetch, since Google rotates its signing keys.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey> {
        let cached = self.cached_certs().await;

        let jwk = match cached.as_ref().and_then(|set| set.find(kid)) {
            Some(jwk) => jwk.clone(),
            None => {
                if cached.is_some() {
                    info!(kid = %kid, "Unknown key id, refreshing Google certificates");
                }
                self.fetch_certs()
                    .await?
                    .find(kid)
                    .cloned()
                    .ok_or_else(|| TrackerError::Verification(format!("unknown key id {}", kid)))?
            }
        };

        DecodingKey::from_jwk(&jwk)
            .map_err(|e| TrackerError::Verification(format!("unusable key: {}", e)))
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity> {
        if self.client_id.is_empty() {
            return Err(TrackerError::Verification(
                "GOOGLE_CLIENT_ID not configured".to_string(),
            ));
        }

        let header = decode_header(id_token)
            .map_err(|e| TrackerError::Verification(format!("malformed token: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| TrackerError::Verification("token has no key id".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(GOOGLE_ISSUERS);
        // Audience is compared below so a mismatch gets its own error.
        validation.validate_aud = false;

        let claims = decode::<GoogleClaims>(id_token, &key, &validation)
            .map_err(|e| TrackerError::Verification(e.to_string()))?
            .claims;

        if claims.aud != self.client_id {
            warn!(received = %claims.aud, "Google token audience mismatch");
            return Err(TrackerError::AudienceMismatch {
                received: claims.aud,
                expected: self.client_id.clone(),
            });
        }

        let email = claims
            .email
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| TrackerError::Verification("token carries no email".to_string()))?;

        if claims.email_verified != Some(true) {
            warn!("Google token email is not verified");
            return Err(TrackerError::Verification(
                "email not verified by Google".to_string(),
            ));
        }

        Ok(GoogleIdentity {
            subject: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }
}
