//! Authentication: password accounts, Google sign-in and bearer tokens
//!
//! Tokens are HS256 JWTs whose `sub` is the user id. Every protected route
//! extracts `AuthUser`, which verifies the token and loads the user record.

use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::TrackerError;
use crate::models::{AuthProvider, NewUser, User};
use crate::store::Store;
use crate::Result;

pub mod google;

pub use google::{GoogleIdentity, GoogleVerifier, IdentityVerifier};

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
// Keeps the test suite fast; the hash format is identical.
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

/// The contents of a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Id of the user the token was issued to.
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

/// Signing material and lifetime for bearer tokens.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now().timestamp();
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| {
                error!(ttl_secs = self.ttl.as_secs(), "Token lifetime out of range");
                TrackerError::Token("token lifetime out of range".to_string())
            })?;
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| TrackerError::Token(e.to_string()))
    }

    /// Check signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| TrackerError::Unauthorized(format!("invalid token: {}", e)))
    }
}

/// Response body of every successful sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = TrackerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| TrackerError::Unauthorized("missing bearer token".to_string()))?;

        let claims = state.tokens.verify(bearer.token())?;

        let user = state
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or_else(|| TrackerError::Unauthorized("user no longer exists".to_string()))?;

        Ok(AuthUser(user))
    }
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Salted bcrypt hash, computed off the async executor.
pub async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|e| TrackerError::Hashing(e.to_string()))?
        .map_err(TrackerError::from)
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| TrackerError::Hashing(e.to_string()))?
        .map_err(TrackerError::from)
}

/// Create a password account and sign it in.
pub async fn register(
    store: &dyn Store,
    tokens: &TokenKeys,
    name: &str,
    email: &str,
    password: &str,
) -> Result<AuthSession> {
    let name = name.trim();
    let email = normalize_email(email);

    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(TrackerError::Validation("Missing required fields".to_string()));
    }

    if store.find_user_by_email(&email).await?.is_some() {
        return Err(TrackerError::Conflict("User already exists".to_string()));
    }

    let password_hash = hash_password(password).await?;
    let user = store
        .create_user(NewUser {
            name: name.to_string(),
            email,
            password_hash: Some(password_hash),
            google_id: None,
            picture: None,
            provider: AuthProvider::Local,
        })
        .await?;

    info!(user_id = %user.id, "Registered user");

    let token = tokens.issue(user.id)?;
    Ok(AuthSession { user, token })
}

/// Password sign-in. Unknown emails and wrong passwords are indistinguishable.
pub async fn login(
    store: &dyn Store,
    tokens: &TokenKeys,
    email: &str,
    password: &str,
) -> Result<AuthSession> {
    let email = normalize_email(email);

    let user = store
        .find_user_by_email(&email)
        .await?
        .ok_or(TrackerError::InvalidCredentials)?;

    let Some(hash) = user.password_hash.as_deref() else {
        return Err(TrackerError::InvalidCredentials);
    };

    if !verify_password(password, hash).await? {
        return Err(TrackerError::InvalidCredentials);
    }

    let token = tokens.issue(user.id)?;
    Ok(AuthSession { user, token })
}

/// Sign in with a Google ID token, creating the user on first sight of the email.
pub async fn google_sign_in(
    store: &dyn Store,
    tokens: &TokenKeys,
    verifier: &dyn IdentityVerifier,
    credential: &str,
) -> Result<AuthSession> {
    let identity = verifier.verify(credential).await?;
    let email = normalize_email(&identity.email);

    let user = match store.find_user_by_email(&email).await? {
        Some(user) => user,
        None => {
            let created = store
                .create_user(NewUser {
                    name: identity.name.clone().unwrap_or_else(|| email.clone()),
                    email: email.clone(),
                    password_hash: None,
                    google_id: Some(identity.subject.clone()),
                    picture: identity.picture.clone(),
                    provider: AuthProvider::Google,
                })
                .await;

            match created {
                Ok(user) => {
                    info!(user_id = %user.id, "Created user from Google sign-in");
                    user
                }
                // Lost a race with a concurrent first sign-in.
                Err(TrackerError::Conflict(_)) => {
                    warn!("Google user created concurrently, reloading");
                    store
                        .find_user_by_email(&email)
                        .await?
                        .ok_or_else(|| TrackerError::Database("user vanished".to_string()))?
                }
                Err(e) => return Err(e),
            }
        }
    };

    let token = tokens.issue(user.id)?;
    Ok(AuthSession { user, token })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    struct FixedIdentity(GoogleIdentity);

    #[async_trait]
    impl IdentityVerifier for FixedIdentity {
        async fn verify(&self, _id_token: &str) -> Result<GoogleIdentity> {
            Ok(self.0.clone())
        }
    }

    fn keys() -> TokenKeys {
        TokenKeys::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_token_roundtrip_carries_user_id() {
        let keys = keys();
        let user_id = Uuid::new_v4();

        let token = keys.issue(user_id).unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_out_of_range_lifetime_fails_to_issue() {
        let keys = TokenKeys::new("test-secret", Duration::from_secs(9_300_000_000_000_000_000));
        assert!(matches!(keys.issue(Uuid::new_v4()), Err(TrackerError::Token(_))));
    }

    #[test]
    fn test_token_from_other_secret_is_unauthorized() {
        let token = TokenKeys::new("other", Duration::from_secs(60))
            .issue(Uuid::new_v4())
            .unwrap();

        assert!(matches!(keys().verify(&token), Err(TrackerError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(keys().verify(&token), Err(TrackerError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_password_hash_is_salted_and_verifies() {
        let first = hash_password("hunter22").await.unwrap();
        let second = hash_password("hunter22").await.unwrap();

        assert_ne!(first, second);
        assert!(verify_password("hunter22", &first).await.unwrap());
        assert!(!verify_password("hunter23", &first).await.unwrap());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = InMemoryStore::new();
        let keys = keys();

        let session = register(&store, &keys, "Ada", " Ada@Example.com ", "pw").await.unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert_eq!(keys.verify(&session.token).unwrap().sub, session.user.id);

        let again = login(&store, &keys, "ADA@example.com", "pw").await.unwrap();
        assert_eq!(again.user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_is_conflict() {
        let store = InMemoryStore::new();
        let keys = keys();
        register(&store, &keys, "Ada", "ada@example.com", "pw").await.unwrap();

        let result = register(&store, &keys, "Imposter", "ada@example.com", "pw2").await;
        assert!(matches!(result, Err(TrackerError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_register_requires_all_fields() {
        let store = InMemoryStore::new();
        let result = register(&store, &keys(), "", "ada@example.com", "pw").await;
        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_failures_are_invalid_credentials() {
        let store = InMemoryStore::new();
        let keys = keys();
        register(&store, &keys, "Ada", "ada@example.com", "pw").await.unwrap();

        let wrong_password = login(&store, &keys, "ada@example.com", "nope").await;
        assert!(matches!(wrong_password, Err(TrackerError::InvalidCredentials)));

        let unknown = login(&store, &keys, "nobody@example.com", "pw").await;
        assert!(matches!(unknown, Err(TrackerError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_google_sign_in_creates_user_once() {
        let store = InMemoryStore::new();
        let keys = keys();
        let verifier = FixedIdentity(GoogleIdentity {
            subject: "google-sub-1".to_string(),
            email: "Grace@Example.com".to_string(),
            name: Some("Grace".to_string()),
            picture: Some("https://example.com/grace.png".to_string()),
        });

        let first = google_sign_in(&store, &keys, &verifier, "id-token").await.unwrap();
        let second = google_sign_in(&store, &keys, &verifier, "id-token").await.unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(first.user.provider, AuthProvider::Google);
        assert_eq!(first.user.google_id.as_deref(), Some("google-sub-1"));

        // Google accounts have no password to log in with.
        let result = login(&store, &keys, "grace@example.com", "").await;
        assert!(matches!(result, Err(TrackerError::InvalidCredentials)));
    }
}
