//! `/api/auth` handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Deserialize;

use super::AppState;
use crate::auth::{self, AuthSession, AuthUser};
use crate::error::TrackerError;
use crate::models::User;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Google sign-in accepts the ID token under either key.
#[derive(Debug, Deserialize)]
pub struct GoogleRequest {
    pub credential: Option<String>,
    pub token: Option<String>,
}

pub async fn register_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthSession>> {
    let Json(req) = payload?;

    let session = auth::register(
        state.store.as_ref(),
        &state.tokens,
        req.name.as_deref().unwrap_or_default(),
        req.email.as_deref().unwrap_or_default(),
        req.password.as_deref().unwrap_or_default(),
    )
    .await?;

    Ok(Json(session))
}

pub async fn login_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthSession>> {
    let Json(req) = payload?;

    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(TrackerError::Validation("Missing required fields".to_string()));
    };

    let session = auth::login(state.store.as_ref(), &state.tokens, &email, &password).await?;
    Ok(Json(session))
}

pub async fn google_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GoogleRequest>, JsonRejection>,
) -> Result<Json<AuthSession>> {
    let Json(req) = payload?;

    let credential = req
        .credential
        .or(req.token)
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| TrackerError::Validation("Missing Google token".to_string()))?;

    let session = auth::google_sign_in(
        state.store.as_ref(),
        &state.tokens,
        state.identity.as_ref(),
        &credential,
    )
    .await?;

    Ok(Json(session))
}

pub async fn me_handler(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
