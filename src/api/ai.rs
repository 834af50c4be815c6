//! `/api/ai` handlers

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::auth::AuthUser;
use crate::dates;
use crate::models::ParsedTransactionDraft;
use crate::parser;
use crate::Result;

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub text: Option<String>,
}

/// Turn free text into a draft for the client to confirm. Nothing is stored.
pub async fn parse_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: std::result::Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Json<ParsedTransactionDraft>> {
    let Json(req) = payload?;
    let text = req.text.unwrap_or_default();

    info!(user_id = %user.id, "Parsing transaction text");

    let mut rng = StdRng::from_entropy();
    let draft = parser::parse_transaction(
        state.extractor.as_ref(),
        &text,
        dates::today(),
        &mut rng,
    )
    .await?;

    Ok(Json(draft))
}
