//! `/api/transactions` handlers
//!
//! Every route is scoped to the authenticated user. Ids that are malformed,
//! unknown or owned by someone else all answer 404.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::auth::AuthUser;
use crate::dates;
use crate::error::TrackerError;
use crate::models::{NewTransaction, Transaction, TransactionPatch, TransactionType};
use crate::stats::{self, DailySpending, DashboardStats};
use crate::Result;

/// Body of create and update requests. Unknown keys are ignored, so clients
/// cannot overwrite ownership or timestamps. On update, a blank merchant or
/// description clears the stored value.
#[derive(Debug, Default, Deserialize)]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub amount: Option<f64>,
    pub category: Option<String>,
    pub merchant: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
}

fn parse_kind(raw: &str) -> Result<TransactionType> {
    TransactionType::parse(raw)
        .ok_or_else(|| TrackerError::Validation("Invalid transaction type".to_string()))
}

fn check_amount(amount: f64) -> Result<f64> {
    if amount.is_finite() && amount > 0.0 {
        Ok(amount)
    } else {
        Err(TrackerError::Validation(
            "Amount must be a positive number".to_string(),
        ))
    }
}

fn parse_explicit_date(raw: &str) -> Result<NaiveDate> {
    dates::parse_date(raw).ok_or_else(|| TrackerError::Validation("Invalid date".to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl TransactionRequest {
    pub fn into_new(self, today: NaiveDate) -> Result<NewTransaction> {
        let (Some(kind), Some(amount), Some(category)) =
            (self.kind, self.amount, non_empty(self.category))
        else {
            return Err(TrackerError::Validation(
                "Missing required fields".to_string(),
            ));
        };

        let date = match non_empty(self.date) {
            Some(raw) => parse_explicit_date(&raw)?,
            None => today,
        };

        Ok(NewTransaction {
            kind: parse_kind(&kind)?,
            amount: check_amount(amount)?,
            category,
            merchant: non_empty(self.merchant),
            description: non_empty(self.description),
            date,
        })
    }

    pub fn into_patch(self) -> Result<TransactionPatch> {
        let category = match self.category {
            Some(raw) => Some(non_empty(Some(raw)).ok_or_else(|| {
                TrackerError::Validation("Category cannot be empty".to_string())
            })?),
            None => None,
        };

        Ok(TransactionPatch {
            kind: self.kind.as_deref().map(parse_kind).transpose()?,
            amount: self.amount.map(check_amount).transpose()?,
            category,
            merchant: self.merchant.map(|raw| non_empty(Some(raw))),
            description: self.description.map(|raw| non_empty(Some(raw))),
            date: non_empty(self.date)
                .as_deref()
                .map(parse_explicit_date)
                .transpose()?,
        })
    }
}

fn transaction_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| TrackerError::NotFound("Transaction not found".to_string()))
}

pub async fn create_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: std::result::Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Transaction>)> {
    let Json(req) = payload?;
    let new_tx = req.into_new(dates::today())?;

    let transaction = state.store.insert_transaction(user.id, new_tx).await?;
    info!(user_id = %user.id, transaction_id = %transaction.id, "Created transaction");

    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn list_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Transaction>>> {
    Ok(Json(state.store.list_transactions(user.id).await?))
}

pub async fn update_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    payload: std::result::Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<Json<Transaction>> {
    let id = transaction_id(&id)?;
    let Json(req) = payload?;
    let patch = req.into_patch()?;

    let transaction = state.store.update_transaction(user.id, id, patch).await?;
    info!(user_id = %user.id, transaction_id = %id, "Updated transaction");

    Ok(Json(transaction))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let id = transaction_id(&id)?;

    state.store.delete_transaction(user.id, id).await?;
    info!(user_id = %user.id, transaction_id = %id, "Deleted transaction");

    Ok(Json(json!({ "success": true })))
}

pub async fn stats_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<DashboardStats>> {
    let transactions = state.store.list_transactions(user.id).await?;
    Ok(Json(stats::compute_stats(&transactions, dates::today())))
}

pub async fn daily_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<DailySpending>>> {
    let transactions = state.store.list_transactions(user.id).await?;
    Ok(Json(stats::daily_spending(&transactions)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn request() -> TransactionRequest {
        TransactionRequest {
            kind: Some("expense".to_string()),
            amount: Some(9.99),
            category: Some(" Books ".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_explicit_dates_are_not_clamped() {
        let tx = TransactionRequest {
            date: Some("2019-06-30".to_string()),
            ..request()
        }
        .into_new(today())
        .unwrap();

        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2019, 6, 30).unwrap());
        assert_eq!(tx.category, "Books");
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let result = TransactionRequest {
            amount: Some(0.0),
            ..request()
        }
        .into_new(today());

        assert!(matches!(result, Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_blank_category_counts_as_missing() {
        let result = TransactionRequest {
            category: Some("   ".to_string()),
            ..request()
        }
        .into_new(today());

        match result {
            Err(TrackerError::Validation(message)) => assert_eq!(message, "Missing required fields"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_validates_present_fields_only() {
        let patch = TransactionRequest {
            kind: Some("Income".to_string()),
            ..Default::default()
        }
        .into_patch()
        .unwrap();

        assert_eq!(patch.kind, Some(TransactionType::Income));
        assert_eq!(patch.amount, None);
        assert_eq!(patch.category, None);

        let bad_amount = TransactionRequest {
            amount: Some(-1.0),
            ..Default::default()
        }
        .into_patch();
        assert!(matches!(bad_amount, Err(TrackerError::Validation(_))));

        let cleared = TransactionRequest {
            merchant: Some("  ".to_string()),
            description: Some("rent for May".to_string()),
            ..Default::default()
        }
        .into_patch()
        .unwrap();
        assert_eq!(cleared.merchant, Some(None));
        assert_eq!(cleared.description, Some(Some("rent for May".to_string())));

        let blank_category = TransactionRequest {
            category: Some(String::new()),
            ..Default::default()
        }
        .into_patch();
        assert!(matches!(blank_category, Err(TrackerError::Validation(_))));
    }

    #[test]
    fn test_malformed_id_is_not_found() {
        assert!(matches!(
            transaction_id("64b7f0c2e1"),
            Err(TrackerError::NotFound(_))
        ));
    }
}
