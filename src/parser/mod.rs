//! Natural-language transaction parsing
//!
//! A `TransactionExtractor` turns free text into the model's raw JSON object.
//! `finalize_draft` then applies the deterministic post-processing: field
//! validation, date sanitisation and confidence stamping.

use chrono::NaiveDate;
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use crate::dates;
use crate::error::TrackerError;
use crate::models::{ParsedTransactionDraft, TransactionType};
use crate::Result;

pub mod openai;
pub use openai::OpenAiExtractor;

pub const SYSTEM_PROMPT: &str =
    "You convert natural language into structured finance transactions.";

pub const DEFAULT_CATEGORY: &str = "Other";

/// Lower bound of the synthetic confidence range; the upper bound is exclusive 1.0.
pub const MIN_CONFIDENCE: f64 = 0.7;

/// Trait for free text → raw transaction JSON (LLM controlled)
#[async_trait::async_trait]
pub trait TransactionExtractor: Send + Sync {
    /// Fails with `UpstreamParse` if the model output is not a JSON object
    /// and `Upstream` for any other call failure.
    async fn extract(&self, text: &str) -> Result<Value>;
}

/// JSON schema the model is asked to fill in.
pub fn transaction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": { "type": "string", "enum": ["income", "expense"] },
            "amount": { "type": "number" },
            "category": { "type": "string" },
            "merchant": { "type": "string" },
            "description": { "type": "string" },
            "date": { "type": "string", "description": "ISO 8601 date (YYYY-MM-DD)" }
        },
        "required": ["type", "amount"],
        "additionalProperties": false
    })
}

/// User prompt embedding the schema and the quoted message.
pub fn build_prompt(text: &str) -> String {
    let quoted = serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text));

    format!(
        "Extract a single financial transaction from the user's message. \
         Return strict JSON matching this schema: {}. \
         If the user does not mention a date, ALWAYS use today's date (YYYY-MM-DD). \
         If the user mentions an unrealistic or very old date, correct it to today's date. \
         Categories should be simple (e.g., Food, Rent, Salary, Transport). \
         Message: {}",
        transaction_schema(),
        quoted
    )
}

fn optional_text(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn read_amount(raw: &Value) -> Option<f64> {
    let amount = match raw.get("amount")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse::<f64>().ok()?,
        _ => return None,
    };

    Some(amount.abs()).filter(|a| a.is_finite() && *a > 0.0)
}

/// Turn the model's raw object into a draft.
pub fn finalize_draft<R: Rng + ?Sized>(
    raw: &Value,
    today: NaiveDate,
    rng: &mut R,
) -> Result<ParsedTransactionDraft> {
    if !raw.is_object() {
        return Err(TrackerError::UpstreamParse("expected a JSON object".to_string()));
    }

    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .and_then(TransactionType::parse)
        .ok_or_else(|| TrackerError::UpstreamParse("missing or invalid type".to_string()))?;

    let amount = read_amount(raw)
        .ok_or_else(|| TrackerError::UpstreamParse("missing or invalid amount".to_string()))?;

    let date = dates::sanitize_or_today(raw.get("date").and_then(Value::as_str), today);

    Ok(ParsedTransactionDraft {
        kind,
        amount,
        category: optional_text(raw, "category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        merchant: optional_text(raw, "merchant"),
        description: optional_text(raw, "description"),
        date,
        confidence: rng.gen_range(MIN_CONFIDENCE..1.0),
    })
}

/// Parse free text into a draft. Empty text is rejected before any model call.
pub async fn parse_transaction<R: Rng + ?Sized>(
    extractor: &dyn TransactionExtractor,
    text: &str,
    today: NaiveDate,
    rng: &mut R,
) -> Result<ParsedTransactionDraft> {
    if text.trim().is_empty() {
        return Err(TrackerError::InvalidInput("Missing text".to_string()));
    }

    let raw = extractor.extract(text).await?;
    let draft = finalize_draft(&raw, today, rng)?;

    info!(
        kind = %draft.kind,
        category = %draft.category,
        date = %draft.date,
        "Parsed transaction draft"
    );

    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    struct CannedExtractor {
        response: Value,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TransactionExtractor for CannedExtractor {
        async fn extract(&self, _text: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    struct FailingExtractor;

    #[async_trait::async_trait]
    impl TransactionExtractor for FailingExtractor {
        async fn extract(&self, _text: &str) -> Result<Value> {
            Err(TrackerError::Upstream("connection reset".to_string()))
        }
    }

    #[test]
    fn test_prompt_embeds_schema_and_escaped_text() {
        let prompt = build_prompt(r#"Paid "Joe's" 12 for lunch"#);
        assert!(prompt.contains(r#""required":["type","amount"]"#));
        assert!(prompt.contains(r#"Message: "Paid \"Joe's\" 12 for lunch""#));
    }

    #[test]
    fn test_old_date_is_replaced_with_today() {
        let raw = json!({ "type": "expense", "amount": 12.5, "category": "Food", "date": "2023-01-01" });
        let draft = finalize_draft(&raw, today(), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(draft.date, today());
    }

    #[test]
    fn test_future_date_is_replaced_with_today() {
        let raw = json!({ "type": "expense", "amount": 12.5, "date": "2027-10-19" });
        let draft = finalize_draft(&raw, today(), &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(draft.date, today());
    }

    #[test]
    fn test_plausible_date_is_kept_and_normalised() {
        let raw = json!({ "type": "income", "amount": 2500, "category": "Salary", "date": "01-10-2026" });
        let draft = finalize_draft(&raw, today(), &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(draft.kind, TransactionType::Income);
        assert_eq!(draft.amount, 2500.0);
        assert_eq!(draft.date, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
    }

    #[test]
    fn test_missing_optional_fields() {
        let raw = json!({ "type": "expense", "amount": "1,200.00", "merchant": "  " });
        let draft = finalize_draft(&raw, today(), &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(draft.amount, 1200.0);
        assert_eq!(draft.category, DEFAULT_CATEGORY);
        assert_eq!(draft.merchant, None);
        assert_eq!(draft.date, today());
    }

    #[test]
    fn test_confidence_stays_in_range() {
        let raw = json!({ "type": "expense", "amount": 3 });
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let draft = finalize_draft(&raw, today(), &mut rng).unwrap();
            assert!(draft.confidence >= MIN_CONFIDENCE && draft.confidence < 1.0);
        }
    }

    #[test]
    fn test_missing_required_fields_is_upstream_parse() {
        let mut rng = StdRng::seed_from_u64(1);

        for raw in [
            json!({ "amount": 3 }),
            json!({ "type": "transfer", "amount": 3 }),
            json!({ "type": "expense" }),
            json!({ "type": "expense", "amount": 0 }),
            json!(["expense", 3]),
        ] {
            let result = finalize_draft(&raw, today(), &mut rng);
            assert!(matches!(result, Err(TrackerError::UpstreamParse(_))), "{}", raw);
        }
    }

    #[tokio::test]
    async fn test_empty_text_never_reaches_model() {
        let extractor = CannedExtractor {
            response: json!({ "type": "expense", "amount": 1 }),
            calls: AtomicUsize::new(0),
        };

        let result =
            parse_transaction(&extractor, "   ", today(), &mut StdRng::seed_from_u64(1)).await;

        assert!(matches!(result, Err(TrackerError::InvalidInput(_))));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parse_transaction_uses_extractor_output() {
        let extractor = CannedExtractor {
            response: json!({ "type": "expense", "amount": 4.5, "category": "Coffee", "merchant": "Blue Bottle" }),
            calls: AtomicUsize::new(0),
        };

        let draft = parse_transaction(
            &extractor,
            "4.50 at Blue Bottle",
            today(),
            &mut StdRng::seed_from_u64(1),
        )
        .await
        .unwrap();

        assert_eq!(draft.merchant.as_deref(), Some("Blue Bottle"));
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extractor_failure_propagates() {
        let result = parse_transaction(
            &FailingExtractor,
            "coffee 3",
            today(),
            &mut StdRng::seed_from_u64(1),
        )
        .await;

        assert!(matches!(result, Err(TrackerError::Upstream(_))));
    }
}
