//! Postgres-backed store
//!
//! The pool connects lazily and the schema is created on first use.

use super::{TransactionStore, UserStore};
use crate::error::TrackerError;
use crate::models::{
    AuthProvider, NewTransaction, NewUser, Transaction, TransactionPatch, TransactionType, User,
};
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

const TRANSACTION_COLUMNS: &str =
    "id, user_id, kind, amount, category, merchant, description, date, created_at, updated_at";

pub struct PostgresStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresStore {
    /// Configure a pool without opening a connection yet.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(url)?;

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS users (
                      id UUID PRIMARY KEY,
                      name TEXT NOT NULL,
                      email TEXT NOT NULL UNIQUE,
                      password_hash TEXT,
                      google_id TEXT,
                      picture TEXT,
                      provider TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                      kind TEXT NOT NULL,
                      amount DOUBLE PRECISION NOT NULL CHECK (amount > 0),
                      category TEXT NOT NULL,
                      merchant TEXT,
                      description TEXT,
                      date DATE NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_transactions_user_date
                    ON transactions (user_id, date DESC, created_at DESC);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                TrackerError::Database(format!("Failed to initialize schema: {}", e))
            })?;

        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let provider: String = row.try_get("provider")?;

    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        google_id: row.try_get("google_id")?,
        picture: row.try_get("picture")?,
        provider: AuthProvider::parse(&provider),
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
    let kind: String = row.try_get("kind")?;
    let kind = TransactionType::parse(&kind)
        .ok_or_else(|| TrackerError::Database(format!("unknown transaction kind: {}", kind)))?;

    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind,
        amount: row.try_get("amount")?,
        category: row.try_get("category")?,
        merchant: row.try_get("merchant")?,
        description: row.try_get("description")?,
        date: row.try_get("date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.ensure_schema().await?;
        let user = user.into_user();

        sqlx::query(
            r#"
            INSERT INTO users
              (id, name, email, password_hash, google_id, picture, provider, created_at)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.google_id)
        .bind(&user.picture)
        .bind(user.provider.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TrackerError::Conflict("User already exists".to_string())
            } else {
                TrackerError::from(e)
            }
        })?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl TransactionStore for PostgresStore {
    async fn insert_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction> {
        self.ensure_schema().await?;
        let tx = tx.into_transaction(user_id);

        sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            TRANSACTION_COLUMNS
        ))
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(tx.kind.as_str())
        .bind(tx.amount)
        .bind(&tx.category)
        .bind(&tx.merchant)
        .bind(&tx.description)
        .bind(tx.date)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(tx)
    }

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY date DESC, created_at DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TransactionPatch,
    ) -> Result<Transaction> {
        self.ensure_schema().await?;

        let clear_merchant = matches!(patch.merchant, Some(None));
        let clear_description = matches!(patch.description, Some(None));

        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions SET
              kind = COALESCE($3, kind),
              amount = COALESCE($4, amount),
              category = COALESCE($5, category),
              merchant = CASE WHEN $9 THEN NULL ELSE COALESCE($6, merchant) END,
              description = CASE WHEN $10 THEN NULL ELSE COALESCE($7, description) END,
              date = COALESCE($8, date),
              updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(patch.kind.map(|kind| kind.as_str()))
        .bind(patch.amount)
        .bind(patch.category)
        .bind(patch.merchant.flatten())
        .bind(patch.description.flatten())
        .bind(patch.date)
        .bind(clear_merchant)
        .bind(clear_description)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => transaction_from_row(&row),
            None => Err(TrackerError::NotFound("Transaction not found".to_string())),
        }
    }

    async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM transactions WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TrackerError::NotFound("Transaction not found".to_string()));
        }

        Ok(())
    }
}

/// These run against a scratch database:
/// `DATABASE_URL=postgres://... cargo test -- --ignored`
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> PostgresStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        PostgresStore::connect_lazy(&url).unwrap()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: Some("hash".to_string()),
            google_id: None,
            picture: None,
            provider: AuthProvider::Local,
        }
    }

    fn unique_email() -> String {
        format!("{}@example.com", Uuid::new_v4())
    }

    fn new_tx(amount: f64, date: (i32, u32, u32)) -> NewTransaction {
        NewTransaction {
            kind: TransactionType::Expense,
            amount,
            category: "Food".to_string(),
            merchant: Some("Bakery".to_string()),
            description: Some("weekly bread".to_string()),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        }
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_users_round_trip_and_conflict() {
        let store = store();
        let email = unique_email();

        let created = store.create_user(new_user(&email)).await.unwrap();

        let duplicate = store.create_user(new_user(&email)).await;
        assert!(matches!(duplicate, Err(TrackerError::Conflict(_))));

        let by_email = store.find_user_by_email(&email).await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.password_hash.as_deref(), Some("hash"));
        assert_eq!(by_email.provider, AuthProvider::Local);

        let by_id = store.find_user_by_id(created.id).await.unwrap();
        assert_eq!(by_id.map(|u| u.email), Some(email));
        assert!(store.find_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_transactions_scoped_sorted_and_patched() {
        let store = store();
        let owner = store.create_user(new_user(&unique_email())).await.unwrap().id;
        let other = store.create_user(new_user(&unique_email())).await.unwrap().id;

        let older = store.insert_transaction(owner, new_tx(1.5, (2025, 1, 5))).await.unwrap();
        store.insert_transaction(owner, new_tx(2.25, (2025, 6, 1))).await.unwrap();
        store.insert_transaction(other, new_tx(3.0, (2025, 7, 1))).await.unwrap();

        let listed = store.list_transactions(owner).await.unwrap();
        let amounts: Vec<f64> = listed.iter().map(|tx| tx.amount).collect();
        assert_eq!(amounts, vec![2.25, 1.5]);
        assert_eq!(listed[1].date, older.date);
        assert_eq!(listed[1].description.as_deref(), Some("weekly bread"));

        let denied = store
            .update_transaction(other, older.id, TransactionPatch::default())
            .await;
        assert!(matches!(denied, Err(TrackerError::NotFound(_))));

        let updated = store
            .update_transaction(
                owner,
                older.id,
                TransactionPatch {
                    category: Some("Groceries".to_string()),
                    description: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category, "Groceries");
        assert_eq!(updated.amount, 1.5);
        assert_eq!(updated.kind, TransactionType::Expense);
        assert_eq!(updated.merchant.as_deref(), Some("Bakery"));
        assert_eq!(updated.description, None);
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn test_delete_is_owner_only() {
        let store = store();
        let owner = store.create_user(new_user(&unique_email())).await.unwrap().id;
        let other = store.create_user(new_user(&unique_email())).await.unwrap().id;
        let tx = store.insert_transaction(owner, new_tx(5.0, (2025, 3, 3))).await.unwrap();

        let result = store.delete_transaction(other, tx.id).await;
        assert!(matches!(result, Err(TrackerError::NotFound(_))));
        assert_eq!(store.list_transactions(owner).await.unwrap().len(), 1);

        store.delete_transaction(owner, tx.id).await.unwrap();
        assert!(store.list_transactions(owner).await.unwrap().is_empty());

        let again = store.delete_transaction(owner, tx.id).await;
        assert!(matches!(again, Err(TrackerError::NotFound(_))));
    }
}
