//! Persistence layer for users and transactions
//!
//! Handlers only see the traits below. The backend is chosen at startup:
//! Postgres when a database URL is configured, in-memory otherwise.

use crate::models::{NewTransaction, NewUser, Transaction, TransactionPatch, User};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// User records, unique by email.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
}

/// Transactions, always scoped to their owner.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction>;

    /// Newest date first; ties broken by creation time, newest first.
    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>>;

    /// Fails with `NotFound` if the id is unknown or owned by someone else.
    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TransactionPatch,
    ) -> Result<Transaction>;

    /// Fails with `NotFound` if the id is unknown or owned by someone else.
    async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<()>;
}

/// Everything the API needs from a backend.
pub trait Store: UserStore + TransactionStore {}

impl<T: UserStore + TransactionStore> Store for T {}

pub(crate) fn sort_newest_first(transactions: &mut [Transaction]) {
    transactions.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Pick a backend for the given database URL.
pub fn build_store(database_url: Option<&str>) -> Arc<dyn Store> {
    if let Some(url) = database_url {
        match PostgresStore::connect_lazy(url) {
            Ok(store) => {
                info!("Storage backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Storage backend: in-memory");
    Arc::new(InMemoryStore::new())
}
