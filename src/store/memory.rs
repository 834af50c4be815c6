//! In-memory store for development and tests

use super::{sort_newest_first, TransactionStore, UserStore};
use crate::error::TrackerError;
use crate::models::{NewTransaction, NewUser, Transaction, TransactionPatch, User};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            transactions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;

        if users.values().any(|existing| existing.email == user.email) {
            return Err(TrackerError::Conflict("User already exists".to_string()));
        }

        let user = user.into_user();
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_transaction(&self, user_id: Uuid, tx: NewTransaction) -> Result<Transaction> {
        let transaction = tx.into_transaction(user_id);
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;

        let mut owned: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        sort_newest_first(&mut owned);

        Ok(owned)
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TransactionPatch,
    ) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;

        match transactions.get_mut(&id) {
            Some(tx) if tx.user_id == user_id => {
                tx.apply(patch);
                Ok(tx.clone())
            }
            _ => Err(TrackerError::NotFound("Transaction not found".to_string())),
        }
    }

    async fn delete_transaction(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let mut transactions = self.transactions.write().await;

        let owned = transactions
            .get(&id)
            .is_some_and(|tx| tx.user_id == user_id);
        if !owned {
            return Err(TrackerError::NotFound("Transaction not found".to_string()));
        }

        transactions.remove(&id);
        Ok(())
    }
}
