//! Prism Ledger
//!
//! Backend for a personal finance tracker:
//! - Per-user income and expense records with full CRUD
//! - Dashboard aggregates (balance, current month, category breakdown)
//! - Free-text transaction entry parsed by a hosted language model
//! - Password and Google sign-in with bearer-token sessions
//!
//! Storage is Postgres when configured, in-memory otherwise.

pub mod api;
pub mod auth;
pub mod config;
pub mod dates;
pub mod error;
pub mod models;
pub mod openai;
pub mod parser;
pub mod stats;
pub mod store;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use config::Config;
