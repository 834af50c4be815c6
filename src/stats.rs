//! Transaction aggregation for the dashboard
//!
//! Everything is recomputed from a user's full transaction list on each call.
//! The "monthly" window is the calendar month containing `today`.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Transaction, TransactionType};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Totals {
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlySummary {
    pub income: f64,
    pub expenses: f64,
    pub savings: f64,
}

/// Response body of `GET /api/transactions/stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardStats {
    pub totals: Totals,
    pub monthly: MonthlySummary,
    /// Expense total per category, current month only.
    pub breakdown: BTreeMap<String, f64>,
}

/// One point of the daily spending series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailySpending {
    pub date: NaiveDate,
    pub amount: f64,
}

fn same_month(date: NaiveDate, today: NaiveDate) -> bool {
    date.year() == today.year() && date.month() == today.month()
}

/// All-time balance: income adds, expenses subtract.
pub fn balance(transactions: &[Transaction]) -> f64 {
    transactions
        .iter()
        .fold(0.0, |acc, transaction| acc + transaction.signed_amount())
}

/// Income, expenses and savings for the calendar month containing `today`.
pub fn monthly_summary(transactions: &[Transaction], today: NaiveDate) -> MonthlySummary {
    let mut summary = MonthlySummary::default();

    for transaction in transactions.iter().filter(|t| same_month(t.date, today)) {
        match transaction.kind {
            TransactionType::Income => summary.income += transaction.amount,
            TransactionType::Expense => summary.expenses += transaction.amount,
        }
    }

    summary.savings = summary.income - summary.expenses;
    summary
}

/// Expense totals per category for the calendar month containing `today`.
pub fn category_breakdown(transactions: &[Transaction], today: NaiveDate) -> BTreeMap<String, f64> {
    let mut breakdown = BTreeMap::new();

    for transaction in transactions {
        if transaction.kind == TransactionType::Expense && same_month(transaction.date, today) {
            *breakdown.entry(transaction.category.clone()).or_insert(0.0) += transaction.amount;
        }
    }

    breakdown
}

pub fn compute_stats(transactions: &[Transaction], today: NaiveDate) -> DashboardStats {
    DashboardStats {
        totals: Totals {
            balance: balance(transactions),
        },
        monthly: monthly_summary(transactions, today),
        breakdown: category_breakdown(transactions, today),
    }
}

/// Expense totals per calendar day across all time, oldest first.
pub fn daily_spending(transactions: &[Transaction]) -> Vec<DailySpending> {
    let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for transaction in transactions {
        if transaction.kind == TransactionType::Expense {
            *per_day.entry(transaction.date).or_insert(0.0) += transaction.amount;
        }
    }

    per_day
        .into_iter()
        .map(|(date, amount)| DailySpending { date, amount })
        .collect()
}
