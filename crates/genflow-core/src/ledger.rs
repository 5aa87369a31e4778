//! Credit ledger: per-account balances as an append-only transaction log.
//!
//! Role in the flow:
//! - Admission pre-authorizes a job's estimated cost with a `Hold`.
//! - On any terminal transition the hold is settled exactly once:
//!   completed steps become `Debit` transactions, the remainder a
//!   `Refund`. Settling is idempotent, so every terminal path may call
//!   it unconditionally.
//! - Balance is the fold of the account's transactions; holds reduce
//!   availability, not balance.
//!
//! Concurrency: each account's book sits behind its own mutex
//! (single-writer-per-account), so two jobs racing for the same balance
//! serialize, while unrelated accounts never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use genflow_domain::ErrorCode;

use crate::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Hold,
    Debit,
    Refund,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub tx_id: Uuid,
    pub account_id: String,
    pub job_id: Uuid,
    pub step_id: Option<String>,
    pub amount: u64,
    pub kind: TxKind,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleOutcome {
    pub debited: u64,
    pub refunded: u64,
}

#[derive(Debug)]
struct HoldRecord {
    amount: u64,
    outcome: Option<SettleOutcome>,
}

#[derive(Debug, Default)]
struct AccountBook {
    credited: u64,
    txs: Vec<CreditTransaction>,
    holds: HashMap<Uuid, HoldRecord>,
}

impl AccountBook {
    fn debited(&self) -> u64 {
        self.txs.iter().filter(|t| t.kind == TxKind::Debit).map(|t| t.amount).sum()
    }

    fn balance(&self) -> u64 {
        self.credited.saturating_sub(self.debited())
    }

    fn outstanding_holds(&self) -> u64 {
        self.holds.values().filter(|h| h.outcome.is_none()).map(|h| h.amount).sum()
    }

    fn available(&self) -> u64 {
        self.balance().saturating_sub(self.outstanding_holds())
    }

    fn push_tx(&mut self, account_id: &str, job_id: Uuid, step_id: Option<String>, amount: u64, kind: TxKind) -> Uuid {
        let tx_id = Uuid::new_v4();
        self.txs.push(CreditTransaction { tx_id,
                                          account_id: account_id.to_string(),
                                          job_id,
                                          step_id,
                                          amount,
                                          kind,
                                          ts: Utc::now() });
        tx_id
    }
}

#[derive(Debug, Default)]
pub struct CreditLedger {
    accounts: DashMap<String, Arc<Mutex<AccountBook>>>,
}

impl CreditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, account_id: &str) -> Arc<Mutex<AccountBook>> {
        self.accounts
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(AccountBook::default())))
            .clone()
    }

    fn with_book<R>(&self, account_id: &str, f: impl FnOnce(&mut AccountBook) -> R) -> R {
        let book = self.book(account_id);
        // A poisoned account lock only means a panicking test thread;
        // the book itself is still consistent (append-only).
        let mut guard = book.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// Add funds to an account.
    pub fn credit(&self, account_id: &str, amount: u64) {
        self.with_book(account_id, |b| b.credited += amount);
    }

    pub fn balance(&self, account_id: &str) -> u64 {
        self.with_book(account_id, |b| b.balance())
    }

    /// Balance minus outstanding holds.
    pub fn available(&self, account_id: &str) -> u64 {
        self.with_book(account_id, |b| b.available())
    }

    pub fn outstanding_holds(&self, account_id: &str) -> u64 {
        self.with_book(account_id, |b| b.outstanding_holds())
    }

    /// Pre-authorize `amount` for `job_id`. Fails with INSUFFICIENT_FUNDS
    /// when the available balance cannot cover it; in that case no
    /// transaction is persisted and the job must not be admitted.
    pub fn hold(&self, account_id: &str, amount: u64, job_id: Uuid) -> Result<Uuid, CoreError> {
        self.with_book(account_id, |b| {
                if b.available() < amount {
                    return Err(CoreError::rejected(ErrorCode::InsufficientFunds,
                                                   format!("available {} < required {}", b.available(), amount)));
                }
                let tx_id = b.push_tx(account_id, job_id, None, amount, TxKind::Hold);
                b.holds.insert(job_id, HoldRecord { amount, outcome: None });
                Ok(tx_id)
            })
    }

    /// Settle the hold for `job_id`: one debit per completed step, one
    /// refund for whatever remains of the hold. Idempotent: the second
    /// and later calls return the recorded outcome without new
    /// transactions. A job with no hold settles to zeros.
    pub fn settle(&self, account_id: &str, job_id: Uuid, step_debits: &[(String, u64)]) -> SettleOutcome {
        self.with_book(account_id, |b| {
                let Some(hold) = b.holds.get(&job_id).map(|h| (h.amount, h.outcome)) else {
                    return SettleOutcome { debited: 0, refunded: 0 };
                };
                if let (_, Some(done)) = hold {
                    return done;
                }
                let mut debited = 0u64;
                for (step_id, cost) in step_debits {
                    if *cost > 0 {
                        b.push_tx(account_id, job_id, Some(step_id.clone()), *cost, TxKind::Debit);
                    }
                    debited += cost;
                }
                let refunded = hold.0.saturating_sub(debited);
                if refunded > 0 {
                    b.push_tx(account_id, job_id, None, refunded, TxKind::Refund);
                }
                let outcome = SettleOutcome { debited, refunded };
                if let Some(h) = b.holds.get_mut(&job_id) {
                    h.outcome = Some(outcome);
                }
                outcome
            })
    }

    /// Full transaction log for an account, append order.
    pub fn transactions(&self, account_id: &str) -> Vec<CreditTransaction> {
        self.with_book(account_id, |b| b.txs.clone())
    }

    /// Transactions tied to one job.
    pub fn transactions_for_job(&self, account_id: &str, job_id: Uuid) -> Vec<CreditTransaction> {
        self.with_book(account_id, |b| b.txs.iter().filter(|t| t.job_id == job_id).cloned().collect())
    }
}
