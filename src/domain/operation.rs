use super::account::{AccountId, Amount, Currency, WORLD_ACCOUNT_ID};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type OperationId = i64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum OperationKind {
    Deposit,
    Transfer,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("Deposit"),
            Self::Transfer => f.write_str("Transfer"),
        }
    }
}

/// Atomic movement of money between two accounts.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub from: AccountId,
    pub to: AccountId,
    pub currency: Currency,
    pub amount: Amount,
}

impl Transaction {
    pub fn new(from: AccountId, to: AccountId, currency: Currency, amount: Amount) -> Result<Self> {
        if from == to {
            return Err(PaymentError::ValidationError(format!(
                "transaction source and destination must differ, got ({from}) twice"
            )));
        }
        Ok(Self {
            from,
            to,
            currency,
            amount,
        })
    }
}

/// An operation that has not been persisted yet.
///
/// Participants are derived from the transactions, so the two can never
/// disagree.
#[derive(Debug, PartialEq, Clone)]
pub struct NewOperation {
    kind: OperationKind,
    transactions: Vec<Transaction>,
}

impl NewOperation {
    /// Money entering the ledger from the world account.
    pub fn deposit(to: AccountId, currency: Currency, amount: Amount) -> Result<Self> {
        Ok(Self {
            kind: OperationKind::Deposit,
            transactions: vec![Transaction::new(WORLD_ACCOUNT_ID, to, currency, amount)?],
        })
    }

    pub fn transfer(
        from: AccountId,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Self> {
        Ok(Self {
            kind: OperationKind::Transfer,
            transactions: vec![Transaction::new(from, to, currency, amount)?],
        })
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Every account referenced by the transactions, in first-reference order.
    pub fn participants(&self) -> Vec<AccountId> {
        let mut participants = Vec::with_capacity(self.transactions.len() * 2);
        for tx in &self.transactions {
            for id in [tx.from, tx.to] {
                if !participants.contains(&id) {
                    participants.push(id);
                }
            }
        }
        participants
    }

    /// Stamps the operation with its store-assigned id and creation time.
    pub fn persist(self, id: OperationId, created_at: DateTime<Utc>) -> Operation {
        Operation {
            id,
            kind: self.kind,
            participants: self.participants(),
            transactions: self.transactions,
            created_at,
        }
    }
}

/// Append-only ledger entry grouping the transactions of one user action.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub participants: Vec<AccountId>,
    pub transactions: Vec<Transaction>,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub fn involves(&self, account: AccountId) -> bool {
        self.participants.contains(&account)
    }
}

/// History order: creation time, then id.
pub fn sort_history(operations: &mut [Operation]) {
    operations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
