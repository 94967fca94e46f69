use super::account::{Account, AccountId, NewAccount};
use super::operation::{NewOperation, Operation, OperationId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Account access bound to one transactional session.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, account: NewAccount) -> Result<Account>;
    /// Fails with `AccountNotFound` for missing or soft-deleted ids.
    async fn get(&self, id: AccountId) -> Result<Account>;
    async fn get_all(&self) -> Result<Vec<Account>>;
    async fn update(&self, account: Account) -> Result<Account>;
    /// Soft-deletes the account. Deleting twice is a no-op.
    async fn delete(&self, id: AccountId) -> Result<()>;
}

/// Operation access bound to one transactional session.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Persists the operation together with its transactions.
    async fn create(&self, operation: NewOperation) -> Result<Operation>;
    async fn get(&self, id: OperationId) -> Result<Operation>;
    /// Operations the account participates in, oldest first.
    async fn get_by_account(&self, id: AccountId) -> Result<Vec<Operation>>;
    async fn get_all(&self) -> Result<Vec<Operation>>;
}

/// One transactional session and the repositories bound to it.
///
/// `save` and `revert` consume the handle, so a session gets exactly one
/// terminal call. Dropping a handle without either discards its writes.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn accounts(&self) -> &dyn AccountRepository;
    fn operations(&self) -> &dyn OperationRepository;
    async fn save(self: Box<Self>) -> Result<()>;
    async fn revert(self: Box<Self>) -> Result<()>;
}

/// Opens a new session per call; the session is already begun when returned.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn make(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// Mutual exclusion shared by every process talking to the same coordinator.
#[async_trait]
pub trait Lock: Send + Sync {
    fn key(&self) -> &str;
    async fn lock(&self) -> Result<()>;
    async fn unlock(&self) -> Result<()>;
}

pub trait LockFactory: Send + Sync {
    fn make(&self, key: &str) -> Box<dyn Lock>;

    /// How long a taken lock stays valid without its holder, `None` if it never lapses.
    fn lease(&self) -> Option<Duration> {
        None
    }
}

pub type UnitOfWorkFactoryRef = Arc<dyn UnitOfWorkFactory>;
pub type LockFactoryRef = Arc<dyn LockFactory>;
