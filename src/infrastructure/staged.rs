//! Unit of work built on buffered writes.
//!
//! A session reads through to the committed state of its backend, keeps its
//! own writes in memory, and hands them to the backend in one atomic commit.
//! Isolation between sessions touching the same account comes from the lock
//! layer, not from the session.

use crate::domain::account::{Account, AccountId, NewAccount};
use crate::domain::operation::{NewOperation, Operation, OperationId, sort_history};
use crate::domain::ports::{AccountRepository, OperationRepository, UnitOfWork};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Writes a session has made but not committed yet.
#[derive(Debug, Default)]
pub struct StagedWrites {
    pub accounts: BTreeMap<AccountId, Account>,
    pub operations: Vec<Operation>,
}

impl StagedWrites {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.operations.is_empty()
    }
}

/// Committed state of a store, as seen by a session.
#[async_trait]
pub trait SessionBackend: Clone + Send + Sync + 'static {
    /// Called when a session opens; failing here means no session is handed out.
    async fn begin(&self) -> Result<()>;
    fn next_account_id(&self) -> AccountId;
    fn next_operation_id(&self) -> OperationId;
    /// Committed account row, soft-deleted ones included.
    async fn account(&self, id: AccountId) -> Result<Option<Account>>;
    async fn accounts(&self) -> Result<Vec<Account>>;
    async fn operation(&self, id: OperationId) -> Result<Option<Operation>>;
    async fn operations_by_account(&self, id: AccountId) -> Result<Vec<Operation>>;
    async fn operations(&self) -> Result<Vec<Operation>>;
    /// Applies every staged write, or none of them.
    async fn commit(&self, writes: StagedWrites) -> Result<()>;
}

struct Session<B> {
    backend: B,
    staged: Mutex<StagedWrites>,
}

impl<B: SessionBackend> Session<B> {
    async fn find_account(&self, id: AccountId) -> Result<Option<Account>> {
        if let Some(account) = self.staged.lock().await.accounts.get(&id).cloned() {
            return Ok(Some(account));
        }
        self.backend.account(id).await
    }

    async fn stage_account(&self, account: Account) {
        self.staged.lock().await.accounts.insert(account.id, account);
    }

    async fn with_staged_operations(
        &self,
        mut committed: Vec<Operation>,
        filter: impl Fn(&Operation) -> bool,
    ) -> Vec<Operation> {
        committed.extend(
            self.staged
                .lock()
                .await
                .operations
                .iter()
                .filter(|op| filter(*op))
                .cloned(),
        );
        sort_history(&mut committed);
        committed
    }
}

pub struct StagedAccountRepository<B> {
    session: Arc<Session<B>>,
}

#[async_trait]
impl<B: SessionBackend> AccountRepository for StagedAccountRepository<B> {
    async fn create(&self, account: NewAccount) -> Result<Account> {
        let id = self.session.backend.next_account_id();
        let account = Account::open(id, account, Utc::now());
        self.session.stage_account(account.clone()).await;
        Ok(account)
    }

    async fn get(&self, id: AccountId) -> Result<Account> {
        self.session
            .find_account(id)
            .await?
            .filter(|account| !account.is_deleted())
            .ok_or(PaymentError::AccountNotFound(id))
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        let mut accounts: BTreeMap<AccountId, Account> = self
            .session
            .backend
            .accounts()
            .await?
            .into_iter()
            .map(|account| (account.id, account))
            .collect();
        for (id, account) in &self.session.staged.lock().await.accounts {
            accounts.insert(*id, account.clone());
        }
        Ok(accounts
            .into_values()
            .filter(|account| !account.is_deleted())
            .collect())
    }

    async fn update(&self, mut account: Account) -> Result<Account> {
        self.get(account.id).await?;
        account.updated_at = Utc::now();
        self.session.stage_account(account.clone()).await;
        Ok(account)
    }

    async fn delete(&self, id: AccountId) -> Result<()> {
        if let Some(mut account) = self.session.find_account(id).await?
            && !account.is_deleted()
        {
            let now = Utc::now();
            account.deleted_at = Some(now);
            account.updated_at = now;
            self.session.stage_account(account).await;
        }
        Ok(())
    }
}

pub struct StagedOperationRepository<B> {
    session: Arc<Session<B>>,
}

#[async_trait]
impl<B: SessionBackend> OperationRepository for StagedOperationRepository<B> {
    async fn create(&self, operation: NewOperation) -> Result<Operation> {
        let id = self.session.backend.next_operation_id();
        let operation = operation.persist(id, Utc::now());
        self.session
            .staged
            .lock()
            .await
            .operations
            .push(operation.clone());
        Ok(operation)
    }

    async fn get(&self, id: OperationId) -> Result<Operation> {
        if let Some(op) = self.session.backend.operation(id).await? {
            return Ok(op);
        }
        self.session
            .with_staged_operations(Vec::new(), |op| op.id == id)
            .await
            .into_iter()
            .next()
            .ok_or(PaymentError::OperationNotFound(id))
    }

    async fn get_by_account(&self, id: AccountId) -> Result<Vec<Operation>> {
        let committed = self.session.backend.operations_by_account(id).await?;
        Ok(self
            .session
            .with_staged_operations(committed, |op| op.involves(id))
            .await)
    }

    async fn get_all(&self) -> Result<Vec<Operation>> {
        let committed = self.session.backend.operations().await?;
        Ok(self.session.with_staged_operations(committed, |_| true).await)
    }
}

pub struct StagedUnitOfWork<B> {
    session: Arc<Session<B>>,
    accounts: StagedAccountRepository<B>,
    operations: StagedOperationRepository<B>,
    finished: bool,
}

/// Opens a session against `backend`.
pub async fn begin<B: SessionBackend>(backend: B) -> Result<Box<dyn UnitOfWork>> {
    backend.begin().await?;
    let session = Arc::new(Session {
        backend,
        staged: Mutex::new(StagedWrites::default()),
    });
    debug!("session begun");
    Ok(Box::new(StagedUnitOfWork {
        accounts: StagedAccountRepository {
            session: Arc::clone(&session),
        },
        operations: StagedOperationRepository {
            session: Arc::clone(&session),
        },
        session,
        finished: false,
    }))
}

#[async_trait]
impl<B: SessionBackend> UnitOfWork for StagedUnitOfWork<B> {
    fn accounts(&self) -> &dyn AccountRepository {
        &self.accounts
    }

    fn operations(&self) -> &dyn OperationRepository {
        &self.operations
    }

    async fn save(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.finished = true;
        let staged = std::mem::take(&mut *this.session.staged.lock().await);
        if staged.is_empty() {
            debug!("session committed, nothing staged");
            return Ok(());
        }
        let (accounts, operations) = (staged.accounts.len(), staged.operations.len());
        this.session.backend.commit(staged).await?;
        debug!(accounts, operations, "session committed");
        Ok(())
    }

    async fn revert(self: Box<Self>) -> Result<()> {
        let mut this = self;
        this.finished = true;
        let staged = std::mem::take(&mut *this.session.staged.lock().await);
        debug!(
            accounts = staged.accounts.len(),
            operations = staged.operations.len(),
            "session rolled back"
        );
        Ok(())
    }
}

impl<B> Drop for StagedUnitOfWork<B> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("unit of work dropped without save or revert, discarding staged writes");
        }
    }
}
