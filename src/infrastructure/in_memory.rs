use super::staged::{self, SessionBackend, StagedWrites};
use crate::config::LockConfig;
use crate::domain::account::{Account, AccountId};
use crate::domain::operation::{Operation, OperationId};
use crate::domain::ports::{Lock, LockFactory, UnitOfWork, UnitOfWorkFactory};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct Ledger {
    accounts: BTreeMap<AccountId, Account>,
    operations: BTreeMap<OperationId, Operation>,
}

/// A thread-safe in-memory ledger store.
///
/// Sessions buffer their writes and apply them under one write lock on
/// `save`, so a committed unit of work is visible all at once or not at all.
/// Ideal for testing; `Clone` shares the underlying state.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    ledger: Arc<RwLock<Ledger>>,
    account_seq: Arc<AtomicI64>,
    operation_seq: Arc<AtomicI64>,
    offline: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, opening a session fails the way an unreachable database would.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionBackend for InMemoryStore {
    async fn begin(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PaymentError::begin_failed("in-memory store is offline"));
        }
        Ok(())
    }

    fn next_account_id(&self) -> AccountId {
        self.account_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_operation_id(&self) -> OperationId {
        self.operation_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.ledger.read().await.accounts.get(&id).cloned())
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.ledger.read().await.accounts.values().cloned().collect())
    }

    async fn operation(&self, id: OperationId) -> Result<Option<Operation>> {
        Ok(self.ledger.read().await.operations.get(&id).cloned())
    }

    async fn operations_by_account(&self, id: AccountId) -> Result<Vec<Operation>> {
        Ok(self
            .ledger
            .read()
            .await
            .operations
            .values()
            .filter(|op| op.involves(id))
            .cloned()
            .collect())
    }

    async fn operations(&self) -> Result<Vec<Operation>> {
        Ok(self.ledger.read().await.operations.values().cloned().collect())
    }

    async fn commit(&self, writes: StagedWrites) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        ledger.accounts.extend(writes.accounts);
        ledger
            .operations
            .extend(writes.operations.into_iter().map(|op| (op.id, op)));
        Ok(())
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    async fn make(&self) -> Result<Box<dyn UnitOfWork>> {
        staged::begin(self.clone()).await
    }
}

type MutexRegistry = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Process-local stand-in for a distributed lock coordinator.
///
/// Every lock made for the same key shares one async mutex, so contention
/// behaves like it would against a real coordinator within one process. A
/// key's mutex is forgotten once the last lock made for it is dropped.
#[derive(Default, Clone)]
pub struct InMemoryLockFactory {
    mutexes: MutexRegistry,
    config: LockConfig,
}

impl InMemoryLockFactory {
    pub fn new(config: LockConfig) -> Self {
        Self {
            mutexes: Arc::default(),
            config,
        }
    }
}

impl LockFactory for InMemoryLockFactory {
    fn make(&self, key: &str) -> Box<dyn Lock> {
        let mutex = self
            .mutexes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();
        Box::new(InMemoryLock {
            key: key.to_string(),
            mutex,
            registry: Arc::clone(&self.mutexes),
            held: Mutex::new(None),
            timeout: self.config.acquire_budget(),
        })
    }
}

pub struct InMemoryLock {
    key: String,
    mutex: Arc<Mutex<()>>,
    registry: MutexRegistry,
    held: Mutex<Option<OwnedMutexGuard<()>>>,
    timeout: Duration,
}

impl Drop for InMemoryLock {
    fn drop(&mut self) {
        drop(self.held.get_mut().take());
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // the registry and this lock are the only owners left
        if Arc::strong_count(&self.mutex) == 2 {
            registry.remove(&self.key);
        }
    }
}

#[async_trait]
impl Lock for InMemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&self) -> Result<()> {
        let guard = tokio::time::timeout(self.timeout, Arc::clone(&self.mutex).lock_owned())
            .await
            .map_err(|_| PaymentError::LockAcquisitionFailed {
                key: self.key.clone(),
                reason: format!("timed out after {:?}", self.timeout),
            })?;
        *self.held.lock().await = Some(guard);
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        match self.held.lock().await.take() {
            Some(guard) => {
                drop(guard);
                Ok(())
            }
            None => Err(PaymentError::LockReleaseFailed {
                key: self.key.clone(),
                reason: "lock is not held".to_string(),
            }),
        }
    }
}
