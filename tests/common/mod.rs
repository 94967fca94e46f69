#![allow(dead_code)]

use async_trait::async_trait;
use payments_ledger::application::service::{BasicPaymentsService, PaymentsService};
use payments_ledger::domain::account::{Account, AccountId, Amount, Currency, NewAccount};
use payments_ledger::domain::operation::{NewOperation, Operation, OperationId};
use payments_ledger::domain::ports::{
    AccountRepository, Lock, LockFactory, OperationRepository, UnitOfWork, UnitOfWorkFactory,
};
use payments_ledger::error::{PaymentError, Result};
use payments_ledger::infrastructure::in_memory::{InMemoryLockFactory, InMemoryStore};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

pub fn usd() -> Currency {
    Currency::new("USD")
}

pub fn amount(value: Decimal) -> Amount {
    Amount::new(value).unwrap()
}

/// A service over fresh in-memory backends.
pub fn in_memory_service() -> BasicPaymentsService {
    BasicPaymentsService::new(
        Arc::new(InMemoryLockFactory::default()),
        Arc::new(InMemoryStore::new()),
    )
}

pub async fn open_funded(
    service: &dyn PaymentsService,
    name: &str,
    funds: Decimal,
) -> Account {
    let account = service.create_account(name.to_string(), usd()).await.unwrap();
    if funds > Decimal::ZERO {
        service
            .make_deposit(account.id, usd(), amount(funds))
            .await
            .unwrap();
    }
    service.get_account(account.id).await.unwrap()
}

/// Switches for failures injected into [`FaultyStore`] sessions, and counters
/// of what the sessions went through.
#[derive(Default)]
pub struct FaultSwitches {
    pub begins: AtomicUsize,
    pub saves: AtomicUsize,
    pub reverts: AtomicUsize,
    /// Account id whose `update` fails; 0 disables the fault.
    pub fail_update_of: AtomicI64,
    pub fail_operation_create: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_revert: AtomicBool,
}

impl FaultSwitches {
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn reverts(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }
}

fn injected(context: &str) -> PaymentError {
    PaymentError::store(context.to_string(), "injected failure")
}

/// In-memory store whose sessions fail on demand.
#[derive(Clone, Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    pub faults: Arc<FaultSwitches>,
}

#[async_trait]
impl UnitOfWorkFactory for FaultyStore {
    async fn make(&self) -> Result<Box<dyn UnitOfWork>> {
        self.faults.begins.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.make().await?;
        Ok(Box::new(FaultyUnitOfWork {
            inner,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct FaultyUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    faults: Arc<FaultSwitches>,
}

#[async_trait]
impl AccountRepository for FaultyUnitOfWork {
    async fn create(&self, account: NewAccount) -> Result<Account> {
        self.inner.accounts().create(account).await
    }

    async fn get(&self, id: AccountId) -> Result<Account> {
        self.inner.accounts().get(id).await
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        self.inner.accounts().get_all().await
    }

    async fn update(&self, account: Account) -> Result<Account> {
        if self.faults.fail_update_of.load(Ordering::SeqCst) == account.id {
            return Err(injected("account update"));
        }
        self.inner.accounts().update(account).await
    }

    async fn delete(&self, id: AccountId) -> Result<()> {
        self.inner.accounts().delete(id).await
    }
}

#[async_trait]
impl OperationRepository for FaultyUnitOfWork {
    async fn create(&self, operation: NewOperation) -> Result<Operation> {
        if self.faults.fail_operation_create.load(Ordering::SeqCst) {
            return Err(injected("operation insert"));
        }
        self.inner.operations().create(operation).await
    }

    async fn get(&self, id: OperationId) -> Result<Operation> {
        self.inner.operations().get(id).await
    }

    async fn get_by_account(&self, id: AccountId) -> Result<Vec<Operation>> {
        self.inner.operations().get_by_account(id).await
    }

    async fn get_all(&self) -> Result<Vec<Operation>> {
        self.inner.operations().get_all().await
    }
}

#[async_trait]
impl UnitOfWork for FaultyUnitOfWork {
    fn accounts(&self) -> &dyn AccountRepository {
        self
    }

    fn operations(&self) -> &dyn OperationRepository {
        self
    }

    async fn save(self: Box<Self>) -> Result<()> {
        let FaultyUnitOfWork { inner, faults } = *self;
        faults.saves.fetch_add(1, Ordering::SeqCst);
        if faults.fail_commit.load(Ordering::SeqCst) {
            inner.revert().await?;
            return Err(injected("commit"));
        }
        inner.save().await
    }

    async fn revert(self: Box<Self>) -> Result<()> {
        let FaultyUnitOfWork { inner, faults } = *self;
        faults.reverts.fetch_add(1, Ordering::SeqCst);
        inner.revert().await?;
        if faults.fail_revert.load(Ordering::SeqCst) {
            return Err(injected("rollback"));
        }
        Ok(())
    }
}

/// Lock factory whose locks can never be taken.
pub struct RefusingLockFactory;

struct RefusingLock(String);

#[async_trait]
impl Lock for RefusingLock {
    fn key(&self) -> &str {
        &self.0
    }

    async fn lock(&self) -> Result<()> {
        Err(PaymentError::LockAcquisitionFailed {
            key: self.0.clone(),
            reason: "coordinator unreachable".to_string(),
        })
    }

    async fn unlock(&self) -> Result<()> {
        Err(PaymentError::LockReleaseFailed {
            key: self.0.clone(),
            reason: "not held".to_string(),
        })
    }
}

impl LockFactory for RefusingLockFactory {
    fn make(&self, key: &str) -> Box<dyn Lock> {
        Box::new(RefusingLock(key.to_string()))
    }
}

/// Writes a batch file opening `accounts` USD accounts and depositing 1 into
/// the first one `deposits` times.
pub fn generate_csv(path: &Path, accounts: usize, deposits: usize) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["type", "name", "from", "to", "currency", "amount"])?;
    for i in 1..=accounts {
        wtr.write_record(["open", &format!("acc-{i}"), "", "", "USD", ""])?;
    }
    for _ in 0..deposits {
        wtr.write_record(["deposit", "", "", "1", "USD", "1.0"])?;
    }

    wtr.flush()?;
    Ok(())
}
