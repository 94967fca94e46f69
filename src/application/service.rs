use crate::domain::account::{
    Account, AccountId, Amount, Currency, NewAccount, validate_account_id,
};
use crate::domain::lock::{LockPool, lock_key};
use crate::domain::operation::{NewOperation, Operation};
use crate::domain::ports::{Lock, LockFactoryRef, UnitOfWork, UnitOfWorkFactoryRef};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Account management and money movement between accounts.
#[async_trait]
pub trait PaymentsService: Send + Sync {
    async fn create_account(&self, name: String, currency: Currency) -> Result<Account>;
    async fn get_account(&self, id: AccountId) -> Result<Account>;
    async fn get_accounts(&self) -> Result<Vec<Account>>;
    /// History of one account, oldest first. Unknown accounts have an empty history.
    async fn get_account_operations(&self, id: AccountId) -> Result<Vec<Operation>>;
    async fn make_deposit(
        &self,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation>;
    async fn make_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation>;
}

/// Wraps a service with a cross-cutting concern.
pub type Middleware =
    Box<dyn Fn(Arc<dyn PaymentsService>) -> Arc<dyn PaymentsService> + Send + Sync>;

/// Builds the basic service and wraps it with `middleware`, first entry innermost.
pub fn compose(
    locks: LockFactoryRef,
    uow: UnitOfWorkFactoryRef,
    middleware: Vec<Middleware>,
) -> Arc<dyn PaymentsService> {
    let basic: Arc<dyn PaymentsService> = Arc::new(BasicPaymentsService::new(locks, uow));
    middleware.iter().fold(basic, |service, wrap| wrap(service))
}

/// The service proper.
///
/// Every call runs in its own unit of work. Balance-changing calls first take
/// one lock per involved account, in ascending id order, and hold them until
/// the unit of work is committed or reverted.
pub struct BasicPaymentsService {
    locks: LockFactoryRef,
    uow: UnitOfWorkFactoryRef,
}

impl BasicPaymentsService {
    pub fn new(locks: LockFactoryRef, uow: UnitOfWorkFactoryRef) -> Self {
        Self { locks, uow }
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        self.uow
            .make()
            .await
            .map_err(|e| e.context("uow context creating"))
    }

    async fn guarded(&self, ids: &[AccountId]) -> Result<LockPool> {
        let pool = LockPool::for_accounts(self.locks.as_ref(), ids);
        pool.lock()
            .await
            .map_err(|e| e.context(format!("accounts ({})", lock_key(ids))))?;
        Ok(pool)
    }

    async fn deposit_in(
        uow: &dyn UnitOfWork,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation> {
        let mut account = uow
            .accounts()
            .get(to)
            .await
            .map_err(|e| e.context(format!("account ({to}) getting")))?;
        account.ensure_currency(&currency)?;
        account.deposit(amount)?;
        uow.accounts()
            .update(account)
            .await
            .map_err(|e| e.context(format!("account ({to}) update")))?;

        uow.operations()
            .create(NewOperation::deposit(to, currency, amount)?)
            .await
            .map_err(|e| e.context("deposit operation creating"))
    }

    async fn transfer_in(
        uow: &dyn UnitOfWork,
        from: AccountId,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation> {
        let mut source = uow
            .accounts()
            .get(from)
            .await
            .map_err(|e| e.context(format!("account ({from}) getting")))?;
        let mut target = uow
            .accounts()
            .get(to)
            .await
            .map_err(|e| e.context(format!("account ({to}) getting")))?;
        source.ensure_currency(&currency)?;
        target.ensure_currency(&currency)?;

        source.withdraw(amount)?;
        target.deposit(amount)?;

        uow.accounts()
            .update(source)
            .await
            .map_err(|e| e.context(format!("account ({from}) update")))?;
        uow.accounts()
            .update(target)
            .await
            .map_err(|e| e.context(format!("account ({to}) update")))?;

        uow.operations()
            .create(NewOperation::transfer(from, to, currency, amount)?)
            .await
            .map_err(|e| e.context("transfer operation creating"))
    }
}

/// Ends the unit of work: commit on success, roll back on failure.
async fn finish<T>(uow: Box<dyn UnitOfWork>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            uow.save().await.map_err(|e| e.context("uow committing"))?;
            Ok(value)
        }
        Err(err) => match uow.revert().await {
            Ok(()) => Err(err),
            Err(revert_err) => Err(PaymentError::store(
                format!("rolling back after \"{err}\""),
                revert_err,
            )),
        },
    }
}

/// Lock release after the work is done never changes the outcome.
async fn release(lock: &LockPool) {
    if let Err(err) = lock.unlock().await {
        warn!(key = lock.key(), error = %err, "releasing account locks failed");
    }
}

#[async_trait]
impl PaymentsService for BasicPaymentsService {
    async fn create_account(&self, name: String, currency: Currency) -> Result<Account> {
        let uow = self.begin().await?;
        let result = uow
            .accounts()
            .create(NewAccount { name, currency })
            .await
            .map_err(|e| e.context("account creating"));
        finish(uow, result).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        let uow = self.begin().await?;
        let result = uow
            .accounts()
            .get(id)
            .await
            .map_err(|e| e.context(format!("account ({id}) getting")));
        finish(uow, result).await
    }

    async fn get_accounts(&self) -> Result<Vec<Account>> {
        let uow = self.begin().await?;
        let result = uow
            .accounts()
            .get_all()
            .await
            .map_err(|e| e.context("accounts getting"));
        finish(uow, result).await
    }

    async fn get_account_operations(&self, id: AccountId) -> Result<Vec<Operation>> {
        let uow = self.begin().await?;
        let result = uow
            .operations()
            .get_by_account(id)
            .await
            .map_err(|e| e.context(format!("account ({id}) operations getting")));
        finish(uow, result).await
    }

    async fn make_deposit(
        &self,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation> {
        validate_account_id(to)?;

        let lock = self.guarded(&[to]).await?;
        let result = match self.begin().await {
            Ok(uow) => {
                let result = Self::deposit_in(uow.as_ref(), to, currency, amount).await;
                finish(uow, result).await
            }
            Err(err) => Err(err),
        };
        release(&lock).await;

        if let Ok(operation) = &result {
            debug!(operation = operation.id, to, %amount, "deposit recorded");
        }
        result
    }

    async fn make_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation> {
        validate_account_id(from)?;
        validate_account_id(to)?;
        if from == to {
            return Err(PaymentError::ValidationError(format!(
                "cannot transfer from account ({from}) to itself"
            )));
        }

        let lock = self.guarded(&[from, to]).await?;
        let result = match self.begin().await {
            Ok(uow) => {
                let result = Self::transfer_in(uow.as_ref(), from, to, currency, amount).await;
                finish(uow, result).await
            }
            Err(err) => Err(err),
        };
        release(&lock).await;

        if let Ok(operation) = &result {
            debug!(operation = operation.id, from, to, %amount, "transfer recorded");
        }
        result
    }
}
