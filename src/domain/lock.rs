use super::account::AccountId;
use super::ports::{Lock, LockFactory};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const ACCOUNT_LOCK_PREFIX: &str = "payments:account:";

pub fn account_lock_key(id: AccountId) -> String {
    format!("{ACCOUNT_LOCK_PREFIX}{id}")
}

/// Sorted, deduplicated ids joined with `:`.
pub fn lock_key(ids: &[AccountId]) -> String {
    sorted_unique(ids)
        .iter()
        .map(AccountId::to_string)
        .collect::<Vec<_>>()
        .join(":")
}

fn sorted_unique(ids: &[AccountId]) -> Vec<AccountId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Time left on a lease taken `elapsed` ago, less an allowance for clock drift.
fn remaining_validity(lease: Duration, elapsed: Duration) -> Duration {
    let drift = lease / 100 + Duration::from_millis(2);
    lease.saturating_sub(elapsed + drift)
}

/// Several locks acting as one.
///
/// Constituents are acquired in the order given and a failed acquisition
/// releases whatever was already held, so a pool is either fully held or not
/// held at all.
///
/// With leased locks the first lease keeps running while later constituents
/// are awaited. The pool is only considered held if at least half of that
/// lease is still left once the last lock is taken.
pub struct LockPool {
    key: String,
    locks: Vec<Box<dyn Lock>>,
    lease: Option<Duration>,
}

impl LockPool {
    pub fn new(locks: Vec<Box<dyn Lock>>) -> Self {
        let key = locks
            .iter()
            .map(|lock| lock.key())
            .collect::<Vec<_>>()
            .join(",");
        Self {
            key,
            locks,
            lease: None,
        }
    }

    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease;
        self
    }

    /// One lock per account, in ascending id order.
    ///
    /// Every caller touching an overlapping set of accounts requests the
    /// shared locks in the same global order, so two pools can never each
    /// hold a lock the other is waiting on.
    pub fn for_accounts(factory: &dyn LockFactory, ids: &[AccountId]) -> Self {
        let locks = sorted_unique(ids)
            .into_iter()
            .map(|id| factory.make(&account_lock_key(id)))
            .collect();
        Self::new(locks).with_lease(factory.lease())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Releases the first `count` constituents, newest first.
    async fn release_held(&self, count: usize) {
        for held in self.locks[..count].iter().rev() {
            if let Err(release_err) = held.unlock().await {
                warn!(
                    key = held.key(),
                    error = %release_err,
                    "releasing partially acquired pool failed"
                );
            }
        }
    }
}

#[async_trait]
impl Lock for LockPool {
    fn key(&self) -> &str {
        &self.key
    }

    async fn lock(&self) -> Result<()> {
        let mut first_taken = None;
        for (position, lock) in self.locks.iter().enumerate() {
            if let Err(err) = lock.lock().await {
                self.release_held(position).await;
                return Err(err);
            }
            first_taken.get_or_insert_with(Instant::now);
        }

        if let (Some(lease), Some(since)) = (self.lease, first_taken) {
            let elapsed = since.elapsed();
            if remaining_validity(lease, elapsed) < lease / 2 {
                self.release_held(self.locks.len()).await;
                return Err(PaymentError::LockAcquisitionFailed {
                    key: self.key.clone(),
                    reason: format!("{elapsed:?} of a {lease:?} lease spent acquiring"),
                });
            }
        }
        debug!(key = %self.key, "lock pool acquired");
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        let mut first_error = None;
        for lock in &self.locks {
            if let Err(err) = lock.unlock().await {
                warn!(key = lock.key(), error = %err, "lock release failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
