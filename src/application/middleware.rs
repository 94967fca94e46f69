//! Decorators adding cross-cutting behavior around a [`PaymentsService`].

use super::service::{Middleware, PaymentsService};
use crate::domain::account::{Account, AccountId, Amount, Currency};
use crate::domain::operation::Operation;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span};

/// Emits one `tracing` event per call with its outcome and duration.
///
/// Domain rejections are logged at `info`, infrastructure failures at `error`.
pub struct LoggingMiddleware {
    next: Arc<dyn PaymentsService>,
}

impl LoggingMiddleware {
    pub fn new(next: Arc<dyn PaymentsService>) -> Self {
        Self { next }
    }

    pub fn layer() -> Middleware {
        Box::new(|next: Arc<dyn PaymentsService>| -> Arc<dyn PaymentsService> {
            Arc::new(LoggingMiddleware::new(next))
        })
    }
}

async fn observe<T, F>(method: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
{
    let started = Instant::now();
    let result = call.await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    match &result {
        Ok(_) => info!(method, elapsed_ms, "call succeeded"),
        Err(err) if err.is_domain() => {
            info!(method, elapsed_ms, kind = err.kind(), error = %err, "call rejected")
        }
        Err(err) => error!(method, elapsed_ms, kind = err.kind(), error = %err, "call failed"),
    }
    result
}

#[async_trait]
impl PaymentsService for LoggingMiddleware {
    async fn create_account(&self, name: String, currency: Currency) -> Result<Account> {
        let span = info_span!("create_account", name = %name, currency = %currency);
        observe("create_account", self.next.create_account(name, currency))
            .instrument(span)
            .await
    }

    async fn get_account(&self, id: AccountId) -> Result<Account> {
        observe("get_account", self.next.get_account(id))
            .instrument(info_span!("get_account", id))
            .await
    }

    async fn get_accounts(&self) -> Result<Vec<Account>> {
        observe("get_accounts", self.next.get_accounts())
            .instrument(info_span!("get_accounts"))
            .await
    }

    async fn get_account_operations(&self, id: AccountId) -> Result<Vec<Operation>> {
        observe(
            "get_account_operations",
            self.next.get_account_operations(id),
        )
        .instrument(info_span!("get_account_operations", id))
        .await
    }

    async fn make_deposit(
        &self,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation> {
        let span = info_span!("make_deposit", to, currency = %currency, amount = %amount);
        observe("make_deposit", self.next.make_deposit(to, currency, amount))
            .instrument(span)
            .await
    }

    async fn make_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Operation> {
        let span = info_span!("make_transfer", from, to, currency = %currency, amount = %amount);
        observe(
            "make_transfer",
            self.next.make_transfer(from, to, currency, amount),
        )
        .instrument(span)
        .await
    }
}
