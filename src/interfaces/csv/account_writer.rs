use crate::domain::account::{Account, AccountId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 4] = ["id", "name", "currency", "balance"];

#[derive(Serialize)]
struct AccountRow<'a> {
    id: AccountId,
    name: &'a str,
    currency: &'a str,
    balance: Decimal,
}

/// Writes account state as CSV, one row per account.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    /// Writes the header, then every account in the order given.
    ///
    /// Balances are normalized, so `70.00` is written as `70`.
    pub fn write_accounts<'a>(
        &mut self,
        accounts: impl IntoIterator<Item = &'a Account>,
    ) -> Result<()> {
        self.writer.write_record(HEADER)?;
        for account in accounts {
            self.writer.serialize(AccountRow {
                id: account.id,
                name: &account.name,
                currency: account.currency.as_str(),
                balance: account.balance.value().normalize(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
