use crate::application::service::PaymentsService;
use crate::domain::account::{AccountId, Amount, Currency};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum CommandType {
    Open,
    Deposit,
    Transfer,
}

/// One CSV row as written; which columns are required depends on `type`.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    #[serde(rename = "type")]
    kind: CommandType,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    from: Option<AccountId>,
    #[serde(default)]
    to: Option<AccountId>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    amount: Option<Decimal>,
}

/// A ledger command read from a batch file.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open {
        name: String,
        currency: Currency,
    },
    Deposit {
        to: AccountId,
        currency: Currency,
        amount: Amount,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        currency: Currency,
        amount: Amount,
    },
}

fn required<T>(value: Option<T>, column: &str, kind: CommandType) -> Result<T> {
    value.ok_or_else(|| {
        PaymentError::ValidationError(format!("{kind:?} command is missing `{column}`"))
    })
}

impl TryFrom<CommandRecord> for Command {
    type Error = PaymentError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let kind = record.kind;
        let currency = Currency::new(required(record.currency, "currency", kind)?);
        match kind {
            CommandType::Open => Ok(Self::Open {
                name: required(record.name, "name", kind)?,
                currency,
            }),
            CommandType::Deposit => Ok(Self::Deposit {
                to: required(record.to, "to", kind)?,
                currency,
                amount: Amount::new(required(record.amount, "amount", kind)?)?,
            }),
            CommandType::Transfer => Ok(Self::Transfer {
                from: required(record.from, "from", kind)?,
                to: required(record.to, "to", kind)?,
                currency,
                amount: Amount::new(required(record.amount, "amount", kind)?)?,
            }),
        }
    }
}

impl Command {
    /// Runs the command against `service`.
    pub async fn apply(self, service: &dyn PaymentsService) -> Result<()> {
        match self {
            Self::Open { name, currency } => {
                service.create_account(name, currency).await?;
            }
            Self::Deposit {
                to,
                currency,
                amount,
            } => {
                service.make_deposit(to, currency, amount).await?;
            }
            Self::Transfer {
                from,
                to,
                currency,
                amount,
            } => {
                service.make_transfer(from, to, currency, amount).await?;
            }
        }
        Ok(())
    }
}

/// Reads ledger commands from a CSV source.
///
/// Expects the header `type, name, from, to, currency, amount`. Whitespace is
/// trimmed and short records are accepted; a row that is malformed or lacks a
/// column its command needs yields an `Err` item without ending the stream.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and validates commands, one per row.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(Command::try_from))
    }
}
