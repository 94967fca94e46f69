use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

pub type AccountId = i64;

/// Reserved id standing for money entering the ledger from outside.
///
/// It never has a materialized account row.
pub const WORLD_ACCOUNT_ID: AccountId = -1;

/// Rejects ids that cannot name a real account, the world account included.
pub fn validate_account_id(id: AccountId) -> Result<AccountId> {
    if id == WORLD_ACCOUNT_ID {
        Err(PaymentError::ValidationError(
            "the world account cannot be used directly".to_string(),
        ))
    } else if id <= 0 {
        Err(PaymentError::ValidationError(format!(
            "account id must be positive, got {id}"
        )))
    } else {
        Ok(id)
    }
}

/// Opaque currency code, compared for exact equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Represents a monetary value held by an account.
///
/// This is a wrapper around `rust_decimal::Decimal` so balance arithmetic is
/// always exact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// Represents a positive monetary amount moved by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Keeps `result` only if nothing was rounded away.
///
/// `rust_decimal` drops fractional digits instead of failing once a result no
/// longer fits its 96-bit mantissa, which shows up as a scale below the
/// operands'.
fn exact(result: Option<Decimal>, lhs: Decimal, rhs: Decimal) -> Option<Decimal> {
    result.filter(|value| value.scale() >= lhs.scale().max(rhs.scale()))
}

impl Balance {
    /// `None` on overflow or when the sum cannot be represented exactly.
    pub fn checked_add(self, amount: Amount) -> Option<Self> {
        exact(self.0.checked_add(amount.0), self.0, amount.0).map(Self)
    }

    /// `None` on overflow or when the difference cannot be represented exactly.
    pub fn checked_sub(self, amount: Amount) -> Option<Self> {
        exact(self.0.checked_sub(amount.0), self.0, amount.0).map(Self)
    }
}

/// Fields supplied by a caller opening an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub currency: Currency,
}

/// A ledger account.
///
/// Balances only change through [`Account::deposit`] and [`Account::withdraw`],
/// and only inside a unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub currency: Currency,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Builds a freshly persisted account with zero balance.
    pub fn open(id: AccountId, new: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            currency: new.currency,
            balance: Balance::ZERO,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Fails with `DifferentCurrencies` unless the account holds `currency`.
    pub fn ensure_currency(&self, currency: &Currency) -> Result<()> {
        if &self.currency == currency {
            Ok(())
        } else {
            Err(PaymentError::DifferentCurrencies {
                account: self.id,
                requested: currency.clone(),
                held: self.currency.clone(),
            })
        }
    }

    fn out_of_range(&self, amount: Amount) -> PaymentError {
        PaymentError::BalanceOutOfRange {
            account: self.id,
            balance: self.balance.value(),
            amount: amount.value(),
        }
    }

    /// Credits the balance, leaving it untouched if the result would not be exact.
    pub fn deposit(&mut self, amount: Amount) -> Result<()> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| self.out_of_range(amount))?;
        Ok(())
    }

    /// Debits the balance if it covers `amount`, leaving it untouched otherwise.
    pub fn withdraw(&mut self, amount: Amount) -> Result<()> {
        if self.balance < Balance::from(amount) {
            return Err(PaymentError::BalanceTooLow {
                account: self.id,
                balance: self.balance.value(),
                requested: amount.value(),
            });
        }
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| self.out_of_range(amount))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd_account(balance: Decimal) -> Account {
        let mut account = Account::open(
            1,
            NewAccount {
                name: "alice".to_string(),
                currency: Currency::new("USD"),
            },
            Utc::now(),
        );
        account.balance = Balance::new(balance);
        account
    }

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
        let amount: Amount = serde_json::from_str("\"2.50\"").unwrap();
        assert_eq!(amount.value(), dec!(2.50));
    }

    #[test]
    fn test_validate_account_id() {
        assert_eq!(validate_account_id(3).unwrap(), 3);
        assert!(validate_account_id(WORLD_ACCOUNT_ID).is_err());
        assert!(validate_account_id(0).is_err());
    }

    #[test]
    fn test_open_starts_at_zero() {
        let account = usd_account(Decimal::ZERO);
        assert_eq!(account.balance, Balance::ZERO);
        assert_eq!(account.created_at, account.updated_at);
        assert!(!account.is_deleted());
    }

    #[test]
    fn test_account_deposit_is_exact() {
        let mut account = usd_account(dec!(0.1));
        account.deposit(Amount::new(dec!(0.2)).unwrap()).unwrap();
        assert_eq!(account.balance, Balance::new(dec!(0.3)));
    }

    #[test]
    fn test_deposit_refuses_rounding() {
        let mut account = usd_account(dec!(100000000000000000000));
        let result = account.deposit(Amount::new(dec!(0.0000000001)).unwrap());

        assert!(matches!(
            result,
            Err(PaymentError::BalanceOutOfRange { account: 1, .. })
        ));
        assert_eq!(account.balance, Balance::new(dec!(100000000000000000000)));
    }

    #[test]
    fn test_deposit_refuses_overflow() {
        let mut account = usd_account(Decimal::MAX);
        assert!(matches!(
            account.deposit(Amount::new(dec!(1)).unwrap()),
            Err(PaymentError::BalanceOutOfRange { .. })
        ));
        assert_eq!(account.balance, Balance::new(Decimal::MAX));
    }

    #[test]
    fn test_withdraw_refuses_rounding() {
        let mut account = usd_account(dec!(100000000000000000000));
        let result = account.withdraw(Amount::new(dec!(0.0000000001)).unwrap());

        assert!(matches!(result, Err(PaymentError::BalanceOutOfRange { .. })));
        assert_eq!(account.balance, Balance::new(dec!(100000000000000000000)));
    }

    #[test]
    fn test_checked_arithmetic_keeps_scale() {
        let balance = Balance::new(dec!(1.10));
        let sum = balance.checked_add(Amount::new(dec!(2.005)).unwrap()).unwrap();
        assert_eq!(sum.value(), dec!(3.105));
        assert_eq!(sum.value().scale(), 3);
        let difference = sum.checked_sub(Amount::new(dec!(3.105)).unwrap()).unwrap();
        assert_eq!(difference, Balance::ZERO);
    }

    #[test]
    fn test_account_withdraw_insufficient() {
        let mut account = usd_account(dec!(10.0));

        let result = account.withdraw(Amount::new(dec!(20.0)).unwrap());
        assert!(matches!(
            result,
            Err(PaymentError::BalanceTooLow { account: 1, .. })
        ));
        assert_eq!(account.balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_account_withdraw_full_balance() {
        let mut account = usd_account(dec!(15));
        account.withdraw(Amount::new(dec!(15)).unwrap()).unwrap();
        assert_eq!(account.balance, Balance::ZERO);
    }

    #[test]
    fn test_currency_guard() {
        let account = usd_account(Decimal::ZERO);
        assert!(account.ensure_currency(&Currency::new("USD")).is_ok());
        // no normalization
        assert!(matches!(
            account.ensure_currency(&Currency::new("usd")),
            Err(PaymentError::DifferentCurrencies { .. })
        ));
    }
}
