use super::staged::{self, SessionBackend, StagedWrites};
use crate::domain::account::{Account, AccountId};
use crate::domain::operation::{Operation, OperationId, sort_history};
use crate::domain::ports::{UnitOfWork, UnitOfWorkFactory};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Column Family for storing account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing operations with their transactions.
pub const CF_OPERATIONS: &str = "operations";
/// Column Family indexing operations by participant: `account_id ++ operation_id`.
pub const CF_ACCOUNT_OPERATIONS: &str = "account_operations";

const COLUMN_FAMILIES: [&str; 3] = [CF_ACCOUNTS, CF_OPERATIONS, CF_ACCOUNT_OPERATIONS];

fn id_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn index_key(account: AccountId, operation: OperationId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&account.to_be_bytes());
    key[8..].copy_from_slice(&operation.to_be_bytes());
    key
}

/// A persistent ledger store backed by RocksDB.
///
/// Accounts and operations live in separate Column Families as JSON. A
/// session's writes are collected into one `WriteBatch`, which RocksDB applies
/// atomically. Ids come from in-process sequences seeded from the highest key
/// on open; RocksDB only allows one process to open a database at a time.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    account_seq: Arc<AtomicI64>,
    operation_seq: Arc<AtomicI64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .map_err(|e| PaymentError::store("opening RocksDB", e))?;

        let store = Self {
            db: Arc::new(db),
            account_seq: Arc::default(),
            operation_seq: Arc::default(),
        };
        store
            .account_seq
            .store(store.last_id(CF_ACCOUNTS)?, Ordering::SeqCst);
        store
            .operation_seq
            .store(store.last_id(CF_OPERATIONS)?, Ordering::SeqCst);
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::store(
                format!("{name} column family"),
                std::io::Error::other("column family not found"),
            )
        })
    }

    fn last_id(&self, name: &str) -> Result<i64> {
        let cf = self.cf(name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item.map_err(|e| PaymentError::store("RocksDB iteration", e))?;
                let bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                    PaymentError::store(
                        format!("{name} key"),
                        std::io::Error::new(std::io::ErrorKind::InvalidData, "key is not 8 bytes"),
                    )
                })?;
                Ok(i64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    fn read<T: DeserializeOwned>(&self, name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        let result = self
            .db
            .get_cf(cf, key)
            .map_err(|e| PaymentError::store(format!("reading {name}"), e))?;

        result
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(|e| PaymentError::store(format!("deserializing {name}"), e))
    }

    fn read_all<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| PaymentError::store("RocksDB iteration", e))?;
            values.push(
                serde_json::from_slice(&value)
                    .map_err(|e| PaymentError::store(format!("deserializing {name}"), e))?,
            );
        }
        Ok(values)
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(name)?;
        let value = serde_json::to_vec(value)
            .map_err(|e| PaymentError::store(format!("serializing {name}"), e))?;
        batch.put_cf(cf, key, value);
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for RocksDBStore {
    async fn begin(&self) -> Result<()> {
        for name in COLUMN_FAMILIES {
            self.cf(name)
                .map_err(|e| PaymentError::begin_failed(e.to_string()))?;
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
        self.read(CF_ACCOUNTS, &id_key(id))
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        self.read_all(CF_ACCOUNTS)
    }

    async fn operation(&self, id: OperationId) -> Result<Option<Operation>> {
        self.read(CF_OPERATIONS, &id_key(id))
    }

    async fn operations_by_account(&self, id: AccountId) -> Result<Vec<Operation>> {
        let index = self.cf(CF_ACCOUNT_OPERATIONS)?;
        let prefix = id_key(id);
        let mut operations: Vec<Operation> = Vec::new();
        let iter = self
            .db
            .iterator_cf(index, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item.map_err(|e| PaymentError::store("RocksDB iteration", e))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let operation_id = &key[8..];
            let operation = self.read(CF_OPERATIONS, operation_id)?.ok_or_else(|| {
                PaymentError::store(
                    format!("account ({id}) operation index"),
                    std::io::Error::other("indexed operation is missing"),
                )
            })?;
            operations.push(operation);
        }
        sort_history(&mut operations);
        Ok(operations)
    }

    async fn operations(&self) -> Result<Vec<Operation>> {
        let mut operations: Vec<Operation> = self.read_all(CF_OPERATIONS)?;
        sort_history(&mut operations);
        Ok(operations)
    }

    async fn commit(&self, writes: StagedWrites) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (id, account) in &writes.accounts {
            self.put(&mut batch, CF_ACCOUNTS, &id_key(*id), account)?;
        }
        for operation in &writes.operations {
            self.put(&mut batch, CF_OPERATIONS, &id_key(operation.id), operation)?;
            let index = self.cf(CF_ACCOUNT_OPERATIONS)?;
            for participant in &operation.participants {
                batch.put_cf(index, index_key(*participant, operation.id), b"");
            }
        }
        self.db
            .write(batch)
            .map_err(|e| PaymentError::store("committing session", e))
    }
}

#[async_trait]
impl UnitOfWorkFactory for RocksDBStore {
    async fn make(&self) -> Result<Box<dyn UnitOfWork>> {
        staged::begin(self.clone()).await
    }
}
