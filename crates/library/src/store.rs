use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{now_secs, Collection, Record};
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition,
    TableError, TransactionError,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const RECORDS_BY_EXTERNAL_ID_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("records_by_external_id");
const COLLECTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("collections");
const OWNER_COLLECTIONS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("owner_collections");

const KEY_SEP: char = '\x1f';

/// redb-backed persistence for records and collections.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let store = Self::new(Arc::new(open_or_create_db(path)?));
        store.init_tables()?;
        Ok(store)
    }

    pub fn init_tables(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS_TABLE)?;
            let _ = write_txn.open_table(RECORDS_BY_EXTERNAL_ID_TABLE)?;
            let _ = write_txn.open_table(COLLECTIONS_TABLE)?;
            let _ = write_txn.open_table(OWNER_COLLECTIONS_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_record(&self, record_id: &str) -> Result<Option<Record>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(RECORDS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record = match table.get(record_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(record)
    }

    pub fn find_record_by_external_id(
        &self,
        external_catalog_id: &str,
    ) -> Result<Option<Record>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let index = match read_txn.open_table(RECORDS_BY_EXTERNAL_ID_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record_id = match index.get(external_catalog_id)? {
            Some(value) => value.value().to_string(),
            None => return Ok(None),
        };
        let records = read_txn.open_table(RECORDS_TABLE)?;
        let record = match records.get(record_id.as_str())? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Inserts `record` unless its external catalog id is already indexed.
    ///
    /// Returns the stored record and whether it was newly inserted. The check
    /// and the insert share one write transaction, so the external id stays
    /// unique even when two ingestions race.
    pub fn insert_record_unique(&self, record: Record) -> Result<(Record, bool), StoreError> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut index = write_txn.open_table(RECORDS_BY_EXTERNAL_ID_TABLE)?;
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let existing_id = index
                .get(record.external_catalog_id.as_str())?
                .map(|value| value.value().to_string());
            let existing = match existing_id {
                Some(existing_id) => match records.get(existing_id.as_str())? {
                    Some(value) => Some(decode_value::<Record>(value.value())?),
                    None => None,
                },
                None => None,
            };
            match existing {
                Some(existing) => (existing, false),
                None => {
                    let bytes = encode_value(&record)?;
                    records.insert(record.id.as_str(), bytes.as_slice())?;
                    index.insert(record.external_catalog_id.as_str(), record.id.as_str())?;
                    (record, true)
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Loads records in the order of `record_ids`, skipping ids that no
    /// longer resolve.
    pub fn get_records(&self, record_ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(RECORDS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::with_capacity(record_ids.len());
        for record_id in record_ids {
            if let Some(value) = table.get(record_id.as_str())? {
                records.push(decode_value(value.value())?);
            }
        }
        Ok(records)
    }

    pub fn create_collection(&self, owner: &str, name: String) -> Result<Collection, StoreError> {
        let now = now_secs();
        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            name,
            description: None,
            genre: Vec::new(),
            mood: Vec::new(),
            records: Vec::new(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
        };
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(COLLECTIONS_TABLE)?;
            let mut owners = write_txn.open_table(OWNER_COLLECTIONS_TABLE)?;
            let bytes = encode_value(&collection)?;
            table.insert(collection.id.as_str(), bytes.as_slice())?;
            let key = owner_key(owner, &collection.id);
            owners.insert(key.as_str(), collection.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(collection)
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<Option<Collection>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(COLLECTIONS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let collection = match table.get(collection_id)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(collection)
    }

    /// Collections owned by `owner`, newest first.
    pub fn list_collections(&self, owner: &str) -> Result<Vec<Collection>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let owners = match read_txn.open_table(OWNER_COLLECTIONS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let table = read_txn.open_table(COLLECTIONS_TABLE)?;

        let prefix = prefix_key(owner);
        let mut end = prefix.clone();
        end.push('\u{10ffff}');
        let mut collections = Vec::new();
        for entry in owners.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            if let Some(value) = table.get(entry.1.value())? {
                let collection: Collection = decode_value(value.value())?;
                collections.push(collection);
            }
        }
        collections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(collections)
    }

    /// Overwrites a stored collection. Returns `false` if it was deleted in
    /// the meantime, in which case nothing is written.
    pub fn save_collection(&self, collection: &Collection) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let saved = {
            let mut table = write_txn.open_table(COLLECTIONS_TABLE)?;
            let exists = table.get(collection.id.as_str())?.is_some();
            if exists {
                let bytes = encode_value(collection)?;
                table.insert(collection.id.as_str(), bytes.as_slice())?;
            }
            exists
        };
        write_txn.commit()?;
        Ok(saved)
    }

    pub fn delete_collection(&self, collection_id: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(COLLECTIONS_TABLE)?;
            let mut owners = write_txn.open_table(OWNER_COLLECTIONS_TABLE)?;
            let removed = table
                .remove(collection_id)?
                .map(|value| decode_value::<Collection>(value.value()))
                .transpose()?;
            match removed {
                Some(collection) => {
                    let key = owner_key(&collection.owner, &collection.id);
                    owners.remove(key.as_str())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}

pub fn open_or_create_db(path: &Path) -> Result<Database, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Database(DatabaseError),
    Table(TableError),
    Transaction(TransactionError),
    Storage(StorageError),
    Commit(CommitError),
    Bincode(Box<bincode::ErrorKind>),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        StoreError::Database(err)
    }
}

impl From<TableError> for StoreError {
    fn from(err: TableError) -> Self {
        StoreError::Table(err)
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        StoreError::Transaction(err)
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Storage(err)
    }
}

impl From<CommitError> for StoreError {
    fn from(err: CommitError) -> Self {
        StoreError::Commit(err)
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        StoreError::Bincode(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "io error: {}", err),
            StoreError::Database(err) => write!(f, "redb database error: {}", err),
            StoreError::Table(err) => write!(f, "redb table error: {}", err),
            StoreError::Transaction(err) => write!(f, "redb transaction error: {}", err),
            StoreError::Storage(err) => write!(f, "redb storage error: {}", err),
            StoreError::Commit(err) => write!(f, "redb commit error: {}", err),
            StoreError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Database(err) => Some(err),
            StoreError::Table(err) => Some(err),
            StoreError::Transaction(err) => Some(err),
            StoreError::Storage(err) => Some(err),
            StoreError::Commit(err) => Some(err),
            StoreError::Bincode(err) => Some(err),
        }
    }
}

fn owner_key(owner: &str, collection_id: &str) -> String {
    let mut out = prefix_key(owner);
    out.push_str(collection_id);
    out
}

fn prefix_key(prefix: &str) -> String {
    let mut out = String::new();
    out.push_str(prefix);
    out.push(KEY_SEP);
    out
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}
