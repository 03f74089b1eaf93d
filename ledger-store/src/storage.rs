//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `users` - Users (key: user_id)
//! - `items` - Items (key: item_id)
//! - `listings` - Active listings (key: listing_id)
//! - `cart_entries` - Cart entries (key: buyer_id || listing_id)
//! - `transactions` - Checkout transactions (key: transaction_id)
//! - `ownership_records` - Ownership history rows (key: record_id)
//! - `indices` - Secondary indices, one tag byte per index
//!
//! # Atomicity
//!
//! Mutations are staged in a [`WriteSet`] and committed as a single
//! `WriteBatch`: either every staged put/delete becomes visible or none does.

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    types::{
        CartEntry, Item, ItemId, Listing, ListingId, OwnershipRecord, OwnershipRecordId,
        Transaction, TransactionId, User, UserId,
    },
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompressionType, Direction, IteratorMode, Options,
    WriteBatch, WriteOptions, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Column family names
const CF_USERS: &str = "users";
const CF_ITEMS: &str = "items";
const CF_LISTINGS: &str = "listings";
const CF_CART_ENTRIES: &str = "cart_entries";
const CF_TRANSACTIONS: &str = "transactions";
const CF_OWNERSHIP_RECORDS: &str = "ownership_records";
const CF_INDICES: &str = "indices";

/// Index tags (first byte of every key in `indices`)
const IDX_LISTING_BY_ITEM: u8 = b'l';
const IDX_CART_BY_LISTING: u8 = b'c';
const IDX_ITEM_HISTORY: u8 = b'h';
const IDX_OWNER_ITEMS: u8 = b'o';
const IDX_REQUEST_KEY: u8 = b'r';

/// Logical table (one column family each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Users
    Users,
    /// Items
    Items,
    /// Listings
    Listings,
    /// Cart entries
    CartEntries,
    /// Transactions
    Transactions,
    /// Ownership records
    OwnershipRecords,
    /// Secondary indices
    Indices,
}

impl Table {
    /// Every table, in column family creation order
    pub const ALL: [Table; 7] = [
        Table::Users,
        Table::Items,
        Table::Listings,
        Table::CartEntries,
        Table::Transactions,
        Table::OwnershipRecords,
        Table::Indices,
    ];

    /// Column family name
    pub fn cf_name(self) -> &'static str {
        match self {
            Table::Users => CF_USERS,
            Table::Items => CF_ITEMS,
            Table::Listings => CF_LISTINGS,
            Table::CartEntries => CF_CART_ENTRIES,
            Table::Transactions => CF_TRANSACTIONS,
            Table::OwnershipRecords => CF_OWNERSHIP_RECORDS,
            Table::Indices => CF_INDICES,
        }
    }
}

/// A row stored in one table under one primary key
pub trait Row: Serialize + DeserializeOwned {
    /// Table holding this row type
    const TABLE: Table;

    /// Primary key
    fn key(&self) -> Vec<u8>;
}

// Index key helpers

fn index_key_listing_by_item(item_id: ItemId) -> Vec<u8> {
    let mut key = vec![IDX_LISTING_BY_ITEM];
    key.extend_from_slice(item_id.as_bytes());
    key
}

fn index_key_cart_by_listing(listing_id: ListingId, buyer_id: Option<UserId>) -> Vec<u8> {
    let mut key = vec![IDX_CART_BY_LISTING];
    key.extend_from_slice(listing_id.as_bytes());
    if let Some(buyer) = buyer_id {
        key.extend_from_slice(buyer.as_bytes());
    }
    key
}

fn index_key_item_history(item_id: ItemId, entry: Option<&OwnershipRecord>) -> Vec<u8> {
    let mut key = vec![IDX_ITEM_HISTORY];
    key.extend_from_slice(item_id.as_bytes());
    if let Some(record) = entry {
        // Big-endian nanos keep the scan ordered by start_date
        let nanos = record.start_date.timestamp_nanos_opt().unwrap_or(0).max(0) as u64;
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(record.record_id.as_bytes());
    }
    key
}

fn index_key_owner_items(owner_id: UserId, item_id: Option<ItemId>) -> Vec<u8> {
    let mut key = vec![IDX_OWNER_ITEMS];
    key.extend_from_slice(owner_id.as_bytes());
    if let Some(item) = item_id {
        key.extend_from_slice(item.as_bytes());
    }
    key
}

fn index_key_request(buyer_id: UserId, request_key: &str) -> Vec<u8> {
    let mut key = vec![IDX_REQUEST_KEY];
    key.extend_from_slice(buyer_id.as_bytes());
    key.extend_from_slice(request_key.as_bytes());
    key
}

/// Read a 16-byte UUID at `offset`
fn uuid_at(bytes: &[u8], offset: usize) -> Result<Uuid> {
    bytes
        .get(offset..offset + 16)
        .and_then(|slice| Uuid::from_slice(slice).ok())
        .ok_or_else(|| Error::Corrupted(format!("expected a UUID at byte {}", offset)))
}

fn decode<R: DeserializeOwned>(bytes: &[u8]) -> Result<R> {
    Ok(bincode::deserialize(bytes)?)
}

/// Typed reads over committed state or a pending [`WriteSet`]
pub trait ReadView {
    /// Raw point lookup
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Raw prefix scan, ordered by key
    fn scan_raw(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Typed point lookup
    fn get<R: Row>(&self, key: &[u8]) -> Result<Option<R>> {
        match self.get_raw(R::TABLE, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get user by ID
    fn user(&self, user_id: UserId) -> Result<Option<User>> {
        self.get(user_id.as_bytes())
    }

    /// Get item by ID
    fn item(&self, item_id: ItemId) -> Result<Option<Item>> {
        self.get(item_id.as_bytes())
    }

    /// Get listing by ID
    fn listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        self.get(listing_id.as_bytes())
    }

    /// Get transaction by ID
    fn transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        self.get(transaction_id.as_bytes())
    }

    /// Get ownership record by ID
    fn ownership_record(&self, record_id: OwnershipRecordId) -> Result<Option<OwnershipRecord>> {
        self.get(record_id.as_bytes())
    }

    /// Get one cart entry
    fn cart_entry(&self, buyer_id: UserId, listing_id: ListingId) -> Result<Option<CartEntry>> {
        self.get(&CartEntry::key_for(buyer_id, listing_id))
    }

    /// All cart entries of one buyer
    fn cart_entries(&self, buyer_id: UserId) -> Result<Vec<CartEntry>> {
        self.scan_raw(Table::CartEntries, buyer_id.as_bytes())?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Buyers holding a listing in their cart
    fn cart_holders(&self, listing_id: ListingId) -> Result<Vec<UserId>> {
        let prefix = index_key_cart_by_listing(listing_id, None);
        self.scan_raw(Table::Indices, &prefix)?
            .iter()
            .map(|(key, _)| uuid_at(key, prefix.len()).map(UserId::from_uuid))
            .collect()
    }

    /// Active listing of an item, if any
    fn listing_for_item(&self, item_id: ItemId) -> Result<Option<ListingId>> {
        match self.get_raw(Table::Indices, &index_key_listing_by_item(item_id))? {
            Some(value) => Ok(Some(ListingId::from_uuid(uuid_at(&value, 0)?))),
            None => Ok(None),
        }
    }

    /// Ownership records of an item ordered by `start_date` ascending
    fn item_history(&self, item_id: ItemId) -> Result<Vec<OwnershipRecord>> {
        let prefix = index_key_item_history(item_id, None);
        let mut records = Vec::new();
        for (key, _) in self.scan_raw(Table::Indices, &prefix)? {
            let record_id = OwnershipRecordId::from_uuid(uuid_at(&key, prefix.len() + 8)?);
            let record = self.ownership_record(record_id)?.ok_or_else(|| {
                Error::Corrupted(format!("history index points at missing record {}", record_id))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Items currently owned by a user
    fn items_owned_by(&self, owner_id: UserId) -> Result<Vec<Item>> {
        let prefix = index_key_owner_items(owner_id, None);
        let mut items = Vec::new();
        for (key, _) in self.scan_raw(Table::Indices, &prefix)? {
            let item_id = ItemId::from_uuid(uuid_at(&key, prefix.len())?);
            let item = self.item(item_id)?.ok_or_else(|| {
                Error::Corrupted(format!("owner index points at missing item {}", item_id))
            })?;
            items.push(item);
        }
        Ok(items)
    }

    /// Every item in the store
    fn all_items(&self) -> Result<Vec<Item>> {
        self.scan_raw(Table::Items, &[])?
            .iter()
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Transaction previously created for a buyer's idempotency key
    fn transaction_for_request(
        &self,
        buyer_id: UserId,
        request_key: &str,
    ) -> Result<Option<TransactionId>> {
        match self.get_raw(Table::Indices, &index_key_request(buyer_id, request_key))? {
            Some(value) => Ok(Some(TransactionId::from_uuid(uuid_at(&value, 0)?))),
            None => Ok(None),
        }
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    path: PathBuf,
    sync_writes: bool,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.cf_name(), Self::cf_options(*table)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = Table::ALL.len(),
            "Opened RocksDB"
        );

        Ok(Self {
            db,
            path: path.clone(),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options(table: Table) -> Options {
        let mut opts = Options::default();
        match table {
            Table::Indices => {
                opts.set_compression_type(DBCompressionType::Lz4);
                // Point lookups on listing-by-item and request keys
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            Table::OwnershipRecords | Table::Transactions => {
                // Append-mostly history
                opts.set_compression_type(DBCompressionType::Zstd);
            }
            _ => {
                opts.set_compression_type(DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, table: Table) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(table.cf_name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", table.cf_name())))
    }

    /// Run a unit of work and commit its writes atomically
    ///
    /// If `unit` returns an error nothing it staged is written.
    pub fn transact<T, E, F>(&self, unit: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteSet<'_>) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut writes = WriteSet::new(self);
        let value = unit(&mut writes)?;
        writes.commit()?;
        Ok(value)
    }

    fn write_staged(&self, staged: BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>) -> Result<usize> {
        let mut batch = WriteBatch::default();
        let count = staged.len();

        for ((table, key), value) in staged {
            let cf = self.cf_handle(table)?;
            match value {
                Some(bytes) => batch.put_cf(cf, key, bytes),
                None => batch.delete_cf(cf, key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        // Atomic commit
        self.db.write_opt(batch, &write_opts)?;

        Ok(count)
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            users: self.approximate_count(Table::Users)?,
            items: self.approximate_count(Table::Items)?,
            listings: self.approximate_count(Table::Listings)?,
            transactions: self.approximate_count(Table::Transactions)?,
            ownership_records: self.approximate_count(Table::OwnershipRecords)?,
        })
    }

    fn approximate_count(&self, table: Table) -> Result<u64> {
        let cf = self.cf_handle(table)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

impl ReadView for Storage {
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(table)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    fn scan_raw(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle(table)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut rows = Vec::new();
        for entry in iter {
            let (key, value) = entry?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }
}

/// Approximate row counts
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Users
    pub users: u64,
    /// Items
    pub items: u64,
    /// Active listings
    pub listings: u64,
    /// Checkout transactions
    pub transactions: u64,
    /// Ownership records
    pub ownership_records: u64,
}

/// Writes staged by one unit of work
///
/// Reads through a `WriteSet` see its own staged writes layered over
/// committed state. Dropping it without committing discards everything.
pub struct WriteSet<'a> {
    storage: &'a Storage,
    staged: BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>,
}

impl fmt::Debug for WriteSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSet")
            .field("staged", &self.staged.len())
            .finish()
    }
}

impl<'a> WriteSet<'a> {
    fn new(storage: &'a Storage) -> Self {
        Self {
            storage,
            staged: BTreeMap::new(),
        }
    }

    /// Number of staged puts and deletes
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    fn put<R: Row>(&mut self, row: &R) -> Result<()> {
        let bytes = bincode::serialize(row)?;
        self.staged.insert((R::TABLE, row.key()), Some(bytes));
        Ok(())
    }

    fn put_index(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert((Table::Indices, key), Some(value));
    }

    fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.staged.insert((table, key), None);
    }

    /// Insert or update a user
    pub fn put_user(&mut self, user: &User) -> Result<()> {
        self.put(user)
    }

    /// Insert or update an item, keeping the owner index in step
    pub fn put_item(&mut self, item: &Item) -> Result<()> {
        if let Some(previous_owner) = self.item(item.item_id)?.and_then(|prev| prev.owner_id) {
            if Some(previous_owner) != item.owner_id {
                self.delete(
                    Table::Indices,
                    index_key_owner_items(previous_owner, Some(item.item_id)),
                );
            }
        }
        if let Some(owner) = item.owner_id {
            self.put_index(index_key_owner_items(owner, Some(item.item_id)), Vec::new());
        }
        self.put(item)
    }

    /// Insert a listing and claim the item's single listing slot
    pub fn put_listing(&mut self, listing: &Listing) -> Result<()> {
        self.put_index(
            index_key_listing_by_item(listing.item_id),
            listing.listing_id.as_bytes().to_vec(),
        );
        self.put(listing)
    }

    /// Delete a listing and every cart entry (of any buyer) referencing it
    ///
    /// Returns the number of cart entries removed.
    pub fn remove_listing(&mut self, listing: &Listing) -> Result<usize> {
        self.delete(Table::Listings, listing.key());
        if self.listing_for_item(listing.item_id)? == Some(listing.listing_id) {
            self.delete(Table::Indices, index_key_listing_by_item(listing.item_id));
        }

        let holders = self.cart_holders(listing.listing_id)?;
        for buyer_id in &holders {
            self.delete(
                Table::CartEntries,
                CartEntry::key_for(*buyer_id, listing.listing_id),
            );
            self.delete(
                Table::Indices,
                index_key_cart_by_listing(listing.listing_id, Some(*buyer_id)),
            );
        }
        Ok(holders.len())
    }

    /// Insert a cart entry
    pub fn put_cart_entry(&mut self, entry: &CartEntry) -> Result<()> {
        self.put_index(
            index_key_cart_by_listing(entry.listing_id, Some(entry.buyer_id)),
            Vec::new(),
        );
        self.put(entry)
    }

    /// Delete a cart entry; returns whether it existed
    pub fn remove_cart_entry(&mut self, buyer_id: UserId, listing_id: ListingId) -> Result<bool> {
        if self.cart_entry(buyer_id, listing_id)?.is_none() {
            return Ok(false);
        }
        self.delete(Table::CartEntries, CartEntry::key_for(buyer_id, listing_id));
        self.delete(
            Table::Indices,
            index_key_cart_by_listing(listing_id, Some(buyer_id)),
        );
        Ok(true)
    }

    /// Insert a transaction (and its idempotency key, if any)
    pub fn put_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        if let Some(request_key) = &transaction.request_key {
            self.put_index(
                index_key_request(transaction.buyer_id, request_key),
                transaction.transaction_id.as_bytes().to_vec(),
            );
        }
        self.put(transaction)
    }

    /// Insert or update an ownership record
    pub fn put_ownership_record(&mut self, record: &OwnershipRecord) -> Result<()> {
        self.put_index(index_key_item_history(record.item_id, Some(record)), Vec::new());
        self.put(record)
    }

    fn commit(self) -> Result<usize> {
        if self.staged.is_empty() {
            return Ok(0);
        }
        let count = self.storage.write_staged(self.staged)?;
        tracing::debug!(writes = count, "Write set committed");
        Ok(count)
    }
}

impl ReadView for WriteSet<'_> {
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.staged.get(&(table, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.storage.get_raw(table, key),
        }
    }

    fn scan_raw(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.storage.scan_raw(table, prefix)?.into_iter().collect();

        let staged = self
            .staged
            .range((table, prefix.to_vec())..)
            .take_while(|((staged_table, key), _)| *staged_table == table && key.starts_with(prefix));
        for ((_, key), value) in staged {
            match value {
                Some(bytes) => {
                    merged.insert(key.clone(), bytes.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = StoreConfig::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_user(balance: u64) -> User {
        User {
            user_id: UserId::new(),
            name: Some("Ada".to_string()),
            email: "ada@example.com".to_string(),
            balance,
            is_guest: false,
            created_at: Utc::now(),
        }
    }

    fn test_item(owner_id: Option<UserId>) -> Item {
        Item {
            item_id: ItemId::new(),
            owner_id,
            name: "Kepler-22b".to_string(),
            size: 12,
            category: "ocean".to_string(),
            created_at: Utc::now(),
        }
    }

    fn test_listing(item: &Item, price: u64) -> Listing {
        Listing {
            listing_id: ListingId::new(),
            item_id: item.item_id,
            seller_id: item.owner_id,
            list_price: price,
            created_at: Utc::now(),
        }
    }

    fn test_record(item: &Item, buyer: &User, start_offset_secs: i64) -> OwnershipRecord {
        OwnershipRecord {
            record_id: OwnershipRecordId::new(),
            item_id: item.item_id,
            transaction_id: TransactionId::new(),
            buyer_id: buyer.user_id,
            seller_id: None,
            buyer_name: buyer.display_name().to_string(),
            seller_name: None,
            item_name: item.name.clone(),
            sale_price: 10,
            start_date: Utc::now() + Duration::seconds(start_offset_secs),
            end_date: None,
        }
    }

    #[test]
    fn test_storage_open() {
        let (storage, _temp) = test_storage();
        for table in Table::ALL {
            assert!(storage.db.cf_handle(table.cf_name()).is_some());
        }
    }

    #[test]
    fn test_commit_and_read_back() {
        let (storage, _temp) = test_storage();
        let user = test_user(500);

        storage
            .transact(|writes| writes.put_user(&user))
            .unwrap();

        let retrieved = storage.user(user.user_id).unwrap().unwrap();
        assert_eq!(retrieved, user);
    }

    #[test]
    fn test_failed_unit_writes_nothing() {
        let (storage, _temp) = test_storage();
        let user = test_user(500);
        let item = test_item(Some(user.user_id));

        let result: Result<()> = storage.transact(|writes| {
            writes.put_user(&user)?;
            writes.put_item(&item)?;
            Err(Error::Concurrency("abort".to_string()))
        });

        assert!(result.is_err());
        assert!(storage.user(user.user_id).unwrap().is_none());
        assert!(storage.item(item.item_id).unwrap().is_none());
        assert!(storage.items_owned_by(user.user_id).unwrap().is_empty());
    }

    #[test]
    fn test_write_set_reads_its_own_writes() {
        let (storage, _temp) = test_storage();
        let buyer = test_user(0);
        let item = test_item(None);
        let listing = test_listing(&item, 100);

        storage
            .transact(|writes| -> Result<()> {
                writes.put_item(&item)?;
                writes.put_listing(&listing)?;
                writes.put_cart_entry(&CartEntry {
                    buyer_id: buyer.user_id,
                    listing_id: listing.listing_id,
                    added_at: Utc::now(),
                })?;

                assert_eq!(writes.listing_for_item(item.item_id)?, Some(listing.listing_id));
                assert_eq!(writes.cart_entries(buyer.user_id)?.len(), 1);

                writes.remove_cart_entry(buyer.user_id, listing.listing_id)?;
                assert!(writes.cart_entries(buyer.user_id)?.is_empty());
                Ok(())
            })
            .unwrap();

        assert!(storage.cart_entries(buyer.user_id).unwrap().is_empty());
        assert!(storage.cart_holders(listing.listing_id).unwrap().is_empty());
    }

    #[test]
    fn test_remove_listing_cascades_to_every_cart() {
        let (storage, _temp) = test_storage();
        let item = test_item(None);
        let listing = test_listing(&item, 100);
        let buyers = [test_user(0), test_user(0), test_user(0)];

        storage
            .transact(|writes| -> Result<()> {
                writes.put_item(&item)?;
                writes.put_listing(&listing)?;
                for buyer in &buyers {
                    writes.put_cart_entry(&CartEntry {
                        buyer_id: buyer.user_id,
                        listing_id: listing.listing_id,
                        added_at: Utc::now(),
                    })?;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(storage.cart_holders(listing.listing_id).unwrap().len(), 3);

        let removed = storage
            .transact(|writes| writes.remove_listing(&listing))
            .unwrap();

        assert_eq!(removed, 3);
        assert!(storage.listing(listing.listing_id).unwrap().is_none());
        assert!(storage.listing_for_item(item.item_id).unwrap().is_none());
        for buyer in &buyers {
            assert!(storage.cart_entries(buyer.user_id).unwrap().is_empty());
        }
    }

    #[test]
    fn test_owner_index_follows_item_owner() {
        let (storage, _temp) = test_storage();
        let first = test_user(0);
        let second = test_user(0);
        let mut item = test_item(Some(first.user_id));

        storage.transact(|writes| writes.put_item(&item)).unwrap();
        assert_eq!(storage.items_owned_by(first.user_id).unwrap().len(), 1);

        item.owner_id = Some(second.user_id);
        storage.transact(|writes| writes.put_item(&item)).unwrap();

        assert!(storage.items_owned_by(first.user_id).unwrap().is_empty());
        let owned = storage.items_owned_by(second.user_id).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].item_id, item.item_id);
    }

    #[test]
    fn test_item_history_ordered_by_start_date() {
        let (storage, _temp) = test_storage();
        let buyer = test_user(0);
        let item = test_item(None);
        let later = test_record(&item, &buyer, 60);
        let earlier = test_record(&item, &buyer, 0);

        storage
            .transact(|writes| -> Result<()> {
                writes.put_ownership_record(&later)?;
                writes.put_ownership_record(&earlier)?;
                Ok(())
            })
            .unwrap();

        let history = storage.item_history(item.item_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record_id, earlier.record_id);
        assert_eq!(history[1].record_id, later.record_id);
    }

    #[test]
    fn test_request_key_index() {
        let (storage, _temp) = test_storage();
        let buyer = test_user(0);
        let transaction = Transaction {
            transaction_id: TransactionId::new(),
            buyer_id: buyer.user_id,
            transaction_total: 300,
            request_key: Some("req-1".to_string()),
            created_at: Utc::now(),
        };

        storage
            .transact(|writes| writes.put_transaction(&transaction))
            .unwrap();

        assert_eq!(
            storage.transaction_for_request(buyer.user_id, "req-1").unwrap(),
            Some(transaction.transaction_id)
        );
        assert!(storage
            .transaction_for_request(buyer.user_id, "req-2")
            .unwrap()
            .is_none());
    }
}
