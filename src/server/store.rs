//! Table store
//!
//! In-memory storage for all tables and their objects.
//!
//! Responsibilities:
//! - Table namespace: create, open, and drop tables by name
//! - Object storage: versioned values addressed by (table id, key)
//! - Reject rules: evaluate guards against stored versions before acting
//! - Key allocation: hand out unused keys for inserted objects
//!
//! ## Concurrency
//!
//! The namespace is guarded by a `RwLock`; each table is guarded by its own
//! `Mutex` behind an `Arc`. Object operations take the namespace read lock
//! only long enough to clone the table handle, then serialize on the table
//! lock. Guard evaluation and the mutation it admits happen under the same
//! table lock, so no other request can slip in between.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{OptiError, Result};
use crate::protocol::RejectRules;

/// First version assigned to a freshly written object
///
/// Kept above zero so that a guard against version 0 can only ever match a
/// missing object.
pub const INITIAL_VERSION: u64 = 1;

/// A stored object: value plus its current version
#[derive(Debug, Clone)]
struct StoredObject {
    value: Bytes,
    version: u64,
}

/// One table: its objects keyed by u64, plus the insert cursor
#[derive(Debug)]
struct Table {
    /// Table name, kept for logging
    name: String,

    /// Objects ordered by key
    objects: BTreeMap<u64, StoredObject>,

    /// Next candidate key for insert (occupied keys are skipped)
    next_key: u64,
}

impl Table {
    fn new(name: String) -> Self {
        Self {
            name,
            objects: BTreeMap::new(),
            next_key: 1,
        }
    }

    /// Allocate the next unused key
    fn allocate_key(&mut self) -> u64 {
        // Keys written explicitly may collide with the cursor; skip them.
        while self.objects.contains_key(&self.next_key) {
            self.next_key += 1;
        }
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}

/// The table namespace: name index plus table handles by id
#[derive(Debug, Default)]
struct Namespace {
    /// Table name -> table id
    by_name: HashMap<String, u64>,

    /// Table id -> table handle
    tables: HashMap<u64, Arc<Mutex<Table>>>,
}

/// Thread-safe store shared by all connection handlers
#[derive(Debug)]
pub struct TableStore {
    /// Namespace guarded by a read-write lock
    inner: RwLock<Namespace>,

    /// Monotonic table id allocator; ids are never reused after a drop
    next_table_id: AtomicU64,

    /// Largest value accepted by write and insert, in bytes
    max_value_size: usize,
}

impl TableStore {
    /// Create an empty store accepting values up to `max_value_size` bytes
    pub fn new(max_value_size: usize) -> Self {
        Self {
            inner: RwLock::new(Namespace::default()),
            next_table_id: AtomicU64::new(1),
            max_value_size,
        }
    }

    // =========================================================================
    // Table namespace operations
    // =========================================================================

    /// Create a new table, returning its id
    ///
    /// Fails with `TableExists` if the name is already taken.
    pub fn create_table(&self, name: &str) -> Result<u64> {
        let mut namespace = self.inner.write();

        if namespace.by_name.contains_key(name) {
            return Err(OptiError::TableExists);
        }

        let id = self.next_table_id.fetch_add(1, Ordering::Relaxed);
        namespace.by_name.insert(name.to_string(), id);
        namespace
            .tables
            .insert(id, Arc::new(Mutex::new(Table::new(name.to_string()))));

        debug!("Created table '{}' with id {}", name, id);
        Ok(id)
    }

    /// Look up a table id by name
    ///
    /// Fails with `TableNotFound` if no table has that name.
    pub fn open_table(&self, name: &str) -> Result<u64> {
        let namespace = self.inner.read();
        namespace
            .by_name
            .get(name)
            .copied()
            .ok_or(OptiError::TableNotFound)
    }

    /// Drop a table and all of its objects
    ///
    /// Fails with `TableNotFound` if no table has that name. The id becomes
    /// invalid immediately; later operations against it fail the same way.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut namespace = self.inner.write();

        let id = namespace
            .by_name
            .remove(name)
            .ok_or(OptiError::TableNotFound)?;
        namespace.tables.remove(&id);

        debug!("Dropped table '{}' (id {})", name, id);
        Ok(())
    }

    // =========================================================================
    // Object operations
    // =========================================================================

    /// Read an object, returning its value and version
    ///
    /// The reject rules are evaluated against the stored version first; a
    /// failed guard yields `Rejected` carrying the current version. A
    /// permitted read of a missing object yields `ObjectNotFound`.
    pub fn read(&self, table_id: u64, key: u64, rules: RejectRules) -> Result<(Bytes, u64)> {
        let table = self.table_handle(table_id)?;
        let table = table.lock();

        let stored = table.objects.get(&key);
        let current = stored.map(|object| object.version);

        if !rules.permits(current) {
            trace!(
                "Read of key {} in table {} rejected (version {:?})",
                key,
                table_id,
                current
            );
            return Err(OptiError::Rejected {
                current_version: current,
            });
        }

        match stored {
            Some(object) => Ok((object.value.clone(), object.version)),
            None => Err(OptiError::ObjectNotFound),
        }
    }

    /// Write an object at an explicit key, returning the new version
    ///
    /// A fresh object gets version 1; an overwrite bumps the stored version
    /// by one. A failed guard leaves the object untouched and yields
    /// `Rejected` carrying the current version (`None` when missing).
    pub fn write(&self, table_id: u64, key: u64, rules: RejectRules, value: Bytes) -> Result<u64> {
        self.check_value_size(value.len())?;
        let table = self.table_handle(table_id)?;
        let mut table = table.lock();

        let current = table.objects.get(&key).map(|object| object.version);

        if !rules.permits(current) {
            trace!(
                "Write of key {} in table {} rejected (version {:?})",
                key,
                table_id,
                current
            );
            return Err(OptiError::Rejected {
                current_version: current,
            });
        }

        let version = match current {
            Some(stored) => stored + 1,
            None => INITIAL_VERSION,
        };
        table.objects.insert(key, StoredObject { value, version });

        trace!(
            "Wrote key {} in table '{}' at version {}",
            key,
            table.name,
            version
        );
        Ok(version)
    }

    /// Insert an object at a server-chosen key
    ///
    /// Returns the allocated key and the object's version. The key has never
    /// held an object before.
    pub fn insert(&self, table_id: u64, value: Bytes) -> Result<(u64, u64)> {
        self.check_value_size(value.len())?;
        let table = self.table_handle(table_id)?;
        let mut table = table.lock();

        let key = table.allocate_key();
        table.objects.insert(
            key,
            StoredObject {
                value,
                version: INITIAL_VERSION,
            },
        );

        trace!("Inserted key {} in table '{}'", key, table.name);
        Ok((key, INITIAL_VERSION))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Clone the handle for a table, releasing the namespace lock before
    /// the caller takes the table lock
    fn table_handle(&self, table_id: u64) -> Result<Arc<Mutex<Table>>> {
        let namespace = self.inner.read();
        namespace
            .tables
            .get(&table_id)
            .cloned()
            .ok_or(OptiError::TableNotFound)
    }

    fn check_value_size(&self, len: usize) -> Result<()> {
        if len > self.max_value_size {
            return Err(OptiError::Server(format!(
                "value of {} bytes exceeds maximum of {}",
                len, self.max_value_size
            )));
        }
        Ok(())
    }
}
