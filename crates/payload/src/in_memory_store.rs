//! In-memory list store for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::signal::{DatabaseSelector, ListStore, ListStoreHandle, StoreError};

/// In-memory ordered-list store.
///
/// - No IO
/// - Lists are kept per `(database, key)`
/// - `set_available(false)` simulates an outage
#[derive(Debug)]
pub struct InMemoryListStore {
    lists: RwLock<HashMap<(DatabaseSelector, String), VecDeque<String>>>,
    available: AtomicBool,
    connections: AtomicUsize,
}

impl InMemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of handles handed out so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Snapshot of a list, head first.
    pub fn list(&self, database: &DatabaseSelector, key: &str) -> Vec<String> {
        let lists = match self.lists.read() {
            Ok(lists) => lists,
            Err(poisoned) => poisoned.into_inner(),
        };
        lists
            .get(&(database.clone(), key.to_string()))
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All keys holding at least one entry in `database`.
    pub fn keys(&self, database: &DatabaseSelector) -> Vec<String> {
        let lists = match self.lists.read() {
            Ok(lists) => lists,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut keys: Vec<String> = lists
            .iter()
            .filter(|((db, _), list)| db == database && !list.is_empty())
            .map(|((_, key), _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryListStore {
    fn default() -> Self {
        Self {
            lists: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
        }
    }
}

impl ListStore for InMemoryListStore {
    fn connection(
        &self,
        database: &DatabaseSelector,
    ) -> Result<Box<dyn ListStoreHandle + '_>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!(
                "in-memory store offline (database {database})"
            )));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryHandle {
            store: self,
            database: database.clone(),
        }))
    }
}

struct InMemoryHandle<'a> {
    store: &'a InMemoryListStore,
    database: DatabaseSelector,
}

impl ListStoreHandle for InMemoryHandle<'_> {
    fn push_head(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if !self.store.available.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout(format!("LPUSH {key}")));
        }
        let mut lists = self
            .store
            .lists
            .write()
            .map_err(|_| StoreError::Command("in-memory store lock poisoned".to_string()))?;
        lists
            .entry((self.database.clone(), key.to_string()))
            .or_default()
            .push_front(value.to_string());
        Ok(())
    }
}
