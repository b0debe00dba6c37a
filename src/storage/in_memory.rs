//! In-memory implementation of the store traits for testing and development

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

use crate::core::error::StorageError;
use crate::core::query::{Filter, Query, compare_records};
use crate::core::record::Record;
use crate::core::store::{Collection, Store, Transaction};

type Documents = IndexMap<Uuid, Record>;

fn lock_error<T>(kind: &'static str) -> impl FnOnce(PoisonError<T>) -> StorageError {
    move |e| StorageError::Lock {
        kind,
        message: e.to_string(),
    }
}

/// In-memory document store
///
/// Useful for testing and development. Uses RwLock for thread-safe access.
/// Transactions journal the writes made through their own store handle and
/// undo only those on abort; writes from other requests are left alone.
#[derive(Clone)]
pub struct InMemoryStore {
    collections: Arc<RwLock<HashMap<String, InMemoryCollection>>>,
    transactions: bool,
}

impl InMemoryStore {
    /// Create a new in-memory store with transaction support
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            transactions: true,
        }
    }

    /// Create a store that reports no transaction capability
    pub fn without_transactions() -> Self {
        Self {
            transactions: false,
            ..Self::new()
        }
    }

    fn handle(&self, name: &str) -> InMemoryCollection {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return existing.clone();
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(name.to_string())
            .or_insert_with(|| InMemoryCollection::new(name))
            .clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(self.handle(name))
    }

    async fn begin(&self) -> Result<Option<Box<dyn Transaction>>, StorageError> {
        if !self.transactions {
            return Ok(None);
        }
        tracing::debug!("in-memory transaction started");
        Ok(Some(Box::new(InMemoryTransaction {
            store: self.clone(),
            journal: Arc::new(Mutex::new(Vec::new())),
        })))
    }
}

/// A single in-memory collection, documents kept in insertion order
#[derive(Clone)]
pub struct InMemoryCollection {
    name: String,
    documents: Arc<RwLock<Documents>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Arc::new(RwLock::new(IndexMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace a document, returning the version it replaced
    fn swap(&self, record: &Record) -> Result<Option<Record>, StorageError> {
        let mut documents = self.documents.write().map_err(lock_error("write"))?;
        Ok(documents
            .get_mut(&record.id)
            .map(|existing| std::mem::replace(existing, record.clone())))
    }

    /// Remove a document, returning its position and content
    fn take(&self, id: Uuid) -> Result<Option<(usize, Record)>, StorageError> {
        let mut documents = self.documents.write().map_err(lock_error("write"))?;
        Ok(documents
            .shift_remove_full(&id)
            .map(|(index, _, record)| (index, record)))
    }

    fn undo(&self, change: Change) -> Result<(), StorageError> {
        let mut documents = self.documents.write().map_err(lock_error("write"))?;
        match change {
            Change::Inserted(id) => {
                documents.shift_remove(&id);
            }
            Change::Replaced(previous) => {
                if let Some(existing) = documents.get_mut(&previous.id) {
                    *existing = previous;
                }
            }
            Change::Removed(index, previous) => {
                let index = index.min(documents.len());
                documents.shift_insert(index, previous.id, previous);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    async fn find(&self, query: &Query) -> Result<Vec<Record>, StorageError> {
        let documents = self.documents.read().map_err(lock_error("read"))?;

        let mut found: Vec<&Record> = documents
            .values()
            .filter(|record| query.filter.matches(record))
            .collect();

        if !query.sort.is_empty() {
            found.sort_by(|a, b| compare_records(a, b, &query.sort));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|record| match &query.projection {
                Some(keys) => record.project(keys),
                None => record.clone(),
            })
            .collect())
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StorageError> {
        let documents = self.documents.read().map_err(lock_error("read"))?;
        Ok(documents.values().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn insert(&self, record: &Record) -> Result<(), StorageError> {
        let mut documents = self.documents.write().map_err(lock_error("write"))?;

        if documents.contains_key(&record.id) {
            return Err(StorageError::Query {
                backend: "memory".to_string(),
                message: format!("duplicate id {} in '{}'", record.id, self.name),
            });
        }
        documents.insert(record.id, record.clone());

        Ok(())
    }

    async fn replace(&self, record: &Record) -> Result<bool, StorageError> {
        Ok(self.swap(record)?.is_some())
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.take(id)?.is_some())
    }
}

/// A write made inside a transaction, with what is needed to undo it
enum Change {
    Inserted(Uuid),
    Replaced(Record),
    Removed(usize, Record),
}

type Journal = Arc<Mutex<Vec<(String, Change)>>>;

struct InMemoryTransaction {
    store: InMemoryStore,
    journal: Journal,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    fn store(&self) -> Arc<dyn Store> {
        Arc::new(JournaledStore {
            store: self.store.clone(),
            journal: self.journal.clone(),
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        let changes = std::mem::take(&mut *self.journal.lock().map_err(lock_error("journal"))?);
        let undone = changes.len();
        for (collection, change) in changes.into_iter().rev() {
            self.store.handle(&collection).undo(change)?;
        }
        tracing::debug!(undone, "in-memory transaction rolled back");
        Ok(())
    }
}

/// Store handle of an open transaction, every write lands in its journal
struct JournaledStore {
    store: InMemoryStore,
    journal: Journal,
}

#[async_trait]
impl Store for JournaledStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(JournaledCollection {
            inner: self.store.handle(name),
            journal: self.journal.clone(),
        })
    }
}

struct JournaledCollection {
    inner: InMemoryCollection,
    journal: Journal,
}

impl JournaledCollection {
    fn record(&self, change: Change) -> Result<(), StorageError> {
        self.journal
            .lock()
            .map_err(lock_error("journal"))?
            .push((self.inner.name.clone(), change));
        Ok(())
    }
}

#[async_trait]
impl Collection for JournaledCollection {
    async fn find(&self, query: &Query) -> Result<Vec<Record>, StorageError> {
        self.inner.find(query).await
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StorageError> {
        self.inner.count(filter).await
    }

    async fn insert(&self, record: &Record) -> Result<(), StorageError> {
        self.inner.insert(record).await?;
        self.record(Change::Inserted(record.id))
    }

    async fn replace(&self, record: &Record) -> Result<bool, StorageError> {
        match self.inner.swap(record)? {
            Some(previous) => {
                self.record(Change::Replaced(previous))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StorageError> {
        match self.inner.take(id)? {
            Some((index, previous)) => {
                self.record(Change::Removed(index, previous))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
