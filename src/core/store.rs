//! Store traits: the document store the engine persists through

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::StorageError;
use crate::core::query::{Filter, Query};
use crate::core::record::Record;

/// A collection of documents
///
/// Implement this trait to plug a document database into the engine. Queries
/// only use the conditions of [`Filter`], so any store able to express
/// equality, membership and null checks can back a controller.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Find the documents matching the query
    async fn find(&self, query: &Query) -> Result<Vec<Record>, StorageError>;

    /// Count the documents matching a filter
    async fn count(&self, filter: &Filter) -> Result<u64, StorageError>;

    /// Insert a new document
    async fn insert(&self, record: &Record) -> Result<(), StorageError>;

    /// Replace the document with the same id, returns false if none exists
    async fn replace(&self, record: &Record) -> Result<bool, StorageError>;

    /// Remove a document by id, returns false if none exists
    async fn remove(&self, id: Uuid) -> Result<bool, StorageError>;

    /// Find the first matching document
    async fn find_one(&self, filter: &Filter) -> Result<Option<Record>, StorageError> {
        let mut found = self.find(&Query::new(filter.clone()).limit(1)).await?;
        Ok(found.pop())
    }
}

/// A document store handing out collections
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a handle on a collection
    fn collection(&self, name: &str) -> Arc<dyn Collection>;

    /// Start a transaction, `None` when the store has no transactions
    async fn begin(&self) -> Result<Option<Box<dyn Transaction>>, StorageError> {
        Ok(None)
    }
}

/// An open store transaction
#[async_trait]
pub trait Transaction: Send {
    /// Store handle whose writes belong to this transaction
    fn store(&self) -> Arc<dyn Store>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn abort(self: Box<Self>) -> Result<(), StorageError>;
}
