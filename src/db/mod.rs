//! Document store access
//!
//! Every entity is a [`Record`]: a serde document with a string `_id`, a
//! [`Metadata`](schemas::Metadata) block and declared indexes. Records are
//! read and written through [`Collection`], which dispatches to MongoDB or
//! to the in-memory backend used in demo mode and in tests.

pub mod filter;
pub mod memory;
pub mod mongo;
pub mod schemas;

use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

pub use filter::{Condition, Filter, Update};
pub use memory::MemoryDatabase;
pub use mongo::{MongoClient, MongoCollection};

use crate::types::Result;
use schemas::Metadata;

/// Index declaration shared by both backends
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: &'static str,
    pub keys: Vec<&'static str>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn unique(name: &'static str, keys: &[&'static str]) -> Self {
        Self {
            name,
            keys: keys.to_vec(),
            unique: true,
        }
    }

    /// Unique indexes cover live rows only, so a soft-deleted document
    /// releases its key
    pub fn partial_filter(&self) -> Option<bson::Document> {
        self.unique.then(|| bson::doc! { "metadata.is_deleted": false })
    }

    pub fn lookup(name: &'static str, keys: &[&'static str]) -> Self {
        Self {
            name,
            keys: keys.to_vec(),
            unique: false,
        }
    }
}

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<IndexSpec>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// A document stored in its own collection
pub trait Record:
    Serialize + DeserializeOwned + Clone + Unpin + Send + Sync + IntoIndexes + MutMetadata + 'static
{
    const COLLECTION: &'static str;
    /// Human-readable name used in not-found messages
    const LABEL: &'static str;

    fn id(&self) -> &str;
}

/// Generate a fresh opaque document id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Handle to whichever document store this process runs against
#[derive(Clone)]
pub enum Database {
    Mongo(MongoClient),
    Memory(Arc<MemoryDatabase>),
}

impl Database {
    /// In-memory store (demo mode, tests)
    pub fn memory() -> Self {
        Database::Memory(Arc::new(MemoryDatabase::new()))
    }

    /// Connect to MongoDB, or fall back to the in-memory store when no URI
    /// is configured or the server cannot be reached
    pub async fn connect_or_demo(uri: Option<&str>, db_name: &str) -> Self {
        let Some(uri) = uri.filter(|u| !u.trim().is_empty()) else {
            tracing::warn!("MONGODB_URI not set - running in demo mode with an in-memory store");
            return Self::memory();
        };
        match MongoClient::new(uri, db_name).await {
            Ok(client) => Database::Mongo(client),
            Err(e) => {
                tracing::warn!(error = %e, "MongoDB unavailable - running in demo mode with an in-memory store");
                Self::memory()
            }
        }
    }

    pub fn is_demo(&self) -> bool {
        matches!(self, Database::Memory(_))
    }

    pub fn collection<T: Record>(&self) -> Collection<T> {
        match self {
            Database::Mongo(client) => Collection::Mongo(client.collection::<T>()),
            Database::Memory(db) => Collection::Memory(Arc::clone(db), PhantomData),
        }
    }

    /// Create the declared indexes of every collection
    pub async fn ensure_indexes(&self) -> Result<()> {
        use schemas::*;

        if let Database::Mongo(client) = self {
            client.apply_indexes::<UserDoc>().await?;
            client.apply_indexes::<CompanyDoc>().await?;
            client.apply_indexes::<CenterDoc>().await?;
            client.apply_indexes::<CounselingSessionDoc>().await?;
            client.apply_indexes::<FinancialSessionDoc>().await?;
            client.apply_indexes::<CounselorPaymentDoc>().await?;
            client.apply_indexes::<NotificationDoc>().await?;
            client.apply_indexes::<ResourceDoc>().await?;
            client.apply_indexes::<FinancialProfileDoc>().await?;
            client.apply_indexes::<CounselingGoalDoc>().await?;
        }
        Ok(())
    }
}

/// Typed collection over either backend
pub enum Collection<T: Record> {
    Mongo(MongoCollection<T>),
    Memory(Arc<MemoryDatabase>, PhantomData<T>),
}

impl<T: Record> Collection<T> {
    /// Insert a document, stamping metadata. Unique-index clashes are `Conflict`.
    pub async fn insert_one(&self, mut item: T) -> Result<String> {
        let metadata = item.mut_metadata();
        let now = bson::DateTime::now();
        metadata.is_deleted = false;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);

        match self {
            Collection::Mongo(c) => c.insert_one(item).await,
            Collection::Memory(db, _) => db.insert_one(item),
        }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        self.find_one(Filter::by_id(id)).await
    }

    pub async fn find_one(&self, filter: Filter) -> Result<Option<T>> {
        match self {
            Collection::Mongo(c) => c.find_one(filter).await,
            Collection::Memory(db, _) => db.find_one(filter),
        }
    }

    /// Matching documents in store order
    pub async fn find_many(&self, filter: Filter) -> Result<Vec<T>> {
        match self {
            Collection::Mongo(c) => c.find_many(filter).await,
            Collection::Memory(db, _) => db.find_many(filter),
        }
    }

    pub async fn count(&self, filter: Filter) -> Result<u64> {
        match self {
            Collection::Mongo(c) => c.count(filter).await,
            Collection::Memory(db, _) => db.count::<T>(filter),
        }
    }

    /// Replace a whole document by id; `NotFound` when it does not exist
    pub async fn replace(&self, item: &mut T) -> Result<()> {
        if self.replace_if(item, Filter::new()).await? {
            Ok(())
        } else {
            Err(crate::types::WellspringError::NotFound(T::LABEL.to_string()))
        }
    }

    /// Replace a document only when it still matches `guard`.
    /// Returns false if nothing matched.
    pub async fn replace_if(&self, item: &mut T, guard: Filter) -> Result<bool> {
        item.mut_metadata().updated_at = Some(bson::DateTime::now());
        let filter = guard.and(Filter::by_id(item.id()));
        match self {
            Collection::Mongo(c) => c.replace_one(filter, item).await,
            Collection::Memory(db, _) => db.replace_one(filter, item),
        }
    }

    /// Apply field updates to every matching document; returns modified count
    pub async fn update_many(&self, filter: Filter, update: Update) -> Result<u64> {
        let update = update.set("metadata.updated_at", bson::DateTime::now());
        match self {
            Collection::Mongo(c) => c.update_many(filter, update).await,
            Collection::Memory(db, _) => db.update_many::<T>(filter, update),
        }
    }

    /// Soft delete by id; returns whether a document was deleted
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let now = bson::DateTime::now();
        let update = Update::new()
            .set("metadata.is_deleted", true)
            .set("metadata.deleted_at", now);
        Ok(self.update_many(Filter::by_id(id), update).await? > 0)
    }
}
