//! MongoDB client and collection wrapper

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};
use std::time::Duration;
use tracing::{error, info};

use crate::db::filter::{Filter, Update};
use crate::db::Record;
use crate::types::WellspringError;

/// Server error code for a unique index violation
const DUPLICATE_KEY: i32 = 11000;

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping. Fails fast on an unreachable server so the caller
    /// can fall back to demo mode.
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, WellspringError> {
        info!("Connecting to MongoDB database '{}'", db_name);

        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| WellspringError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        tokio::time::timeout(
            Duration::from_secs(5),
            client.database(db_name).run_command(doc! { "ping": 1 }),
        )
        .await
        .map_err(|_| WellspringError::Database("MongoDB ping timed out".into()))?
        .map_err(|e| WellspringError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub fn collection<T: Record>(&self) -> MongoCollection<T> {
        MongoCollection {
            inner: self.client.database(&self.db_name).collection::<T>(T::COLLECTION),
        }
    }

    /// Create the schema-declared indexes of one collection
    pub async fn apply_indexes<T: Record>(&self) -> Result<(), WellspringError> {
        let specs = T::into_indices();
        if specs.is_empty() {
            return Ok(());
        }

        let models: Vec<IndexModel> = specs
            .into_iter()
            .map(|spec| {
                let mut keys = Document::new();
                for key in &spec.keys {
                    keys.insert(*key, 1);
                }
                let options = IndexOptions::builder()
                    .name(spec.name.to_string())
                    .unique(spec.unique)
                    .partial_filter_expression(spec.partial_filter())
                    .build();
                IndexModel::builder().keys(keys).options(options).build()
            })
            .collect();

        self.collection::<T>()
            .inner
            .create_indexes(models)
            .await
            .map_err(|e| WellspringError::Database(format!("Failed to create indexes: {}", e)))?;

        info!(collection = T::COLLECTION, "indexes applied");
        Ok(())
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection
#[derive(Debug, Clone)]
pub struct MongoCollection<T: Record> {
    inner: Collection<T>,
}

impl<T: Record> MongoCollection<T> {
    pub async fn insert_one(&self, item: T) -> Result<String, WellspringError> {
        let id = item.id().to_string();
        self.inner
            .insert_one(item)
            .await
            .map_err(write_error::<T>)?;
        Ok(id)
    }

    pub async fn find_one(&self, filter: Filter) -> Result<Option<T>, WellspringError> {
        self.inner
            .find_one(filter.to_document())
            .await
            .map_err(|e| WellspringError::Database(format!("Find failed: {}", e)))
    }

    pub async fn find_many(&self, filter: Filter) -> Result<Vec<T>, WellspringError> {
        let cursor = self
            .inner
            .find(filter.to_document())
            .await
            .map_err(|e| WellspringError::Database(format!("Find failed: {}", e)))?;

        cursor.try_collect().await.map_err(|e| {
            error!(collection = T::COLLECTION, "undecodable document: {}", e);
            WellspringError::Database(format!("Failed to read {} documents: {}", T::LABEL, e))
        })
    }

    pub async fn count(&self, filter: Filter) -> Result<u64, WellspringError> {
        self.inner
            .count_documents(filter.to_document())
            .await
            .map_err(|e| WellspringError::Database(format!("Count failed: {}", e)))
    }

    /// Replace the first matching document; false when nothing matched
    pub async fn replace_one(&self, filter: Filter, item: &T) -> Result<bool, WellspringError> {
        let result = self
            .inner
            .replace_one(filter.to_document(), item)
            .await
            .map_err(write_error::<T>)?;
        Ok(result.matched_count > 0)
    }

    pub async fn update_many(&self, filter: Filter, update: Update) -> Result<u64, WellspringError> {
        let result = self
            .inner
            .update_many(filter.to_document(), update.to_document())
            .await
            .map_err(write_error::<T>)?;
        Ok(result.modified_count)
    }
}

/// Unique index violations become `Conflict`; everything else is a database fault
fn write_error<T: Record>(err: mongodb::error::Error) -> WellspringError {
    if let ErrorKind::Write(WriteFailure::WriteError(ref write)) = *err.kind {
        if write.code == DUPLICATE_KEY {
            return WellspringError::Conflict(format!("{} already exists", T::LABEL));
        }
    }
    WellspringError::Database(format!("Write to {} failed: {}", T::COLLECTION, err))
}
