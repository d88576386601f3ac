//! In-memory document store
//!
//! Used when no MongoDB URI is configured (demo mode) and by the test
//! suite. Documents are kept as BSON in insertion order so that queries see
//! the same ordering MongoDB gives a fresh collection, and unique indexes
//! declared by each schema are enforced on insert and replace.

use bson::{Bson, Document};
use dashmap::DashMap;
use tracing::debug;

use crate::db::filter::{lookup, Filter, Update};
use crate::db::Record;
use crate::types::{Result, WellspringError};

#[derive(Default)]
struct Table {
    rows: Vec<Document>,
}

/// Collections keyed by name
#[derive(Default)]
pub struct MemoryDatabase {
    tables: DashMap<&'static str, Table>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live documents in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.tables
            .get(collection)
            .map(|t| t.rows.iter().filter(|d| Filter::new().matches(d)).count())
            .unwrap_or(0)
    }

    pub fn insert_one<T: Record>(&self, item: T) -> Result<String> {
        let id = item.id().to_string();
        let doc = bson::to_document(&item)?;
        let mut table = self.tables.entry(T::COLLECTION).or_default();

        if table.rows.iter().any(|row| lookup(row, "_id") == Some(&Bson::String(id.clone()))) {
            return Err(WellspringError::Conflict(format!("{} already exists", T::LABEL)));
        }
        check_unique::<T>(&table.rows, &doc, None)?;

        table.rows.push(doc);
        debug!(collection = T::COLLECTION, id = %id, "memory insert");
        Ok(id)
    }

    pub fn find_one<T: Record>(&self, filter: Filter) -> Result<Option<T>> {
        let Some(table) = self.tables.get(T::COLLECTION) else {
            return Ok(None);
        };
        table
            .rows
            .iter()
            .find(|row| filter.matches(row))
            .map(|row| bson::from_document(row.clone()).map_err(WellspringError::from))
            .transpose()
    }

    pub fn find_many<T: Record>(&self, filter: Filter) -> Result<Vec<T>> {
        let Some(table) = self.tables.get(T::COLLECTION) else {
            return Ok(Vec::new());
        };
        table
            .rows
            .iter()
            .filter(|row| filter.matches(row))
            .map(|row| bson::from_document(row.clone()).map_err(WellspringError::from))
            .collect()
    }

    pub fn count<T: Record>(&self, filter: Filter) -> Result<u64> {
        Ok(self
            .tables
            .get(T::COLLECTION)
            .map(|t| t.rows.iter().filter(|row| filter.matches(row)).count() as u64)
            .unwrap_or(0))
    }

    pub fn replace_one<T: Record>(&self, filter: Filter, item: &T) -> Result<bool> {
        let doc = bson::to_document(item)?;
        let Some(mut table) = self.tables.get_mut(T::COLLECTION) else {
            return Ok(false);
        };
        let Some(pos) = table.rows.iter().position(|row| filter.matches(row)) else {
            return Ok(false);
        };
        check_unique::<T>(&table.rows, &doc, Some(pos))?;
        table.rows[pos] = doc;
        Ok(true)
    }

    pub fn update_many<T: Record>(&self, filter: Filter, update: Update) -> Result<u64> {
        let Some(mut table) = self.tables.get_mut(T::COLLECTION) else {
            return Ok(0);
        };
        let mut modified = 0;
        for row in table.rows.iter_mut().filter(|row| filter.matches(row)) {
            update.apply(row);
            modified += 1;
        }
        Ok(modified)
    }
}

/// Reject `doc` if it collides with another live row on a unique index
fn check_unique<T: Record>(rows: &[Document], doc: &Document, skip: Option<usize>) -> Result<()> {
    // deleted rows sit outside every unique index
    if !Filter::new().matches(doc) {
        return Ok(());
    }
    for index in T::into_indices().iter().filter(|i| i.unique) {
        let key: Vec<Option<&Bson>> = index.keys.iter().map(|k| lookup(doc, k)).collect();
        let clash = rows.iter().enumerate().any(|(i, row)| {
            Some(i) != skip
                && Filter::new().matches(row)
                && index
                    .keys
                    .iter()
                    .zip(&key)
                    .all(|(k, v)| lookup(row, k) == *v)
        });
        if clash {
            return Err(WellspringError::Conflict(format!(
                "{} violates unique index {}",
                T::LABEL,
                index.name
            )));
        }
    }
    Ok(())
}
