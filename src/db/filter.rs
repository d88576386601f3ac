//! Typed query filters and field updates
//!
//! A [`Filter`] compiles to a MongoDB query document and can also be
//! evaluated directly against a BSON document, which is how the in-memory
//! backend answers queries. Soft-deleted documents never match unless the
//! filter opts in with [`Filter::include_deleted`].

use bson::{Bson, Document};
use serde::Serialize;
use std::cmp::Ordering;

/// One condition on a (possibly dotted) field path
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Bson),
    Ne(Bson),
    In(Vec<Bson>),
    Gte(Bson),
    Lte(Bson),
    Exists(bool),
}

/// Conjunction of field conditions
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
    include_deleted: bool,
}

/// Serialize an enum or struct into the BSON value it is stored as
pub fn stored<T: Serialize>(value: &T) -> Bson {
    bson::to_bson(value).unwrap_or(Bson::Null)
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &str) -> Self {
        Self::new().eq("_id", id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.clauses.push((field.to_string(), Condition::Eq(value.into())));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.clauses.push((field.to_string(), Condition::Ne(value.into())));
        self
    }

    pub fn is_in<V: Into<Bson>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.clauses.push((field.to_string(), Condition::In(values)));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.clauses.push((field.to_string(), Condition::Gte(value.into())));
        self
    }

    pub fn lte(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.clauses.push((field.to_string(), Condition::Lte(value.into())));
        self
    }

    pub fn exists(mut self, field: &str, present: bool) -> Self {
        self.clauses.push((field.to_string(), Condition::Exists(present)));
        self
    }

    /// Also match soft-deleted documents
    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Merge another filter's clauses into this one
    pub fn and(mut self, other: Filter) -> Self {
        self.clauses.extend(other.clauses);
        self.include_deleted = self.include_deleted || other.include_deleted;
        self
    }

    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }

    /// MongoDB query document
    pub fn to_document(&self) -> Document {
        let mut query = Document::new();
        for (field, condition) in &self.clauses {
            let (op, value) = match condition {
                Condition::Eq(v) => ("$eq", v.clone()),
                Condition::Ne(v) => ("$ne", v.clone()),
                Condition::In(vs) => ("$in", Bson::Array(vs.clone())),
                Condition::Gte(v) => ("$gte", v.clone()),
                Condition::Lte(v) => ("$lte", v.clone()),
                Condition::Exists(b) => ("$exists", Bson::Boolean(*b)),
            };
            match query.get_mut(field) {
                Some(Bson::Document(ops)) => {
                    ops.insert(op, value);
                }
                _ => {
                    let mut ops = Document::new();
                    ops.insert(op, value);
                    query.insert(field.clone(), ops);
                }
            }
        }
        if !self.include_deleted {
            let mut not_deleted = Document::new();
            not_deleted.insert("$ne", true);
            query.insert("metadata.is_deleted", not_deleted);
        }
        query
    }

    /// Evaluate against a stored document
    pub fn matches(&self, doc: &Document) -> bool {
        if !self.include_deleted {
            if let Some(Bson::Boolean(true)) = lookup(doc, "metadata.is_deleted") {
                return false;
            }
        }
        self.clauses
            .iter()
            .all(|(field, condition)| condition_holds(lookup(doc, field), condition))
    }
}

fn condition_holds(value: Option<&Bson>, condition: &Condition) -> bool {
    match condition {
        Condition::Eq(expected) => field_equals(value, expected),
        Condition::Ne(expected) => !field_equals(value, expected),
        Condition::In(options) => options.iter().any(|o| field_equals(value, o)),
        Condition::Gte(bound) => value
            .and_then(|v| compare(v, bound))
            .is_some_and(|ord| ord != Ordering::Less),
        Condition::Lte(bound) => value
            .and_then(|v| compare(v, bound))
            .is_some_and(|ord| ord != Ordering::Greater),
        Condition::Exists(present) => value.is_some() == *present,
    }
}

/// Equality with MongoDB's array and null semantics
fn field_equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None | Some(Bson::Null) => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(v) => values_equal(v, expected),
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_number(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Resolve a dotted path inside a document
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = doc.get(first)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// `$set` / `$unset` field updates
#[derive(Debug, Clone, Default)]
pub struct Update {
    sets: Vec<(String, Bson)>,
    unsets: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Bson>) -> Self {
        self.sets.push((field.to_string(), value.into()));
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.unsets.push(field.to_string());
        self
    }

    /// MongoDB update document
    pub fn to_document(&self) -> Document {
        let mut update = Document::new();
        if !self.sets.is_empty() {
            let mut set = Document::new();
            for (field, value) in &self.sets {
                set.insert(field.clone(), value.clone());
            }
            update.insert("$set", set);
        }
        if !self.unsets.is_empty() {
            let mut unset = Document::new();
            for field in &self.unsets {
                unset.insert(field.clone(), "");
            }
            update.insert("$unset", unset);
        }
        update
    }

    /// Apply in place to a stored document
    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.sets {
            set_path(doc, field, value.clone());
        }
        for field in &self.unsets {
            unset_path(doc, field);
        }
    }
}

fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_to_document_merges_range_on_one_field() {
        let start = bson::DateTime::from_millis(1_000);
        let end = bson::DateTime::from_millis(2_000);
        let query = Filter::new()
            .eq("status", "completed")
            .gte("appointment_date", start)
            .lte("appointment_date", end)
            .to_document();

        assert_eq!(
            query,
            doc! {
                "status": { "$eq": "completed" },
                "appointment_date": { "$gte": start, "$lte": end },
                "metadata.is_deleted": { "$ne": true },
            }
        );
    }

    #[test]
    fn test_matches_numbers_across_widths() {
        let stored = doc! { "rate": 50_000_i64 };
        assert!(Filter::new().eq("rate", 50_000_i32).matches(&stored));
        assert!(Filter::new().gte("rate", 40_000_i32).matches(&stored));
        assert!(!Filter::new().lte("rate", 40_000_i32).matches(&stored));
    }

    #[test]
    fn test_soft_deleted_excluded_by_default() {
        let stored = doc! { "_id": "a", "metadata": { "is_deleted": true } };
        assert!(!Filter::by_id("a").matches(&stored));
        assert!(Filter::by_id("a").include_deleted().matches(&stored));
    }

    #[test]
    fn test_null_and_missing_fields() {
        let stored = doc! { "counselor": Bson::Null };
        assert!(Filter::new().eq("counselor", Bson::Null).matches(&stored));
        assert!(Filter::new().eq("center", Bson::Null).matches(&stored));
        assert!(Filter::new().ne("counselor", "c1").matches(&stored));
        assert!(!Filter::new().exists("center", true).matches(&stored));
    }

    #[test]
    fn test_array_membership() {
        let stored = doc! { "counselors": ["c1", "c2"] };
        assert!(Filter::new().eq("counselors", "c2").matches(&stored));
        assert!(!Filter::new().eq("counselors", "c3").matches(&stored));
    }

    #[test]
    fn test_update_apply_nested() {
        let mut stored = doc! { "_id": "c1", "center": "x" };
        Update::new()
            .set("profile.is_independent", true)
            .unset("center")
            .apply(&mut stored);
        assert_eq!(lookup(&stored, "profile.is_independent"), Some(&Bson::Boolean(true)));
        assert!(stored.get("center").is_none());
    }
}
