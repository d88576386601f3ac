//! Knowledge-base resource schema

use serde::{Deserialize, Serialize};

use crate::db::schemas::Metadata;
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    #[default]
    Article,
    Video,
    Worksheet,
    Guide,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResourceDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub title: String,

    #[serde(default)]
    pub summary: String,

    pub content: String,

    pub category: String,

    #[serde(default)]
    pub kind: ResourceKind,

    #[serde(default)]
    pub tags: Vec<String>,

    pub author: String,

    #[serde(default)]
    pub is_published: bool,

    #[serde(default)]
    pub views: i64,

    /// Users who liked the resource
    #[serde(default)]
    pub likes: Vec<String>,
}

impl ResourceDoc {
    pub fn new(title: String, content: String, category: String, author: &str) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            title,
            summary: String::new(),
            content,
            category,
            kind: ResourceKind::default(),
            tags: Vec::new(),
            author: author.to_string(),
            is_published: false,
            views: 0,
            likes: Vec::new(),
        }
    }

    /// Flip the caller's like; returns whether it is now liked
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if let Some(pos) = self.likes.iter().position(|u| u == user_id) {
            self.likes.remove(pos);
            false
        } else {
            self.likes.push(user_id.to_string());
            true
        }
    }
}

impl IntoIndexes for ResourceDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::lookup("category_index", &["category", "is_published"]),
            IndexSpec::lookup("author_index", &["author"]),
        ]
    }
}

impl MutMetadata for ResourceDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for ResourceDoc {
    const COLLECTION: &'static str = "resources";
    const LABEL: &'static str = "Resource";

    fn id(&self) -> &str {
        &self.id
    }
}
