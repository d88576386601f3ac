//! In-app notification schema

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::db::schemas::Metadata;
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    SessionAssigned,
    SessionDisputed,
    PaymentApproved,
    PaymentPaid,
    PaymentDisputed,
    Announcement,
    General,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotificationDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub recipient: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,

    /// Id of the session or payment the notification is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,

    #[serde(default)]
    pub is_read: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime>,
}

impl NotificationDoc {
    pub fn new(recipient: &str, kind: NotificationKind, title: &str, message: &str) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            recipient: recipient.to_string(),
            kind,
            title: title.to_string(),
            message: message.to_string(),
            related: None,
            is_read: false,
            read_at: None,
        }
    }

    pub fn about(mut self, related: &str) -> Self {
        self.related = Some(related.to_string());
        self
    }

    pub fn mark_read(&mut self) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(DateTime::now());
        }
    }
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![IndexSpec::lookup("recipient_read_index", &["recipient", "is_read"])]
    }
}

impl MutMetadata for NotificationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for NotificationDoc {
    const COLLECTION: &'static str = "notifications";
    const LABEL: &'static str = "Notification";

    fn id(&self) -> &str {
        &self.id
    }
}
