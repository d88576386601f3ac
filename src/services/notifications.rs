//! In-app notifications
//!
//! Workflow code emits notifications through [`NotificationSink`] so that
//! delivery stays swappable; the platform's own sink writes them to the
//! store where `/notifications` reads them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::Role;
use crate::db::schemas::{to_chrono, NotificationDoc, NotificationKind, UserDoc};
use crate::db::{Database, Filter};
use crate::types::{Result, WellspringError};

/// Destination for workflow notifications
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: NotificationDoc) -> Result<()>;
}

/// Sink that persists notifications in the document store
#[derive(Clone)]
pub struct StoreNotifier {
    db: Database,
}

impl StoreNotifier {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl NotificationSink for StoreNotifier {
    async fn notify(&self, notification: NotificationDoc) -> Result<()> {
        self.db.collection::<NotificationDoc>().insert_one(notification).await?;
        Ok(())
    }
}

/// Send without failing the surrounding workflow
pub async fn notify_quietly(sink: &dyn NotificationSink, notification: NotificationDoc) {
    let recipient = notification.recipient.clone();
    if let Err(e) = sink.notify(notification).await {
        warn!(recipient = %recipient, error = %e, "notification not stored");
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&NotificationDoc> for NotificationView {
    fn from(n: &NotificationDoc) -> Self {
        Self {
            id: n.id.clone(),
            kind: n.kind,
            title: n.title.clone(),
            message: n.message.clone(),
            related: n.related.clone(),
            is_read: n.is_read,
            read_at: n.read_at.map(to_chrono),
            created_at: n.metadata.created(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationList {
    pub notifications: Vec<NotificationView>,
    pub unread: usize,
}

/// Caller's notifications, newest first
pub async fn list_for(db: &Database, user_id: &str, unread_only: bool) -> Result<NotificationList> {
    let mut filter = Filter::new().eq("recipient", user_id);
    if unread_only {
        filter = filter.eq("is_read", false);
    }
    let mut docs = db.collection::<NotificationDoc>().find_many(filter).await?;
    docs.reverse();

    let unread = docs.iter().filter(|n| !n.is_read).count();
    Ok(NotificationList {
        notifications: docs.iter().map(NotificationView::from).collect(),
        unread,
    })
}

async fn load_own(db: &Database, user_id: &str, id: &str) -> Result<NotificationDoc> {
    db.collection::<NotificationDoc>()
        .find_one(Filter::by_id(id).eq("recipient", user_id))
        .await?
        .ok_or_else(|| WellspringError::NotFound("Notification".into()))
}

pub async fn mark_read(db: &Database, user_id: &str, id: &str) -> Result<NotificationView> {
    let mut doc = load_own(db, user_id, id).await?;
    doc.mark_read();
    db.collection::<NotificationDoc>().replace(&mut doc).await?;
    Ok(NotificationView::from(&doc))
}

pub async fn delete(db: &Database, user_id: &str, id: &str) -> Result<()> {
    let doc = load_own(db, user_id, id).await?;
    db.collection::<NotificationDoc>().soft_delete(&doc.id).await?;
    Ok(())
}

/// Announcement to every active user, or to one role; returns recipients
pub async fn broadcast(
    db: &Database,
    sink: &dyn NotificationSink,
    title: &str,
    message: &str,
    role: Option<Role>,
) -> Result<usize> {
    if title.trim().is_empty() || message.trim().is_empty() {
        return Err(WellspringError::invalid("title", "title and message are required"));
    }
    let mut filter = Filter::new().eq("is_active", true);
    if let Some(role) = role {
        filter = filter.eq("role", role.as_str());
    }
    let recipients = db.collection::<UserDoc>().find_many(filter).await?;
    for user in &recipients {
        sink.notify(NotificationDoc::new(
            &user.id,
            NotificationKind::Announcement,
            title,
            message,
        ))
        .await?;
    }
    info!(recipients = recipients.len(), role = ?role, "announcement sent");
    Ok(recipients.len())
}
