//! Knowledge-base resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Role;
use crate::db::schemas::{ResourceDoc, ResourceKind};
use crate::db::{Database, Filter};
use crate::services::visibility::Viewer;
use crate::types::{FieldError, Result, WellspringError};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_published: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub id: String,
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub category: String,
    pub kind: ResourceKind,
    pub tags: Vec<String>,
    pub author: String,
    pub is_published: bool,
    pub views: i64,
    pub likes: usize,
    pub liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ResourceView {
    /// `with_content` is false for list reads
    pub fn new(resource: &ResourceDoc, viewer_id: &str, with_content: bool) -> Self {
        Self {
            id: resource.id.clone(),
            title: resource.title.clone(),
            summary: resource.summary.clone(),
            content: with_content.then(|| resource.content.clone()),
            category: resource.category.clone(),
            kind: resource.kind,
            tags: resource.tags.clone(),
            author: resource.author.clone(),
            is_published: resource.is_published,
            views: resource.views,
            likes: resource.likes.len(),
            liked: resource.likes.iter().any(|u| u == viewer_id),
            created_at: resource.metadata.created(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ResourceQuery {
    pub category: Option<String>,
    pub kind: Option<ResourceKind>,
    pub search: Option<String>,
}

fn can_edit(viewer: &Viewer, resource: &ResourceDoc) -> bool {
    viewer.role == Role::SuperAdmin || resource.author == viewer.id
}

fn can_read(viewer: &Viewer, resource: &ResourceDoc) -> bool {
    resource.is_published || can_edit(viewer, resource)
}

/// Published resources plus the caller's own drafts
pub async fn list(db: &Database, viewer: &Viewer, query: &ResourceQuery) -> Result<Vec<ResourceDoc>> {
    let mut filter = Filter::new();
    if let Some(category) = &query.category {
        filter = filter.eq("category", category.as_str());
    }
    let needle = query.search.as_deref().map(str::to_lowercase);
    let mut resources: Vec<ResourceDoc> = db
        .collection::<ResourceDoc>()
        .find_many(filter)
        .await?
        .into_iter()
        .filter(|r| can_read(viewer, r))
        .filter(|r| query.kind.map_or(true, |k| r.kind == k))
        .filter(|r| {
            needle.as_deref().map_or(true, |n| {
                r.title.to_lowercase().contains(n)
                    || r.tags.iter().any(|t| t.to_lowercase().contains(n))
            })
        })
        .collect();
    resources.reverse();
    Ok(resources)
}

async fn load(db: &Database, id: &str) -> Result<ResourceDoc> {
    db.collection::<ResourceDoc>()
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Resource".into()))
}

/// Read one resource, counting the view
pub async fn get(db: &Database, viewer: &Viewer, id: &str) -> Result<ResourceDoc> {
    let mut resource = load(db, id).await?;
    if !can_read(viewer, &resource) {
        return Err(WellspringError::NotFound("Resource".into()));
    }
    resource.views += 1;
    db.collection::<ResourceDoc>().replace(&mut resource).await?;
    Ok(resource)
}

fn apply(resource: &mut ResourceDoc, input: ResourceInput) -> Result<()> {
    let mut errors = Vec::new();
    for (field, value) in [
        ("title", &input.title),
        ("content", &input.content),
        ("category", &input.category),
    ] {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            errors.push(FieldError::new(field, "must not be empty"));
        }
    }
    if !errors.is_empty() {
        return Err(WellspringError::Validation(errors));
    }

    if let Some(v) = input.title {
        resource.title = v.trim().to_string();
    }
    if let Some(v) = input.summary {
        resource.summary = v;
    }
    if let Some(v) = input.content {
        resource.content = v;
    }
    if let Some(v) = input.category {
        resource.category = v.trim().to_string();
    }
    if let Some(v) = input.kind {
        resource.kind = v;
    }
    if let Some(v) = input.tags {
        resource.tags = v.into_iter().filter(|t| !t.trim().is_empty()).collect();
    }
    if let Some(v) = input.is_published {
        resource.is_published = v;
    }
    Ok(())
}

pub async fn create(db: &Database, author: &Viewer, input: ResourceInput) -> Result<ResourceDoc> {
    let mut missing = Vec::new();
    for (field, value) in [
        ("title", &input.title),
        ("content", &input.content),
        ("category", &input.category),
    ] {
        if value.is_none() {
            missing.push(FieldError::new(field, "is required"));
        }
    }
    if !missing.is_empty() {
        return Err(WellspringError::Validation(missing));
    }

    let mut resource = ResourceDoc::new(String::new(), String::new(), String::new(), &author.id);
    apply(&mut resource, input)?;
    db.collection::<ResourceDoc>().insert_one(resource.clone()).await?;
    info!(resource_id = %resource.id, author = %author.id, "resource created");
    Ok(resource)
}

pub async fn update(db: &Database, viewer: &Viewer, id: &str, input: ResourceInput) -> Result<ResourceDoc> {
    let mut resource = load(db, id).await?;
    if !can_edit(viewer, &resource) {
        return Err(WellspringError::Forbidden("Only the author may edit this resource".into()));
    }
    apply(&mut resource, input)?;
    db.collection::<ResourceDoc>().replace(&mut resource).await?;
    Ok(resource)
}

pub async fn delete(db: &Database, viewer: &Viewer, id: &str) -> Result<()> {
    let resource = load(db, id).await?;
    if !can_edit(viewer, &resource) {
        return Err(WellspringError::Forbidden("Only the author may delete this resource".into()));
    }
    db.collection::<ResourceDoc>().soft_delete(id).await?;
    info!(resource_id = %id, by = %viewer.id, "resource deleted");
    Ok(())
}

/// Toggle the caller's like; returns the updated resource
pub async fn toggle_like(db: &Database, viewer: &Viewer, id: &str) -> Result<ResourceDoc> {
    let mut resource = load(db, id).await?;
    if !can_read(viewer, &resource) {
        return Err(WellspringError::NotFound("Resource".into()));
    }
    resource.toggle_like(&viewer.id);
    db.collection::<ResourceDoc>().replace(&mut resource).await?;
    Ok(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, published: bool) -> ResourceInput {
        ResourceInput {
            title: Some(title.into()),
            content: Some("Breathe in for four seconds.".into()),
            category: Some("stress".into()),
            tags: Some(vec!["breathing".into()]),
            is_published: Some(published),
            ..ResourceInput::default()
        }
    }

    #[tokio::test]
    async fn test_drafts_visible_to_author_only() {
        let db = Database::memory();
        let author = Viewer::new("c1", Role::Counselor);
        let reader = Viewer::new("e1", Role::Employee);
        let draft = create(&db, &author, input("Draft", false)).await.unwrap();
        create(&db, &author, input("Box breathing", true)).await.unwrap();

        assert_eq!(list(&db, &author, &ResourceQuery::default()).await.unwrap().len(), 2);
        let visible = list(&db, &reader, &ResourceQuery::default()).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Box breathing");
        assert!(matches!(
            get(&db, &reader, &draft.id).await,
            Err(WellspringError::NotFound(_))
        ));

        let search = ResourceQuery {
            search: Some("BREATH".into()),
            ..ResourceQuery::default()
        };
        assert_eq!(list(&db, &reader, &search).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_views_likes_and_edit_rights() {
        let db = Database::memory();
        let author = Viewer::new("c1", Role::Counselor);
        let reader = Viewer::new("e1", Role::Employee);
        let resource = create(&db, &author, input("Sleep", true)).await.unwrap();

        get(&db, &reader, &resource.id).await.unwrap();
        let seen = get(&db, &reader, &resource.id).await.unwrap();
        assert_eq!(seen.views, 2);

        let liked = toggle_like(&db, &reader, &resource.id).await.unwrap();
        assert!(ResourceView::new(&liked, "e1", false).liked);
        let unliked = toggle_like(&db, &reader, &resource.id).await.unwrap();
        assert_eq!(ResourceView::new(&unliked, "e1", false).likes, 0);

        assert!(matches!(
            update(&db, &reader, &resource.id, ResourceInput::default()).await,
            Err(WellspringError::Forbidden(_))
        ));
        let admin = Viewer::new("root", Role::SuperAdmin);
        delete(&db, &admin, &resource.id).await.unwrap();
        assert!(list(&db, &reader, &ResourceQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let db = Database::memory();
        let author = Viewer::new("c1", Role::Counselor);
        match create(&db, &author, ResourceInput::default()).await {
            Err(WellspringError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
