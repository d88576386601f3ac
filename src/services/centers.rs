//! Counseling centers and their counselor memberships
//!
//! This module is the only place that changes either side of the
//! center/counselor relationship. A counselor is independent with no
//! center, or linked to exactly one center that also lists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Role;
use crate::db::schemas::{CenterDoc, CenterSettings, OperatingHours, UserDoc};
use crate::db::{Database, Filter, Update};
use crate::types::{FieldError, Result, WellspringError};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CenterInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub admin: Option<String>,
    #[serde(default)]
    pub specialties: Option<Vec<String>>,
    #[serde(default)]
    pub operating_hours: Option<OperatingHoursInput>,
    #[serde(default)]
    pub max_counselors: Option<i32>,
    #[serde(default)]
    pub accepts_auto_assignment: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHoursInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunday: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub total_sessions: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CenterView {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    pub specialties: Vec<String>,
    pub operating_hours: OperatingHoursInput,
    pub max_counselors: i32,
    pub accepts_auto_assignment: bool,
    pub is_active: bool,
    pub counselors: Vec<MemberView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn apply_input(center: &mut CenterDoc, input: CenterInput) -> Result<()> {
    let mut errors = Vec::new();
    if let Some(name) = input.name {
        if name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        center.name = name.trim().to_string();
    }
    if let Some(max) = input.max_counselors {
        if max < 1 {
            errors.push(FieldError::new("maxCounselors", "must be at least 1"));
        } else if (max as usize) < center.counselors().len() {
            errors.push(FieldError::new(
                "maxCounselors",
                "must not be below the current number of counselors",
            ));
        }
        center.settings.max_counselors = max;
    }
    if !errors.is_empty() {
        return Err(WellspringError::Validation(errors));
    }

    if let Some(v) = input.description {
        center.description = v;
    }
    if input.address.is_some() {
        center.address = input.address;
    }
    if input.phone.is_some() {
        center.phone = input.phone;
    }
    if input.admin.is_some() {
        center.admin = input.admin;
    }
    if let Some(v) = input.specialties {
        center.specialties = v;
    }
    if let Some(h) = input.operating_hours {
        center.operating_hours = OperatingHours {
            weekdays: h.weekdays,
            saturday: h.saturday,
            sunday: h.sunday,
        };
    }
    if let Some(v) = input.accepts_auto_assignment {
        center.settings.accepts_auto_assignment = v;
    }
    if let Some(v) = input.is_active {
        center.is_active = v;
    }
    Ok(())
}

pub async fn create_center(db: &Database, input: CenterInput) -> Result<CenterDoc> {
    let name = input
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| WellspringError::invalid("name", "is required"))?;
    let mut center = CenterDoc::new(name.trim().to_string());
    center.settings = CenterSettings::default();
    apply_input(&mut center, input)?;

    db.collection::<CenterDoc>().insert_one(center.clone()).await?;
    info!(center_id = %center.id, name = %center.name, "counseling center created");
    Ok(center)
}

pub async fn update_center(db: &Database, id: &str, input: CenterInput) -> Result<CenterDoc> {
    let centers = db.collection::<CenterDoc>();
    let mut center = load_center(db, id).await?;
    apply_input(&mut center, input)?;
    centers.replace(&mut center).await?;
    Ok(center)
}

pub async fn load_center(db: &Database, id: &str) -> Result<CenterDoc> {
    db.collection::<CenterDoc>()
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Counseling center".into()))
}

async fn load_counselor(db: &Database, id: &str) -> Result<UserDoc> {
    db.collection::<UserDoc>()
        .find_one(Filter::by_id(id).eq("role", Role::Counselor.as_str()))
        .await?
        .ok_or_else(|| WellspringError::NotFound("Counselor".into()))
}

pub async fn view(db: &Database, center: &CenterDoc) -> Result<CenterView> {
    let members = if center.counselors().is_empty() {
        Vec::new()
    } else {
        db.collection::<UserDoc>()
            .find_many(Filter::new().is_in("_id", center.counselors().iter().map(String::as_str)))
            .await?
    };

    Ok(CenterView {
        id: center.id.clone(),
        name: center.name.clone(),
        description: center.description.clone(),
        address: center.address.clone(),
        phone: center.phone.clone(),
        admin: center.admin.clone(),
        specialties: center.specialties.clone(),
        operating_hours: OperatingHoursInput {
            weekdays: center.operating_hours.weekdays.clone(),
            saturday: center.operating_hours.saturday.clone(),
            sunday: center.operating_hours.sunday.clone(),
        },
        max_counselors: center.settings.max_counselors,
        accepts_auto_assignment: center.settings.accepts_auto_assignment,
        is_active: center.is_active,
        counselors: members
            .iter()
            .map(|u| {
                let profile = u.counselor();
                MemberView {
                    id: u.id.clone(),
                    name: u.name.clone(),
                    rating: profile.map(|p| p.rating).unwrap_or_default(),
                    total_sessions: profile.map(|p| p.total_sessions).unwrap_or_default(),
                }
            })
            .collect(),
        created_at: center.metadata.created(),
    })
}

pub async fn list_centers(db: &Database) -> Result<Vec<CenterDoc>> {
    db.collection::<CenterDoc>().find_many(Filter::new()).await
}

/// Link a counselor to a center; capacity is checked here
pub async fn add_counselor(db: &Database, center_id: &str, counselor_id: &str) -> Result<CenterDoc> {
    let mut center = load_center(db, center_id).await?;
    let mut counselor = load_counselor(db, counselor_id).await?;
    let profile = counselor
        .counselor_mut()
        .ok_or_else(|| WellspringError::NotFound("Counselor".into()))?;

    if let Some(current) = profile.counseling_center() {
        if current != center_id {
            return Err(WellspringError::Conflict(
                "Counselor already belongs to another center".into(),
            ));
        }
    }
    center.admit(counselor_id)?;
    profile.link_center(center_id);

    db.collection::<CenterDoc>().replace(&mut center).await?;
    db.collection::<UserDoc>().replace(&mut counselor).await?;

    info!(center_id = %center_id, counselor = %counselor_id, "counselor joined center");
    Ok(center)
}

/// Unlink a counselor, making them independent
pub async fn remove_counselor(db: &Database, center_id: &str, counselor_id: &str) -> Result<CenterDoc> {
    let mut center = load_center(db, center_id).await?;
    if !center.has_member(counselor_id) {
        return Err(WellspringError::NotFound("Counselor in this center".into()));
    }

    if let Some(mut counselor) = db.collection::<UserDoc>().find_by_id(counselor_id).await? {
        if let Some(profile) = counselor.counselor_mut() {
            profile.unlink_center();
            db.collection::<UserDoc>().replace(&mut counselor).await?;
        }
    }
    center.release(counselor_id);
    db.collection::<CenterDoc>().replace(&mut center).await?;

    info!(center_id = %center_id, counselor = %counselor_id, "counselor left center");
    Ok(center)
}

/// Soft-delete a center after making every member independent.
/// Returns the number of counselors released.
pub async fn delete_center(db: &Database, center_id: &str) -> Result<u64> {
    let center = load_center(db, center_id).await?;

    let released = db
        .collection::<UserDoc>()
        .update_many(
            Filter::new()
                .eq("role", Role::Counselor.as_str())
                .eq("counseling_center", center_id),
            Update::new()
                .unset("counseling_center")
                .set("is_independent", true),
        )
        .await?;

    db.collection::<CenterDoc>().soft_delete(&center.id).await?;
    info!(center_id = %center_id, released, "counseling center deleted");
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::RoleProfile;

    async fn counselor(db: &Database, email: &str) -> String {
        let user = UserDoc::new(email, "hash".into(), "Counselor", RoleProfile::Counselor(Default::default())).unwrap();
        db.collection::<UserDoc>().insert_one(user).await.unwrap()
    }

    async fn reload(db: &Database, id: &str) -> UserDoc {
        db.collection::<UserDoc>().find_by_id(id).await.unwrap().unwrap()
    }

    fn named(name: &str, max: i32) -> CenterInput {
        CenterInput {
            name: Some(name.into()),
            max_counselors: Some(max),
            ..CenterInput::default()
        }
    }

    #[tokio::test]
    async fn test_membership_updates_both_sides() {
        let db = Database::memory();
        let center = create_center(&db, named("Seoul Mind", 1)).await.unwrap();
        let a = counselor(&db, "a@c.kr").await;
        let b = counselor(&db, "b@c.kr").await;

        add_counselor(&db, &center.id, &a).await.unwrap();
        let linked = reload(&db, &a).await;
        assert_eq!(linked.counselor().unwrap().counseling_center(), Some(center.id.as_str()));
        assert!(!linked.counselor().unwrap().is_independent());

        assert!(matches!(
            add_counselor(&db, &center.id, &b).await,
            Err(WellspringError::Conflict(_))
        ));
        assert!(reload(&db, &b).await.counselor().unwrap().is_independent());

        let other = create_center(&db, named("Busan Care", 5)).await.unwrap();
        assert!(add_counselor(&db, &other.id, &a).await.is_err());

        let after = remove_counselor(&db, &center.id, &a).await.unwrap();
        assert!(after.counselors().is_empty());
        assert!(reload(&db, &a).await.counselor().unwrap().is_independent());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_counselors() {
        let db = Database::memory();
        let center = create_center(&db, named("Seoul Mind", 5)).await.unwrap();
        let a = counselor(&db, "a@c.kr").await;
        let b = counselor(&db, "b@c.kr").await;
        add_counselor(&db, &center.id, &a).await.unwrap();
        add_counselor(&db, &center.id, &b).await.unwrap();

        assert_eq!(delete_center(&db, &center.id).await.unwrap(), 2);
        for id in [&a, &b] {
            let user = reload(&db, id).await;
            let profile = user.counselor().unwrap();
            assert!(profile.is_independent());
            assert_eq!(profile.counseling_center(), None);
        }
        assert!(matches!(
            load_center(&db, &center.id).await,
            Err(WellspringError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_capacity_cannot_shrink_below_members() {
        let db = Database::memory();
        let center = create_center(&db, named("Seoul Mind", 3)).await.unwrap();
        let a = counselor(&db, "a@c.kr").await;
        let b = counselor(&db, "b@c.kr").await;
        add_counselor(&db, &center.id, &a).await.unwrap();
        add_counselor(&db, &center.id, &b).await.unwrap();

        let shrink = CenterInput { max_counselors: Some(1), ..CenterInput::default() };
        assert!(matches!(
            update_center(&db, &center.id, shrink).await,
            Err(WellspringError::Validation(_))
        ));
    }
}
