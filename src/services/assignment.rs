//! Counselor assignment for counseling sessions

use tracing::info;

use crate::auth::Role;
use crate::db::schemas::{
    AssignmentStatus, CounselingSessionDoc, NotificationDoc, NotificationKind, UserDoc,
};
use crate::db::{filter::stored, Database, Filter};
use crate::services::notifications::{notify_quietly, NotificationSink};
use crate::types::{Result, WellspringError};

/// First active counselor in store order
pub async fn first_active_counselor(db: &Database) -> Result<Option<UserDoc>> {
    db.collection::<UserDoc>()
        .find_one(
            Filter::new()
                .eq("role", Role::Counselor.as_str())
                .eq("is_active", true),
        )
        .await
}

/// Assign a new session to the first active counselor at their effective
/// rate. Leaves the session pending when there is no active counselor.
pub async fn auto_assign(
    db: &Database,
    session: &mut CounselingSessionDoc,
    system_rate: i64,
) -> Result<Option<String>> {
    let Some(counselor) = first_active_counselor(db).await? else {
        info!(session_id = %session.id, "no active counselor, session left pending");
        return Ok(None);
    };
    let Some(profile) = counselor.counselor() else {
        return Ok(None);
    };

    session.assign(&counselor.id, profile.effective_rate(system_rate));
    info!(
        session_id = %session.id,
        counselor = %counselor.id,
        rate = session.counselor_rate,
        "session auto-assigned"
    );
    Ok(Some(counselor.id))
}

/// Super-admin assignment of a pending session
pub async fn manual_assign(
    db: &Database,
    sink: &dyn NotificationSink,
    session_id: &str,
    counselor_id: &str,
    system_rate: i64,
) -> Result<CounselingSessionDoc> {
    let sessions = db.collection::<CounselingSessionDoc>();
    let mut session = sessions
        .find_by_id(session_id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Counseling session".into()))?;

    if session.assignment_status != AssignmentStatus::Pending {
        return Err(WellspringError::Conflict(
            "Only pending sessions can be assigned".into(),
        ));
    }

    let counselor = db
        .collection::<UserDoc>()
        .find_one(
            Filter::by_id(counselor_id)
                .eq("role", Role::Counselor.as_str())
                .eq("is_active", true),
        )
        .await?
        .ok_or_else(|| WellspringError::NotFound("Active counselor".into()))?;
    let rate = counselor
        .counselor()
        .map(|p| p.rate_for_method(session.delivery_method, system_rate))
        .unwrap_or(system_rate);

    session.assign(counselor_id, rate);
    let saved = sessions
        .replace_if(
            &mut session,
            Filter::new().eq("assignment_status", stored(&AssignmentStatus::Pending)),
        )
        .await?;
    if !saved {
        return Err(WellspringError::Conflict(
            "Session was assigned concurrently".into(),
        ));
    }

    info!(session_id = %session_id, counselor = %counselor_id, rate, "session assigned");
    notify_assignment(sink, &session).await;
    Ok(session)
}

/// The assigned counselor accepts an assigned session
pub async fn confirm(
    db: &Database,
    sink: &dyn NotificationSink,
    counselor_id: &str,
    session_id: &str,
) -> Result<CounselingSessionDoc> {
    let sessions = db.collection::<CounselingSessionDoc>();
    let mut session = sessions
        .find_by_id(session_id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Counseling session".into()))?;

    if !session.is_counselor(counselor_id) {
        return Err(WellspringError::Forbidden(
            "Only the assigned counselor may confirm this session".into(),
        ));
    }
    if session.assignment_status != AssignmentStatus::Assigned {
        return Err(WellspringError::Conflict(
            "Only assigned sessions can be confirmed".into(),
        ));
    }
    if session.status.is_terminal() {
        return Err(WellspringError::Conflict(format!(
            "Cannot confirm a {} session",
            session.status.as_str()
        )));
    }

    session.assignment_status = AssignmentStatus::Confirmed;
    let saved = sessions
        .replace_if(
            &mut session,
            Filter::new()
                .eq("assignment_status", stored(&AssignmentStatus::Assigned))
                .eq("counselor", counselor_id),
        )
        .await?;
    if !saved {
        return Err(WellspringError::Conflict(
            "Session assignment changed concurrently".into(),
        ));
    }

    info!(session_id = %session_id, counselor = %counselor_id, "session assignment confirmed");
    let when = session.appointment_date.to_chrono().format("%Y-%m-%d %H:%M");
    notify_quietly(
        sink,
        NotificationDoc::new(
            &session.employee,
            NotificationKind::SessionAssigned,
            "Session confirmed",
            &format!("Your counselor confirmed the session on {when} UTC."),
        )
        .about(&session.id),
    )
    .await;
    Ok(session)
}

pub async fn notify_assignment(sink: &dyn NotificationSink, session: &CounselingSessionDoc) {
    let Some(counselor) = session.counselor.as_deref() else {
        return;
    };
    let when = session.appointment_date.to_chrono().format("%Y-%m-%d %H:%M");
    notify_quietly(
        sink,
        NotificationDoc::new(
            counselor,
            NotificationKind::SessionAssigned,
            "New session assigned",
            &format!("A counseling session on {when} UTC has been assigned to you."),
        )
        .about(&session.id),
    )
    .await;
    notify_quietly(
        sink,
        NotificationDoc::new(
            &session.employee,
            NotificationKind::SessionAssigned,
            "Counselor assigned",
            &format!("A counselor has been assigned to your session on {when} UTC."),
        )
        .about(&session.id),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{DeliveryMethod, RoleProfile};
    use crate::services::notifications::StoreNotifier;

    async fn add_counselor(db: &Database, email: &str, active: bool, chat_rate: Option<i64>) -> String {
        let mut profile = crate::db::schemas::CounselorProfile::default();
        profile.method_rates.chat = chat_rate;
        let mut user = UserDoc::new(email, "hash".into(), "C", RoleProfile::Counselor(profile)).unwrap();
        user.is_active = active;
        db.collection::<UserDoc>().insert_one(user).await.unwrap()
    }

    fn pending_session(method: DeliveryMethod) -> CounselingSessionDoc {
        CounselingSessionDoc::new("emp".into(), None, "stress".into(), method, bson::DateTime::now())
    }

    #[tokio::test]
    async fn test_auto_assign_picks_first_active() {
        let db = Database::memory();
        add_counselor(&db, "inactive@c.kr", false, None).await;
        let first = add_counselor(&db, "first@c.kr", true, None).await;
        add_counselor(&db, "second@c.kr", true, None).await;

        let mut session = pending_session(DeliveryMethod::FaceToFace);
        let assigned = auto_assign(&db, &mut session, 50_000).await.unwrap();
        assert_eq!(assigned.as_deref(), Some(first.as_str()));
        assert_eq!(session.assignment_status, AssignmentStatus::Assigned);
        assert_eq!(session.counselor_rate, 50_000);
    }

    #[tokio::test]
    async fn test_no_counselor_stays_pending() {
        let db = Database::memory();
        let mut session = pending_session(DeliveryMethod::Chat);
        assert!(auto_assign(&db, &mut session, 50_000).await.unwrap().is_none());
        assert_eq!(session.assignment_status, AssignmentStatus::Pending);
        assert_eq!(session.counselor_rate, 0);
        assert!(session.counselor.is_none());
    }

    #[tokio::test]
    async fn test_manual_assign_uses_method_rate_and_requires_pending() {
        let db = Database::memory();
        let sink = StoreNotifier::new(db.clone());
        let counselor = add_counselor(&db, "c@c.kr", true, Some(35_000)).await;
        let session_id = db
            .collection::<CounselingSessionDoc>()
            .insert_one(pending_session(DeliveryMethod::Chat))
            .await
            .unwrap();

        let session = manual_assign(&db, &sink, &session_id, &counselor, 50_000).await.unwrap();
        assert_eq!(session.counselor_rate, 35_000);
        assert_eq!(session.assignment_status, AssignmentStatus::Assigned);

        assert!(matches!(
            manual_assign(&db, &sink, &session_id, &counselor, 50_000).await,
            Err(WellspringError::Conflict(_))
        ));
        let notes = db
            .collection::<NotificationDoc>()
            .count(Filter::new().eq("recipient", counselor.as_str()))
            .await
            .unwrap();
        assert_eq!(notes, 1);
    }

    #[tokio::test]
    async fn test_confirm_only_from_assigned() {
        let db = Database::memory();
        let sink = StoreNotifier::new(db.clone());
        let counselor = add_counselor(&db, "c@c.kr", true, None).await;
        let other = add_counselor(&db, "d@c.kr", true, None).await;
        let sessions = db.collection::<CounselingSessionDoc>();
        let session_id = sessions.insert_one(pending_session(DeliveryMethod::Chat)).await.unwrap();

        // pending sessions have nobody to confirm them
        assert!(matches!(
            confirm(&db, &sink, &counselor, &session_id).await,
            Err(WellspringError::Forbidden(_))
        ));

        manual_assign(&db, &sink, &session_id, &counselor, 50_000).await.unwrap();
        assert!(matches!(
            confirm(&db, &sink, &other, &session_id).await,
            Err(WellspringError::Forbidden(_))
        ));

        let confirmed = confirm(&db, &sink, &counselor, &session_id).await.unwrap();
        assert_eq!(confirmed.assignment_status, AssignmentStatus::Confirmed);
        let reloaded = sessions.find_by_id(&session_id).await.unwrap().unwrap();
        assert_eq!(reloaded.assignment_status, AssignmentStatus::Confirmed);

        assert!(matches!(
            confirm(&db, &sink, &counselor, &session_id).await,
            Err(WellspringError::Conflict(_))
        ));
        // a confirmed session cannot be reassigned either
        assert!(matches!(
            manual_assign(&db, &sink, &session_id, &other, 50_000).await,
            Err(WellspringError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_refuses_cancelled_session() {
        let db = Database::memory();
        let sink = StoreNotifier::new(db.clone());
        let counselor = add_counselor(&db, "c@c.kr", true, None).await;
        let mut session = pending_session(DeliveryMethod::FaceToFace);
        session.assign(&counselor, 50_000);
        session.status = crate::db::schemas::SessionStatus::Cancelled;
        let session_id = db.collection::<CounselingSessionDoc>().insert_one(session).await.unwrap();

        assert!(matches!(
            confirm(&db, &sink, &counselor, &session_id).await,
            Err(WellspringError::Conflict(_))
        ));
    }
}
