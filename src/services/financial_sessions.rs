//! Financial counseling sessions

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::auth::{AuthUser, Role};
use crate::db::schemas::{
    ClientFeedback, FinancialRecord, FinancialSessionDoc, FinancialSessionType, NotificationDoc,
    NotificationKind, SessionStatus, UserDoc, DEFAULT_DURATION_MINUTES,
};
use crate::db::{filter::stored, Database, Filter};
use crate::services::notifications::{notify_quietly, NotificationSink};
use crate::services::sessions::{check_duration, check_method, check_schedule};
use crate::types::{FieldError, Result, WellspringError};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateFinancialSessionRequest {
    #[serde(default)]
    pub financial_advisor: Option<String>,
    /// Required when an advisor books on behalf of a client
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub scheduled_date: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
}

fn parse_session_type(raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<FinancialSessionType> {
    let parsed = raw.and_then(|r| {
        serde_json::from_value::<FinancialSessionType>(serde_json::Value::String(r.to_string())).ok()
    });
    if parsed.is_none() {
        errors.push(FieldError::new("sessionType", "is not a known financial session type"));
    }
    parsed
}

async fn active_advisor(db: &Database, id: Option<&str>) -> Result<Option<UserDoc>> {
    let mut filter = Filter::new()
        .eq("role", Role::FinancialAdvisor.as_str())
        .eq("is_active", true);
    if let Some(id) = id {
        filter = filter.and(Filter::by_id(id));
    }
    db.collection::<UserDoc>().find_one(filter).await
}

fn advisor_rate(advisor: &UserDoc) -> i64 {
    match &advisor.profile {
        crate::db::schemas::RoleProfile::FinancialAdvisor(p) => p.session_rate,
        _ => 0,
    }
}

/// Book a financial session
///
/// Clients (employees, managers) may name an advisor or take the first
/// active one; an advisor books for a named client.
pub async fn create(
    db: &Database,
    sink: &dyn NotificationSink,
    caller: &AuthUser,
    req: CreateFinancialSessionRequest,
    now: DateTime<Utc>,
) -> Result<FinancialSessionDoc> {
    let mut errors = Vec::new();
    let session_type = parse_session_type(req.session_type.as_deref(), &mut errors);
    let format = check_method("format", req.format.as_deref(), &mut errors);
    let date = check_schedule("scheduledDate", req.scheduled_date.as_deref(), now, &mut errors);
    check_duration(req.duration, &mut errors);
    if caller.role() == Role::FinancialAdvisor && req.client.is_none() {
        errors.push(FieldError::new("client", "is required when an advisor books"));
    }
    let (Some(session_type), Some(format), Some(date), true) =
        (session_type, format, date, errors.is_empty())
    else {
        return Err(WellspringError::Validation(errors));
    };

    let users = db.collection::<UserDoc>();
    let (client, advisor) = if caller.role() == Role::FinancialAdvisor {
        let client_id = req.client.as_deref().unwrap_or_default();
        let client = users
            .find_one(Filter::by_id(client_id).eq("is_active", true))
            .await?
            .filter(|u| matches!(u.role(), Role::Employee | Role::Manager))
            .ok_or_else(|| WellspringError::invalid("client", "must be an active employee or manager"))?;
        (client, Some(caller.user.clone()))
    } else {
        let advisor = active_advisor(db, req.financial_advisor.as_deref()).await?;
        if req.financial_advisor.is_some() && advisor.is_none() {
            return Err(WellspringError::invalid("financialAdvisor", "must be an active financial advisor"));
        }
        (caller.user.clone(), advisor)
    };

    let mut session = FinancialSessionDoc::new(
        client.id.clone(),
        advisor.as_ref().map(|a| a.id.clone()),
        client.company().map(str::to_string),
        session_type,
        format,
        bson::DateTime::from_chrono(date),
        req.duration.unwrap_or(DEFAULT_DURATION_MINUTES),
    );
    if let Some(advisor) = &advisor {
        session.advisor_rate = advisor_rate(advisor);
    }
    db.collection::<FinancialSessionDoc>().insert_one(session.clone()).await?;

    info!(
        session_id = %session.id,
        client = %session.client,
        advisor = ?session.financial_advisor,
        "financial session created"
    );
    if let Some(advisor) = advisor.filter(|a| a.id != caller.id()) {
        notify_quietly(
            sink,
            NotificationDoc::new(
                &advisor.id,
                NotificationKind::SessionAssigned,
                "New financial session",
                &format!("A financial session on {} UTC has been booked with you.", date.format("%Y-%m-%d %H:%M")),
            )
            .about(&session.id),
        )
        .await;
    }
    Ok(session)
}

fn scope_filter(caller: &AuthUser) -> Result<Filter> {
    let filter = Filter::new();
    match caller.role() {
        Role::SuperAdmin => Ok(filter),
        Role::Employee => Ok(filter.eq("client", caller.id())),
        Role::FinancialAdvisor => Ok(filter.eq("financial_advisor", caller.id())),
        Role::Manager | Role::CompanyAdmin => match caller.company() {
            Some(company) => Ok(filter.eq("company", company)),
            None => Err(WellspringError::Forbidden("No company on this account".into())),
        },
        Role::Counselor => Err(WellspringError::Forbidden(
            "Financial sessions are not available to this role".into(),
        )),
    }
}

fn in_scope(caller: &AuthUser, session: &FinancialSessionDoc) -> bool {
    match caller.role() {
        Role::SuperAdmin => true,
        Role::Employee => session.client == caller.id(),
        Role::FinancialAdvisor => session.is_advisor(caller.id()),
        Role::Manager | Role::CompanyAdmin => {
            caller.company().is_some() && session.company.as_deref() == caller.company()
        }
        Role::Counselor => false,
    }
}

pub async fn list(
    db: &Database,
    caller: &AuthUser,
    status: Option<SessionStatus>,
) -> Result<Vec<FinancialSessionDoc>> {
    let mut filter = scope_filter(caller)?;
    if let Some(status) = status {
        filter = filter.eq("status", stored(&status));
    }
    let mut sessions = db.collection::<FinancialSessionDoc>().find_many(filter).await?;
    sessions.sort_by_key(|s| s.scheduled_date);
    Ok(sessions)
}

pub async fn get(db: &Database, caller: &AuthUser, id: &str) -> Result<FinancialSessionDoc> {
    let session = db
        .collection::<FinancialSessionDoc>()
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Financial session".into()))?;
    if !in_scope(caller, &session) {
        return Err(WellspringError::Forbidden("Not allowed to view this session".into()));
    }
    Ok(session)
}

/// Advisor or super-admin moves the session; the client may only cancel
pub async fn update_status(
    db: &Database,
    caller: &AuthUser,
    id: &str,
    next: SessionStatus,
) -> Result<FinancialSessionDoc> {
    let mut session = get(db, caller, id).await?;
    let allowed = match caller.role() {
        Role::SuperAdmin => true,
        Role::FinancialAdvisor => session.is_advisor(caller.id()),
        _ => session.client == caller.id() && next == SessionStatus::Cancelled,
    };
    if !allowed {
        return Err(WellspringError::Forbidden(
            "Not allowed to change this session's status".into(),
        ));
    }
    let from = session.status;
    if !from.can_transition_to(next) {
        return Err(WellspringError::Conflict(format!(
            "Cannot change session status from {} to {}",
            from.as_str(),
            next.as_str()
        )));
    }

    session.status = next;
    let saved = db
        .collection::<FinancialSessionDoc>()
        .replace_if(&mut session, Filter::new().eq("status", stored(&from)))
        .await?;
    if !saved {
        return Err(WellspringError::Conflict(
            "Session was modified concurrently, reload and retry".into(),
        ));
    }
    info!(session_id = %id, from = from.as_str(), to = next.as_str(), "financial session status changed");

    if next == SessionStatus::Completed {
        if let Some(advisor_id) = session.financial_advisor.as_deref() {
            let users = db.collection::<UserDoc>();
            if let Some(mut advisor) = users.find_by_id(advisor_id).await? {
                if let Some(profile) = advisor.advisor_mut() {
                    profile.total_sessions += 1;
                    users.replace(&mut advisor).await?;
                }
            }
        }
    }
    Ok(session)
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FinancialRecordInput {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
    #[serde(default)]
    pub action_items: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub risk_assessment: Option<String>,
}

pub async fn update_record(
    db: &Database,
    caller: &AuthUser,
    id: &str,
    input: FinancialRecordInput,
) -> Result<FinancialSessionDoc> {
    let mut session = get(db, caller, id).await?;
    if !(caller.is_super_admin() || session.is_advisor(caller.id())) {
        return Err(WellspringError::Forbidden(
            "Only the session's advisor may write its record".into(),
        ));
    }

    let record = session.session_record.get_or_insert_with(FinancialRecord::default);
    if let Some(summary) = input.summary {
        record.shared_content.summary = summary;
    }
    if let Some(recommendations) = input.recommendations {
        record.shared_content.recommendations = recommendations;
    }
    if let Some(items) = input.action_items {
        record.shared_content.action_items = items;
    }
    if let Some(notes) = input.notes {
        record.advisor_only_content.notes = notes;
    }
    if input.risk_assessment.is_some() {
        record.advisor_only_content.risk_assessment = input.risk_assessment;
    }

    db.collection::<FinancialSessionDoc>().replace(&mut session).await?;
    info!(session_id = %id, by = %caller.id(), "financial session record updated");
    Ok(session)
}

#[derive(Debug, Deserialize)]
pub struct FeedbackInput {
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Client feedback on a completed session, once
pub async fn submit_feedback(
    db: &Database,
    caller: &AuthUser,
    id: &str,
    input: FeedbackInput,
    now: DateTime<Utc>,
) -> Result<FinancialSessionDoc> {
    let mut session = get(db, caller, id).await?;
    if session.client != caller.id() {
        return Err(WellspringError::Forbidden("Only the client may leave feedback".into()));
    }
    if !(1..=5).contains(&input.rating) {
        return Err(WellspringError::invalid("rating", "must be between 1 and 5"));
    }
    if session.status != SessionStatus::Completed {
        return Err(WellspringError::Conflict(
            "Feedback is only accepted for completed sessions".into(),
        ));
    }
    if session.client_feedback.is_some() {
        return Err(WellspringError::Conflict("Feedback was already submitted".into()));
    }

    session.client_feedback = Some(ClientFeedback {
        rating: input.rating,
        comment: input.comment.filter(|c| !c.trim().is_empty()),
        submitted_at: bson::DateTime::from_chrono(now),
    });
    db.collection::<FinancialSessionDoc>().replace(&mut session).await?;

    if let Some(advisor_id) = session.financial_advisor.as_deref() {
        let users = db.collection::<UserDoc>();
        if let Some(mut advisor) = users.find_by_id(advisor_id).await? {
            if let Some(profile) = advisor.advisor_mut() {
                let total = profile.rating * profile.rating_count as f64 + f64::from(input.rating);
                profile.rating_count += 1;
                profile.rating = (total / profile.rating_count as f64 * 10.0).round() / 10.0;
                users.replace(&mut advisor).await?;
            }
        }
    }
    info!(session_id = %id, rating = input.rating, "financial feedback submitted");
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{AdvisorProfile, DeliveryMethod, RoleProfile};
    use crate::services::notifications::StoreNotifier;
    use crate::services::visibility::project_financial;
    use chrono::{Datelike, Duration};

    async fn setup() -> (Database, StoreNotifier, AuthUser, AuthUser) {
        let db = Database::memory();
        let advisor = UserDoc::new(
            "fa@money.kr",
            "hash".into(),
            "Advisor",
            RoleProfile::FinancialAdvisor(AdvisorProfile {
                session_rate: 70_000,
                ..AdvisorProfile::default()
            }),
        )
        .unwrap();
        db.collection::<UserDoc>().insert_one(advisor.clone()).await.unwrap();

        let profile = RoleProfile::for_role(Role::Employee, Some("co".into()), Utc::now().year(), 12).unwrap();
        let client = UserDoc::new("emp@acme.kr", "hash".into(), "Emp", profile).unwrap();
        db.collection::<UserDoc>().insert_one(client.clone()).await.unwrap();

        (
            db.clone(),
            StoreNotifier::new(db),
            AuthUser { user: client },
            AuthUser { user: advisor },
        )
    }

    fn request(now: DateTime<Utc>) -> CreateFinancialSessionRequest {
        CreateFinancialSessionRequest {
            session_type: Some("debt-management".into()),
            format: Some("phoneVideo".into()),
            scheduled_date: Some((now + Duration::days(3)).to_rfc3339()),
            ..CreateFinancialSessionRequest::default()
        }
    }

    #[tokio::test]
    async fn test_client_booking_takes_first_advisor() {
        let (db, sink, client, advisor) = setup().await;
        let now = Utc::now();
        let session = create(&db, &sink, &client, request(now), now).await.unwrap();
        assert_eq!(session.financial_advisor.as_deref(), Some(advisor.id()));
        assert_eq!(session.advisor_rate, 70_000);
        assert_eq!(session.session_type, FinancialSessionType::DebtManagement);
        assert_eq!(session.format, DeliveryMethod::PhoneVideo);
        assert_eq!(session.company.as_deref(), Some("co"));
    }

    #[tokio::test]
    async fn test_advisor_booking_needs_client() {
        let (db, sink, client, advisor) = setup().await;
        let now = Utc::now();
        assert!(matches!(
            create(&db, &sink, &advisor, request(now), now).await,
            Err(WellspringError::Validation(_))
        ));
        let mut req = request(now);
        req.client = Some(client.id().to_string());
        let session = create(&db, &sink, &advisor, req, now).await.unwrap();
        assert_eq!(session.client, client.id());
    }

    #[tokio::test]
    async fn test_record_is_hidden_from_client() {
        let (db, sink, client, advisor) = setup().await;
        let now = Utc::now();
        let session = create(&db, &sink, &client, request(now), now).await.unwrap();

        let input = FinancialRecordInput {
            summary: Some("consolidate loans".into()),
            notes: Some("private".into()),
            ..FinancialRecordInput::default()
        };
        assert!(matches!(
            update_record(&db, &client, &session.id, FinancialRecordInput::default()).await,
            Err(WellspringError::Forbidden(_))
        ));
        let updated = update_record(&db, &advisor, &session.id, input).await.unwrap();

        let view = serde_json::to_value(project_financial(&client.viewer(), &updated)).unwrap();
        assert_eq!(view["sessionRecord"]["sharedContent"]["summary"], "consolidate loans");
        assert!(!view.to_string().contains("private"));
    }

    #[tokio::test]
    async fn test_feedback_after_completion() {
        let (db, sink, client, advisor) = setup().await;
        let now = Utc::now();
        let session = create(&db, &sink, &client, request(now), now).await.unwrap();
        let early = FeedbackInput { rating: 5, comment: None };
        assert!(matches!(
            submit_feedback(&db, &client, &session.id, early, now).await,
            Err(WellspringError::Conflict(_))
        ));

        update_status(&db, &advisor, &session.id, SessionStatus::Completed).await.unwrap();
        submit_feedback(&db, &client, &session.id, FeedbackInput { rating: 3, comment: None }, now)
            .await
            .unwrap();

        let stored = db.collection::<UserDoc>().find_by_id(advisor.id()).await.unwrap().unwrap();
        match stored.profile {
            RoleProfile::FinancialAdvisor(p) => {
                assert_eq!(p.total_sessions, 1);
                assert_eq!(p.rating, 3.0);
            }
            _ => panic!("advisor profile expected"),
        }
    }
}
