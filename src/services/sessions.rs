//! Counseling session lifecycle
//!
//! Booking (with the annual allowance and auto-assignment), role-scoped
//! reads, status changes with their completion side effects, the two-tier
//! record, ratings and the per-session dispute.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::{AuthUser, Role};
use crate::db::schemas::{
    CompanyDoc, CounselingSessionDoc, CounselorOnlyContent, DeliveryMethod, DisputeStatus,
    NotificationDoc, NotificationKind, RiskLevel, SessionDispute, SessionRating, SessionRecord,
    SessionStatus, SharedContent, UserDoc,
};
use crate::db::{filter::stored, Database, Filter};
use crate::services::assignment;
use crate::services::notifications::{notify_quietly, NotificationSink};
use crate::types::{FieldError, Result, WellspringError};

const MAX_TOPIC_LEN: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub delivery_method: Option<String>,
    #[serde(default)]
    pub appointment_date: Option<String>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC)
pub fn parse_schedule(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Validate a booking date: present, parseable and not before today (UTC)
pub(crate) fn check_schedule(
    field: &str,
    raw: Option<&str>,
    now: DateTime<Utc>,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        errors.push(FieldError::new(field, "is required"));
        return None;
    };
    match parse_schedule(raw) {
        None => {
            errors.push(FieldError::new(field, "must be an ISO 8601 date"));
            None
        }
        Some(at) if at.date_naive() < now.date_naive() => {
            errors.push(FieldError::new(field, "cannot be in the past"));
            None
        }
        Some(at) => Some(at),
    }
}

pub(crate) fn check_method(
    field: &str,
    raw: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> Option<DeliveryMethod> {
    let method = raw.and_then(|r| DeliveryMethod::ALL.into_iter().find(|m| m.as_str() == r));
    if method.is_none() {
        errors.push(FieldError::new(field, "must be one of faceToFace, phoneVideo, chat"));
    }
    method
}

pub(crate) fn check_duration(duration: Option<i32>, errors: &mut Vec<FieldError>) {
    if duration.is_some_and(|d| !(10..=240).contains(&d)) {
        errors.push(FieldError::new("duration", "must be between 10 and 240 minutes"));
    }
}

/// Book a session for the calling employee or manager
pub async fn create(
    db: &Database,
    sink: &dyn NotificationSink,
    caller: &UserDoc,
    req: CreateSessionRequest,
    system_rate: i64,
    now: DateTime<Utc>,
) -> Result<CounselingSessionDoc> {
    let mut errors = Vec::new();
    let topic = req.topic.trim().to_string();
    if topic.is_empty() {
        errors.push(FieldError::new("topic", "is required"));
    } else if topic.chars().count() > MAX_TOPIC_LEN {
        errors.push(FieldError::new("topic", "must be at most 200 characters"));
    }
    let method = check_method("deliveryMethod", req.delivery_method.as_deref(), &mut errors);
    let date = check_schedule("appointmentDate", req.appointment_date.as_deref(), now, &mut errors);
    check_duration(req.duration, &mut errors);

    let (Some(method), Some(date), true) = (method, date, errors.is_empty()) else {
        return Err(WellspringError::Validation(errors));
    };

    if let crate::db::schemas::RoleProfile::Employee(profile) = &caller.profile {
        let mut usage = profile.annual_counseling_usage.clone();
        usage.roll_over(now.year());
        if usage.is_exhausted() {
            return Err(WellspringError::Conflict(format!(
                "Annual counseling limit of {} sessions has been reached",
                usage.limit
            )));
        }
    }

    let mut session = CounselingSessionDoc::new(
        caller.id.clone(),
        caller.company().map(str::to_string),
        topic,
        method,
        bson::DateTime::from_chrono(date),
    );
    session.notes = req.notes.filter(|n| !n.trim().is_empty());
    if let Some(duration) = req.duration {
        session.duration = duration;
    }

    assignment::auto_assign(db, &mut session, system_rate).await?;
    db.collection::<CounselingSessionDoc>().insert_one(session.clone()).await?;

    info!(
        session_id = %session.id,
        employee = %caller.id,
        assigned = session.counselor.is_some(),
        "counseling session created"
    );
    assignment::notify_assignment(sink, &session).await;
    Ok(session)
}

/// Sessions a caller may see at all
fn scope_filter(caller: &AuthUser) -> Result<Filter> {
    let filter = Filter::new();
    match caller.role() {
        Role::SuperAdmin => Ok(filter),
        Role::Employee => Ok(filter.eq("employee", caller.id())),
        Role::Counselor => Ok(filter.eq("counselor", caller.id())),
        Role::Manager | Role::CompanyAdmin => match caller.company() {
            Some(company) => Ok(filter.eq("company", company)),
            None => Err(WellspringError::Forbidden("No company on this account".into())),
        },
        Role::FinancialAdvisor => Err(WellspringError::Forbidden(
            "Counseling sessions are not available to this role".into(),
        )),
    }
}

fn in_scope(caller: &AuthUser, session: &CounselingSessionDoc) -> bool {
    match caller.role() {
        Role::SuperAdmin => true,
        Role::Employee => session.employee == caller.id(),
        Role::Counselor => session.is_counselor(caller.id()),
        Role::Manager | Role::CompanyAdmin => {
            caller.company().is_some() && session.company.as_deref() == caller.company()
        }
        Role::FinancialAdvisor => false,
    }
}

#[derive(Debug, Default, Clone)]
pub struct SessionQuery {
    pub status: Option<SessionStatus>,
}

/// Sessions visible to the caller, soonest appointment first
pub async fn list(db: &Database, caller: &AuthUser, query: &SessionQuery) -> Result<Vec<CounselingSessionDoc>> {
    let mut filter = scope_filter(caller)?;
    if let Some(status) = query.status {
        filter = filter.eq("status", stored(&status));
    }
    let mut sessions = db.collection::<CounselingSessionDoc>().find_many(filter).await?;
    sessions.sort_by_key(|s| s.appointment_date);
    Ok(sessions)
}

async fn load(db: &Database, id: &str) -> Result<CounselingSessionDoc> {
    db.collection::<CounselingSessionDoc>()
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Counseling session".into()))
}

pub async fn get(db: &Database, caller: &AuthUser, id: &str) -> Result<CounselingSessionDoc> {
    let session = load(db, id).await?;
    if !in_scope(caller, &session) {
        return Err(WellspringError::Forbidden("Not allowed to view this session".into()));
    }
    Ok(session)
}

async fn save_if_status(
    db: &Database,
    session: &mut CounselingSessionDoc,
    from: SessionStatus,
) -> Result<()> {
    let saved = db
        .collection::<CounselingSessionDoc>()
        .replace_if(session, Filter::new().eq("status", stored(&from)))
        .await?;
    if saved {
        Ok(())
    } else {
        Err(WellspringError::Conflict(
            "Session was modified concurrently, reload and retry".into(),
        ))
    }
}

/// Move a session along its status machine
///
/// The assigned counselor and super-admins drive any legal transition; the
/// session's employee may only cancel.
pub async fn update_status(
    db: &Database,
    caller: &AuthUser,
    id: &str,
    next: SessionStatus,
    now: DateTime<Utc>,
) -> Result<CounselingSessionDoc> {
    let mut session = get(db, caller, id).await?;
    let allowed = match caller.role() {
        Role::SuperAdmin => true,
        Role::Counselor => session.is_counselor(caller.id()),
        Role::Employee => session.employee == caller.id() && next == SessionStatus::Cancelled,
        _ => false,
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
    if next == SessionStatus::Completed && session.counselor.is_none() {
        return Err(WellspringError::Conflict(
            "An unassigned session cannot be completed".into(),
        ));
    }

    session.status = next;
    if next == SessionStatus::Completed {
        session.completed_at = Some(bson::DateTime::from_chrono(now));
    }
    save_if_status(db, &mut session, from).await?;
    info!(session_id = %id, from = from.as_str(), to = next.as_str(), by = %caller.id(), "session status changed");

    if next == SessionStatus::Completed {
        record_completion(db, &session, now).await?;
    }
    Ok(session)
}

/// Usage and billing effects of a completed session
async fn record_completion(db: &Database, session: &CounselingSessionDoc, now: DateTime<Utc>) -> Result<()> {
    let users = db.collection::<UserDoc>();

    if let Some(mut employee) = users.find_by_id(&session.employee).await? {
        if let Some(profile) = employee.employee_mut() {
            let usage = &mut profile.annual_counseling_usage;
            usage.roll_over(now.year());
            usage.used += 1;
            users.replace(&mut employee).await?;
        }
    }

    if let Some(counselor_id) = session.counselor.as_deref() {
        if let Some(mut counselor) = users.find_by_id(counselor_id).await? {
            if let Some(profile) = counselor.counselor_mut() {
                profile.total_sessions += 1;
                users.replace(&mut counselor).await?;
            }
        }
    }

    let Some(company_id) = session.company.as_deref() else {
        return Ok(());
    };
    let companies = db.collection::<CompanyDoc>();
    let Some(mut company) = companies.find_by_id(company_id).await? else {
        warn!(session_id = %session.id, company = %company_id, "company of completed session not found");
        return Ok(());
    };
    let date = session.appointment_date.to_chrono();
    company.update_monthly_usage(date.year(), date.month(), 1, session.counselor_rate);
    if !company.deduct_balance(session.counselor_rate) {
        warn!(
            company = %company_id,
            balance = company.balance,
            cost = session.counselor_rate,
            "company balance insufficient, session cost not deducted"
        );
    }
    companies.replace(&mut company).await
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordInput {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
    #[serde(default)]
    pub follow_up: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub assessment: Option<String>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
}

/// Write the two-tier record; only the assigned counselor or a super-admin
pub async fn update_record(
    db: &Database,
    caller: &AuthUser,
    id: &str,
    input: RecordInput,
) -> Result<CounselingSessionDoc> {
    let mut session = get(db, caller, id).await?;
    if !(caller.is_super_admin() || session.is_counselor(caller.id())) {
        return Err(WellspringError::Forbidden(
            "Only the assigned counselor may write session records".into(),
        ));
    }

    let record = session.session_record.get_or_insert_with(SessionRecord::default);
    let shared: &mut SharedContent = &mut record.shared_content;
    if let Some(summary) = input.summary {
        shared.summary = summary;
    }
    if let Some(recommendations) = input.recommendations {
        shared.recommendations = recommendations;
    }
    if input.follow_up.is_some() {
        shared.follow_up = input.follow_up;
    }
    let private: &mut CounselorOnlyContent = &mut record.counselor_only_content;
    if let Some(notes) = input.notes {
        private.notes = notes;
    }
    if input.assessment.is_some() {
        private.assessment = input.assessment;
    }
    if input.risk_level.is_some() {
        private.risk_level = input.risk_level;
    }

    db.collection::<CounselingSessionDoc>().replace(&mut session).await?;
    info!(session_id = %id, by = %caller.id(), "session record updated");
    Ok(session)
}

#[derive(Debug, Deserialize)]
pub struct RatingInput {
    pub score: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

/// The session's employee rates a completed session once
pub async fn rate(
    db: &Database,
    caller: &AuthUser,
    id: &str,
    input: RatingInput,
    now: DateTime<Utc>,
) -> Result<CounselingSessionDoc> {
    let mut session = get(db, caller, id).await?;
    if session.employee != caller.id() {
        return Err(WellspringError::Forbidden(
            "Only the session's employee may rate it".into(),
        ));
    }
    if !(1..=5).contains(&input.score) {
        return Err(WellspringError::invalid("score", "must be between 1 and 5"));
    }
    if session.status != SessionStatus::Completed {
        return Err(WellspringError::Conflict("Only completed sessions can be rated".into()));
    }
    if session.rating.is_some() {
        return Err(WellspringError::Conflict("Session has already been rated".into()));
    }

    session.rating = Some(SessionRating {
        score: input.score,
        comment: input.comment.filter(|c| !c.trim().is_empty()),
        rated_at: bson::DateTime::from_chrono(now),
    });
    db.collection::<CounselingSessionDoc>()
        .replace_if(&mut session, Filter::new().exists("rating", false))
        .await?
        .then_some(())
        .ok_or_else(|| WellspringError::Conflict("Session has already been rated".into()))?;

    if let Some(counselor_id) = session.counselor.as_deref() {
        let users = db.collection::<UserDoc>();
        if let Some(mut counselor) = users.find_by_id(counselor_id).await? {
            if let Some(profile) = counselor.counselor_mut() {
                profile.record_rating(input.score);
                users.replace(&mut counselor).await?;
            }
        }
    }
    info!(session_id = %id, score = input.score, "session rated");
    Ok(session)
}

/// Employee or assigned counselor opens a dispute on the session
pub async fn raise_dispute(
    db: &Database,
    sink: &dyn NotificationSink,
    caller: &AuthUser,
    id: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<CounselingSessionDoc> {
    let mut session = get(db, caller, id).await?;
    if !(session.employee == caller.id() || session.is_counselor(caller.id())) {
        return Err(WellspringError::Forbidden(
            "Only the session's employee or counselor may dispute it".into(),
        ));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(WellspringError::invalid("reason", "is required"));
    }
    if session
        .dispute
        .as_ref()
        .is_some_and(|d| matches!(d.status, DisputeStatus::Pending | DisputeStatus::Reviewing))
    {
        return Err(WellspringError::Conflict(
            "A dispute is already open for this session".into(),
        ));
    }

    session.dispute = Some(SessionDispute {
        raised_by: caller.id().to_string(),
        raised_by_role: caller.role(),
        reason: reason.to_string(),
        status: DisputeStatus::Pending,
        raised_at: bson::DateTime::from_chrono(now),
        resolution: None,
        resolved_by: None,
        resolved_at: None,
    });
    db.collection::<CounselingSessionDoc>().replace(&mut session).await?;
    info!(session_id = %id, by = %caller.id(), "session dispute raised");

    let admins = db
        .collection::<UserDoc>()
        .find_many(
            Filter::new()
                .eq("role", Role::SuperAdmin.as_str())
                .eq("is_active", true),
        )
        .await?;
    for admin in admins {
        notify_quietly(
            sink,
            NotificationDoc::new(
                &admin.id,
                NotificationKind::SessionDisputed,
                "Session dispute raised",
                &format!("A dispute was raised on session {id}: {reason}"),
            )
            .about(id),
        )
        .await;
    }
    Ok(session)
}

#[derive(Debug, Deserialize)]
pub struct DisputeStatusInput {
    pub status: DisputeStatus,
    #[serde(default)]
    pub resolution: Option<String>,
}

/// Super-admin review of a session dispute
pub async fn update_dispute_status(
    db: &Database,
    sink: &dyn NotificationSink,
    admin_id: &str,
    id: &str,
    input: DisputeStatusInput,
    now: DateTime<Utc>,
) -> Result<CounselingSessionDoc> {
    let mut session = load(db, id).await?;
    let Some(dispute) = session.dispute.as_mut() else {
        return Err(WellspringError::Conflict("Session has no dispute".into()));
    };
    if !dispute.status.can_transition_to(input.status) {
        return Err(WellspringError::Conflict(format!(
            "Cannot move dispute from {} to {}",
            dispute.status.as_str(),
            input.status.as_str()
        )));
    }

    dispute.status = input.status;
    if let Some(resolution) = input.resolution.filter(|r| !r.trim().is_empty()) {
        dispute.resolution = Some(resolution);
    }
    if matches!(input.status, DisputeStatus::Resolved | DisputeStatus::Rejected) {
        dispute.resolved_by = Some(admin_id.to_string());
        dispute.resolved_at = Some(bson::DateTime::from_chrono(now));
    }
    let raised_by = dispute.raised_by.clone();

    db.collection::<CounselingSessionDoc>().replace(&mut session).await?;
    info!(session_id = %id, status = input.status.as_str(), admin = %admin_id, "session dispute updated");

    notify_quietly(
        sink,
        NotificationDoc::new(
            &raised_by,
            NotificationKind::SessionDisputed,
            "Dispute updated",
            &format!("Your dispute on session {id} is now {}.", input.status.as_str()),
        )
        .about(id),
    )
    .await;
    Ok(session)
}
