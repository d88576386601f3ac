//! Session visibility projection
//!
//! Every session read, list or detail, goes through [`project_counseling`] or
//! [`project_financial`]. The access tier depends on who is asking and on
//! the session's two owners (the client and the assigned staff member).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::Role;
use crate::db::schemas::{
    to_chrono, AssignmentStatus, ClientFeedback, CounselingSessionDoc, DeliveryMethod,
    DisputeStatus, FinancialSessionDoc, FinancialSessionType, RiskLevel, SessionStatus,
};

/// Topic shown to company-side viewers instead of the real one
pub const REDACTED_TOPIC: &str = "Confidential counseling session";

/// Who is looking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub role: Role,
}

impl Viewer {
    pub fn new(id: &str, role: Role) -> Self {
        Self {
            id: id.to_string(),
            role,
        }
    }
}

/// The two parties a session belongs to
#[derive(Debug, Clone, Copy)]
pub struct Owners<'a> {
    pub client: &'a str,
    pub staff: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Everything, including owner-only content and billing
    Full,
    /// The session's own client: shared content and topic
    Client,
    /// Manager or company admin: shared summary, redacted topic
    CompanySummary,
    /// Anyone else allowed to see the session at all
    SharedOnly,
}

pub fn access_for(viewer: &Viewer, owners: Owners<'_>) -> Access {
    if viewer.role == Role::SuperAdmin {
        return Access::Full;
    }
    if viewer.role.is_staff() && owners.staff == Some(viewer.id.as_str()) {
        return Access::Full;
    }
    if owners.client == viewer.id {
        return Access::Client;
    }
    match viewer.role {
        Role::Manager | Role::CompanyAdmin => Access::CompanySummary,
        _ => Access::SharedOnly,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedContentView {
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub action_items: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerOnlyView {
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecordView {
    pub shared_content: SharedContentView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_only_content: Option<OwnerOnlyView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    pub score: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeView {
    pub raised_by: String,
    pub raised_by_role: Role,
    pub reason: String,
    pub status: DisputeStatus,
    pub raised_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounselingSessionView {
    pub id: String,
    pub employee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub counselor: Option<String>,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub delivery_method: DeliveryMethod,
    pub appointment_date: DateTime<Utc>,
    pub duration: i32,
    pub status: SessionStatus,
    pub assignment_status: AssignmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counselor_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paid_to_counselor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_record: Option<SessionRecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute: Option<DisputeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Project a counseling session for `viewer`
pub fn project_counseling(viewer: &Viewer, session: &CounselingSessionDoc) -> CounselingSessionView {
    let access = access_for(
        viewer,
        Owners {
            client: &session.employee,
            staff: session.counselor.as_deref(),
        },
    );
    let full = access == Access::Full;
    let company_side = access == Access::CompanySummary;

    let session_record = session.session_record.as_ref().map(|record| {
        let shared = &record.shared_content;
        SessionRecordView {
            shared_content: SharedContentView {
                summary: shared.summary.clone(),
                recommendations: if company_side {
                    Vec::new()
                } else {
                    shared.recommendations.clone()
                },
                follow_up: if company_side { None } else { shared.follow_up.clone() },
                action_items: Vec::new(),
            },
            owner_only_content: full.then(|| {
                let owner = &record.counselor_only_content;
                OwnerOnlyView {
                    notes: owner.notes.clone(),
                    assessment: owner.assessment.clone(),
                    risk_level: owner.risk_level,
                }
            }),
        }
    });

    CounselingSessionView {
        id: session.id.clone(),
        employee: session.employee.clone(),
        company: session.company.clone(),
        counselor: session.counselor.clone(),
        topic: if company_side {
            REDACTED_TOPIC.to_string()
        } else {
            session.topic.clone()
        },
        notes: matches!(access, Access::Full | Access::Client)
            .then(|| session.notes.clone())
            .flatten(),
        delivery_method: session.delivery_method,
        appointment_date: to_chrono(session.appointment_date),
        duration: session.duration,
        status: session.status,
        assignment_status: session.assignment_status,
        counselor_rate: full.then_some(session.counselor_rate),
        is_paid_to_counselor: full.then_some(session.is_paid_to_counselor),
        session_record,
        rating: (!company_side)
            .then(|| session.rating.as_ref())
            .flatten()
            .map(|r| RatingView {
                score: r.score,
                comment: r.comment.clone(),
                rated_at: to_chrono(r.rated_at),
            }),
        dispute: matches!(access, Access::Full | Access::Client)
            .then(|| session.dispute.as_ref())
            .flatten()
            .map(|d| DisputeView {
                raised_by: d.raised_by.clone(),
                raised_by_role: d.raised_by_role,
                reason: d.reason.clone(),
                status: d.status,
                raised_at: to_chrono(d.raised_at),
                resolution: d.resolution.clone(),
                resolved_at: d.resolved_at.map(to_chrono),
            }),
        created_at: session.metadata.created(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    pub rating: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<&ClientFeedback> for FeedbackView {
    fn from(f: &ClientFeedback) -> Self {
        Self {
            rating: f.rating,
            comment: f.comment.clone(),
            submitted_at: to_chrono(f.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSessionView {
    pub id: String,
    pub client: String,
    pub financial_advisor: Option<String>,
    pub session_type: FinancialSessionType,
    pub format: DeliveryMethod,
    pub scheduled_date: DateTime<Utc>,
    pub duration: i32,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisor_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_record: Option<SessionRecordView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_feedback: Option<FeedbackView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Project a financial session for `viewer`
pub fn project_financial(viewer: &Viewer, session: &FinancialSessionDoc) -> FinancialSessionView {
    let access = access_for(
        viewer,
        Owners {
            client: &session.client,
            staff: session.financial_advisor.as_deref(),
        },
    );
    let full = access == Access::Full;
    let company_side = access == Access::CompanySummary;

    let session_record = session.session_record.as_ref().map(|record| {
        let shared = &record.shared_content;
        SessionRecordView {
            shared_content: SharedContentView {
                summary: shared.summary.clone(),
                recommendations: if company_side {
                    Vec::new()
                } else {
                    shared.recommendations.clone()
                },
                follow_up: None,
                action_items: if company_side {
                    Vec::new()
                } else {
                    shared.action_items.clone()
                },
            },
            owner_only_content: full.then(|| OwnerOnlyView {
                notes: record.advisor_only_content.notes.clone(),
                assessment: record.advisor_only_content.risk_assessment.clone(),
                risk_level: None,
            }),
        }
    });

    FinancialSessionView {
        id: session.id.clone(),
        client: session.client.clone(),
        financial_advisor: session.financial_advisor.clone(),
        session_type: session.session_type,
        format: session.format,
        scheduled_date: to_chrono(session.scheduled_date),
        duration: session.duration,
        status: session.status,
        advisor_rate: full.then_some(session.advisor_rate),
        session_record,
        client_feedback: (!company_side)
            .then(|| session.client_feedback.as_ref())
            .flatten()
            .map(FeedbackView::from),
        created_at: session.metadata.created(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{CounselorOnlyContent, SessionRecord, SharedContent};

    fn recorded_session() -> CounselingSessionDoc {
        let mut session = CounselingSessionDoc::new(
            "emp-1".into(),
            Some("acme".into()),
            "stress".into(),
            DeliveryMethod::FaceToFace,
            bson::DateTime::now(),
        );
        session.assign("coun-1", 50_000);
        session.notes = Some("prefers mornings".into());
        session.session_record = Some(SessionRecord {
            shared_content: SharedContent {
                summary: "Discussed workload".into(),
                recommendations: vec!["Take breaks".into()],
                follow_up: Some("two weeks".into()),
            },
            counselor_only_content: CounselorOnlyContent {
                notes: "signs of burnout".into(),
                assessment: Some("moderate".into()),
                risk_level: Some(RiskLevel::Medium),
            },
        });
        session
    }

    #[test]
    fn test_counselor_and_super_admin_see_everything() {
        let session = recorded_session();
        for viewer in [
            Viewer::new("coun-1", Role::Counselor),
            Viewer::new("root", Role::SuperAdmin),
        ] {
            let view = project_counseling(&viewer, &session);
            let record = view.session_record.unwrap();
            assert_eq!(record.owner_only_content.unwrap().notes, "signs of burnout");
            assert_eq!(view.counselor_rate, Some(50_000));
        }
    }

    #[test]
    fn test_employee_never_sees_owner_only_content() {
        let session = recorded_session();
        let view = project_counseling(&Viewer::new("emp-1", Role::Employee), &session);
        assert_eq!(view.topic, "stress");
        assert_eq!(view.notes.as_deref(), Some("prefers mornings"));
        let record = view.session_record.unwrap();
        assert!(record.owner_only_content.is_none());
        assert_eq!(record.shared_content.recommendations.len(), 1);
        assert!(view.counselor_rate.is_none());

        let json = serde_json::to_string(&project_counseling(
            &Viewer::new("emp-1", Role::Employee),
            &session,
        ))
        .unwrap();
        assert!(!json.contains("burnout"));
    }

    #[test]
    fn test_company_side_sees_summary_only() {
        let session = recorded_session();
        for role in [Role::Manager, Role::CompanyAdmin] {
            let view = project_counseling(&Viewer::new("boss", role), &session);
            assert_eq!(view.topic, REDACTED_TOPIC);
            assert!(view.notes.is_none());
            let record = view.session_record.unwrap();
            assert_eq!(record.shared_content.summary, "Discussed workload");
            assert!(record.shared_content.recommendations.is_empty());
            assert!(record.shared_content.follow_up.is_none());
            assert!(record.owner_only_content.is_none());
        }
    }

    #[test]
    fn test_other_counselor_gets_shared_only() {
        let session = recorded_session();
        let view = project_counseling(&Viewer::new("coun-2", Role::Counselor), &session);
        assert!(view.session_record.unwrap().owner_only_content.is_none());
        assert!(view.notes.is_none());
    }
}
