//! Counseling session schema
//!
//! A session carries its own billing fields (`counselor_rate`,
//! `is_paid_to_counselor`) so that settlement can aggregate sessions without
//! joining against the counselor's current rate.

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::schemas::Metadata;
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

/// Default session length in minutes
pub const DEFAULT_DURATION_MINUTES: i32 = 50;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMethod {
    FaceToFace,
    PhoneVideo,
    Chat,
}

impl DeliveryMethod {
    pub const ALL: [DeliveryMethod; 3] = [
        DeliveryMethod::FaceToFace,
        DeliveryMethod::PhoneVideo,
        DeliveryMethod::Chat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMethod::FaceToFace => "faceToFace",
            DeliveryMethod::PhoneVideo => "phoneVideo",
            DeliveryMethod::Chat => "chat",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::NoShow
        )
    }

    /// `scheduled -> in-progress -> completed | cancelled | no-show`;
    /// a scheduled session may also close directly.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        match self {
            SessionStatus::Scheduled => next != SessionStatus::Scheduled,
            SessionStatus::InProgress => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::NoShow => "no-show",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    Pending,
    Assigned,
    Confirmed,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Part of the record the client may read
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SharedContent {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<String>,
}

/// Part of the record only the counselor (and super-admin) may read
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CounselorOnlyContent {
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionRecord {
    #[serde(default)]
    pub shared_content: SharedContent,
    #[serde(default)]
    pub counselor_only_content: CounselorOnlyContent,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionRating {
    pub score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub rated_at: DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DisputeStatus {
    Pending,
    Reviewing,
    Resolved,
    Rejected,
}

impl DisputeStatus {
    /// `pending -> reviewing -> resolved | rejected`; pending may close directly
    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        match self {
            DisputeStatus::Pending => next != DisputeStatus::Pending,
            DisputeStatus::Reviewing => {
                matches!(next, DisputeStatus::Resolved | DisputeStatus::Rejected)
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Pending => "pending",
            DisputeStatus::Reviewing => "reviewing",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionDispute {
    pub raised_by: String,
    pub raised_by_role: Role,
    pub reason: String,
    pub status: DisputeStatus,
    pub raised_at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CounselingSessionDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub employee: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    /// Assigned counselor; stored as null while pending
    #[serde(default)]
    pub counselor: Option<String>,

    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub delivery_method: DeliveryMethod,

    pub appointment_date: DateTime,

    #[serde(default = "default_duration")]
    pub duration: i32,

    pub status: SessionStatus,

    pub assignment_status: AssignmentStatus,

    #[serde(default)]
    pub counselor_rate: i64,

    #[serde(default)]
    pub is_paid_to_counselor: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_record: Option<SessionRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<SessionRating>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute: Option<SessionDispute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

fn default_duration() -> i32 {
    DEFAULT_DURATION_MINUTES
}

impl CounselingSessionDoc {
    /// New unassigned request
    pub fn new(
        employee: String,
        company: Option<String>,
        topic: String,
        delivery_method: DeliveryMethod,
        appointment_date: DateTime,
    ) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            employee,
            company,
            counselor: None,
            topic,
            notes: None,
            delivery_method,
            appointment_date,
            duration: DEFAULT_DURATION_MINUTES,
            status: SessionStatus::Scheduled,
            assignment_status: AssignmentStatus::Pending,
            counselor_rate: 0,
            is_paid_to_counselor: false,
            session_record: None,
            rating: None,
            dispute: None,
            completed_at: None,
        }
    }

    pub fn assign(&mut self, counselor_id: &str, rate: i64) {
        self.counselor = Some(counselor_id.to_string());
        self.counselor_rate = rate;
        self.assignment_status = AssignmentStatus::Assigned;
    }

    pub fn is_counselor(&self, user_id: &str) -> bool {
        self.counselor.as_deref() == Some(user_id)
    }
}

impl IntoIndexes for CounselingSessionDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::lookup("employee_index", &["employee"]),
            IndexSpec::lookup("counselor_index", &["counselor"]),
            IndexSpec::lookup("company_index", &["company"]),
            IndexSpec::lookup(
                "settlement_scan_index",
                &["status", "is_paid_to_counselor", "appointment_date"],
            ),
        ]
    }
}

impl MutMetadata for CounselingSessionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for CounselingSessionDoc {
    const COLLECTION: &'static str = "counseling_sessions";
    const LABEL: &'static str = "Counseling session";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_machine() {
        use SessionStatus::*;
        assert!(Scheduled.can_transition_to(InProgress));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Scheduled));
        for terminal in [Completed, Cancelled, NoShow] {
            for next in [Scheduled, InProgress, Completed, Cancelled, NoShow] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_dispute_machine() {
        use DisputeStatus::*;
        assert!(Pending.can_transition_to(Reviewing));
        assert!(Reviewing.can_transition_to(Resolved));
        assert!(!Reviewing.can_transition_to(Pending));
        assert!(!Resolved.can_transition_to(Rejected));
    }

    #[test]
    fn test_stored_names() {
        let session = CounselingSessionDoc::new(
            "emp".into(),
            None,
            "stress".into(),
            DeliveryMethod::PhoneVideo,
            DateTime::now(),
        );
        let doc = bson::to_document(&session).unwrap();
        assert_eq!(doc.get_str("delivery_method").unwrap(), "phoneVideo");
        assert_eq!(doc.get_str("assignment_status").unwrap(), "pending");
        assert!(doc.get("counselor").unwrap().as_null().is_some());
    }
}
