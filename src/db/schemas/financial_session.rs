//! Financial counseling session schema

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::db::schemas::{DeliveryMethod, Metadata, SessionStatus};
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FinancialSessionType {
    Budgeting,
    DebtManagement,
    Investment,
    Retirement,
    Insurance,
    TaxPlanning,
    General,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FinancialSharedContent {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AdvisorOnlyContent {
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FinancialRecord {
    #[serde(default)]
    pub shared_content: FinancialSharedContent,
    #[serde(default)]
    pub advisor_only_content: AdvisorOnlyContent,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClientFeedback {
    pub rating: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub submitted_at: DateTime,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FinancialSessionDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub client: String,

    #[serde(default)]
    pub financial_advisor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    pub session_type: FinancialSessionType,

    pub format: DeliveryMethod,

    pub scheduled_date: DateTime,

    pub duration: i32,

    pub status: SessionStatus,

    #[serde(default)]
    pub advisor_rate: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_record: Option<FinancialRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_feedback: Option<ClientFeedback>,
}

impl FinancialSessionDoc {
    pub fn new(
        client: String,
        financial_advisor: Option<String>,
        company: Option<String>,
        session_type: FinancialSessionType,
        format: DeliveryMethod,
        scheduled_date: DateTime,
        duration: i32,
    ) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            client,
            financial_advisor,
            company,
            session_type,
            format,
            scheduled_date,
            duration,
            status: SessionStatus::Scheduled,
            advisor_rate: 0,
            session_record: None,
            client_feedback: None,
        }
    }

    pub fn is_advisor(&self, user_id: &str) -> bool {
        self.financial_advisor.as_deref() == Some(user_id)
    }
}

impl IntoIndexes for FinancialSessionDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::lookup("client_index", &["client"]),
            IndexSpec::lookup("advisor_index", &["financial_advisor"]),
        ]
    }
}

impl MutMetadata for FinancialSessionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for FinancialSessionDoc {
    const COLLECTION: &'static str = "financial_sessions";
    const LABEL: &'static str = "Financial session";

    fn id(&self) -> &str {
        &self.id
    }
}
