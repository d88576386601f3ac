//! Counselor payment (monthly settlement) schema
//!
//! One document per (counselor, year, month), enforced by a unique index.
//! Status changes go through the methods on [`CounselorPaymentDoc`], which
//! reject illegal transitions without touching the document.

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::db::schemas::{DeliveryMethod, Metadata};
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};
use crate::types::{Result, WellspringError};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Paid,
    Dispute,
    Processing,
    Settling,
    Completed,
}

impl PaymentStatus {
    /// Targets accepted by the administrative override
    pub const OVERRIDE_TARGETS: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Settling,
        PaymentStatus::Completed,
        PaymentStatus::Dispute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Dispute => "dispute",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Settling => "settling",
            PaymentStatus::Completed => "completed",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Check,
    DigitalWallet,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PaymentLineItem {
    pub session: String,
    pub date: DateTime,
    pub method: DeliveryMethod,
    pub duration: i32,
    pub rate: i64,
    pub amount: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentSummary {
    #[serde(default)]
    pub face_to_face: i64,
    #[serde(default)]
    pub phone_video: i64,
    #[serde(default)]
    pub chat: i64,
    #[serde(default)]
    pub total_sessions: i64,
    #[serde(default)]
    pub total_amount: i64,
    #[serde(default)]
    pub tax_amount: i64,
    #[serde(default)]
    pub net_amount: i64,
}

/// Structured record of one status change
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusLogEntry {
    pub by: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub at: DateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CounselorPaymentDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub counselor: String,
    pub year: i32,
    pub month: u32,

    #[serde(default)]
    pub sessions: Vec<PaymentLineItem>,

    #[serde(default)]
    pub summary: PaymentSummary,

    pub status: PaymentStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime>,

    /// Free-text log, one line per remark
    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub status_log: Vec<StatusLogEntry>,
}

impl CounselorPaymentDoc {
    pub fn new(
        counselor: String,
        year: i32,
        month: u32,
        sessions: Vec<PaymentLineItem>,
        summary: PaymentSummary,
    ) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            counselor,
            year,
            month,
            sessions,
            summary,
            status: PaymentStatus::Pending,
            payment_method: None,
            approved_by: None,
            approved_at: None,
            paid_at: None,
            notes: String::new(),
            status_log: Vec::new(),
        }
    }

    /// `pending -> approved`
    pub fn approve(&mut self, admin_id: &str) -> Result<()> {
        if self.status != PaymentStatus::Pending {
            return Err(WellspringError::Conflict(format!(
                "Only pending payments can be approved (current status: {})",
                self.status.as_str()
            )));
        }
        let now = DateTime::now();
        self.approved_by = Some(admin_id.to_string());
        self.approved_at = Some(now);
        self.move_to(PaymentStatus::Approved, admin_id, now, None);
        Ok(())
    }

    /// `approved -> paid`
    pub fn pay(&mut self, method: PaymentMethod, notes: Option<&str>, admin_id: &str) -> Result<()> {
        if self.status != PaymentStatus::Approved {
            return Err(WellspringError::Conflict(format!(
                "Only approved payments can be paid (current status: {})",
                self.status.as_str()
            )));
        }
        let now = DateTime::now();
        self.paid_at = Some(now);
        self.payment_method = Some(method);
        if let Some(text) = notes.map(str::trim).filter(|t| !t.is_empty()) {
            self.append_note(now, text);
        }
        self.move_to(PaymentStatus::Paid, admin_id, now, notes.map(str::to_string));
        Ok(())
    }

    /// Any state except `paid` may be disputed
    pub fn dispute(&mut self, reason: &str, by: &str) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WellspringError::invalid("reason", "is required"));
        }
        if self.status == PaymentStatus::Paid {
            return Err(WellspringError::Conflict(
                "Paid settlements cannot be disputed".into(),
            ));
        }
        let now = DateTime::now();
        self.append_note(now, &format!("Dispute: {reason}"));
        self.move_to(PaymentStatus::Dispute, by, now, Some(reason.to_string()));
        Ok(())
    }

    /// Administrative override, unconditional apart from the target set
    pub fn override_status(&mut self, to: PaymentStatus, admin_id: &str, note: Option<String>) -> Result<()> {
        if !PaymentStatus::OVERRIDE_TARGETS.contains(&to) {
            return Err(WellspringError::invalid(
                "status",
                "must be one of pending, processing, settling, completed, dispute",
            ));
        }
        self.move_to(to, admin_id, DateTime::now(), note);
        Ok(())
    }

    fn move_to(&mut self, to: PaymentStatus, by: &str, at: DateTime, note: Option<String>) {
        self.status_log.push(StatusLogEntry {
            by: by.to_string(),
            from: self.status,
            to,
            at,
            note,
        });
        self.status = to;
    }

    fn append_note(&mut self, at: DateTime, text: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        let date = at.to_chrono().format("%Y-%m-%d");
        self.notes.push_str(&format!("[{date}] {text}"));
    }
}

impl IntoIndexes for CounselorPaymentDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::unique("counselor_period_unique", &["counselor", "year", "month"]),
            IndexSpec::lookup("status_index", &["status"]),
        ]
    }
}

impl MutMetadata for CounselorPaymentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for CounselorPaymentDoc {
    const COLLECTION: &'static str = "counselor_payments";
    const LABEL: &'static str = "Payment";

    fn id(&self) -> &str {
        &self.id
    }
}
