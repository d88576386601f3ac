//! Document schemas for the counseling platform
//!
//! Stored field names are snake_case; API views rename to camelCase.

mod center;
mod company;
mod financial_profile;
mod financial_session;
mod goal;
mod metadata;
mod notification;
mod payment;
mod resource;
mod session;
mod user;

pub use center::{CenterDoc, CenterSettings, OperatingHours};
pub use company::{BusinessMetrics, CompanyDoc, CompanySettings, MonthlyUsage, Plan, RoiEstimate};
pub use financial_profile::{Asset, FinancialGoal, FinancialProfileDoc, Liability, RiskTolerance};
pub use financial_session::{
    AdvisorOnlyContent, ClientFeedback, FinancialRecord, FinancialSessionDoc, FinancialSessionType,
    FinancialSharedContent,
};
pub use goal::{CounselingGoalDoc, GoalStatus, Milestone};
pub use metadata::Metadata;
pub use notification::{NotificationDoc, NotificationKind};
pub use payment::{
    CounselorPaymentDoc, PaymentLineItem, PaymentMethod, PaymentStatus, PaymentSummary,
    StatusLogEntry,
};
pub use resource::{ResourceDoc, ResourceKind};
pub use session::{
    AssignmentStatus, CounselingSessionDoc, CounselorOnlyContent, DeliveryMethod, DisputeStatus,
    RiskLevel, SessionDispute, SessionRating, SessionRecord, SessionStatus, SharedContent,
    DEFAULT_DURATION_MINUTES,
};
pub use user::{
    AdvisorProfile, AnnualUsage, CounselorProfile, EmployeeProfile, MemberProfile, MethodRates,
    RoleProfile, TaxRate, UserDoc, DEFAULT_ANNUAL_LIMIT,
};

/// Shorthand for `bson::DateTime` to chrono for API views
pub(crate) fn to_chrono(value: bson::DateTime) -> chrono::DateTime<chrono::Utc> {
    value.to_chrono()
}

pub(crate) fn default_true() -> bool {
    true
}
