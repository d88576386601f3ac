//! User document schema
//!
//! One collection holds every role. The shared base (id, credentials,
//! `is_active`) lives on [`UserDoc`]; everything role-specific lives in the
//! [`RoleProfile`] payload, which is flattened into the same document and
//! tagged by the `role` field.

use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::schemas::{default_true, Metadata};
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};
use crate::types::{FieldError, Result, WellspringError};

/// Default yearly counseling allowance for a new employee
pub const DEFAULT_ANNUAL_LIMIT: i32 = 12;

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Login e-mail, stored lowercase
    pub email: String,

    /// Argon2 PHC string
    pub password_hash: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(flatten)]
    pub profile: RoleProfile,
}

/// Role-specific payload
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum RoleProfile {
    Employee(EmployeeProfile),
    Manager(MemberProfile),
    Counselor(CounselorProfile),
    FinancialAdvisor(AdvisorProfile),
    CompanyAdmin(MemberProfile),
    SuperAdmin,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EmployeeProfile {
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    pub annual_counseling_usage: AnnualUsage,
}

/// Manager and company-admin payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemberProfile {
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Sessions used against the yearly allowance
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnnualUsage {
    pub year: i32,
    #[serde(default)]
    pub used: i32,
    pub limit: i32,
}

impl AnnualUsage {
    pub fn new(year: i32, limit: i32) -> Self {
        Self { year, used: 0, limit }
    }

    /// Reset the counter when the calendar year has moved on
    pub fn roll_over(&mut self, current_year: i32) {
        if self.year != current_year {
            self.year = current_year;
            self.used = 0;
        }
    }

    pub fn remaining(&self) -> i32 {
        (self.limit - self.used).max(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

/// Withholding rate applied to a counselor's own settlement summary
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(try_from = "f64", into = "f64")]
pub enum TaxRate {
    /// 3.3% business income withholding
    #[default]
    Business,
    /// 10% flat withholding
    Flat,
}

impl TaxRate {
    pub fn basis_points(self) -> i64 {
        match self {
            TaxRate::Business => 330,
            TaxRate::Flat => 1000,
        }
    }

    pub fn percent(self) -> f64 {
        self.basis_points() as f64 / 100.0
    }

    /// Tax withheld from `gross`, rounded down to the won
    pub fn withholding(self, gross: i64) -> i64 {
        // at most a tenth of `gross`, so the narrowing is lossless
        (i128::from(gross) * i128::from(self.basis_points()) / 10_000) as i64
    }
}

impl TryFrom<f64> for TaxRate {
    type Error = String;

    fn try_from(value: f64) -> std::result::Result<Self, Self::Error> {
        if (value - 3.3).abs() < 1e-9 {
            Ok(TaxRate::Business)
        } else if (value - 10.0).abs() < 1e-9 {
            Ok(TaxRate::Flat)
        } else {
            Err(format!("tax rate must be 3.3 or 10, got {value}"))
        }
    }
}

impl From<TaxRate> for f64 {
    fn from(rate: TaxRate) -> f64 {
        rate.percent()
    }
}

/// Optional per-delivery-method rates
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MethodRates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_to_face: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_video: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CounselorProfile {
    #[serde(default)]
    pub custom_rate: i64,
    #[serde(default = "default_true")]
    pub use_system_rate: bool,
    #[serde(default)]
    pub method_rates: MethodRates,
    #[serde(default)]
    pub tax_rate: TaxRate,

    /// Center membership. Only the center relationship service may change
    /// these two fields, through [`CounselorProfile::link_center`] and
    /// [`CounselorProfile::unlink_center`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    counseling_center: Option<String>,
    #[serde(default = "default_true")]
    is_independent: bool,

    #[serde(default)]
    pub total_sessions: i64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub rating_count: i64,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
}

impl Default for CounselorProfile {
    fn default() -> Self {
        Self {
            custom_rate: 0,
            use_system_rate: true,
            method_rates: MethodRates::default(),
            tax_rate: TaxRate::default(),
            counseling_center: None,
            is_independent: true,
            total_sessions: 0,
            rating: 0.0,
            rating_count: 0,
            specialties: Vec::new(),
            license_number: None,
        }
    }
}

impl CounselorProfile {
    pub fn counseling_center(&self) -> Option<&str> {
        self.counseling_center.as_deref()
    }

    pub fn is_independent(&self) -> bool {
        self.is_independent
    }

    pub fn link_center(&mut self, center_id: &str) {
        self.counseling_center = Some(center_id.to_string());
        self.is_independent = false;
    }

    pub fn unlink_center(&mut self) {
        self.counseling_center = None;
        self.is_independent = true;
    }

    /// Rate used by automatic assignment
    pub fn effective_rate(&self, system_rate: i64) -> i64 {
        if self.use_system_rate {
            system_rate
        } else {
            self.custom_rate
        }
    }

    /// Rate for a delivery method, falling back to the effective rate
    pub fn rate_for_method(
        &self,
        method: crate::db::schemas::DeliveryMethod,
        system_rate: i64,
    ) -> i64 {
        use crate::db::schemas::DeliveryMethod;

        let specific = match method {
            DeliveryMethod::FaceToFace => self.method_rates.face_to_face,
            DeliveryMethod::PhoneVideo => self.method_rates.phone_video,
            DeliveryMethod::Chat => self.method_rates.chat,
        };
        specific.unwrap_or_else(|| self.effective_rate(system_rate))
    }

    /// Fold one 1..=5 score into the running average
    pub fn record_rating(&mut self, score: i32) {
        let total = self.rating * self.rating_count as f64 + f64::from(score);
        self.rating_count += 1;
        self.rating = (total / self.rating_count as f64 * 10.0).round() / 10.0;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AdvisorProfile {
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub session_rate: i64,
    #[serde(default)]
    pub total_sessions: i64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub rating_count: i64,
}

impl RoleProfile {
    /// Default payload for `role`, validating the fields that role requires
    pub fn for_role(role: Role, company: Option<String>, year: i32, annual_limit: i32) -> Result<Self> {
        let company = company.filter(|c| !c.trim().is_empty());
        if role.requires_company() && company.is_none() {
            return Err(WellspringError::Validation(vec![FieldError::new(
                "company",
                format!("is required for role {role}"),
            )]));
        }
        let company = company.unwrap_or_default();

        Ok(match role {
            Role::Employee => RoleProfile::Employee(EmployeeProfile {
                company,
                department: None,
                employee_number: None,
                annual_counseling_usage: AnnualUsage::new(year, annual_limit),
            }),
            Role::Manager => RoleProfile::Manager(MemberProfile {
                company,
                department: None,
            }),
            Role::CompanyAdmin => RoleProfile::CompanyAdmin(MemberProfile {
                company,
                department: None,
            }),
            Role::Counselor => RoleProfile::Counselor(CounselorProfile::default()),
            Role::FinancialAdvisor => RoleProfile::FinancialAdvisor(AdvisorProfile::default()),
            Role::SuperAdmin => RoleProfile::SuperAdmin,
        })
    }

    pub fn role(&self) -> Role {
        match self {
            RoleProfile::Employee(_) => Role::Employee,
            RoleProfile::Manager(_) => Role::Manager,
            RoleProfile::Counselor(_) => Role::Counselor,
            RoleProfile::FinancialAdvisor(_) => Role::FinancialAdvisor,
            RoleProfile::CompanyAdmin(_) => Role::CompanyAdmin,
            RoleProfile::SuperAdmin => Role::SuperAdmin,
        }
    }

    pub fn company(&self) -> Option<&str> {
        match self {
            RoleProfile::Employee(p) => Some(&p.company),
            RoleProfile::Manager(p) | RoleProfile::CompanyAdmin(p) => Some(&p.company),
            _ => None,
        }
    }

    pub fn department(&self) -> Option<&str> {
        match self {
            RoleProfile::Employee(p) => p.department.as_deref(),
            RoleProfile::Manager(p) | RoleProfile::CompanyAdmin(p) => p.department.as_deref(),
            _ => None,
        }
    }
}

impl UserDoc {
    /// Build a new account; the profile must already be valid for its role
    pub fn new(email: &str, password_hash: String, name: &str, profile: RoleProfile) -> Result<Self> {
        let mut errors = Vec::new();
        let email = email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            errors.push(FieldError::new("email", "must be a valid e-mail address"));
        }
        if name.trim().is_empty() {
            errors.push(FieldError::new("name", "is required"));
        }
        if !errors.is_empty() {
            return Err(WellspringError::Validation(errors));
        }

        Ok(Self {
            id: new_id(),
            metadata: Metadata::new(),
            email,
            password_hash,
            name: name.trim().to_string(),
            phone: None,
            is_active: true,
            profile,
        })
    }

    pub fn role(&self) -> Role {
        self.profile.role()
    }

    pub fn company(&self) -> Option<&str> {
        self.profile.company()
    }

    pub fn counselor(&self) -> Option<&CounselorProfile> {
        match &self.profile {
            RoleProfile::Counselor(p) => Some(p),
            _ => None,
        }
    }

    pub fn counselor_mut(&mut self) -> Option<&mut CounselorProfile> {
        match &mut self.profile {
            RoleProfile::Counselor(p) => Some(p),
            _ => None,
        }
    }

    pub fn employee_mut(&mut self) -> Option<&mut EmployeeProfile> {
        match &mut self.profile {
            RoleProfile::Employee(p) => Some(p),
            _ => None,
        }
    }

    pub fn advisor_mut(&mut self) -> Option<&mut AdvisorProfile> {
        match &mut self.profile {
            RoleProfile::FinancialAdvisor(p) => Some(p),
            _ => None,
        }
    }

    /// E-mail domain, used to match self-registration to a company
    pub fn email_domain(&self) -> Option<&str> {
        self.email.rsplit_once('@').map(|(_, domain)| domain)
    }
}

pub(crate) fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::unique("email_unique", &["email"]),
            IndexSpec::lookup("role_active_index", &["role", "is_active"]),
            IndexSpec::lookup("company_index", &["company"]),
            IndexSpec::lookup("center_index", &["counseling_center"]),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for UserDoc {
    const COLLECTION: &'static str = "users";
    const LABEL: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::DeliveryMethod;

    fn counselor() -> UserDoc {
        UserDoc::new(
            "Lee@Center.kr",
            "hash".into(),
            "Lee Counselor",
            RoleProfile::for_role(Role::Counselor, None, 2024, DEFAULT_ANNUAL_LIMIT).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_company_required_for_company_roles() {
        let err = RoleProfile::for_role(Role::Employee, None, 2024, 12).unwrap_err();
        assert!(matches!(err, WellspringError::Validation(ref e) if e[0].field == "company"));
        assert!(RoleProfile::for_role(Role::Manager, Some(" ".into()), 2024, 12).is_err());
        assert!(RoleProfile::for_role(Role::Counselor, None, 2024, 12).is_ok());
    }

    #[test]
    fn test_bson_layout_is_flat_and_tagged() {
        let user = counselor();
        let doc = bson::to_document(&user).unwrap();
        assert_eq!(doc.get_str("role").unwrap(), "counselor");
        assert_eq!(doc.get_str("email").unwrap(), "lee@center.kr");
        assert!(doc.get_bool("is_independent").unwrap());
        assert!(doc.get("counseling_center").is_none());

        let back: UserDoc = bson::from_document(doc).unwrap();
        assert_eq!(back.role(), Role::Counselor);
        assert_eq!(back.counselor().unwrap().tax_rate, TaxRate::Business);
    }

    #[test]
    fn test_center_link_is_exclusive_with_independence() {
        let mut user = counselor();
        let profile = user.counselor_mut().unwrap();
        profile.link_center("center-1");
        assert_eq!(profile.counseling_center(), Some("center-1"));
        assert!(!profile.is_independent());
        profile.unlink_center();
        assert_eq!(profile.counseling_center(), None);
        assert!(profile.is_independent());
    }

    #[test]
    fn test_rates() {
        let mut profile = CounselorProfile::default();
        assert_eq!(profile.effective_rate(50_000), 50_000);
        profile.use_system_rate = false;
        profile.custom_rate = 65_000;
        profile.method_rates.chat = Some(30_000);
        assert_eq!(profile.effective_rate(50_000), 65_000);
        assert_eq!(profile.rate_for_method(DeliveryMethod::Chat, 50_000), 30_000);
        assert_eq!(profile.rate_for_method(DeliveryMethod::FaceToFace, 50_000), 65_000);
    }

    #[test]
    fn test_tax_rate_serde_and_withholding() {
        assert_eq!(serde_json::to_string(&TaxRate::Business).unwrap(), "3.3");
        assert_eq!(serde_json::from_str::<TaxRate>("10").unwrap(), TaxRate::Flat);
        assert!(serde_json::from_str::<TaxRate>("8.8").is_err());
        assert_eq!(TaxRate::Business.withholding(180_000), 5_940);
        assert_eq!(TaxRate::Flat.withholding(180_000), 18_000);
    }

    #[test]
    fn test_running_rating_average() {
        let mut profile = CounselorProfile::default();
        profile.record_rating(5);
        profile.record_rating(4);
        assert_eq!(profile.rating_count, 2);
        assert!((profile.rating - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_annual_usage_rolls_over() {
        let mut usage = AnnualUsage { year: 2023, used: 12, limit: 12 };
        assert!(usage.is_exhausted());
        usage.roll_over(2024);
        assert_eq!(usage.used, 0);
        assert_eq!(usage.remaining(), 12);
    }

    #[test]
    fn test_email_validation() {
        assert!(UserDoc::new("no-at-sign", "h".into(), "A", RoleProfile::SuperAdmin).is_err());
        assert!(is_plausible_email("kim@acme.co.kr"));
    }
}
