//! Client companies: creation, company-admin reads and settings

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::{AuthUser, Role};
use crate::db::schemas::{
    BusinessMetrics, CompanyDoc, CounselingSessionDoc, Plan, RoiEstimate, RoleProfile,
    SessionStatus, UserDoc,
};
use crate::db::{Database, Filter};
use crate::services::accounts::{self, CreateUserRequest};
use crate::types::{FieldError, Result, WellspringError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAccountInput {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub balance: Option<i64>,
    #[serde(default)]
    pub max_employees: Option<i64>,
    #[serde(default)]
    pub annual_counseling_limit: Option<i32>,
    #[serde(default)]
    pub allow_self_registration: Option<bool>,
    #[serde(default)]
    pub allow_overage: Option<bool>,
    #[serde(default)]
    pub departments: Option<Vec<String>>,
    /// Company-admin account created along with the company
    #[serde(default)]
    pub admin: Option<AdminAccountInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyView {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub plan: Plan,
    pub balance: i64,
    pub max_employees: i64,
    pub annual_counseling_limit: i32,
    pub allow_self_registration: bool,
    pub allow_overage: bool,
    pub departments: Vec<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&CompanyDoc> for CompanyView {
    fn from(c: &CompanyDoc) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            domain: c.domain.clone(),
            plan: c.plan,
            balance: c.balance,
            max_employees: c.settings.max_employees,
            annual_counseling_limit: c.settings.annual_counseling_limit,
            allow_self_registration: c.settings.allow_self_registration,
            allow_overage: c.settings.allow_overage,
            departments: c.settings.departments.clone(),
            is_active: c.is_active,
            created_at: c.metadata.created(),
        }
    }
}

fn clean_departments(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for d in raw {
        let d = d.trim().to_string();
        if !d.is_empty() && !out.contains(&d) {
            out.push(d);
        }
    }
    out
}

/// Create a company, optionally with its first company-admin account.
///
/// The admin account is inserted after the company; if that fails the
/// company is soft-deleted again.
pub async fn create_company(
    db: &Database,
    req: CreateCompanyRequest,
) -> Result<(CompanyDoc, Option<UserDoc>)> {
    let mut errors = Vec::new();
    let name = req.name.trim().to_string();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    let domain = req.domain.trim().trim_start_matches('@').to_lowercase();
    if domain.is_empty() || !domain.contains('.') {
        errors.push(FieldError::new("domain", "must be an e-mail domain such as example.com"));
    }
    if req.balance.is_some_and(|b| b < 0) {
        errors.push(FieldError::new("balance", "must not be negative"));
    }
    if req.max_employees.is_some_and(|m| m < 1) {
        errors.push(FieldError::new("maxEmployees", "must be at least 1"));
    }
    if req.annual_counseling_limit.is_some_and(|l| l < 0) {
        errors.push(FieldError::new("annualCounselingLimit", "must not be negative"));
    }
    if !errors.is_empty() {
        return Err(WellspringError::Validation(errors));
    }

    let mut company = CompanyDoc::new(name, domain, req.plan.unwrap_or_default(), req.balance.unwrap_or(0));
    let s = &mut company.settings;
    if let Some(v) = req.max_employees {
        s.max_employees = v;
    }
    if let Some(v) = req.annual_counseling_limit {
        s.annual_counseling_limit = v;
    }
    if let Some(v) = req.allow_self_registration {
        s.allow_self_registration = v;
    }
    if let Some(v) = req.allow_overage {
        s.allow_overage = v;
    }
    if let Some(v) = req.departments {
        s.departments = clean_departments(v);
    }

    db.collection::<CompanyDoc>().insert_one(company.clone()).await?;
    info!(company_id = %company.id, name = %company.name, "company created");

    let Some(admin) = req.admin else {
        return Ok((company, None));
    };
    let created = accounts::create_user(
        db,
        CreateUserRequest {
            email: admin.email,
            password: admin.password,
            name: admin.name,
            role: Role::CompanyAdmin,
            company: Some(company.id.clone()),
            department: None,
            phone: None,
        },
    )
    .await;
    match created {
        Ok(user) => Ok((company, Some(user))),
        Err(e) => {
            warn!(company_id = %company.id, error = %e, "admin account rejected, rolling back company");
            db.collection::<CompanyDoc>().soft_delete(&company.id).await?;
            Err(e)
        }
    }
}

pub async fn load_company(db: &Database, id: &str) -> Result<CompanyDoc> {
    db.collection::<CompanyDoc>()
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Company".into()))
}

/// Company a company-side request acts on: the caller's own, or any
/// company a super-admin names
pub fn resolve_company(caller: &AuthUser, requested: Option<&str>) -> Result<String> {
    match caller.role() {
        Role::SuperAdmin => requested
            .map(str::to_string)
            .ok_or_else(|| WellspringError::invalid("companyId", "is required for super-admins")),
        Role::CompanyAdmin => caller
            .company()
            .map(str::to_string)
            .ok_or_else(|| WellspringError::Forbidden("No company on this account".into())),
        _ => Err(WellspringError::Forbidden(
            "Company administration requires the company-admin role".into(),
        )),
    }
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStats {
    pub company_id: String,
    pub name: String,
    pub total_employees: u64,
    pub active_employees: u64,
    pub max_employees: i64,
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub scheduled_sessions: usize,
    pub sessions_this_month: usize,
    pub year_sessions: i64,
    pub year_cost: i64,
    pub balance: i64,
    /// Employees that have used their whole yearly allowance
    pub exhausted_allowances: usize,
}

pub async fn stats(db: &Database, company_id: &str, now: DateTime<Utc>) -> Result<CompanyStats> {
    let company = load_company(db, company_id).await?;
    let employees = db
        .collection::<UserDoc>()
        .find_many(Filter::new().eq("company", company_id).eq("role", Role::Employee.as_str()))
        .await?;
    let sessions = db
        .collection::<CounselingSessionDoc>()
        .find_many(Filter::new().eq("company", company_id))
        .await?;

    let this_month = |s: &&CounselingSessionDoc| {
        let at = s.appointment_date.to_chrono();
        at.year() == now.year() && at.month() == now.month()
    };
    let (year_sessions, year_cost) = company.usage_for(now.year());
    let exhausted = employees
        .iter()
        .filter(|u| match &u.profile {
            RoleProfile::Employee(p) => {
                let mut usage = p.annual_counseling_usage.clone();
                usage.roll_over(now.year());
                usage.is_exhausted()
            }
            _ => false,
        })
        .count();

    Ok(CompanyStats {
        company_id: company.id.clone(),
        name: company.name.clone(),
        total_employees: employees.len() as u64,
        active_employees: employees.iter().filter(|u| u.is_active).count() as u64,
        max_employees: company.settings.max_employees,
        total_sessions: sessions.len(),
        completed_sessions: sessions.iter().filter(|s| s.status == SessionStatus::Completed).count(),
        scheduled_sessions: sessions.iter().filter(|s| s.status == SessionStatus::Scheduled).count(),
        sessions_this_month: sessions.iter().filter(this_month).count(),
        year_sessions,
        year_cost,
        balance: company.balance,
        exhausted_allowances: exhausted,
    })
}

/// Employee roster as seen by the company; no counseling content
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_used: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions_limit: Option<i32>,
    pub is_active: bool,
}

pub async fn employees(db: &Database, company_id: &str, now: DateTime<Utc>) -> Result<Vec<EmployeeView>> {
    load_company(db, company_id).await?;
    let members = db
        .collection::<UserDoc>()
        .find_many(
            Filter::new()
                .eq("company", company_id)
                .is_in("role", [Role::Employee.as_str(), Role::Manager.as_str()]),
        )
        .await?;

    Ok(members
        .iter()
        .map(|u| {
            let usage = match &u.profile {
                RoleProfile::Employee(p) => {
                    let mut usage = p.annual_counseling_usage.clone();
                    usage.roll_over(now.year());
                    Some(usage)
                }
                _ => None,
            };
            EmployeeView {
                id: u.id.clone(),
                name: u.name.clone(),
                email: u.email.clone(),
                role: u.role(),
                department: u.profile.department().map(str::to_string),
                employee_number: match &u.profile {
                    RoleProfile::Employee(p) => p.employee_number.clone(),
                    _ => None,
                },
                sessions_used: usage.as_ref().map(|u| u.used),
                sessions_limit: usage.as_ref().map(|u| u.limit),
                is_active: u.is_active,
            }
        })
        .collect())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentView {
    pub name: String,
    pub employees: usize,
}

pub async fn departments(db: &Database, company_id: &str) -> Result<Vec<DepartmentView>> {
    let company = load_company(db, company_id).await?;
    let members = db
        .collection::<UserDoc>()
        .find_many(Filter::new().eq("company", company_id))
        .await?;
    Ok(company
        .settings
        .departments
        .iter()
        .map(|name| DepartmentView {
            name: name.clone(),
            employees: members
                .iter()
                .filter(|u| u.profile.department() == Some(name.as_str()))
                .count(),
        })
        .collect())
}

pub async fn set_departments(db: &Database, company_id: &str, names: Vec<String>) -> Result<Vec<String>> {
    if names.iter().any(|n| n.trim().chars().count() > 100) {
        return Err(WellspringError::invalid("departments", "names must be at most 100 characters"));
    }
    let mut company = load_company(db, company_id).await?;
    company.settings.departments = clean_departments(names);
    db.collection::<CompanyDoc>().replace(&mut company).await?;
    info!(company_id = %company_id, count = company.settings.departments.len(), "departments updated");
    Ok(company.settings.departments)
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMetricsInput {
    #[serde(default)]
    pub employee_count: Option<i64>,
    #[serde(default)]
    pub average_salary: Option<i64>,
    #[serde(default)]
    pub turnover_rate: Option<f64>,
    #[serde(default)]
    pub absenteeism_days: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMetricsView {
    pub employee_count: i64,
    pub average_salary: i64,
    pub turnover_rate: f64,
    pub absenteeism_days: f64,
    pub year: i32,
    pub roi: RoiEstimate,
}

fn metrics_view(company: &CompanyDoc, year: i32) -> BusinessMetricsView {
    let m: &BusinessMetrics = &company.business_metrics;
    BusinessMetricsView {
        employee_count: m.employee_count,
        average_salary: m.average_salary,
        turnover_rate: m.turnover_rate,
        absenteeism_days: m.absenteeism_days,
        year,
        roi: company.roi_estimate(year),
    }
}

pub async fn business_metrics(db: &Database, company_id: &str, year: i32) -> Result<BusinessMetricsView> {
    let company = load_company(db, company_id).await?;
    Ok(metrics_view(&company, year))
}

pub async fn set_business_metrics(
    db: &Database,
    company_id: &str,
    input: BusinessMetricsInput,
    year: i32,
) -> Result<BusinessMetricsView> {
    let mut errors = Vec::new();
    if input.employee_count.is_some_and(|v| v < 0) {
        errors.push(FieldError::new("employeeCount", "must not be negative"));
    }
    if input.average_salary.is_some_and(|v| v < 0) {
        errors.push(FieldError::new("averageSalary", "must not be negative"));
    }
    if input.turnover_rate.is_some_and(|v| !(0.0..=100.0).contains(&v)) {
        errors.push(FieldError::new("turnoverRate", "must be a percentage between 0 and 100"));
    }
    if input.absenteeism_days.is_some_and(|v| !(0.0..=365.0).contains(&v)) {
        errors.push(FieldError::new("absenteeismDays", "must be between 0 and 365"));
    }
    if !errors.is_empty() {
        return Err(WellspringError::Validation(errors));
    }

    let mut company = load_company(db, company_id).await?;
    let m = &mut company.business_metrics;
    if let Some(v) = input.employee_count {
        m.employee_count = v;
    }
    if let Some(v) = input.average_salary {
        m.average_salary = v;
    }
    if let Some(v) = input.turnover_rate {
        m.turnover_rate = v;
    }
    if let Some(v) = input.absenteeism_days {
        m.absenteeism_days = v;
    }
    db.collection::<CompanyDoc>().replace(&mut company).await?;
    info!(company_id = %company_id, "business metrics updated");
    Ok(metrics_view(&company, year))
}
