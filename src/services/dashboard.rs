//! Super-admin dashboard aggregates
//!
//! These are the reads served through the dashboard cache. Each function
//! computes a fresh value; caching happens at the route.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::auth::Role;
use crate::cache::DashboardKey;
use crate::db::schemas::{
    AssignmentStatus, CenterDoc, CompanyDoc, CounselingSessionDoc, CounselorPaymentDoc,
    DisputeStatus, PaymentStatus, SessionStatus, UserDoc, DEFAULT_ANNUAL_LIMIT,
};
use crate::db::{Database, Filter};
use crate::services::companies::CompanyView;
use crate::services::settlement::{self, PeriodSummary, SETTLEMENT_TAX_PERCENT};
use crate::types::Result;

const TREND_MONTHS: u32 = 6;
const TOP_COUNSELORS: usize = 5;

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: usize,
    pub users_by_role: BTreeMap<String, usize>,
    pub companies: usize,
    pub active_companies: usize,
    pub active_counselors: usize,
    pub independent_counselors: usize,
    pub centers: usize,
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub pending_assignment: usize,
    pub open_session_disputes: usize,
    pub pending_payments: usize,
    pub disputed_payments: usize,
}

pub async fn stats(db: &Database) -> Result<PlatformStats> {
    let users = db.collection::<UserDoc>().find_many(Filter::new()).await?;
    let companies = db.collection::<CompanyDoc>().find_many(Filter::new()).await?;
    let sessions = db.collection::<CounselingSessionDoc>().find_many(Filter::new()).await?;
    let payments = db.collection::<CounselorPaymentDoc>().find_many(Filter::new()).await?;
    let centers = db.collection::<CenterDoc>().count(Filter::new()).await?;

    let mut by_role = BTreeMap::new();
    for user in &users {
        *by_role.entry(user.role().as_str().to_string()).or_default() += 1;
    }
    let counselors: Vec<_> = users
        .iter()
        .filter(|u| u.is_active)
        .filter_map(|u| u.counselor())
        .collect();

    Ok(PlatformStats {
        total_users: users.len(),
        users_by_role: by_role,
        companies: companies.len(),
        active_companies: companies.iter().filter(|c| c.is_active).count(),
        active_counselors: counselors.len(),
        independent_counselors: counselors.iter().filter(|p| p.is_independent()).count(),
        centers: centers as usize,
        total_sessions: sessions.len(),
        completed_sessions: sessions.iter().filter(|s| s.status == SessionStatus::Completed).count(),
        pending_assignment: sessions
            .iter()
            .filter(|s| s.assignment_status == AssignmentStatus::Pending)
            .count(),
        open_session_disputes: sessions
            .iter()
            .filter_map(|s| s.dispute.as_ref())
            .filter(|d| matches!(d.status, DisputeStatus::Pending | DisputeStatus::Reviewing))
            .count(),
        pending_payments: payments.iter().filter(|p| p.status == PaymentStatus::Pending).count(),
        disputed_payments: payments.iter().filter(|p| p.status == PaymentStatus::Dispute).count(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    #[serde(flatten)]
    pub company: CompanyView,
    pub employees: usize,
    pub year_sessions: i64,
    pub year_cost: i64,
}

/// Every company with its head count and this year's usage
pub async fn companies(db: &Database, now: DateTime<Utc>) -> Result<Vec<CompanySummary>> {
    let companies = db.collection::<CompanyDoc>().find_many(Filter::new()).await?;
    let employees = db
        .collection::<UserDoc>()
        .find_many(Filter::new().eq("role", Role::Employee.as_str()))
        .await?;

    Ok(companies
        .iter()
        .map(|c| {
            let (year_sessions, year_cost) = c.usage_for(now.year());
            CompanySummary {
                company: CompanyView::from(c),
                employees: employees
                    .iter()
                    .filter(|u| u.company() == Some(c.id.as_str()))
                    .count(),
                year_sessions,
                year_cost,
            }
        })
        .collect())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonthTrend {
    pub year: i32,
    pub month: u32,
    pub sessions: usize,
    pub completed: usize,
    pub counselor_cost: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounselorRanking {
    pub id: String,
    pub name: String,
    pub total_sessions: i64,
    pub rating: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub trend: Vec<MonthTrend>,
    pub top_counselors: Vec<CounselorRanking>,
    pub current_settlement: PeriodSummary,
}

/// The `TREND_MONTHS` months ending with `now`'s month, oldest first
fn trailing_months(now: DateTime<Utc>) -> Vec<(i32, u32)> {
    let mut months = Vec::with_capacity(TREND_MONTHS as usize);
    let (mut year, mut month) = (now.year(), now.month());
    for _ in 0..TREND_MONTHS {
        months.push((year, month));
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    months.reverse();
    months
}

pub async fn dashboard_data(db: &Database, now: DateTime<Utc>) -> Result<DashboardData> {
    let sessions = db.collection::<CounselingSessionDoc>().find_many(Filter::new()).await?;
    let trend = trailing_months(now)
        .into_iter()
        .map(|(year, month)| {
            let in_month: Vec<_> = sessions
                .iter()
                .filter(|s| {
                    let at = s.appointment_date.to_chrono();
                    at.year() == year && at.month() == month
                })
                .collect();
            let completed: Vec<_> = in_month
                .iter()
                .filter(|s| s.status == SessionStatus::Completed)
                .collect();
            MonthTrend {
                year,
                month,
                sessions: in_month.len(),
                completed: completed.len(),
                counselor_cost: completed.iter().map(|s| s.counselor_rate).sum(),
            }
        })
        .collect();

    let mut counselors: Vec<CounselorRanking> = db
        .collection::<UserDoc>()
        .find_many(Filter::new().eq("role", Role::Counselor.as_str()))
        .await?
        .into_iter()
        .filter_map(|u| {
            let p = u.counselor()?;
            Some(CounselorRanking {
                total_sessions: p.total_sessions,
                rating: p.rating,
                id: u.id.clone(),
                name: u.name.clone(),
            })
        })
        .collect();
    counselors.sort_by(|a, b| b.total_sessions.cmp(&a.total_sessions));
    counselors.truncate(TOP_COUNSELORS);

    Ok(DashboardData {
        trend,
        top_counselors: counselors,
        current_settlement: settlement::period_summary(db, now.year(), now.month()).await?,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTtl {
    pub key: &'static str,
    pub ttl_seconds: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSettings {
    pub system_counselor_rate: i64,
    pub settlement_tax_percent: i64,
    pub default_annual_counseling_limit: i32,
    pub token_lifetime_seconds: u64,
    pub demo_mode: bool,
    pub dashboard_cache_enabled: bool,
    pub cache_ttls: Vec<CacheTtl>,
}

pub fn settings(
    system_rate: i64,
    token_lifetime_seconds: u64,
    demo_mode: bool,
    cache_enabled: bool,
) -> PlatformSettings {
    PlatformSettings {
        system_counselor_rate: system_rate,
        settlement_tax_percent: SETTLEMENT_TAX_PERCENT,
        default_annual_counseling_limit: DEFAULT_ANNUAL_LIMIT,
        token_lifetime_seconds,
        demo_mode,
        dashboard_cache_enabled: cache_enabled,
        cache_ttls: DashboardKey::ALL
            .iter()
            .map(|k| CacheTtl {
                key: k.as_str(),
                ttl_seconds: k.ttl().as_secs(),
            })
            .collect(),
    }
}
