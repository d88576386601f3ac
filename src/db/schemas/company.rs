//! Client company schema: prepaid balance, settings and usage ledger

use serde::{Deserialize, Serialize};

use crate::db::schemas::Metadata;
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Basic,
    Standard,
    Premium,
    Enterprise,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CompanySettings {
    #[serde(default = "default_max_employees")]
    pub max_employees: i64,
    #[serde(default)]
    pub allow_self_registration: bool,
    #[serde(default = "default_annual_limit")]
    pub annual_counseling_limit: i32,
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub allow_overage: bool,
}

fn default_max_employees() -> i64 {
    100
}

fn default_annual_limit() -> i32 {
    crate::db::schemas::user::DEFAULT_ANNUAL_LIMIT
}

impl Default for CompanySettings {
    fn default() -> Self {
        Self {
            max_employees: default_max_employees(),
            allow_self_registration: false,
            annual_counseling_limit: default_annual_limit(),
            departments: Vec::new(),
            allow_overage: false,
        }
    }
}

/// Inputs for the program ROI estimate
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BusinessMetrics {
    #[serde(default)]
    pub employee_count: i64,
    /// Average annual salary in won
    #[serde(default)]
    pub average_salary: i64,
    /// Yearly turnover, percent
    #[serde(default)]
    pub turnover_rate: f64,
    /// Sick days per employee per year
    #[serde(default)]
    pub absenteeism_days: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MonthlyUsage {
    pub year: i32,
    pub month: u32,
    pub sessions: i64,
    pub cost: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoiEstimate {
    pub program_cost: i64,
    pub turnover_savings: i64,
    pub absenteeism_savings: i64,
    pub estimated_savings: i64,
    pub roi_percent: f64,
}

const TURNOVER_REDUCTION: f64 = 0.2;
const REPLACEMENT_COST_RATIO: f64 = 0.5;
const ABSENTEEISM_REDUCTION: f64 = 0.25;
const WORKING_DAYS_PER_YEAR: f64 = 250.0;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CompanyDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// E-mail domain, lowercase
    pub domain: String,

    #[serde(default)]
    pub plan: Plan,

    /// Prepaid credit in won
    #[serde(default)]
    pub balance: i64,

    #[serde(default)]
    pub settings: CompanySettings,

    #[serde(default)]
    pub business_metrics: BusinessMetrics,

    #[serde(default)]
    pub monthly_usage: Vec<MonthlyUsage>,

    #[serde(default = "crate::db::schemas::default_true")]
    pub is_active: bool,
}

impl CompanyDoc {
    pub fn new(name: String, domain: String, plan: Plan, balance: i64) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            name,
            domain: domain.trim().to_lowercase(),
            plan,
            balance,
            settings: CompanySettings::default(),
            business_metrics: BusinessMetrics::default(),
            monthly_usage: Vec::new(),
            is_active: true,
        }
    }

    /// Take `amount` from the balance when it covers it or overage is allowed
    pub fn deduct_balance(&mut self, amount: i64) -> bool {
        if self.balance >= amount || self.settings.allow_overage {
            self.balance -= amount;
            true
        } else {
            false
        }
    }

    /// Add sessions and cost to the month's usage row, creating it if needed
    pub fn update_monthly_usage(&mut self, year: i32, month: u32, sessions: i64, cost: i64) {
        match self
            .monthly_usage
            .iter_mut()
            .find(|u| u.year == year && u.month == month)
        {
            Some(row) => {
                row.sessions += sessions;
                row.cost += cost;
            }
            None => self.monthly_usage.push(MonthlyUsage {
                year,
                month,
                sessions,
                cost,
            }),
        }
    }

    pub fn usage_for(&self, year: i32) -> (i64, i64) {
        self.monthly_usage
            .iter()
            .filter(|u| u.year == year)
            .fold((0, 0), |(s, c), u| (s + u.sessions, c + u.cost))
    }

    /// Yearly savings estimate against the year's program cost
    pub fn roi_estimate(&self, year: i32) -> RoiEstimate {
        let m = &self.business_metrics;
        let (_, program_cost) = self.usage_for(year);
        let headcount = m.employee_count as f64;
        let salary = m.average_salary as f64;

        let turnover_savings = (headcount * m.turnover_rate / 100.0
            * TURNOVER_REDUCTION
            * salary
            * REPLACEMENT_COST_RATIO)
            .floor() as i64;
        let absenteeism_savings = (headcount
            * m.absenteeism_days
            * ABSENTEEISM_REDUCTION
            * (salary / WORKING_DAYS_PER_YEAR))
            .floor() as i64;
        let estimated_savings = turnover_savings + absenteeism_savings;
        let roi_percent = if program_cost > 0 {
            ((estimated_savings - program_cost) as f64 / program_cost as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        RoiEstimate {
            program_cost,
            turnover_savings,
            absenteeism_savings,
            estimated_savings,
            roi_percent,
        }
    }
}

impl IntoIndexes for CompanyDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::unique("domain_unique", &["domain"]),
            IndexSpec::unique("name_unique", &["name"]),
        ]
    }
}

impl MutMetadata for CompanyDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for CompanyDoc {
    const COLLECTION: &'static str = "companies";
    const LABEL: &'static str = "Company";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduct_balance_respects_overage() {
        let mut company = CompanyDoc::new("Acme".into(), "ACME.kr".into(), Plan::Standard, 60_000);
        assert_eq!(company.domain, "acme.kr");
        assert!(company.deduct_balance(50_000));
        assert!(!company.deduct_balance(50_000));
        assert_eq!(company.balance, 10_000);

        company.settings.allow_overage = true;
        assert!(company.deduct_balance(50_000));
        assert_eq!(company.balance, -40_000);
    }

    #[test]
    fn test_monthly_usage_upsert() {
        let mut company = CompanyDoc::new("Acme".into(), "acme.kr".into(), Plan::Basic, 0);
        company.update_monthly_usage(2024, 11, 1, 50_000);
        company.update_monthly_usage(2024, 11, 1, 60_000);
        company.update_monthly_usage(2024, 12, 1, 70_000);
        assert_eq!(company.monthly_usage.len(), 2);
        assert_eq!(company.monthly_usage[0].cost, 110_000);
        assert_eq!(company.usage_for(2024), (3, 180_000));
    }

    #[test]
    fn test_roi_estimate() {
        let mut company = CompanyDoc::new("Acme".into(), "acme.kr".into(), Plan::Basic, 0);
        company.business_metrics = BusinessMetrics {
            employee_count: 100,
            average_salary: 50_000_000,
            turnover_rate: 10.0,
            absenteeism_days: 4.0,
        };
        company.update_monthly_usage(2024, 1, 20, 10_000_000);
        let roi = company.roi_estimate(2024);
        // 100 * 0.1 * 0.2 * 50M * 0.5
        assert_eq!(roi.turnover_savings, 50_000_000);
        // 100 * 4 * 0.25 * 200k
        assert_eq!(roi.absenteeism_savings, 20_000_000);
        assert_eq!(roi.roi_percent, 600.0);
        assert_eq!(company.roi_estimate(2023).roi_percent, 0.0);
    }
}
