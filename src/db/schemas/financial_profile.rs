//! Financial profile schema, one per client

use serde::{Deserialize, Serialize};

use crate::db::schemas::Metadata;
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    pub value: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Liability {
    pub name: String,
    #[serde(default)]
    pub kind: String,
    pub balance: i64,
    #[serde(default)]
    pub interest_rate: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FinancialGoal {
    pub title: String,
    pub target_amount: i64,
    #[serde(default)]
    pub current_amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FinancialProfileDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub user: String,

    #[serde(default)]
    pub monthly_income: i64,

    #[serde(default)]
    pub monthly_expenses: i64,

    #[serde(default)]
    pub assets: Vec<Asset>,

    #[serde(default)]
    pub liabilities: Vec<Liability>,

    #[serde(default)]
    pub goals: Vec<FinancialGoal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<RiskTolerance>,
}

impl FinancialProfileDoc {
    pub fn new(user: &str) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            user: user.to_string(),
            monthly_income: 0,
            monthly_expenses: 0,
            assets: Vec::new(),
            liabilities: Vec::new(),
            goals: Vec::new(),
            risk_tolerance: None,
        }
    }

    pub fn net_worth(&self) -> i64 {
        let assets: i64 = self.assets.iter().map(|a| a.value).sum();
        let debts: i64 = self.liabilities.iter().map(|l| l.balance).sum();
        assets - debts
    }

    pub fn monthly_surplus(&self) -> i64 {
        self.monthly_income - self.monthly_expenses
    }
}

impl IntoIndexes for FinancialProfileDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![IndexSpec::unique("user_unique", &["user"])]
    }
}

impl MutMetadata for FinancialProfileDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for FinancialProfileDoc {
    const COLLECTION: &'static str = "financial_profiles";
    const LABEL: &'static str = "Financial profile";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_net_worth() {
        let mut profile = FinancialProfileDoc::new("u1");
        profile.assets.push(Asset { name: "savings".into(), kind: "cash".into(), value: 30_000_000 });
        profile.liabilities.push(Liability {
            name: "car loan".into(),
            kind: "loan".into(),
            balance: 12_000_000,
            interest_rate: 5.5,
        });
        assert_eq!(profile.net_worth(), 18_000_000);
    }
}
