//! Client financial profile and counseling goals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::Role;
use crate::db::schemas::{
    to_chrono, Asset, CounselingGoalDoc, FinancialGoal, FinancialProfileDoc, GoalStatus, Liability,
    Milestone, RiskTolerance,
};
use crate::db::{Database, Filter};
use crate::services::sessions::parse_schedule;
use crate::services::visibility::Viewer;
use crate::types::{FieldError, Result, WellspringError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialProfileView {
    pub user: String,
    pub monthly_income: i64,
    pub monthly_expenses: i64,
    pub monthly_surplus: i64,
    pub assets: Vec<Asset>,
    pub liabilities: Vec<Liability>,
    pub goals: Vec<FinancialGoal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<RiskTolerance>,
    pub net_worth: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&FinancialProfileDoc> for FinancialProfileView {
    fn from(p: &FinancialProfileDoc) -> Self {
        Self {
            user: p.user.clone(),
            monthly_income: p.monthly_income,
            monthly_expenses: p.monthly_expenses,
            monthly_surplus: p.monthly_surplus(),
            assets: p.assets.clone(),
            liabilities: p.liabilities.clone(),
            goals: p.goals.clone(),
            risk_tolerance: p.risk_tolerance,
            net_worth: p.net_worth(),
            updated_at: p.metadata.updated(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    #[serde(default)]
    pub monthly_income: Option<i64>,
    #[serde(default)]
    pub monthly_expenses: Option<i64>,
    #[serde(default)]
    pub assets: Option<Vec<Asset>>,
    #[serde(default)]
    pub liabilities: Option<Vec<Liability>>,
    #[serde(default)]
    pub goals: Option<Vec<FinancialGoal>>,
    #[serde(default)]
    pub risk_tolerance: Option<RiskTolerance>,
}

/// The caller's profile; an empty one when nothing was saved yet
pub async fn profile(db: &Database, user_id: &str) -> Result<FinancialProfileView> {
    let doc = db
        .collection::<FinancialProfileDoc>()
        .find_one(Filter::new().eq("user", user_id))
        .await?
        .unwrap_or_else(|| FinancialProfileDoc::new(user_id));
    Ok(FinancialProfileView::from(&doc))
}

fn validate_profile(input: &ProfileInput) -> Result<()> {
    let mut errors = Vec::new();
    if input.monthly_income.is_some_and(|v| v < 0) {
        errors.push(FieldError::new("monthlyIncome", "must not be negative"));
    }
    if input.monthly_expenses.is_some_and(|v| v < 0) {
        errors.push(FieldError::new("monthlyExpenses", "must not be negative"));
    }
    if let Some(assets) = &input.assets {
        if assets.iter().any(|a| a.value < 0 || a.name.trim().is_empty()) {
            errors.push(FieldError::new("assets", "each asset needs a name and a non-negative value"));
        }
    }
    if let Some(liabilities) = &input.liabilities {
        if liabilities.iter().any(|l| l.balance < 0 || l.interest_rate < 0.0) {
            errors.push(FieldError::new("liabilities", "balances and interest rates must not be negative"));
        }
    }
    if let Some(goals) = &input.goals {
        if goals.iter().any(|g| g.target_amount <= 0 || g.title.trim().is_empty()) {
            errors.push(FieldError::new("goals", "each goal needs a title and a positive target"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(WellspringError::Validation(errors))
    }
}

/// Create or update the caller's profile
pub async fn save_profile(db: &Database, user_id: &str, input: ProfileInput) -> Result<FinancialProfileView> {
    validate_profile(&input)?;
    let profiles = db.collection::<FinancialProfileDoc>();
    let existing = profiles.find_one(Filter::new().eq("user", user_id)).await?;
    let is_new = existing.is_none();
    let mut doc = existing.unwrap_or_else(|| FinancialProfileDoc::new(user_id));

    if let Some(v) = input.monthly_income {
        doc.monthly_income = v;
    }
    if let Some(v) = input.monthly_expenses {
        doc.monthly_expenses = v;
    }
    if let Some(v) = input.assets {
        doc.assets = v;
    }
    if let Some(v) = input.liabilities {
        doc.liabilities = v;
    }
    if let Some(v) = input.goals {
        doc.goals = v;
    }
    if input.risk_tolerance.is_some() {
        doc.risk_tolerance = input.risk_tolerance;
    }

    if is_new {
        profiles.insert_one(doc.clone()).await?;
        info!(user = %user_id, "financial profile created");
    } else {
        profiles.replace(&mut doc).await?;
    }
    Ok(FinancialProfileView::from(&doc))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalView {
    pub id: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counselor: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    pub progress: i32,
    pub status: GoalStatus,
    pub milestones: Vec<Milestone>,
}

impl From<&CounselingGoalDoc> for GoalView {
    fn from(g: &CounselingGoalDoc) -> Self {
        Self {
            id: g.id.clone(),
            user: g.user.clone(),
            counselor: g.counselor.clone(),
            title: g.title.clone(),
            description: g.description.clone(),
            category: g.category.clone(),
            target_date: g.target_date.map(to_chrono),
            progress: g.progress,
            status: g.status,
            milestones: g.milestones.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GoalInput {
    /// Client the goal belongs to; only counselors set this
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub target_date: Option<String>,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub status: Option<GoalStatus>,
    #[serde(default)]
    pub milestones: Option<Vec<Milestone>>,
}

/// Goals the caller owns, or follows as counselor
pub async fn goals(db: &Database, viewer: &Viewer) -> Result<Vec<CounselingGoalDoc>> {
    let field = if viewer.role == Role::Counselor { "counselor" } else { "user" };
    db.collection::<CounselingGoalDoc>()
        .find_many(Filter::new().eq(field, viewer.id.as_str()))
        .await
}

fn apply_goal(goal: &mut CounselingGoalDoc, input: GoalInput) -> Result<()> {
    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(WellspringError::invalid("title", "must not be empty"));
    }
    let target_date = match input.target_date.as_deref() {
        Some(raw) => Some(
            parse_schedule(raw)
                .ok_or_else(|| WellspringError::invalid("targetDate", "must be an ISO 8601 date"))?,
        ),
        None => None,
    };

    if let Some(v) = input.title {
        goal.title = v.trim().to_string();
    }
    if let Some(v) = input.description {
        goal.description = v;
    }
    if let Some(v) = input.category {
        goal.category = v;
    }
    if let Some(at) = target_date {
        goal.target_date = Some(bson::DateTime::from_chrono(at));
    }
    if let Some(v) = input.milestones {
        goal.milestones = v;
    }
    if let Some(v) = input.status {
        goal.status = v;
    }
    if let Some(v) = input.progress {
        goal.set_progress(v);
    }
    Ok(())
}

pub async fn create_goal(db: &Database, viewer: &Viewer, input: GoalInput) -> Result<CounselingGoalDoc> {
    let title = input
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| WellspringError::invalid("title", "is required"))?;

    let mut goal = match (viewer.role, input.user.as_deref()) {
        (Role::Counselor, Some(client)) => {
            let mut goal = CounselingGoalDoc::new(client, title);
            goal.counselor = Some(viewer.id.clone());
            goal
        }
        (Role::Counselor, None) => {
            return Err(WellspringError::invalid("user", "is required when a counselor sets a goal"));
        }
        _ => CounselingGoalDoc::new(&viewer.id, title),
    };
    apply_goal(&mut goal, GoalInput { user: None, ..input })?;

    db.collection::<CounselingGoalDoc>().insert_one(goal.clone()).await?;
    info!(goal_id = %goal.id, user = %goal.user, "goal created");
    Ok(goal)
}

pub async fn update_goal(db: &Database, viewer: &Viewer, id: &str, input: GoalInput) -> Result<CounselingGoalDoc> {
    let goals = db.collection::<CounselingGoalDoc>();
    let mut goal = goals
        .find_by_id(id)
        .await?
        .ok_or_else(|| WellspringError::NotFound("Goal".into()))?;
    if goal.user != viewer.id && goal.counselor.as_deref() != Some(viewer.id.as_str()) {
        return Err(WellspringError::Forbidden("Not allowed to edit this goal".into()));
    }
    apply_goal(&mut goal, GoalInput { user: None, ..input })?;
    goals.replace(&mut goal).await?;
    Ok(goal)
}
