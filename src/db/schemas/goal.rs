//! Counseling goal schema

use bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::db::schemas::Metadata;
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GoalStatus {
    Active,
    Paused,
    Completed,
    Abandoned,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Milestone {
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CounselingGoalDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Owner of the goal
    pub user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counselor: Option<String>,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime>,

    /// Percent complete, 0..=100
    #[serde(default)]
    pub progress: i32,

    pub status: GoalStatus,

    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl CounselingGoalDoc {
    pub fn new(user: &str, title: String) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            user: user.to_string(),
            counselor: None,
            title,
            description: String::new(),
            category: String::new(),
            target_date: None,
            progress: 0,
            status: GoalStatus::Active,
            milestones: Vec::new(),
        }
    }

    /// Clamp progress; reaching 100 completes an active goal
    pub fn set_progress(&mut self, progress: i32) {
        self.progress = progress.clamp(0, 100);
        if self.progress == 100 && self.status == GoalStatus::Active {
            self.status = GoalStatus::Completed;
        }
    }
}

impl IntoIndexes for CounselingGoalDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![IndexSpec::lookup("user_index", &["user"])]
    }
}

impl MutMetadata for CounselingGoalDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for CounselingGoalDoc {
    const COLLECTION: &'static str = "counseling_goals";
    const LABEL: &'static str = "Goal";

    fn id(&self) -> &str {
        &self.id
    }
}
