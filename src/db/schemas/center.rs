//! Counseling center schema

use serde::{Deserialize, Serialize};

use crate::db::schemas::{default_true, Metadata};
use crate::db::{new_id, IndexSpec, IntoIndexes, MutMetadata, Record};
use crate::types::{Result, WellspringError};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CenterSettings {
    #[serde(default = "default_max_counselors")]
    pub max_counselors: i32,
    #[serde(default = "default_true")]
    pub accepts_auto_assignment: bool,
}

fn default_max_counselors() -> i32 {
    10
}

impl Default for CenterSettings {
    fn default() -> Self {
        Self {
            max_counselors: default_max_counselors(),
            accepts_auto_assignment: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct OperatingHours {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturday: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunday: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CenterDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Member counselors; mutated only through the center relationship service
    #[serde(default)]
    counselors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,

    #[serde(default)]
    pub specialties: Vec<String>,

    #[serde(default)]
    pub operating_hours: OperatingHours,

    #[serde(default)]
    pub settings: CenterSettings,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl CenterDoc {
    pub fn new(name: String) -> Self {
        Self {
            id: new_id(),
            metadata: Metadata::new(),
            name,
            description: String::new(),
            address: None,
            phone: None,
            counselors: Vec::new(),
            admin: None,
            specialties: Vec::new(),
            operating_hours: OperatingHours::default(),
            settings: CenterSettings::default(),
            is_active: true,
        }
    }

    pub fn counselors(&self) -> &[String] {
        &self.counselors
    }

    pub fn has_member(&self, counselor_id: &str) -> bool {
        self.counselors.iter().any(|c| c == counselor_id)
    }

    /// Add a member, enforcing `settings.max_counselors`
    pub(crate) fn admit(&mut self, counselor_id: &str) -> Result<()> {
        if self.has_member(counselor_id) {
            return Err(WellspringError::Conflict(
                "Counselor already belongs to this center".into(),
            ));
        }
        if self.counselors.len() >= self.settings.max_counselors.max(0) as usize {
            return Err(WellspringError::Conflict(format!(
                "Center is at capacity ({} counselors)",
                self.settings.max_counselors
            )));
        }
        self.counselors.push(counselor_id.to_string());
        Ok(())
    }

    pub(crate) fn release(&mut self, counselor_id: &str) -> bool {
        let before = self.counselors.len();
        self.counselors.retain(|c| c != counselor_id);
        before != self.counselors.len()
    }
}

impl IntoIndexes for CenterDoc {
    fn into_indices() -> Vec<IndexSpec> {
        vec![
            IndexSpec::unique("name_unique", &["name"]),
            IndexSpec::lookup("counselors_index", &["counselors"]),
        ]
    }
}

impl MutMetadata for CenterDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Record for CenterDoc {
    const COLLECTION: &'static str = "counseling_centers";
    const LABEL: &'static str = "Counseling center";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_checked_on_admit() {
        let mut center = CenterDoc::new("Seoul Mind".into());
        center.settings.max_counselors = 2;
        center.admit("a").unwrap();
        assert!(center.admit("a").is_err());
        center.admit("b").unwrap();
        assert!(matches!(center.admit("c"), Err(WellspringError::Conflict(_))));
        assert_eq!(center.counselors().len(), 2);

        assert!(center.release("a"));
        assert!(!center.release("a"));
        center.admit("c").unwrap();
    }
}
