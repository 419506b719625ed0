use crate::file::ReleaseFile;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Version {
    pub id: i32,
    pub name: String,
    pub dead: bool,
    /// Percentage of rollout buckets that receive this version, 0..=100.
    pub rollout: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub files: Vec<ReleaseFile>,
}

impl Version {
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}
