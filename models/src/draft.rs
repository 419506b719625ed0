use serde::{Deserialize, Serialize};

/// Uploaded artifacts staged for a version that has not been released yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TemporarySave {
    pub id: i32,
    pub save_string: String,
    pub cipher_password: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub date: chrono::DateTime<chrono::Utc>,
    pub filenames: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewTemporarySave {
    pub save_string: String,
    pub cipher_password: String,
    pub version: String,
    pub platform: String,
    pub arch: String,
    pub filenames: Vec<String>,
}
