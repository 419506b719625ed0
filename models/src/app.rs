use crate::release::Version;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct App {
    pub id: i32,
    pub name: String,
    /// URL-safe identifier used as the root of every storage path of the app.
    pub slug: String,
    pub token: String,
    pub team: Vec<String>,
    pub channels: Vec<Channel>,
}

impl App {
    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == channel_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub versions: Vec<Version>,
}

impl Channel {
    pub fn version(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name == name)
    }
}
