use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Win32,
    Darwin,
    Linux,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Win32 => "win32",
            Platform::Darwin => "darwin",
            Platform::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win32" => Ok(Platform::Win32),
            "darwin" => Ok(Platform::Darwin),
            "linux" => Ok(Platform::Linux),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "file_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Installer,
    Update,
}

impl FileType {
    /// Classifies a file from its platform and name. Anything that is not a
    /// recognised installer is treated as an update artifact.
    pub fn classify(platform: &str, file_name: &str) -> Self {
        let installer_extensions: &[&str] = match platform {
            "win32" => &[".exe", ".msi"],
            "darwin" => &[".dmg", ".pkg"],
            "linux" => &[".deb", ".rpm"],
            _ => &[],
        };
        if installer_extensions
            .iter()
            .any(|ext| file_name.ends_with(ext))
        {
            FileType::Installer
        } else {
            FileType::Update
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Installer => write!(f, "installer"),
            FileType::Update => write!(f, "update"),
        }
    }
}

/// A release artifact registered against a version.
///
/// `platform` and `arch` are kept as the strings the uploader sent so that
/// unrecognised combinations can still be described and skipped downstream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFile {
    pub id: Option<i32>,
    pub file_name: String,
    pub platform: String,
    pub arch: String,
    pub file_type: FileType,
    pub sha1: String,
    pub sha256: String,
}

impl ReleaseFile {
    pub fn is_same_target(&self, other: &ReleaseFile) -> bool {
        self.file_name == other.file_name
            && self.platform == other.platform
            && self.arch == other.arch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_installers() {
        assert_eq!(FileType::classify("win32", "App Setup.exe"), FileType::Installer);
        assert_eq!(FileType::classify("win32", "app.msi"), FileType::Installer);
        assert_eq!(FileType::classify("darwin", "app.dmg"), FileType::Installer);
        assert_eq!(FileType::classify("linux", "app_1.0.0_amd64.deb"), FileType::Installer);
    }

    #[test]
    fn test_classify_updates() {
        assert_eq!(FileType::classify("win32", "app-1.0.0-full.nupkg"), FileType::Update);
        assert_eq!(FileType::classify("darwin", "app-mac.zip"), FileType::Update);
        assert_eq!(FileType::classify("chromeOS", "app.apk"), FileType::Update);
    }

    #[test]
    fn test_platform_round_trip_names() {
        assert_eq!("darwin".parse::<Platform>(), Ok(Platform::Darwin));
        assert_eq!(Platform::Win32.to_string(), "win32");
        assert!("chromeOS".parse::<Platform>().is_err());
    }
}
