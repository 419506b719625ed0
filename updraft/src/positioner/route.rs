use models::file::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Ia32,
    X64,
    Arm64,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::Ia32, Arch::X64, Arch::Arm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Ia32 => "ia32",
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }

    pub fn parse(arch: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == arch)
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feed an artifact contributes to, beyond its own placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// Squirrel.Windows `RELEASES`.
    Windows,
    /// Squirrel.Mac `RELEASES.json`.
    Darwin,
    /// Placement and latest pointer only.
    Installer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub platform: Platform,
    pub arch: Arch,
    pub feed: Feed,
}

const ROUTES: &[(Platform, &str, Feed)] = &[
    (Platform::Win32, "exe", Feed::Installer),
    (Platform::Win32, "msi", Feed::Installer),
    (Platform::Win32, "nupkg", Feed::Windows),
    (Platform::Darwin, "dmg", Feed::Installer),
    (Platform::Darwin, "pkg", Feed::Installer),
    (Platform::Darwin, "zip", Feed::Darwin),
    (Platform::Linux, "deb", Feed::Installer),
    (Platform::Linux, "rpm", Feed::Installer),
];

/// Resolves where an upload goes. `None` means the artifact is not routable
/// and must be ignored without writing anything.
pub fn route(platform: &str, arch: &str, file_name: &str) -> Option<Route> {
    let platform: Platform = platform.parse().ok()?;
    let arch = Arch::parse(arch)?;
    let extension = crate::paths::extension(file_name)?.to_ascii_lowercase();

    ROUTES
        .iter()
        .find(|(p, ext, _)| *p == platform && *ext == extension)
        .map(|(_, _, feed)| Route {
            platform,
            arch,
            feed: *feed,
        })
}
