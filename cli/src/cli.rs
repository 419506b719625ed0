use clap::{Args, Parser, Subcommand, value_parser};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "updraft", version, about = "Updraft - desktop release distribution", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Application and channel a command operates on.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Application slug
    #[arg(short, long)]
    pub app: String,
    /// Channel id
    #[arg(short, long)]
    pub channel: String,
}

#[derive(Subcommand, Debug)]
pub enum AppsCommands {
    /// Create an application
    Create {
        name: String,
        /// Team members. Can be used multiple times.
        #[arg(short, long = "member")]
        members: Vec<String>,
    },
    /// List applications
    Ls {
        #[arg(short, long, default_value = "false")]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChannelsCommands {
    /// Create a channel in an application
    Create {
        /// Application slug
        #[arg(short, long)]
        app: String,
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DraftsCommands {
    /// Stage files as a draft of a version
    Upload {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        version: String,
        #[arg(long)]
        platform: String,
        #[arg(long)]
        arch: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the drafts of a channel
    Ls {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, default_value = "false")]
        json: bool,
    },
    /// Release a draft into its version
    Release {
        #[command(flatten)]
        target: Target,
        draft_id: i32,
    },
    /// Delete one draft, or every draft of the channel with --all
    Rm {
        #[command(flatten)]
        target: Target,
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        draft_id: Option<i32>,
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum VersionsCommands {
    /// List the versions of a channel
    Ls {
        #[command(flatten)]
        target: Target,
        #[arg(short, long, default_value = "false")]
        json: bool,
    },
    /// Change the rollout percentage of a version
    Rollout {
        #[command(flatten)]
        target: Target,
        version: String,
        #[arg(value_parser = value_parser!(i32).range(0..=100))]
        rollout: i32,
    },
    /// Mark a version as dead
    Dead {
        #[command(flatten)]
        target: Target,
        version: String,
    },
    /// Bring a dead version back
    Revive {
        #[command(flatten)]
        target: Target,
        version: String,
    },
    /// Mark every version older than the three most recent as dead
    Age {
        #[command(flatten)]
        target: Target,
    },
    /// Delete old dead versions
    Prune {
        #[command(flatten)]
        target: Target,
        /// Number of newest versions that are never deleted
        #[arg(long, default_value = "3")]
        keep: usize,
    },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the configured storage accepts writes, reads and deletes
    Deepcheck,

    /// Clear a stuck application lock
    Unlock {
        /// Application slug
        #[arg(short, long)]
        app: String,
    },

    /// Manage applications
    Apps {
        #[clap(subcommand)]
        command: AppsCommands,
    },

    /// Manage channels
    Channels {
        #[clap(subcommand)]
        command: ChannelsCommands,
    },

    /// Stage and release drafts
    Drafts {
        #[clap(subcommand)]
        command: DraftsCommands,
    },

    /// Inspect and change versions
    Versions {
        #[clap(subcommand)]
        command: VersionsCommands,
    },

    /// Rebuild every feed of a channel from the catalog
    Regenerate {
        #[command(flatten)]
        target: Target,
    },

    /// Generate shell completion scripts
    Completion {
        #[arg(value_parser = value_parser!(Shell))]
        shell: Shell,
    },
}
