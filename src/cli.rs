use std::path::PathBuf;

use clap::{ArgAction, Parser};

/// Export Vikunja tasks as Markdown and sync them to a Nextcloud folder.
///
/// Every option can also come from the environment variable shown, or from
/// the config file (default ~/.vikunja-export/config.toml).
#[derive(Debug, Parser)]
#[command(name = "vikunja-export", version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "VK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log the planned operations without changing the destination
    #[arg(long)]
    pub dry_run: bool,

    /// Log level when no -v is given
    #[arg(long, env = "VK_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Vikunja host, e.g. tasks.example.com
    #[arg(long, env = "VK_HOST")]
    pub vikunja_host: Option<String>,

    /// Vikunja API token
    #[arg(long, env = "VK_TOKEN", hide_env_values = true)]
    pub vikunja_token: Option<String>,

    /// Comma-separated project names to skip
    #[arg(long, env = "VK_IGNORE_PROJECTS", value_delimiter = ',')]
    pub ignore_projects: Option<Vec<String>>,

    /// Comma-separated label names to skip
    #[arg(long, env = "VK_IGNORE_LABELS", value_delimiter = ',')]
    pub ignore_labels: Option<Vec<String>>,

    /// Write to a local directory instead of Nextcloud
    #[arg(long, env = "VK_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Also export every task as one tasks.json
    #[arg(long, env = "VK_COMBINED_JSON")]
    pub combined_json: bool,

    /// Nextcloud host, e.g. cloud.example.com
    #[arg(long, env = "NC_HOST")]
    pub nextcloud_host: Option<String>,

    /// Nextcloud user
    #[arg(long, env = "NC_USER")]
    pub nextcloud_user: Option<String>,

    /// Nextcloud password or app password
    #[arg(long, env = "NC_PASS", hide_env_values = true)]
    pub nextcloud_password: Option<String>,

    /// Folder below the user's files root
    #[arg(long, env = "NC_DIR")]
    pub nextcloud_dir: Option<String>,
}
