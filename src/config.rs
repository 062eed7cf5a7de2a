use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::cli::Cli;
use crate::providers::TaskFilter;

const DEFAULT_LOG_LEVEL: &str = "info";

/// Contents of the TOML config file. Everything is optional here; required
/// values are checked in [`Settings::resolve`].
#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub log_level: Option<String>,
    pub vikunja: Option<VikunjaConfig>,
    pub nextcloud: Option<NextcloudConfig>,
    pub export: Option<ExportConfig>,
}

#[derive(Deserialize, Default)]
pub struct VikunjaConfig {
    pub host: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub ignore_projects: Vec<String>,
    #[serde(default)]
    pub ignore_labels: Vec<String>,
}

impl fmt::Debug for VikunjaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VikunjaConfig")
            .field("host", &self.host)
            .field("token", &"[REDACTED]")
            .field("ignore_projects", &self.ignore_projects)
            .field("ignore_labels", &self.ignore_labels)
            .finish()
    }
}

#[derive(Deserialize, Default)]
pub struct NextcloudConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dir: Option<String>,
}

impl fmt::Debug for NextcloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextcloudConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("dir", &self.dir)
            .finish()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ExportConfig {
    pub output_dir: Option<PathBuf>,
    pub combined_json: Option<bool>,
}

fn config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vikunja-export")
        .join("config.toml")
}

/// Load the config file. A missing default file is an empty config; a
/// missing explicitly requested file is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                return Ok(AppConfig::default());
            }
            path
        }
    };
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

/// Validated configuration for one run.
#[derive(Debug)]
pub struct Settings {
    /// A `tracing` level name.
    pub log_level: String,
    pub combined_json: bool,
    pub vikunja: VikunjaSettings,
    pub destination: Destination,
}

#[derive(Clone)]
pub struct VikunjaSettings {
    /// Server root including scheme.
    pub base_url: String,
    pub token: String,
    pub filter: TaskFilter,
}

impl fmt::Debug for VikunjaSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VikunjaSettings")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("filter", &self.filter)
            .finish()
    }
}

#[derive(Debug)]
pub enum Destination {
    Local { output_dir: PathBuf },
    Nextcloud(NextcloudSettings),
}

pub struct NextcloudSettings {
    /// Server root including scheme.
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub dir: String,
}

impl fmt::Debug for NextcloudSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextcloudSettings")
            .field("base_url", &self.base_url)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("dir", &self.dir)
            .finish()
    }
}

impl Settings {
    /// Merge CLI/env values over the config file and validate the result.
    pub fn resolve(file: AppConfig, cli: &Cli) -> Result<Self> {
        let vikunja = file.vikunja.unwrap_or_default();
        let nextcloud = file.nextcloud.unwrap_or_default();
        let export = file.export.unwrap_or_default();

        let Some(host) = cli.vikunja_host.clone().or(vikunja.host) else {
            bail!("Vikunja host required (--vikunja-host, VK_HOST or [vikunja].host)");
        };
        let Some(token) = cli.vikunja_token.clone().or(vikunja.token) else {
            bail!("Vikunja token required (--vikunja-token, VK_TOKEN or [vikunja].token)");
        };

        let ignore_projects = cli
            .ignore_projects
            .as_ref()
            .unwrap_or(&vikunja.ignore_projects);
        let ignore_labels = cli.ignore_labels.as_ref().unwrap_or(&vikunja.ignore_labels);
        let filter = TaskFilter {
            ignore_projects: parse_list(ignore_projects),
            ignore_labels: parse_list(ignore_labels),
        };

        let log_level = cli
            .log_level
            .clone()
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        let log_level = normalize_level(&log_level)?;
        let combined_json = cli.combined_json || export.combined_json.unwrap_or(false);

        let destination = match cli.output_dir.clone().or(export.output_dir) {
            Some(output_dir) => Destination::Local {
                output_dir: expand_home(&output_dir),
            },
            None => {
                let host = cli.nextcloud_host.clone().or(nextcloud.host);
                let user = cli.nextcloud_user.clone().or(nextcloud.user);
                let password = cli.nextcloud_password.clone().or(nextcloud.password);
                let dir = cli.nextcloud_dir.clone().or(nextcloud.dir);
                let (Some(host), Some(user), Some(password)) = (host, user, password) else {
                    bail!(
                        "No destination configured: set an output directory, or Nextcloud host, user and password"
                    );
                };
                let dir = dir.unwrap_or_default();
                if dir.trim_matches('/').trim().is_empty() {
                    bail!("Nextcloud folder required (--nextcloud-dir, NC_DIR or [nextcloud].dir)");
                }
                Destination::Nextcloud(NextcloudSettings {
                    base_url: base_url(&host),
                    user,
                    password,
                    dir,
                })
            }
        };

        Ok(Self {
            log_level,
            combined_json,
            vikunja: VikunjaSettings {
                base_url: base_url(&host),
                token,
                filter,
            },
            destination,
        })
    }
}

/// Map a level name onto `tracing`'s, accepting the `WARNING`/`CRITICAL`
/// spellings older configs use.
fn normalize_level(level: &str) -> Result<String> {
    let level = match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        other => bail!("Unknown log level '{other}'"),
    };
    Ok(level.to_string())
}

/// Trimmed, non-empty entries as a set.
fn parse_list(items: &[String]) -> HashSet<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Bare hosts get `https://`; explicit schemes are kept.
fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["vikunja-export"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn file_config(toml_src: &str) -> AppConfig {
        toml::from_str(toml_src).unwrap()
    }

    const FULL: &str = r#"
log_level = "warn"

[vikunja]
host = "tasks.example.com"
token = "tk"
ignore_projects = ["Archive", " Old ", ""]
ignore_labels = ["private"]

[nextcloud]
host = "cloud.example.com"
user = "alice"
password = "pw"
dir = "Tasks"
"#;

    #[test]
    fn load_config_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert_eq!(config.nextcloud.unwrap().dir.as_deref(), Some("Tasks"));
    }

    #[test]
    fn load_config_missing_explicit_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_config(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn load_config_invalid_toml_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "log_level = [").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn resolve_file_values() {
        let settings = Settings::resolve(file_config(FULL), &cli(&[])).unwrap();

        assert_eq!(settings.log_level, "warn");
        assert_eq!(settings.vikunja.base_url, "https://tasks.example.com");
        assert_eq!(
            settings.vikunja.filter.ignore_projects,
            HashSet::from(["Archive".to_string(), "Old".to_string()])
        );
        match settings.destination {
            Destination::Nextcloud(nc) => {
                assert_eq!(nc.base_url, "https://cloud.example.com");
                assert_eq!(nc.user, "alice");
                assert_eq!(nc.dir, "Tasks");
            }
            other => panic!("unexpected destination: {other:?}"),
        }
    }

    #[test]
    fn cli_overrides_file() {
        let settings = Settings::resolve(
            file_config(FULL),
            &cli(&[
                "--vikunja-host",
                "http://localhost:3456/",
                "--ignore-labels",
                "a, b",
                "--log-level",
                "debug",
            ]),
        )
        .unwrap();

        assert_eq!(settings.vikunja.base_url, "http://localhost:3456");
        assert_eq!(
            settings.vikunja.filter.ignore_labels,
            HashSet::from(["a".to_string(), "b".to_string()])
        );
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn output_dir_selects_local_destination() {
        let settings =
            Settings::resolve(file_config(FULL), &cli(&["--output-dir", "/tmp/tasks"])).unwrap();
        match settings.destination {
            Destination::Local { output_dir } => assert_eq!(output_dir, PathBuf::from("/tmp/tasks")),
            other => panic!("unexpected destination: {other:?}"),
        }
    }

    #[test]
    fn missing_host_is_an_error() {
        let err = Settings::resolve(AppConfig::default(), &cli(&[])).unwrap_err();
        assert!(err.to_string().contains("Vikunja host required"));
    }

    #[test]
    fn missing_destination_is_an_error() {
        let config = file_config(
            r#"
[vikunja]
host = "tasks.example.com"
token = "tk"
"#,
        );
        let err = Settings::resolve(config, &cli(&[])).unwrap_err();
        assert!(err.to_string().contains("No destination configured"));
    }

    #[test]
    fn empty_nextcloud_dir_is_an_error() {
        let err = Settings::resolve(file_config(FULL), &cli(&["--nextcloud-dir", "/"])).unwrap_err();
        assert!(err.to_string().contains("Nextcloud folder required"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let settings = Settings::resolve(file_config(FULL), &cli(&[])).unwrap();
        let debug = format!("{settings:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("\"tk\""));
        assert!(!debug.contains("\"pw\""));
    }

    #[test]
    fn legacy_level_names_are_mapped() {
        assert_eq!(normalize_level("WARNING").unwrap(), "warn");
        assert_eq!(normalize_level("critical").unwrap(), "error");
        assert_eq!(normalize_level(" Info ").unwrap(), "info");
        assert!(normalize_level("verbose").is_err());
    }

    #[test]
    fn legacy_level_in_config_resolves() {
        let config = FULL.replace("log_level = \"warn\"", "log_level = \"WARNING\"");
        let settings = Settings::resolve(file_config(&config), &cli(&[])).unwrap();
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn unknown_level_is_an_error() {
        let err = Settings::resolve(file_config(FULL), &cli(&["--log-level", "loud"])).unwrap_err();
        assert!(err.to_string().contains("Unknown log level"));
    }

    #[test]
    fn combined_json_from_file_or_flag() {
        let settings = Settings::resolve(file_config(FULL), &cli(&[])).unwrap();
        assert!(!settings.combined_json);

        let config = format!("{FULL}\n[export]\ncombined_json = true\n");
        let settings = Settings::resolve(file_config(&config), &cli(&[])).unwrap();
        assert!(settings.combined_json);

        let settings = Settings::resolve(file_config(FULL), &cli(&["--combined-json"])).unwrap();
        assert!(settings.combined_json);
    }

    #[test]
    fn base_url_adds_scheme() {
        assert_eq!(base_url("tasks.example.com"), "https://tasks.example.com");
        assert_eq!(base_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
    }
}
