//! CLI settings: project configuration, logging and the REPL history file
//!
//! Script-facing settings come from heta.toml and `HETA_*` variables via
//! `heta_config`; flags given on the command line win over both.

use anyhow::{Context, Result};
use heta_config::{Config, ConfigLoader};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Load heta.toml starting from `dir` and walking up.
pub fn load_project(dir: &Path) -> Result<Config> {
    ConfigLoader::new()
        .load_from_directory(dir)
        .with_context(|| format!("Failed to load configuration for {}", dir.display()))
}

/// Install the stderr log subscriber.
///
/// Filter precedence: `--log`, then `HETA_LOG` / `[log] level`, then `warn`.
pub fn init_logging(cli_filter: Option<&str>, config: &Config) -> Result<()> {
    let directive = cli_filter.unwrap_or_else(|| config.log_level());
    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log filter '{directive}'"))?;

    // A second init (tests calling in-process) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
    Ok(())
}

/// Get the REPL history file path
///
/// Returns:
/// 1. HETA_HISTORY_FILE if set
/// 2. ~/.heta/history if home directory exists
/// 3. None otherwise
pub fn history_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os("HETA_HISTORY_FILE") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".heta").join("history"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_project_from_script_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("heta.toml"),
            "[modules]\nsearch_paths = [\"lib\"]\n",
        )
        .unwrap();

        let config = load_project(temp_dir.path()).unwrap();
        assert_eq!(config.search_paths(), vec![temp_dir.path().join("lib")]);
    }

    #[test]
    fn test_load_project_reports_bad_toml() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("heta.toml"), "[vm\n").unwrap();

        let error = load_project(temp_dir.path()).unwrap_err();
        assert!(format!("{error:#}").contains("Invalid TOML"));
    }

    #[test]
    fn test_bad_log_filter_is_an_error() {
        let result = init_logging(Some("heta_runtime=loud"), &Config::default());
        assert!(result.is_err());
    }
}
