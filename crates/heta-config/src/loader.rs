//! Configuration Loader
//!
//! Finds `heta.toml`, applies `HETA_*` environment overrides and validates
//! the result.

use crate::project::{LogSection, ProjectConfig};
use crate::{ConfigError, ConfigResult, CONFIG_FILE_NAME};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Log filter used when nothing else sets one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Built-in defaults
/// 2. Project config (heta.toml)
/// 3. Environment variables (HETA_*)
/// 4. CLI flags (handled by caller)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides; used by hosts that must be reproducible
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration with overrides applied
    pub project: ProjectConfig,

    /// Directory holding heta.toml, if one was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader that does not read `HETA_*` variables.
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find heta.toml. A missing file is not
    /// an error: defaults apply and `project_root` is `None`.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        self.finish(project, project_root)
    }

    /// Load configuration from a specific heta.toml
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project_root = config_path.parent().map(Path::to_path_buf);
        self.finish(project, project_root)
    }

    fn finish(&self, project: ProjectConfig, project_root: Option<PathBuf>) -> ConfigResult<Config> {
        let project = if self.ignore_env {
            project
        } else {
            self.apply_env_overrides(project)?
        };
        project.validate()?;
        Ok(Config {
            project,
            project_root,
        })
    }

    /// Returns (project_root, project_config)
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        for dir in start_dir.ancestors() {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                let project = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(dir.to_path_buf()), project));
            }
        }
        Ok((None, ProjectConfig::default()))
    }

    /// Apply environment variable overrides to project config
    ///
    /// `HETA_GC_STRESS`, `HETA_HEAP_GROWTH_PERCENT`, `HETA_MIN_HEAP_SIZE`,
    /// `HETA_INITIAL_HEAP_SIZE` and `HETA_LOG`.
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(stress) = env::var("HETA_GC_STRESS") {
            config.vm_mut().gc_stress = Some(parse_bool(&stress));
        }
        if let Some(percent) = env_number("HETA_HEAP_GROWTH_PERCENT")? {
            config.vm_mut().heap_growth_percent = Some(percent);
        }
        if let Some(size) = env_number("HETA_MIN_HEAP_SIZE")? {
            config.vm_mut().min_heap_size = Some(size);
        }
        if let Some(size) = env_number("HETA_INITIAL_HEAP_SIZE")? {
            config.vm_mut().initial_heap_size = Some(size);
        }
        if let Ok(level) = env::var("HETA_LOG") {
            config.log = Some(LogSection { level: Some(level) });
        }
        Ok(config)
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn env_number<T: FromStr>(name: &str) -> ConfigResult<Option<T>> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            reason: format!("'{raw}' is not a non-negative integer"),
        })
}

impl Config {
    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has heta.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Effective log filter (env > project > default)
    pub fn log_level(&self) -> &str {
        self.project.log_level().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Module search paths, relative entries resolved against the project
    /// root.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.project
            .search_paths()
            .iter()
            .map(|path| match &self.project_root {
                Some(root) if path.is_relative() => root.join(path),
                _ => path.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[log]\nlevel = \"info\"\n");

        let sub_dir = temp_dir.path().join("scripts");
        fs::create_dir(&sub_dir).unwrap();

        let config = ConfigLoader::without_env().load_from_directory(&sub_dir).unwrap();
        assert_eq!(config.project_root(), Some(temp_dir.path()));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_search_paths_resolve_against_root() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            "[modules]\nsearch_paths = [\"lib\", \"/abs\"]\n",
        );

        let config = ConfigLoader::without_env()
            .load_from_directory(temp_dir.path())
            .unwrap();
        assert_eq!(
            config.search_paths(),
            vec![temp_dir.path().join("lib"), PathBuf::from("/abs")]
        );
    }

    #[test]
    #[serial]
    fn test_env_override_gc_stress() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[vm]\ngc_stress = false\n");

        env::set_var("HETA_GC_STRESS", "1");
        let config = ConfigLoader::new().load_from_directory(temp_dir.path());
        env::remove_var("HETA_GC_STRESS");

        let config = config.unwrap();
        assert_eq!(config.project.vm.unwrap().gc_stress, Some(true));
    }

    #[test]
    #[serial]
    fn test_env_override_must_be_numeric() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("HETA_MIN_HEAP_SIZE", "lots");
        let result = ConfigLoader::new().load_from_directory(temp_dir.path());
        env::remove_var("HETA_MIN_HEAP_SIZE");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "HETA_MIN_HEAP_SIZE"
        ));
    }

    #[test]
    fn test_default_log_level() {
        assert_eq!(Config::default().log_level(), DEFAULT_LOG_LEVEL);
    }
}
