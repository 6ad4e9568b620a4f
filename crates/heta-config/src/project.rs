//! Project Configuration (heta.toml)
//!
//! Every section and field is optional; anything left out keeps the
//! engine's default.
//!
//! ```toml
//! [vm]
//! initial_heap_size = 10485760
//! min_heap_size = 1048576
//! heap_growth_percent = 50
//! gc_stress = false
//!
//! [modules]
//! search_paths = ["lib", "vendor"]
//!
//! [log]
//! level = "heta_runtime=debug"
//! ```

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from heta.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Heap tuning for VMs created by the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmSection>,

    /// Where the file-system loader looks for bare module names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules: Option<ModulesSection>,

    /// Logging defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogSection>,
}

/// `[vm]`: mirrors the heap settings of the runtime's `Configuration`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VmSection {
    /// Bytes allocated before the first collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_heap_size: Option<usize>,

    /// Floor for the collection threshold, in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_heap_size: Option<usize>,

    /// Threshold growth after each collection, in percent of live bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_growth_percent: Option<usize>,

    /// Collect before every allocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc_stress: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ModulesSection {
    /// Directories searched, in order, for bare import names. Relative
    /// entries are relative to the project root.
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// A `tracing` filter directive such as `warn` or `heta_runtime=debug`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::parse(&content).map_err(|error| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without validating it.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Check value ranges the engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(vm) = &self.vm {
            if vm.heap_growth_percent == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "vm.heap_growth_percent".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            if vm.min_heap_size == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "vm.min_heap_size".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(log) = &self.log {
            if log.level.as_deref().is_some_and(|level| level.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "log.level".to_string(),
                    reason: "cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// The `[vm]` section, created empty if missing.
    pub fn vm_mut(&mut self) -> &mut VmSection {
        self.vm.get_or_insert_with(VmSection::default)
    }

    /// Configured log filter, if any
    pub fn log_level(&self) -> Option<&str> {
        self.log.as_ref().and_then(|log| log.level.as_deref())
    }

    /// Module search paths as written in the file
    pub fn search_paths(&self) -> &[PathBuf] {
        self.modules
            .as_ref()
            .map(|modules| modules.search_paths.as_slice())
            .unwrap_or_default()
    }

    /// Merge another project config into this one.
    /// Values set in `other` win, field by field.
    pub fn merge(&mut self, other: &ProjectConfig) {
        if let Some(vm) = &other.vm {
            let ours = self.vm_mut();
            ours.initial_heap_size = vm.initial_heap_size.or(ours.initial_heap_size);
            ours.min_heap_size = vm.min_heap_size.or(ours.min_heap_size);
            ours.heap_growth_percent = vm.heap_growth_percent.or(ours.heap_growth_percent);
            ours.gc_stress = vm.gc_stress.or(ours.gc_stress);
        }
        if let Some(modules) = &other.modules {
            let ours = self.modules.get_or_insert_with(ModulesSection::default);
            ours.search_paths.extend(modules.search_paths.iter().cloned());
        }
        if let Some(level) = other.log_level() {
            self.log = Some(LogSection {
                level: Some(level.to_string()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_empty_config() {
        let config = ProjectConfig::parse("").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[vm]
initial_heap_size = 2048
min_heap_size = 1024
heap_growth_percent = 100
gc_stress = true

[modules]
search_paths = ["lib", "/opt/heta"]

[log]
level = "debug"
"#;
        let config = ProjectConfig::parse(toml).unwrap();
        assert!(config.validate().is_ok());

        let vm = config.vm.as_ref().unwrap();
        assert_eq!(vm.initial_heap_size, Some(2048));
        assert_eq!(vm.min_heap_size, Some(1024));
        assert_eq!(vm.heap_growth_percent, Some(100));
        assert_eq!(vm.gc_stress, Some(true));
        assert_eq!(
            config.search_paths(),
            &[PathBuf::from("lib"), PathBuf::from("/opt/heta")]
        );
        assert_eq!(config.log_level(), Some("debug"));
    }

    #[test]
    fn test_zero_growth_rejected() {
        let config = ProjectConfig::parse("[vm]\nheap_growth_percent = 0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "vm.heap_growth_percent"
        ));
    }

    #[test]
    fn test_zero_min_heap_rejected() {
        let config = ProjectConfig::parse("[vm]\nmin_heap_size = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_overrides_field_by_field() {
        let mut base = ProjectConfig::parse("[vm]\nmin_heap_size = 10\ngc_stress = false").unwrap();
        let other = ProjectConfig::parse("[vm]\ngc_stress = true\n[log]\nlevel = \"trace\"").unwrap();

        base.merge(&other);
        let vm = base.vm.as_ref().unwrap();
        assert_eq!(vm.min_heap_size, Some(10));
        assert_eq!(vm.gc_stress, Some(true));
        assert_eq!(base.log_level(), Some("trace"));
    }
}
