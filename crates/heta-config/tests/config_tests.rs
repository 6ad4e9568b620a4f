//! Configuration loading, validation and precedence tests

use heta_config::{ConfigError, ConfigLoader, ProjectConfig, CONFIG_FILE_NAME};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

/// Run `f` with `vars` set, removing them afterwards even if `f` panics.
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    struct Reset<'a>(Vec<&'a str>);
    impl Drop for Reset<'_> {
        fn drop(&mut self) {
            for name in &self.0 {
                env::remove_var(name);
            }
        }
    }

    let _reset = Reset(vars.iter().map(|(name, _)| *name).collect());
    for (name, value) in vars {
        env::set_var(name, value);
    }
    f()
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_project_config_basic() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[vm]\nmin_heap_size = 4096\n");

    let config = ConfigLoader::without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(config.is_project());
    assert_eq!(config.project.vm.unwrap().min_heap_size, Some(4096));
}

#[test]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let config = ConfigLoader::without_env()
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert!(!config.is_project());
    assert_eq!(config.project, ProjectConfig::default());
    assert_eq!(config.log_level(), "warn");
}

#[test]
fn test_load_from_nested_subdirectory_finds_nearest() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "[log]\nlevel = \"outer\"\n");

    let inner = temp_dir.path().join("inner");
    let deep = inner.join("a").join("b");
    fs::create_dir_all(&deep).unwrap();
    create_config_file(&inner, "[log]\nlevel = \"inner\"\n");

    let config = ConfigLoader::without_env().load_from_directory(&deep).unwrap();
    assert_eq!(config.project_root(), Some(inner.as_path()));
    assert_eq!(config.log_level(), "inner");
}

#[test]
fn test_load_from_specific_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[vm]\ngc_stress = true\n");

    let config = ConfigLoader::without_env().load_from_file(&path).unwrap();
    assert_eq!(config.project_root(), Some(temp_dir.path()));
    assert_eq!(config.project.vm.unwrap().gc_stress, Some(true));
}

#[test]
fn test_missing_file_is_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(CONFIG_FILE_NAME);

    let result = ConfigLoader::without_env().load_from_file(&path);
    assert!(matches!(result, Err(ConfigError::NotFound(p)) if p == path));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_invalid_toml_names_the_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[vm\nmin_heap_size = 1");

    let error = ConfigLoader::without_env().load_from_file(&path).unwrap_err();
    match &error {
        ConfigError::TomlParseError { file, .. } => assert_eq!(file, &path),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(error.to_string().contains(CONFIG_FILE_NAME));
}

#[rstest]
#[case::top_level("[package]\nname = \"x\"\n")]
#[case::vm_field("[vm]\nheap_size = 1\n")]
#[case::modules_field("[modules]\npaths = []\n")]
#[case::log_field("[log]\nformat = \"json\"\n")]
fn test_unknown_fields_rejected(#[case] content: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    let result = ConfigLoader::without_env().load_from_file(&path);
    assert!(matches!(result, Err(ConfigError::TomlParseError { .. })));
}

#[rstest]
#[case::zero_growth("[vm]\nheap_growth_percent = 0\n", "vm.heap_growth_percent")]
#[case::zero_min_heap("[vm]\nmin_heap_size = 0\n", "vm.min_heap_size")]
#[case::empty_log_level("[log]\nlevel = \" \"\n", "log.level")]
fn test_invalid_values_rejected(#[case] content: &str, #[case] expected_field: &str) {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), content);

    match ConfigLoader::without_env().load_from_file(&path) {
        Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, expected_field),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_negative_sizes_do_not_parse() {
    assert!(ProjectConfig::parse("[vm]\nmin_heap_size = -1\n").is_err());
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
#[serial]
fn test_env_overrides_win_over_file() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        "[vm]\nheap_growth_percent = 50\nmin_heap_size = 1024\n[log]\nlevel = \"info\"\n",
    );

    let config = with_env(
        &[
            ("HETA_HEAP_GROWTH_PERCENT", "200"),
            ("HETA_INITIAL_HEAP_SIZE", "65536"),
            ("HETA_LOG", "heta_runtime=trace"),
        ],
        || ConfigLoader::new().load_from_directory(temp_dir.path()),
    )
    .unwrap();

    let vm = config.project.vm.clone().unwrap();
    assert_eq!(vm.heap_growth_percent, Some(200));
    assert_eq!(vm.initial_heap_size, Some(65536));
    assert_eq!(vm.min_heap_size, Some(1024));
    assert_eq!(config.log_level(), "heta_runtime=trace");
}

#[rstest]
#[case("true", true)]
#[case("YES", true)]
#[case("1", true)]
#[case("false", false)]
#[case("0", false)]
#[serial]
fn test_env_gc_stress_values(#[case] value: &str, #[case] expected: bool) {
    let temp_dir = TempDir::new().unwrap();
    let config = with_env(&[("HETA_GC_STRESS", value)], || {
        ConfigLoader::new().load_from_directory(temp_dir.path())
    })
    .unwrap();
    assert_eq!(config.project.vm.unwrap().gc_stress, Some(expected));
}

#[test]
#[serial]
fn test_env_override_is_validated() {
    let temp_dir = TempDir::new().unwrap();
    let result = with_env(&[("HETA_HEAP_GROWTH_PERCENT", "0")], || {
        ConfigLoader::new().load_from_directory(temp_dir.path())
    });
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_without_env_ignores_variables() {
    let temp_dir = TempDir::new().unwrap();
    let config = with_env(&[("HETA_LOG", "trace")], || {
        ConfigLoader::without_env().load_from_directory(temp_dir.path())
    })
    .unwrap();
    assert_eq!(config.log_level(), "warn");
}
