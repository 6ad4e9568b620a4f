//! End-to-end tests for the `heta` binary
//!
//! Scripts are written into temporary directories and run as a child
//! process, checking stdout, stderr and the exit code.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn heta_cmd() -> Command {
    let mut cmd = Command::cargo_bin("heta").unwrap();
    for var in ["HETA_LOG", "HETA_GC_STRESS", "HETA_HEAP_GROWTH_PERCENT", "HETA_MIN_HEAP_SIZE", "HETA_INITIAL_HEAP_SIZE"] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

// ══════════════════════════════════════════════════════════════════════════════
// RUN
// ══════════════════════════════════════════════════════════════════════════════

mod run {
    use super::*;

    #[test]
    fn test_prints_script_output() {
        let dir = TempDir::new().unwrap();
        let script = write_file(
            dir.path(),
            "main.heta",
            "var greeting = \"hello\"\nSystem.print(greeting)\nSystem.print(1 + 2)\n",
        );

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .success()
            .stdout("hello\n3\n")
            .stderr("");
    }

    #[test]
    fn test_compile_error_exits_65() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "System.print(1)\nvar = 2\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .code(65)
            .stdout("")
            .stderr(predicate::str::starts_with("[main line 2] Error"));
    }

    #[test]
    fn test_runtime_error_exits_70_with_trace() {
        let dir = TempDir::new().unwrap();
        let script = write_file(
            dir.path(),
            "main.heta",
            r#"class Widget {
  construct new() {}
  spin() { null.wobble }
}
System.print("before")
Widget.new().spin()
System.print("after")
"#,
        );

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .code(70)
            .stdout("before\n")
            .stderr(predicate::str::contains("does not implement 'wobble'."))
            .stderr(predicate::str::contains("[main line 3] in Widget.spin()"))
            .stderr(predicate::str::contains("[main line 6] in (script)"));
    }

    #[test]
    fn test_missing_file_fails() {
        heta_cmd()
            .args(["run", "definitely-missing.heta"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read source file"));
    }

    #[test]
    fn test_alias_r() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "System.print(\"aliased\")\n");

        heta_cmd()
            .arg("r")
            .arg(&script)
            .assert()
            .success()
            .stdout("aliased\n");
    }

    #[test]
    fn test_gc_stress_flag_keeps_output() {
        let dir = TempDir::new().unwrap();
        let script = write_file(
            dir.path(),
            "main.heta",
            "var list = []\nfor (i in 1..50) list.add(\"item %(i)\")\nSystem.print(list[49])\n",
        );

        heta_cmd()
            .arg("run")
            .arg(&script)
            .arg("--gc-stress")
            .assert()
            .success()
            .stdout("item 50\n");
    }

    #[test]
    fn test_stats_prints_json_to_stderr() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "System.gc()\n");

        let output = heta_cmd()
            .arg("run")
            .arg(&script)
            .arg("--stats")
            .output()
            .unwrap();
        assert!(output.status.success());
        assert!(output.stdout.is_empty());

        let stats: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
        assert!(stats["collections"].as_u64().unwrap() >= 1);
        assert!(stats["live_objects"].as_u64().is_some());
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// MODULES
// ══════════════════════════════════════════════════════════════════════════════

mod modules {
    use super::*;

    #[test]
    fn test_relative_imports() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "lib/shapes.heta",
            "import \"./units\" for Unit\nclass Square {\n  static area(side) { side * side * Unit.scale }\n}\n",
        );
        write_file(dir.path(), "lib/units.heta", "class Unit {\n  static scale { 2 }\n}\n");
        let script = write_file(
            dir.path(),
            "app/main.heta",
            "import \"../lib/shapes\" for Square\nSystem.print(Square.area(3))\n",
        );

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .success()
            .stdout("18\n");
    }

    #[test]
    fn test_bare_import_from_script_directory() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "util.heta", "var Answer = 42\nSystem.print(\"loading util\")\n");
        let script = write_file(
            dir.path(),
            "main.heta",
            "import \"util\" for Answer\nimport \"util\"\nSystem.print(Answer)\n",
        );

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .success()
            .stdout("loading util\n42\n");
    }

    #[test]
    fn test_search_paths_from_project_config() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "heta.toml", "[modules]\nsearch_paths = [\"vendor\"]\n");
        write_file(dir.path(), "vendor/colors.heta", "var Red = \"#f00\"\n");
        let script = write_file(
            dir.path(),
            "src/main.heta",
            "import \"colors\" for Red\nSystem.print(Red)\n",
        );

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .success()
            .stdout("#f00\n");
    }

    #[test]
    fn test_missing_module_is_a_runtime_error() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "import \"nowhere\" for Thing\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .code(70)
            .stderr(predicate::str::contains("Could not load module 'nowhere'."));
    }

    #[test]
    fn test_compile_error_in_imported_module_names_it() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "broken.heta", "class {\n");
        let script = write_file(dir.path(), "main.heta", "import \"broken\"\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .code(70)
            .stderr(predicate::str::contains("[broken line 1] Error"))
            .stderr(predicate::str::contains("Could not compile module 'broken'."));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION AND LOGGING
// ══════════════════════════════════════════════════════════════════════════════

mod configuration {
    use super::*;

    #[test]
    fn test_invalid_project_config_fails() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "heta.toml", "[vm]\nheap_growth_percent = 0\n");
        let script = write_file(dir.path(), "main.heta", "System.print(1)\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .failure()
            .stderr(predicate::str::contains("vm.heap_growth_percent"));
    }

    #[test]
    fn test_gc_stress_from_environment() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "System.print([1, 2, 3])\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .arg("--stats")
            .env("HETA_GC_STRESS", "1")
            .assert()
            .success()
            .stdout("[1, 2, 3]\n");
    }

    #[test]
    fn test_log_flag_enables_runtime_events() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "System.gc()\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .args(["--log", "debug"])
            .assert()
            .success()
            .stdout("")
            .stderr(predicate::str::contains("DEBUG"));
    }

    #[test]
    fn test_default_log_level_is_quiet() {
        let dir = TempDir::new().unwrap();
        let script = write_file(dir.path(), "main.heta", "System.gc()\n");

        heta_cmd()
            .arg("run")
            .arg(&script)
            .assert()
            .success()
            .stderr("");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// VERSION AND HELP
// ══════════════════════════════════════════════════════════════════════════════

mod version_and_help {
    use super::*;

    #[test]
    fn test_version_subcommand() {
        heta_cmd()
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("heta 0.1.0 (vm 1000)"));
    }

    #[test]
    fn test_version_flag() {
        heta_cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("0.1.0"));
    }

    #[test]
    fn test_help_lists_commands() {
        heta_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("repl"))
            .stdout(predicate::str::contains("HETA_LOG"));
    }

    #[test]
    fn test_no_subcommand_is_an_error() {
        heta_cmd().assert().failure();
    }
}
