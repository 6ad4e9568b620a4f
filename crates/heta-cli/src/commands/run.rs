//! Run command - execute a Heta script file

use crate::config::{init_logging, load_project};
use crate::modules::FileModules;
use crate::report::stderr_reporter;
use anyhow::{Context, Result};
use heta_runtime::{Configuration, InterpretResult, Vm};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Exit code for a compile error (EX_DATAERR).
pub const EXIT_COMPILE_ERROR: u8 = 65;
/// Exit code for a runtime error (EX_SOFTWARE).
pub const EXIT_RUNTIME_ERROR: u8 = 70;

pub struct RunArgs {
    pub file: PathBuf,
    pub gc_stress: bool,
    pub stats: bool,
    pub log: Option<String>,
}

/// Run a script file as the main module.
pub fn run(args: RunArgs) -> Result<ExitCode> {
    execute(args).map(exit_code)
}

fn execute(args: RunArgs) -> Result<InterpretResult> {
    let file = fs::canonicalize(&args.file)
        .with_context(|| format!("Failed to read source file: {}", args.file.display()))?;
    let source = fs::read_to_string(&file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;
    let script_dir = file
        .parent()
        .map(PathBuf::from)
        .context("Script path has no parent directory")?;

    let config = load_project(&script_dir)?;
    init_logging(args.log.as_deref(), &config)?;

    let modules = FileModules::new(&script_dir, config.search_paths());
    let module = modules.module_name(&file);

    let mut vm_config = modules
        .install(Configuration::from_project(&config.project))
        .with_write(|text: &str| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        })
        .with_error(stderr_reporter());
    if args.gc_stress {
        vm_config = vm_config.with_gc_stress(true);
    }

    info!(module = %module, file = %file.display(), "running script");
    let mut vm = Vm::new(vm_config);
    let result = vm.interpret(&module, &source);

    if args.stats {
        let stats = serde_json::to_string_pretty(&vm.gc_stats())?;
        eprintln!("{stats}");
    }

    Ok(result)
}

pub fn exit_code(result: InterpretResult) -> ExitCode {
    match result {
        InterpretResult::Success => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(EXIT_COMPILE_ERROR),
        InterpretResult::RuntimeError => ExitCode::from(EXIT_RUNTIME_ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(file: PathBuf) -> RunArgs {
        RunArgs {
            file,
            gc_stress: false,
            stats: false,
            log: None,
        }
    }

    #[test]
    fn test_run_simple_script() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("main.heta");
        fs::write(&path, "var x = 1 + 2\n").unwrap();

        let result = execute(args(path)).unwrap();
        assert_eq!(result, InterpretResult::Success);
    }

    #[test]
    fn test_run_missing_file() {
        let result = execute(args(PathBuf::from("nonexistent.heta")));
        assert!(result.is_err());
    }

    #[test]
    fn test_runtime_error_result() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("main.heta");
        fs::write(&path, "null.foo\n").unwrap();

        let result = execute(args(path)).unwrap();
        assert_eq!(result, InterpretResult::RuntimeError);
    }

    #[test]
    fn test_compile_error_result() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.heta");
        fs::write(&path, "var = \n").unwrap();

        let result = execute(args(path)).unwrap();
        assert_eq!(result, InterpretResult::CompileError);
    }
}
