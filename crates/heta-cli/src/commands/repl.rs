//! REPL command implementation

use crate::config::{history_path, init_logging, load_project};
use crate::modules::FileModules;
use crate::report::stderr_reporter;
use anyhow::{Context, Result};
use heta_runtime::{Configuration, Vm};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::Write;

/// Module every REPL line runs in.
pub const REPL_MODULE: &str = "repl";

/// Run the interactive REPL
///
/// Each line is interpreted into the `repl` module, so top-level variables
/// and classes persist. If `no_history` is true, history is neither loaded
/// nor saved.
pub fn run(no_history: bool, log: Option<&str>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let config = load_project(&cwd)?;
    init_logging(log, &config)?;

    let modules = FileModules::new(&cwd, config.search_paths());
    let vm_config = modules
        .install(Configuration::from_project(&config.project))
        .with_write(|text: &str| {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        })
        .with_error(stderr_reporter());
    let mut vm = Vm::new(vm_config);

    let mut rl = DefaultEditor::new()?;
    let history = if no_history { None } else { history_path() };
    if let Some(path) = &history {
        let _ = rl.load_history(path); // Missing on first run
    }

    println!("Heta v{} REPL", heta_runtime::VERSION_STRING);
    println!("Type :quit to exit, :help for commands");
    println!();

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let trimmed = line.trim();
                match trimmed {
                    "" => continue,
                    ":quit" | ":q" => break,
                    ":help" | ":h" => {
                        print_help();
                        continue;
                    }
                    ":gc" => {
                        vm.collect_garbage();
                        println!("{}", serde_json::to_string_pretty(&vm.gc_stats())?);
                        continue;
                    }
                    _ => {}
                }

                let _ = rl.add_history_entry(&line);
                // Errors have already gone to stderr through the reporter.
                vm.interpret(REPL_MODULE, &line);
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                println!("Use :quit or :q to exit");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    if let Some(path) = history {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(&path);
    }

    Ok(())
}

fn print_help() {
    println!("Heta REPL Commands:");
    println!("  :quit, :q         Exit the REPL");
    println!("  :help, :h         Show this help message");
    println!("  :gc               Collect garbage and show heap statistics");
    println!();
    println!("Each line runs as Heta code; variables persist between lines.");
    println!("Examples:");
    println!("  > var x = 40");
    println!("  > System.print(x + 2)");
}
