use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod modules;
mod report;

/// Heta scripting language runner.
///
/// Runs Heta scripts on the embeddable Heta VM, or starts an interactive
/// session.
///
/// EXAMPLES:
///     heta run main.heta                 Run a script
///     heta run main.heta --stats         Print GC statistics when done
///     heta run main.heta --log debug     Show runtime log events
///     heta repl                          Start interactive REPL
///
/// ENVIRONMENT VARIABLES:
///     HETA_LOG          Log filter (e.g. 'heta_runtime=debug')
///     HETA_GC_STRESS    Set to '1' to collect before every allocation
///     HETA_NO_HISTORY   Set to '1' to disable REPL history
#[derive(Parser)]
#[command(name = "heta")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Heta source file
    ///
    /// Loads heta.toml from the script's directory or any parent, then
    /// interprets the file as a module. Imports are read from disk.
    ///
    /// Exits with 65 on a compile error and 70 on a runtime error.
    ///
    /// EXAMPLES:
    ///     heta run main.heta
    ///     heta run main.heta --gc-stress
    ///     heta run main.heta --stats --log heta_runtime=debug
    #[command(visible_alias = "r")]
    Run {
        /// Path to the script
        file: PathBuf,
        /// Collect garbage before every allocation
        #[arg(long)]
        gc_stress: bool,
        /// Print GC statistics as JSON to stderr on exit
        #[arg(long)]
        stats: bool,
        /// Log filter directive; overrides HETA_LOG and heta.toml
        #[arg(long, value_name = "FILTER")]
        log: Option<String>,
    },

    /// Start an interactive REPL
    ///
    /// Every line runs in the same module, so variables persist.
    ///
    /// EXAMPLES:
    ///     heta repl
    ///     heta repl --no-history
    Repl {
        /// Don't load or save command history
        #[arg(long, env = "HETA_NO_HISTORY")]
        no_history: bool,
        /// Log filter directive; overrides HETA_LOG and heta.toml
        #[arg(long, value_name = "FILTER")]
        log: Option<String>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            gc_stress,
            stats,
            log,
        } => commands::run::run(commands::run::RunArgs {
            file,
            gc_stress,
            stats,
            log,
        }),
        Commands::Repl { no_history, log } => {
            commands::repl::run(no_history, log.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!(
                "heta {} (vm {})",
                heta_runtime::VERSION_STRING,
                heta_runtime::get_version_number()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["heta", "run", "main.heta", "--gc-stress", "--stats"]);
        match cli.command {
            Commands::Run {
                file,
                gc_stress,
                stats,
                log,
            } => {
                assert_eq!(file, PathBuf::from("main.heta"));
                assert!(gc_stress);
                assert!(stats);
                assert_eq!(log, None);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_log_filter() {
        let cli = Cli::parse_from(["heta", "run", "main.heta", "--log", "heta_runtime=debug"]);
        match cli.command {
            Commands::Run { log, .. } => assert_eq!(log.as_deref(), Some("heta_runtime=debug")),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_alias_r_for_run() {
        let cli = Cli::parse_from(["heta", "r", "main.heta"]);
        assert!(matches!(cli.command, Commands::Run { .. }));
    }

    #[test]
    fn test_repl_no_history_flag() {
        let cli = Cli::parse_from(["heta", "repl", "--no-history"]);
        match cli.command {
            Commands::Repl { no_history, .. } => assert!(no_history),
            _ => panic!("Expected Repl command"),
        }
    }
}
