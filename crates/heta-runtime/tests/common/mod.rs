//! Shared test utilities
//!
//! A [`Harness`] owns a VM whose output and error callbacks write into
//! shared buffers, so tests can assert on exactly what a script printed and
//! what the host was told.

#![allow(dead_code)]

use heta_runtime::{Configuration, ErrorKind, InterpretResult, Vm};
use std::sync::{Arc, Mutex};

pub use pretty_assertions::assert_eq;

/// One call of the error callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub kind: ErrorKind,
    pub module: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl Report {
    /// The report as the command-line host prints it.
    pub fn render(&self) -> String {
        let module = self.module.as_deref().unwrap_or("?");
        let line = self.line.unwrap_or(0);
        match self.kind {
            ErrorKind::Compile => format!("[{module} line {line}] {}", self.message),
            ErrorKind::Runtime => self.message.clone(),
            ErrorKind::StackTrace => format!("[{module} line {line}] in {}", self.message),
        }
    }
}

pub struct Harness {
    pub vm: Vm,
    output: Arc<Mutex<String>>,
    reports: Arc<Mutex<Vec<Report>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Configuration::new())
    }

    /// Wrap `config`, replacing its write and error callbacks.
    pub fn with_config(config: Configuration) -> Self {
        let output = Arc::new(Mutex::new(String::new()));
        let reports = Arc::new(Mutex::new(Vec::new()));

        let sink = output.clone();
        let errors = reports.clone();
        let config = config
            .with_write(move |text: &str| sink.lock().unwrap().push_str(text))
            .with_error(
                move |kind: ErrorKind, module: Option<&str>, line: Option<u32>, message: &str| {
                    errors.lock().unwrap().push(Report {
                        kind,
                        module: module.map(str::to_string),
                        line,
                        message: message.to_string(),
                    });
                },
            );

        Self {
            vm: Vm::new(config),
            output,
            reports,
        }
    }

    /// Interpret `source` as the module `main`.
    pub fn run(&mut self, source: &str) -> InterpretResult {
        self.vm.interpret("main", source)
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn clear_output(&self) {
        self.output.lock().unwrap().clear();
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    /// Every report rendered on its own line.
    pub fn error_text(&self) -> String {
        self.reports()
            .iter()
            .map(Report::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Run `source` on a fresh VM and return its result and output.
pub fn run(source: &str) -> (InterpretResult, String) {
    let mut harness = Harness::new();
    let result = harness.run(source);
    (result, harness.output())
}

/// Assert that `source` runs successfully and prints `expected`.
pub fn assert_output(source: &str, expected: &str) {
    let mut harness = Harness::new();
    let result = harness.run(source);
    assert_eq!(
        result,
        InterpretResult::Success,
        "script failed:\n{}",
        harness.error_text()
    );
    assert_eq!(harness.output(), expected);
}

/// Assert that `source` fails at runtime with `message`.
pub fn assert_runtime_error(source: &str, message: &str) {
    let mut harness = Harness::new();
    assert_eq!(harness.run(source), InterpretResult::RuntimeError);
    let reports = harness.reports();
    let runtime = reports
        .iter()
        .find(|report| report.kind == ErrorKind::Runtime)
        .expect("no runtime error reported");
    assert_eq!(runtime.message, message);
}
