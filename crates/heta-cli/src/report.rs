//! Error callback output
//!
//! Compile errors and stack trace lines are prefixed with their module and
//! line; runtime errors print the bare message.

use heta_runtime::ErrorKind;

/// Format one error callback for stderr.
pub fn format_error(kind: ErrorKind, module: Option<&str>, line: Option<u32>, message: &str) -> String {
    let location = match (module, line) {
        (Some(module), Some(line)) => format!("[{module} line {line}] "),
        _ => String::new(),
    };
    match kind {
        ErrorKind::Compile => format!("{location}{message}"),
        ErrorKind::Runtime => message.to_string(),
        ErrorKind::StackTrace => format!("{location}in {message}"),
    }
}

/// An error reporter printing to stderr.
pub fn stderr_reporter() -> impl FnMut(ErrorKind, Option<&str>, Option<u32>, &str) + Send + 'static {
    |kind, module, line, message| eprintln!("{}", format_error(kind, module, line, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compile_error_has_location() {
        assert_eq!(
            format_error(
                ErrorKind::Compile,
                Some("main"),
                Some(3),
                "Error at '}': Expect expression."
            ),
            "[main line 3] Error at '}': Expect expression."
        );
    }

    #[test]
    fn test_runtime_error_is_bare() {
        assert_eq!(
            format_error(ErrorKind::Runtime, None, None, "Null does not implement 'foo'."),
            "Null does not implement 'foo'."
        );
    }

    #[test]
    fn test_stack_trace_line() {
        assert_eq!(
            format_error(ErrorKind::StackTrace, Some("util"), Some(12), "Stack.pop()"),
            "[util line 12] in Stack.pop()"
        );
    }
}
