//! Error message sanitization for external callers
//!
//! Full errors stay in the daemon log. Callers only ever see a message with
//! absolute paths reduced to their file name, environment variable
//! references masked, and stack frames dropped.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest message handed to a caller
pub const MAX_ERROR_LEN: usize = 500;

static STACK_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s+at\s+\S|\s*\d+:\s+0x[0-9a-f]+|stack backtrace:|Traceback \(most recent)")
        .expect("Invalid stack frame regex")
});

static UNIX_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[\s'"(=\[])/(?:[^\s'"()\[\]:/]+/)*([^\s'"()\[\]:/]*)"#)
        .expect("Invalid unix path regex")
});

static WINDOWS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[\s'"(=\[])[A-Za-z]:\\(?:[^\s'"()\[\]\\]+\\)*([^\s'"()\[\]\\]*)"#)
        .expect("Invalid windows path regex")
});

static ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{[A-Za-z_][A-Za-z0-9_]*\}|\$[A-Za-z_][A-Za-z0-9_]*|%[A-Za-z_][A-Za-z0-9_]*%")
        .expect("Invalid env reference regex")
});

/// Strip internal detail from an error message
pub fn sanitize_error(message: &str) -> String {
    let lines: Vec<String> = message
        .lines()
        .filter(|line| !STACK_FRAME.is_match(line))
        .map(sanitize_line)
        .filter(|line| !line.is_empty())
        .collect();

    let joined = lines.join("\n");
    if joined.is_empty() {
        return "Operation failed".to_string();
    }
    truncate(&joined, MAX_ERROR_LEN)
}

fn sanitize_line(line: &str) -> String {
    let line = UNIX_PATH.replace_all(line, "$1$2");
    let line = WINDOWS_PATH.replace_all(&line, "$1$2");
    let line = ENV_REF.replace_all(&line, "<env>");
    line.trim().to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
