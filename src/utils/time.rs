use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;

/// Replaces characters that aren't safe for filenames.
pub fn sanitize_target(target: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9\-_\.]").expect("static regex"));
    re.replace_all(target, "_").to_string()
}

pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Elapsed seconds between two instants, never negative.
pub fn duration_seconds(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    let millis = end.signed_duration_since(start).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
