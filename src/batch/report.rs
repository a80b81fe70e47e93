//! One-line summaries of batch events for a console.

use std::time::Duration;

use super::{BatchEvent, JobStatus};

/// Summary line for `event`, if it has one.
///
/// Completion lines carry the elapsed time when it exceeds `threshold`.
pub fn describe(event: &BatchEvent, threshold: Duration) -> Option<String> {
    match event {
        BatchEvent::ScriptsLoaded { .. } => None,
        BatchEvent::ScriptStart { script_name, .. } => Some(format!("\u{29bf} '{script_name}' started")),
        BatchEvent::ScriptEnd {
            script_name,
            status,
            total_time,
            ..
        } => {
            let mut line = match status {
                JobStatus::Ok => format!("\u{2713} '{script_name}' completed"),
                JobStatus::Err => format!("\u{2717} '{script_name}' failed"),
            };
            if *total_time > threshold {
                line.push_str(&format!(" ({})", format_elapsed(*total_time)));
            }
            Some(line)
        }
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}
