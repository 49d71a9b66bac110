//! Shared helper functions for CLI commands

use console::style;

use crate::entities::equipment::DueStatus;

/// Format a record id for display, truncating if too long
///
/// ULID-based ids are 29+ characters; sanitized import tags usually fit.
pub fn format_short_id(id: &str) -> String {
    if id.len() > 16 {
        format!("{}...", &id[..13])
    } else {
        id.to_string()
    }
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Escape a string for CSV output
///
/// Handles commas, quotes, and newlines according to RFC 4180.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Styled label for an equipment's due status
pub fn due_status_label(due: Option<DueStatus>) -> String {
    match due {
        Some(DueStatus::Overdue(days)) => style(format!("Vencido ({} dias)", days))
            .red()
            .bold()
            .to_string(),
        Some(DueStatus::DueSoon(days)) => style(format!("Vence em {} dias", days))
            .yellow()
            .to_string(),
        Some(DueStatus::Current) => style("Em dia").green().to_string(),
        None => style("-").dim().to_string(),
    }
}
