use crate::planner::PlanStatus;
use console::style;
use std::fmt::Display;

/// Green bold: completions, confirmations
pub fn success<D: Display>(text: D) -> String {
    style(text).green().bold().to_string()
}

/// White bold: section headers
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

/// Dim: hints and secondary text
pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

/// Yellow: shell commands, warnings
pub fn yellow<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

/// Red bold: command failures
pub fn failure<D: Display>(text: D) -> String {
    style(text).red().bold().to_string()
}

/// Cyan bold: step ids
pub fn accent<D: Display>(text: D) -> String {
    style(text).cyan().bold().to_string()
}

/// Status label padded to a fixed width, colored by outcome.
pub fn status(status: PlanStatus) -> String {
    let label = format!("{:<9}", status.to_string());
    match status {
        PlanStatus::Pending => dim(label),
        PlanStatus::Completed => style(label).green().to_string(),
        PlanStatus::Failed => style(label).red().to_string(),
        PlanStatus::Abandoned => style(label).yellow().dim().to_string(),
    }
}
