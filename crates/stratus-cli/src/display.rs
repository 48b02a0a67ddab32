//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Configuration issues grouped by stack
//! - Execution plans
//! - Rendered revision diffs with colored unified diffs

use console::style;
use stratus_core::ValidationIssue;
use stratus_engine::ExecutionPlanSummary;
use stratus_state::{ChangeType, DiffEngine, DiffResult, LineType};

/// Print every configuration issue of a stack
pub fn display_issues(stack: &str, issues: &[ValidationIssue]) {
    println!();
    println!("{}", style(stack).cyan().bold());

    for issue in issues {
        let path_display = if issue.path.is_empty() {
            String::new()
        } else {
            format!(" at {}", style(&issue.path).dim())
        };
        println!("  {} {}{}", style("✗").red(), issue.message, path_display);
    }

    println!();
    println!(
        "{} Validation failed: {}",
        style("✗").red().bold(),
        pluralize(issues.len(), "issue", "issues")
    );
}

/// Print the waves of an execution plan
pub fn display_plan(summary: &ExecutionPlanSummary) {
    println!(
        "{} {} in {}",
        style("Execution plan:").bold(),
        pluralize(summary.total_resources, "resource", "resources"),
        pluralize(summary.total_waves, "wave", "waves")
    );

    for wave in &summary.waves {
        println!();
        println!(
            "  {} ({})",
            style(format!("Wave {}", wave.number)).cyan(),
            pluralize(wave.resource_count, "resource", "resources")
        );
        for resource in &wave.resources {
            println!("    - {}", resource);
        }
    }
}

/// Print a diff between two rendered revisions
pub fn display_diff(engine: &DiffEngine, result: &DiffResult) {
    let header = if result.old_revision == 0 {
        "No recorded revision, showing everything as added".to_string()
    } else {
        format!("Comparing with revision {}", result.old_revision)
    };
    println!("{} {}", style("→").blue(), header);

    for change in &result.changes {
        let marker = match change.change_type {
            ChangeType::Added => style("+").green().bold(),
            ChangeType::Modified => style("~").yellow().bold(),
            ChangeType::Removed => style("-").red().bold(),
        };
        println!();
        println!("{} {}", marker, style(change.display_name()).bold());

        if let Some(diff) = &change.diff {
            for line in &diff.lines {
                match line.line_type {
                    LineType::Added => println!("    {}", style(format!("+ {}", line.content)).green()),
                    LineType::Removed => println!("    {}", style(format!("- {}", line.content)).red()),
                    LineType::Context => println!("    {}", style(format!("  {}", line.content)).dim()),
                }
            }
        }
    }

    if !result.output_changes.is_empty() {
        println!();
        println!("{}", style("Outputs:").bold());
        for output in &result.output_changes {
            let render = |value: &Option<serde_json::Value>| {
                value
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "(none)".to_string())
            };
            println!(
                "  {} {}: {} → {}",
                style(output.change_type).yellow(),
                output.key,
                render(&output.old),
                render(&output.new)
            );
        }
    }

    println!();
    println!("{} {}", style("Summary:").bold(), engine.summary(result));
}

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "wave", "waves"), "1 wave");
        assert_eq!(pluralize(0, "wave", "waves"), "0 waves");
        assert_eq!(pluralize(3, "resource", "resources"), "3 resources");
    }
}
