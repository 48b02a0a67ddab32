//! Validate command - check a stack config without building its graph

use console::style;
use stratus_core::{CoreError, StackConfig};

use super::StackArgs;
use crate::display::display_issues;
use crate::error::{CliError, Result};

pub fn run(stack: &StackArgs, json_output: bool) -> Result<()> {
    let values = stack.values()?;
    let project = stack.stack.project();

    let issues = match StackConfig::from_values(stack.stack, &values) {
        Ok(_) => Vec::new(),
        Err(CoreError::InvalidConfig { issues, .. }) => issues,
        Err(other) => return Err(other.into()),
    };

    if json_output {
        let output = serde_json::json!({
            "valid": issues.is_empty(),
            "stack": project,
            "environment": stack.environment,
            "issues": issues.iter().map(|issue| {
                serde_json::json!({
                    "path": issue.path,
                    "message": issue.message,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if issues.is_empty() {
        println!(
            "{} Config for stack {} is valid",
            style("✓").green().bold(),
            style(stack.stack_id()).cyan()
        );
    } else {
        display_issues(&stack.stack_id().name(), &issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CliError::ValidationFailed {
            stack: project.to_string(),
            count: issues.len(),
        })
    }
}
