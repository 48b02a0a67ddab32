//! Outputs commands - import, show and list recorded stack outputs

use console::style;
use std::path::Path;
use stratus_core::StackId;
use stratus_state::{StateStore, parse_outputs};
use tracing::warn;

use super::{OutputFormat, StateArgs, print_document};
use crate::display::pluralize;
use crate::error::{CliError, Result};

/// Record outputs exported by the provisioning engine
pub async fn import(stack: &StackId, file: &Path, state: &StateArgs) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| CliError::io_at(e, file))?;
    let outputs = parse_outputs(stack.kind, &content)?;

    let missing: Vec<&str> = stack
        .kind
        .required_outputs()
        .iter()
        .copied()
        .filter(|key| !outputs.contains(key))
        .collect();
    if !missing.is_empty() {
        warn!(stack = %stack, missing = ?missing, "imported outputs are incomplete");
        eprintln!(
            "{} missing {}: {}",
            style("⚠").yellow(),
            if missing.len() == 1 { "output" } else { "outputs" },
            missing.join(", ")
        );
    }

    let store = state.open().await?;
    store.put_outputs(stack, &outputs).await?;
    println!(
        "{} Imported {} for stack {}",
        style("✓").green().bold(),
        pluralize(outputs.len(), "output", "outputs"),
        style(stack).cyan()
    );
    Ok(())
}

/// Print recorded outputs, secrets masked unless asked
pub async fn show(
    stack: &StackId,
    state: &StateArgs,
    format: OutputFormat,
    show_secrets: bool,
) -> Result<()> {
    let store = state.open().await?;
    let outputs = store.get_outputs(stack).await?;

    let document = if show_secrets {
        serde_json::to_value(&outputs)?
    } else {
        outputs.masked()
    };
    print_document(&format.to_string_pretty(&document)?);
    Ok(())
}

/// List recorded stacks
pub async fn list(environment: Option<&str>, state: &StateArgs) -> Result<()> {
    let store = state.open().await?;
    let records = store.list(environment).await?;

    if records.is_empty() {
        println!("No recorded stacks");
        return Ok(());
    }

    println!("{:<16} {:<10} {:<8} REVISION", "STACK", "PROJECT", "OUTPUTS");
    for record in records {
        println!(
            "{:<16} {:<10} {:<8} {}",
            record.stack.name(),
            record.stack.kind.project(),
            if record.has_outputs { "yes" } else { "no" },
            record
                .revision
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(())
}
