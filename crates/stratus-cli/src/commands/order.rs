//! Order command - list stacks in apply order

use console::style;
use stratus_core::{StackGraph, StackKind};

use crate::error::Result;

pub fn run(json_output: bool) -> Result<()> {
    let kinds = StackGraph::builtin()
        .order()?
        .iter()
        .map(|name| name.parse::<StackKind>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if json_output {
        let stacks: Vec<serde_json::Value> = kinds
            .iter()
            .map(|kind| {
                serde_json::json!({
                    "stack": kind.project(),
                    "depends_on": dependency_names(*kind),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&stacks)?);
        return Ok(());
    }

    for (i, kind) in kinds.iter().enumerate() {
        let dependencies = dependency_names(*kind);
        if dependencies.is_empty() {
            println!("{}. {}", i + 1, style(kind.project()).cyan());
        } else {
            println!(
                "{}. {} {}",
                i + 1,
                style(kind.project()).cyan(),
                style(format!("(after {})", dependencies.join(", "))).dim()
            );
        }
    }
    Ok(())
}

fn dependency_names(kind: StackKind) -> Vec<&'static str> {
    kind.dependencies().iter().map(|d| d.project()).collect()
}
