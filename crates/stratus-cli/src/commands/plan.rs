//! Plan command - show the waves the provisioning engine will apply

use stratus_engine::Engine;

use super::{StackArgs, StateArgs, prepare};
use crate::display::display_plan;
use crate::error::Result;

pub async fn run(stack: &StackArgs, state: &StateArgs, json_output: bool) -> Result<()> {
    let store = state.open().await?;
    let (ctx, config) = prepare(stack, &store).await?;

    let summary = Engine::default().plan(&ctx, &config)?.summary();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        display_plan(&summary);
    }
    Ok(())
}
