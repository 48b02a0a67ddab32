//! Diff command - compare a fresh render with the last recorded revision

use stratus_core::RenderedStack;
use stratus_engine::Engine;
use stratus_state::{DiffEngine, StateError, StateStore};

use super::{StackArgs, StateArgs, prepare};
use crate::display::display_diff;
use crate::error::Result;

pub async fn run(
    stack: &StackArgs,
    state: &StateArgs,
    context_lines: usize,
    json_output: bool,
) -> Result<()> {
    let store = state.open().await?;
    let (ctx, config) = prepare(stack, &store).await?;

    let previous = match store.get_rendered(ctx.stack()).await {
        Ok(previous) => previous,
        Err(StateError::RenderedNotFound { .. }) => RenderedStack::new(ctx.stack().clone()),
        Err(e) => return Err(e.into()),
    };

    let mut current = Engine::default().render(&ctx, &config)?;
    current.revision = previous.revision + 1;

    let engine = DiffEngine::new().with_context(context_lines);
    let result = engine.diff_rendered(&previous, &current)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        display_diff(&engine, &result);
    }
    Ok(())
}
