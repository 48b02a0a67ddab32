//! Render command - evaluate a stack into its resource document

use stratus_engine::Engine;
use stratus_state::StateStore;
use tracing::info;

use super::{OutputFormat, StackArgs, StateArgs, prepare, print_document};
use crate::error::Result;

pub async fn run(
    stack: &StackArgs,
    state: &StateArgs,
    format: OutputFormat,
    show_secrets: bool,
    no_record: bool,
) -> Result<()> {
    let store = state.open().await?;
    let (ctx, config) = prepare(stack, &store).await?;

    let rendered = Engine::default().render(&ctx, &config)?;
    let rendered = if no_record {
        rendered
    } else {
        let stored = store.put_rendered(&rendered).await?;
        info!(stack = %stored.stack, revision = stored.revision, "rendered stack recorded");
        stored
    };

    let document = if show_secrets {
        rendered
    } else {
        rendered.masked()
    };
    print_document(&format.to_string_pretty(&document)?);
    Ok(())
}

