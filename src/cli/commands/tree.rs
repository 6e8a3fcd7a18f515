//! Directory commands - init and evict

use super::CommandContext;
use crate::cache::{create_tree, remove_tree};
use crate::cli::args::TreeArgs;
use crate::error::CacheResult;
use crate::ui;
use tracing::info;

/// Create a cache directory and any missing parents
pub async fn init(args: TreeArgs, ctx: &CommandContext) -> CacheResult<()> {
    let path = ctx.resolve(&args.path);
    let shown = path.display().to_string();

    ctx.blocking("Creating cache directory", move |_| create_tree(&path))
        .await?;

    ui::step_ok(&ctx.ui, &format!("Cache directory ready at {}", shown));
    Ok(())
}

/// Delete a cache directory tree
pub async fn evict(args: TreeArgs, ctx: &CommandContext) -> CacheResult<()> {
    let path = ctx.resolve(&args.path);
    let shown = path.display().to_string();

    ctx.blocking("Evicting cache tree", move |_| remove_tree(&path))
        .await?;

    info!("Evicted cache tree {}", shown);
    ui::step_ok(&ctx.ui, &format!("Evicted {}", shown));
    Ok(())
}
