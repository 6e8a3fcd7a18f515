//! Entry commands - cat, put, touch, rm

use super::{mode, CommandContext};
use crate::cache::{EntryState, WriteOutcome};
use crate::cli::args::{EntryArgs, PutArgs};
use crate::error::{CacheError, CacheResult};
use crate::ui::{self, format_bytes};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Print a complete entry to stdout
pub async fn cat(args: EntryArgs, ctx: &CommandContext) -> CacheResult<()> {
    let path = ctx.resolve(&args.path);
    let mode = mode(args.no_wait);

    let data = ctx
        .blocking("Waiting for entry lock", move |store| {
            let lock = store.locker().acquire(&path, mode)?;
            let data = store.read_entry(&lock)?;
            lock.release(false)?;
            Ok(data)
        })
        .await?;

    let mut stdout = tokio::io::stdout();
    let written = async {
        stdout.write_all(&data.bytes).await?;
        stdout.flush().await
    }
    .await;
    written.map_err(|e| CacheError::Io {
        context: "writing entry to stdout".to_string(),
        source: e,
    })
}

/// Write an entry from a file or stdin and mark it done
pub async fn put(args: PutArgs, ctx: &CommandContext) -> CacheResult<()> {
    let content = match &args.file {
        Some(file) => tokio::fs::read(file)
            .await
            .map_err(|e| CacheError::io("reading", file, e))?,
        None => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .map_err(|e| CacheError::Io {
                    context: "reading entry from stdin".to_string(),
                    source: e,
                })?;
            buf
        }
    };

    let path = ctx.resolve(&args.entry.path);
    let shown = path.display().to_string();
    let size = content.len() as u64;
    let mode = mode(args.entry.no_wait);
    let (append, skip) = (args.append, args.skip_identical);
    debug!("Writing {} bytes to {}", size, shown);

    let outcome = ctx
        .blocking("Waiting for entry lock", move |store| {
            let lock = store.locker().acquire(&path, mode)?;
            let outcome = store.write_entry(&lock, &content, append, skip)?;
            lock.release(true)?;
            Ok(outcome)
        })
        .await?;

    let verb = match outcome {
        WriteOutcome::Written => "Wrote",
        WriteOutcome::Appended => "Appended to",
        WriteOutcome::Skipped => "Unchanged",
    };
    ui::step_ok_detail(&ctx.ui, &format!("{} {}", verb, shown), &format_bytes(size));
    Ok(())
}

/// Create an empty entry if none exists
pub async fn touch(args: EntryArgs, ctx: &CommandContext) -> CacheResult<()> {
    let path = ctx.resolve(&args.path);
    let shown = path.display().to_string();
    let mode = mode(args.no_wait);

    let created = ctx
        .blocking("Waiting for entry lock", move |store| {
            let lock = store.locker().acquire(&path, mode)?;
            let created = lock.entry_state()? == EntryState::Missing;
            store.touch_entry(&lock)?;
            lock.release(created)?;
            Ok(created)
        })
        .await?;

    if created {
        ui::step_ok_detail(&ctx.ui, &format!("Created {}", shown), "empty");
    } else {
        ui::step_ok(&ctx.ui, &format!("{} already exists", shown));
    }
    Ok(())
}

/// Remove an entry with its done marker and lock
pub async fn rm(args: EntryArgs, ctx: &CommandContext) -> CacheResult<()> {
    let path = ctx.resolve(&args.path);
    let shown = path.display().to_string();
    let mode = mode(args.no_wait);

    ctx.blocking("Waiting for entry lock", move |store| store.remove_path(&path, mode))
        .await?;

    ui::step_ok(&ctx.ui, &format!("Removed {}", shown));
    Ok(())
}
