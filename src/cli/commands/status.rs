//! Status command - entry state and lock holder

use super::CommandContext;
use crate::cache::{file_size, marker, EntryState, LockStatus};
use crate::cli::args::{OutputFormat, StatusArgs};
use crate::error::CacheResult;
use crate::ui::{self, format_bytes};

/// Execute the status command
pub async fn execute(args: StatusArgs, ctx: &CommandContext) -> CacheResult<()> {
    let path = ctx.resolve(&args.path);
    let probe_path = path.clone();

    // Read-only: no lock is taken, so a busy entry can still be inspected
    let (state, size, done, lock) = ctx
        .blocking("Inspecting entry", move |store| {
            let state = marker::entry_state(&probe_path)?;
            let size = match state {
                EntryState::Missing => None,
                _ => Some(file_size(&probe_path)?),
            };
            let done = marker::read_done(&probe_path)?;
            let lock = store.locker().inspect(&probe_path)?;
            Ok((state, size, done, lock))
        })
        .await?;

    if args.format == OutputFormat::Json {
        let lock_json = match &lock {
            LockStatus::Free => serde_json::json!({ "status": "free" }),
            LockStatus::Held {
                record,
                liveness,
                stale,
            } => serde_json::json!({
                "status": "held",
                "owner": record.owner,
                "lock_id": record.lock_id,
                "acquired_at": record.acquired_at,
                "liveness": liveness.to_string(),
                "stale": stale,
            }),
            LockStatus::Unreadable { stale } => {
                serde_json::json!({ "status": "unreadable", "stale": stale })
            }
        };
        let out = serde_json::json!({
            "path": path,
            "state": state,
            "size": size,
            "done": done,
            "lock": lock_json,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    ui::section(&ctx.ui, &path.display().to_string());
    ui::key_value_status(&ctx.ui, "state", &state.to_string(), state.is_complete());
    if let Some(size) = size {
        ui::key_value(&ctx.ui, "size", &format_bytes(size));
    }
    if let Some(done) = &done {
        ui::key_value(
            &ctx.ui,
            "completed",
            &done.completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
    }

    match lock {
        LockStatus::Free => ui::key_value_status(&ctx.ui, "lock", "free", true),
        LockStatus::Held {
            record,
            liveness,
            stale,
        } => {
            let holder = format!("held by {} ({})", record.owner, liveness);
            ui::key_value_status(&ctx.ui, "lock", &holder, !stale);
            if stale {
                ui::step_warn_hint(
                    &ctx.ui,
                    "Lock owner is gone",
                    "The next acquirer will reclaim it",
                );
            }
        }
        LockStatus::Unreadable { stale } => {
            ui::key_value_status(&ctx.ui, "lock", "unreadable sentinel", false);
            if stale {
                ui::step_warn_hint(
                    &ctx.ui,
                    "Sentinel is past its grace period",
                    "The next acquirer will reclaim it",
                );
            }
        }
    }

    Ok(())
}
