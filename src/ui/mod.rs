//! Terminal output for the maintenance CLI
//!
//! Status lines go to stdout; the lock-wait spinner draws on stderr and
//! only in interactive terminals, so `cachelock cat` output stays clean
//! when piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    format_bytes, key_value, key_value_status, section, step_ok, step_ok_detail,
    step_warn_hint,
};
pub use progress::WaitSpinner;
