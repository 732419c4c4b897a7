//! CLI command handlers, one file per command.

mod check;
mod checksum;
mod diff;
mod engine;
mod status;
mod update;

pub use check::run_check;
pub use checksum::run_checksum;
pub use diff::run_diff;
pub use status::run_status;
pub use update::{run_update, UpdateArgs};
