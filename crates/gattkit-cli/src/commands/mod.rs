//! Command implementations for the CLI.

mod check;
mod config;
mod explore;
mod read;
mod watch;
mod write;

pub use check::cmd_check;
pub use config::cmd_config;
pub use explore::cmd_explore;
pub use read::cmd_read;
pub use watch::{WatchArgs, cmd_watch};
pub use write::{WriteArgs, cmd_write};
