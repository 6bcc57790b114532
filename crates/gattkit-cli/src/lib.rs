//! Command-line explorer for GATT peripherals.
//!
//! The `gattkit` binary drives a [`gattkit_core::Session`] over a simulated
//! peripheral described by a TOML profile, so every command exercises the
//! same queueing, discovery and event paths a real link would.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `explore` | Discover and print the attribute tree |
//! | `read` | Read a characteristic or descriptor |
//! | `write` | Write a characteristic or descriptor |
//! | `watch` | Subscribe to a characteristic and print each change |
//! | `check` | Validate a profile |
//! | `config` | Manage CLI configuration |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! The CLI reads `~/.config/gattkit/config.toml` (or platform equivalent):
//!
//! - `profile`: Profile used when `--profile` is not given
//! - `no_color`: Disable colored output
//! - `[session]`: Session timeouts in milliseconds and the event buffer size
//!
//! # Environment Variables
//!
//! - `GATTKIT_PROFILE`: Default profile (overridden by `--profile`)
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! Explore the built-in demo peripheral, reading every value:
//! ```bash
//! gattkit explore --full
//! ```
//!
//! Read a characteristic as JSON:
//! ```bash
//! gattkit read 180a 2a29 --format json
//! ```
//!
//! Write text to a characteristic without response:
//! ```bash
//! gattkit write 180a 2a00 --text "kitchen" --without-response
//! ```
//!
//! Watch battery level notifications from a custom profile:
//! ```bash
//! gattkit watch --profile hrm.toml 180f 2a19 -n 5
//! ```

pub mod profile;

// Re-export core dependencies for convenience
pub use gattkit_core;
pub use gattkit_types;
