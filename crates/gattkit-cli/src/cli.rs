//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// How values are printed in text output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ValueStyle {
    /// Hex bytes, plus text when the value is printable (default)
    #[default]
    Auto,
    /// Hex bytes only
    Hex,
    /// UTF-8 text, lossily decoded
    Text,
}

/// Reusable session arguments
#[derive(Debug, Clone, Args)]
pub struct SessionArgs {
    /// Peripheral profile (TOML); the built-in demo peripheral is used otherwise
    #[arg(short, long, env = "GATTKIT_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Timeout for opening the session, in seconds
    #[arg(long)]
    pub open_timeout: Option<f64>,

    /// Timeout for each discovery, read and write, in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<f64>,
}

/// Reusable output arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// How values are printed in text output
    #[arg(long, value_enum, default_value = "auto")]
    pub values: ValueStyle,
}

/// Selects one characteristic (and optionally one of its descriptors)
#[derive(Debug, Clone, Args)]
pub struct AttributeArgs {
    /// Service UUID (16-bit short form or full)
    pub service: String,

    /// Characteristic UUID (16-bit short form or full)
    pub characteristic: String,

    /// Descriptor UUID; targets a descriptor of the characteristic instead
    #[arg(short, long)]
    pub descriptor: Option<String>,
}

#[derive(Parser)]
#[command(name = "gattkit")]
#[command(author, version, about = "Explore GATT peripherals through a session engine", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover and print the peripheral's attribute tree
    Explore {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Also read every readable characteristic and every descriptor
        #[arg(long)]
        full: bool,
    },

    /// Read a characteristic or descriptor
    Read {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        target: AttributeArgs,
    },

    /// Write a characteristic or descriptor
    Write {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        target: AttributeArgs,

        /// Value as hex bytes (`01 02`, `0x0102`, `01:02`)
        #[arg(required_unless_present = "text")]
        value: Option<String>,

        /// Value as UTF-8 text instead of hex
        #[arg(long, conflicts_with = "value")]
        text: Option<String>,

        /// Send a write command (no response); characteristics only
        #[arg(long, conflicts_with = "descriptor")]
        without_response: bool,
    },

    /// Subscribe to a characteristic and print every change
    Watch {
        #[command(flatten)]
        session: SessionArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Service UUID
        service: String,

        /// Characteristic UUID
        characteristic: String,

        /// Use indications instead of notifications
        #[arg(long)]
        indicate: bool,

        /// Stop after this many changes (default: every scripted update)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Check a profile without opening a session
    Check {
        /// Profile to check
        profile: PathBuf,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
