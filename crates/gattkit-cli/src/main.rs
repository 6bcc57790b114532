use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod util;

use cli::{Cli, Commands};
use commands::{WatchArgs, WriteArgs};
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "gattkit", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let no_color = cli.no_color || config.no_color || cli.output.is_some();
    let output = cli.output.as_ref();

    match &cli.command {
        Commands::Explore {
            session,
            output: out,
            full,
        } => {
            let opts = FormatOptions::new(no_color, cli.compact, out.values);
            commands::cmd_explore(session, &config, out.format, *full, output, cli.quiet, &opts)
                .await?;
        }
        Commands::Read {
            session,
            output: out,
            target,
        } => {
            let opts = FormatOptions::new(no_color, cli.compact, out.values);
            commands::cmd_read(session, &config, target, out.format, output, &opts).await?;
        }
        Commands::Write {
            session,
            target,
            value,
            text,
            without_response,
        } => {
            let args = WriteArgs {
                session,
                target,
                value: value.as_deref(),
                text: text.as_deref(),
                without_response: *without_response,
                quiet: cli.quiet,
            };
            commands::cmd_write(args, &config).await?;
        }
        Commands::Watch {
            session,
            output: out,
            service,
            characteristic,
            indicate,
            count,
        } => {
            let opts = FormatOptions::new(no_color, cli.compact, out.values);
            let args = WatchArgs {
                session,
                service,
                characteristic,
                indicate: *indicate,
                count: *count,
                format: out.format,
                output,
                quiet: cli.quiet,
            };
            commands::cmd_watch(args, &config, &opts).await?;
        }
        Commands::Check { profile } => commands::cmd_check(profile, cli.quiet)?,
        Commands::Config { action } => commands::cmd_config(action, &config)?,
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }

    Ok(())
}
