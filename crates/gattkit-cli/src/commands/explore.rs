//! Explore command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

use gattkit_core::DiscoveryMode;

use crate::cli::{OutputFormat, SessionArgs};
use crate::config::Config;
use crate::format::{
    FormatOptions, ServiceReport, format_explore_json, format_explore_text, format_metrics_text,
};
use crate::util::{open_simulation, write_output};

pub async fn cmd_explore(
    args: &SessionArgs,
    config: &Config,
    format: OutputFormat,
    full: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    let sim = open_simulation(args, config).await?;
    let session = &sim.session;
    let mode = if full {
        DiscoveryMode::FullDiscovery
    } else {
        DiscoveryMode::SkipValueDiscovery
    };

    // Start every service before awaiting any; the session runs them in order.
    let services = session.services();
    let mut pending = Vec::with_capacity(services.len());
    for view in &services {
        pending.push(
            view.discover_details_with_mode(mode)
                .with_context(|| format!("Failed to start discovery of {}", view.uuid()))?,
        );
    }
    for (view, discovery) in services.iter().zip(pending) {
        if let Err(e) = discovery.await {
            warn!(service = %view.uuid(), error = %e, "service discovery failed");
        }
    }

    let reports: Vec<ServiceReport> = services.iter().map(ServiceReport::from).collect();
    let metrics = session.metrics();
    let content = match format {
        OutputFormat::Json => format_explore_json(
            session.address(),
            session.mtu(),
            &reports,
            full.then_some(&metrics),
            opts,
        )?,
        OutputFormat::Text => {
            let mut text = format_explore_text(session.address(), session.mtu(), &reports, full, opts);
            if full && !quiet {
                text.push('\n');
                text.push_str(&format_metrics_text(&metrics, opts));
            }
            text
        }
    };
    session.disconnect();
    write_output(output, &content)
}
