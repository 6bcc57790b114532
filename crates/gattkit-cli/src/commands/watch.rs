//! Watch command implementation.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use gattkit_cli::profile::Update;
use gattkit_core::{DiscoveryMode, MockTransport, SessionEvent};

use crate::cli::{OutputFormat, SessionArgs};
use crate::config::Config;
use crate::format::{FormatOptions, ValueReport, format_watch_line};
use crate::util::{detailed_service, find_characteristic, open_simulation, write_output};

pub struct WatchArgs<'a> {
    pub session: &'a SessionArgs,
    pub service: &'a str,
    pub characteristic: &'a str,
    pub indicate: bool,
    pub count: Option<usize>,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
}

/// Push the scripted updates from the peripheral side, in order.
fn play_script(transport: Arc<MockTransport>, updates: Vec<Update>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for update in updates {
            tokio::time::sleep(update.after).await;
            if !transport.notify(update.characteristic, update.value) {
                debug!(characteristic = %update.characteristic, "no listener for scripted update");
            }
        }
    })
}

pub async fn cmd_watch(args: WatchArgs<'_>, config: &Config, opts: &FormatOptions) -> Result<()> {
    let sim = open_simulation(args.session, config).await?;
    let view = detailed_service(&sim.session, args.service, DiscoveryMode::SkipValueDiscovery).await?;
    let characteristic = find_characteristic(&view, args.characteristic)?;

    let updates = sim.profile.updates()?;
    let scripted = updates
        .iter()
        .filter(|u| u.characteristic == characteristic.uuid)
        .count();
    let limit = args.count.or((scripted > 0).then_some(scripted));

    let mut events = view.events()?;
    let enable = if args.indicate {
        view.enable_indications(characteristic.handle)?
    } else {
        view.enable_notifications(characteristic.handle)?
    };
    enable
        .await
        .with_context(|| format!("Failed to subscribe to {}", characteristic.uuid))?;

    if !args.quiet {
        match limit {
            Some(n) => eprintln!("Watching {} for {n} update(s)...", characteristic.uuid),
            None => eprintln!("Watching {} (Ctrl+C to stop)...", characteristic.uuid),
        }
    }

    let player = play_script(sim.transport.clone(), updates);
    let json = args.format == OutputFormat::Json;
    let mut buffered = String::new();
    let mut received = 0usize;

    while limit.is_none_or(|n| received < n) {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            info!("session closed");
            break;
        };
        let SessionEvent::CharacteristicChanged {
            characteristic: handle,
            value,
            ..
        } = event
        else {
            continue;
        };
        if handle != characteristic.handle {
            continue;
        }

        received += 1;
        let report = ValueReport::new(view.uuid(), characteristic.uuid, None, handle, value);
        let line = format_watch_line(received, &report, json, opts)?;
        if args.output.is_some() {
            buffered.push_str(&line);
        } else {
            print!("{line}");
            io::stdout().flush()?;
        }
    }

    player.abort();
    if let Ok(disable) = view.disable_notifications(characteristic.handle) {
        // Best effort; the session is closed right after.
        let _ = disable.await;
    }
    sim.session.disconnect();

    if args.output.is_some() {
        write_output(args.output, &buffered)?;
    }
    Ok(())
}
