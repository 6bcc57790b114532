//! Write command implementation.

use anyhow::{Context, Result, bail};
use tracing::info;

use gattkit_types::WriteMode;

use crate::cli::{AttributeArgs, SessionArgs};
use crate::config::Config;
use crate::format::hex;
use crate::util::{open_simulation, parse_hex, select};

pub struct WriteArgs<'a> {
    pub session: &'a SessionArgs,
    pub target: &'a AttributeArgs,
    pub value: Option<&'a str>,
    pub text: Option<&'a str>,
    pub without_response: bool,
    pub quiet: bool,
}

pub async fn cmd_write(args: WriteArgs<'_>, config: &Config) -> Result<()> {
    let bytes = match (args.text, args.value) {
        (Some(text), _) => text.as_bytes().to_vec(),
        (None, Some(value)) => parse_hex(value)?,
        (None, None) => bail!("No value to write"),
    };
    let mode = if args.without_response {
        WriteMode::WithoutResponse
    } else {
        WriteMode::WithResponse
    };

    let sim = open_simulation(args.session, config).await?;
    let selected = select(&sim.session, args.target).await?;
    let handle = selected.handle();

    match selected.descriptor {
        Some(descriptor) => selected.view.write_descriptor(descriptor, bytes.clone())?.await,
        None => {
            selected
                .view
                .write_characteristic(handle, bytes.clone(), mode)?
                .await
        }
    }
    .with_context(|| format!("Failed to write {handle}"))?;

    info!(%handle, %mode, len = bytes.len(), "write complete");
    if !args.quiet {
        eprintln!("Wrote {} byte(s) to {}: {}", bytes.len(), handle, hex(&bytes));
    }
    sim.session.disconnect();
    Ok(())
}
