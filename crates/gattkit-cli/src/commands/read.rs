//! Read command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::{AttributeArgs, OutputFormat, SessionArgs};
use crate::config::Config;
use crate::format::{FormatOptions, ValueReport, format_read};
use crate::util::{open_simulation, select, write_output};

pub async fn cmd_read(
    args: &SessionArgs,
    config: &Config,
    target: &AttributeArgs,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let sim = open_simulation(args, config).await?;
    let selected = select(&sim.session, target).await?;

    let value = match selected.descriptor {
        Some(descriptor) => selected.view.read_descriptor(descriptor)?.await,
        None => {
            selected
                .view
                .read_characteristic(selected.characteristic.handle)?
                .await
        }
    }
    .with_context(|| format!("Failed to read {}", selected.handle()))?;

    let descriptor_uuid = selected.descriptor.and_then(|handle| {
        selected
            .characteristic
            .descriptors
            .iter()
            .find(|d| d.handle == handle)
            .map(|d| d.uuid)
    });
    let report = ValueReport::new(
        selected.view.uuid(),
        selected.characteristic.uuid,
        descriptor_uuid,
        selected.handle(),
        value,
    );
    sim.session.disconnect();

    let content = format_read(&report, format == OutputFormat::Json, opts)?;
    write_output(output, &content)
}
