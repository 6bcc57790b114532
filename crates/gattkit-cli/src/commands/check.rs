//! Check command implementation.

use std::path::Path;

use anyhow::Result;

use gattkit_cli::profile::Profile;

pub fn cmd_check(path: &Path, quiet: bool) -> Result<()> {
    let profile = Profile::load(path)?;
    if !quiet {
        let characteristics: usize = profile
            .services
            .iter()
            .map(|s| s.characteristics.len())
            .sum();
        println!(
            "{}: ok ({} services, {} characteristics, {} scripted updates)",
            path.display(),
            profile.services.len(),
            characteristics,
            profile.script.len()
        );
    }
    Ok(())
}
