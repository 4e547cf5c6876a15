//! Resolve command handler

use anyhow::Result;
use colored::*;
use kiln_core::domain::variant::Variant;

use crate::config::Config;

/// Print the build parameters of one variant as `--build-arg` values
pub fn resolve_variant(config: &Config, variant: &str) -> Result<()> {
    let resolver = config.manifest.resolver()?;
    let params = resolver.resolve(&Variant::new(variant))?;

    println!("{}", format!("Build arguments for variant {}:", variant).bold());
    for arg in params.to_build_args() {
        println!("  {}", arg);
    }

    Ok(())
}
