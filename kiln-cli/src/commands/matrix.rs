//! Matrix command handler

use anyhow::Result;
use colored::*;

use crate::config::Config;

/// List every declared variant with its resolved build arguments
pub fn show_matrix(config: &Config) -> Result<()> {
    let manifest = &config.manifest;
    let resolver = manifest.resolver()?;

    println!(
        "{}",
        format!("Pipeline {} ({} variant(s)):", manifest.image, manifest.variants.len()).bold()
    );
    println!();

    for variant in resolver.variants() {
        let params = resolver.resolve(variant)?;
        println!("  {} {}", "▸".cyan(), variant.as_str().bold());
        for (name, value) in params.iter() {
            println!("    {} = {}", name.dimmed(), value);
        }
    }

    Ok(())
}
