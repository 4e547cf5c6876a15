//! Tags command handler

use anyhow::Result;
use colored::*;
use kiln_core::domain::event::Event;
use kiln_core::domain::variant::Variant;
use kiln_core::gate;

use crate::config::Config;

/// Preview the tag set and publish decision for one variant
pub fn preview_tags(config: &Config, variant: &str, event: &Event) -> Result<()> {
    let variant = Variant::new(variant);
    let resolver = config.manifest.resolver()?;
    if !resolver.contains(&variant) {
        // Surfaces the declared matrix in the error
        resolver.resolve(&variant)?;
    }

    let deriver = config.manifest.deriver();
    let tags = deriver.derive(event, &variant);

    println!(
        "{}",
        format!("Tags for variant {} on {} {}:", variant, event.kind, event.git_ref).bold()
    );
    if tags.is_empty() {
        println!("  {}", "(none)".yellow());
    }
    for tag in tags.iter() {
        println!("  {}:{}", config.manifest.image.dimmed(), tag);
    }

    println!();
    println!(
        "  Latest:  {} (policy {})",
        if deriver.is_canonical(event) { "yes".green() } else { "no".dimmed() },
        deriver.latest_policy()
    );
    println!(
        "  Publish: {}",
        if gate::may_push(event) {
            "allowed".green()
        } else {
            "denied for pull requests".yellow()
        }
    );

    Ok(())
}
