//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod matrix;
mod replay;
mod report;
mod resolve;
mod run;
mod tags;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use kiln_core::domain::event::{Event, EventKind};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List the declared variants and their build arguments
    Matrix,
    /// Print the build parameters of one variant
    Resolve {
        /// Variant id (e.g. RZ)
        variant: String,
    },
    /// Preview the tags an event produces for a variant
    Tags {
        #[arg(long)]
        variant: String,

        #[command(flatten)]
        event: EventArgs,
    },
    /// Build every variant for an event and publish when allowed
    Run {
        #[command(flatten)]
        event: EventArgs,

        /// Build and tag without pushing
        #[arg(long)]
        dry_run: bool,
    },
    /// Run a stream of events (one JSON object per line) in arrival order
    Replay {
        /// NDJSON file, "-" for stdin
        file: PathBuf,

        /// Build and tag without pushing
        #[arg(long)]
        dry_run: bool,
    },
}

/// Trigger event, defaulting to the GitHub Actions environment
#[derive(Args, Debug, Clone)]
pub struct EventArgs {
    /// Event kind: push, pull_request, schedule or tag
    #[arg(long = "event", env = "GITHUB_EVENT_NAME", default_value = "push")]
    pub kind: String,

    /// Full git ref (e.g. refs/heads/main)
    #[arg(long = "ref", env = "GITHUB_REF")]
    pub git_ref: String,

    /// Source branch of a pull request
    #[arg(long, env = "GITHUB_HEAD_REF")]
    pub head_ref: Option<String>,

    /// Commit SHA
    #[arg(long, env = "GITHUB_SHA")]
    pub sha: String,

    /// Semantic version carried by the event (defaults to the tag ref)
    #[arg(long)]
    pub semver: Option<String>,
}

impl EventArgs {
    /// Builds the event; a push of a tag ref counts as a tag event
    pub fn to_event(&self) -> Result<Event> {
        let mut kind: EventKind = self.kind.parse().map_err(anyhow::Error::msg)?;
        if kind == EventKind::Push && self.git_ref.starts_with("refs/tags/") {
            kind = EventKind::Tag;
        }

        let mut event = Event::new(kind, self.git_ref.trim(), self.sha.trim());
        if let Some(head) = self.head_ref.as_deref().filter(|h| !h.trim().is_empty()) {
            event = event.with_head_ref(head.trim());
        }
        if let Some(version) = self.semver.as_deref().filter(|v| !v.trim().is_empty()) {
            event = event.with_semver_tag(version.trim());
        }

        if event.git_ref.is_empty() {
            anyhow::bail!("event ref cannot be empty");
        }
        if event.commit_sha.is_empty() {
            anyhow::bail!("event commit SHA cannot be empty");
        }

        Ok(event)
    }
}

/// Reads NDJSON events, skipping blank lines
pub fn parse_events(raw: &str) -> Result<Vec<Event>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid event on line {}", idx + 1))
        })
        .collect()
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
///
/// # Returns
/// Process exit code
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Matrix => matrix::show_matrix(config).map(|_| ExitCode::SUCCESS),
        Commands::Resolve { variant } => {
            resolve::resolve_variant(config, &variant).map(|_| ExitCode::SUCCESS)
        }
        Commands::Tags { variant, event } => {
            tags::preview_tags(config, &variant, &event.to_event()?).map(|_| ExitCode::SUCCESS)
        }
        Commands::Run { event, dry_run } => run::run_event(config, event.to_event()?, dry_run).await,
        Commands::Replay { file, dry_run } => replay::replay_events(config, &file, dry_run).await,
    }
}
