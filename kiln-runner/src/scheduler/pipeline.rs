//! Pipeline executor
//!
//! Fans one event out over the variant matrix. Each variant runs in its own
//! task through resolve, build, tag derivation, gate and push; a failure in
//! one variant never aborts its siblings.

use kiln_core::domain::event::Event;
use kiln_core::domain::image::BuildDescription;
use kiln_core::domain::run::{RunReport, RunStatus, SkipReason, VariantOutcome, VariantReport};
use kiln_core::domain::variant::Variant;
use kiln_core::error::PipelineError;
use kiln_core::gate;
use kiln_core::resolver::VariantResolver;
use kiln_core::tags::TagDeriver;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::coordinator::{RunCoordinator, RunTicket};
use crate::service::{BuildOutcome, ImageBuilder, Registry, publish};

/// Everything a variant task needs, shared by all runs
pub struct Stages {
    pub resolver: VariantResolver,
    pub deriver: TagDeriver,
    pub description: BuildDescription,
    pub builder: ImageBuilder,
    pub registry: Arc<dyn Registry>,
    /// Build and tag, but never push
    pub dry_run: bool,
}

pub struct PipelineExecutor {
    stages: Arc<Stages>,
    coordinator: Arc<RunCoordinator>,
    semaphore: Arc<Semaphore>,
}

impl PipelineExecutor {
    /// Creates an executor
    ///
    /// # Arguments
    /// * `stages` - Pipeline stages
    /// * `max_parallel_variants` - Max variant tasks running at once, across runs
    pub fn new(stages: Stages, max_parallel_variants: usize) -> Self {
        Self {
            stages: Arc::new(stages),
            coordinator: Arc::new(RunCoordinator::new()),
            semaphore: Arc::new(Semaphore::new(max_parallel_variants.max(1))),
        }
    }

    pub fn coordinator(&self) -> &RunCoordinator {
        &self.coordinator
    }

    /// Runs the pipeline for `event` and waits for the report
    pub async fn run(&self, event: Event) -> RunReport {
        let ticket = self.coordinator.admit(event.run_group());
        self.execute(event, ticket).await
    }

    /// Admits `event` now and runs it in the background
    ///
    /// Admission happens before this returns, so events submitted one after
    /// another supersede each other in submission order.
    pub fn submit(self: &Arc<Self>, event: Event) -> JoinHandle<RunReport> {
        let ticket = self.coordinator.admit(event.run_group());
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.execute(event, ticket).await })
    }

    async fn execute(&self, event: Event, ticket: RunTicket) -> RunReport {
        let started_at = chrono::Utc::now();
        let event = Arc::new(event);

        info!(
            "Run {} started for {} event on {} (commit {})",
            ticket.run_id,
            event.kind,
            event.git_ref,
            event.short_sha(7)
        );

        let handles: Vec<(Variant, JoinHandle<VariantOutcome>)> = self
            .stages
            .resolver
            .variants()
            .cloned()
            .map(|variant| {
                let handle = self.spawn_variant_task(&event, &variant, ticket.token());
                (variant, handle)
            })
            .collect();

        let mut variants = Vec::with_capacity(handles.len());
        for (variant, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Variant {} task ended abnormally: {}", variant, e);
                    VariantOutcome::Failed {
                        error: PipelineError::Internal(e.to_string()),
                    }
                }
            };
            variants.push(VariantReport { variant, outcome });
        }

        let status = RunReport::summarize(&variants);
        self.coordinator.finish(&ticket, status);

        if ticket.is_superseded() && status != RunStatus::Cancelled {
            info!("Run {} was superseded after its pushes began", ticket.run_id);
        }
        info!("Run {} finished: {}", ticket.run_id, status);

        RunReport {
            run_id: ticket.run_id,
            group: ticket.group.clone(),
            status,
            started_at,
            finished_at: chrono::Utc::now(),
            variants,
        }
    }

    fn spawn_variant_task(
        &self,
        event: &Arc<Event>,
        variant: &Variant,
        token: &CancellationToken,
    ) -> JoinHandle<VariantOutcome> {
        let stages = Arc::clone(&self.stages);
        let semaphore = Arc::clone(&self.semaphore);
        let event = Arc::clone(event);
        let variant = variant.clone();
        let token = token.clone();

        tokio::spawn(async move {
            let outcome = run_variant(&stages, &semaphore, &event, &variant, &token).await;
            match &outcome {
                VariantOutcome::Published { tags, .. } => {
                    info!("Variant {}: published {} tag(s)", variant, tags.len())
                }
                VariantOutcome::Built { reason, .. } => {
                    info!("Variant {}: built, not pushed ({})", variant, reason)
                }
                VariantOutcome::Cancelled => info!("Variant {}: cancelled", variant),
                VariantOutcome::Failed { error } => {
                    error!("Variant {}: {} failure: {}", variant, error.kind(), error)
                }
            }
            outcome
        })
    }
}

/// Runs one variant through every stage
///
/// Cancellation is checked before each stage up to the push. Once the push
/// has started it runs to completion.
async fn run_variant(
    stages: &Stages,
    semaphore: &Semaphore,
    event: &Event,
    variant: &Variant,
    token: &CancellationToken,
) -> VariantOutcome {
    if token.is_cancelled() {
        return VariantOutcome::Cancelled;
    }

    let _permit = tokio::select! {
        biased;
        _ = token.cancelled() => return VariantOutcome::Cancelled,
        permit = semaphore.acquire() => match permit {
            Ok(permit) => permit,
            Err(e) => {
                return VariantOutcome::Failed {
                    error: PipelineError::Internal(e.to_string()),
                };
            }
        },
    };

    let params = match stages.resolver.resolve(variant) {
        Ok(params) => params,
        Err(e) => return VariantOutcome::Failed { error: e.into() },
    };

    let image = match stages
        .builder
        .build(variant, &stages.description, &params, token)
        .await
    {
        Ok(BuildOutcome::Built(image)) => image,
        Ok(BuildOutcome::Cancelled) => return VariantOutcome::Cancelled,
        Err(error) => return VariantOutcome::Failed { error },
    };

    let tags = stages.deriver.derive(event, variant);

    // Last point where a superseded run may stop; nothing is published yet
    if token.is_cancelled() {
        return VariantOutcome::Cancelled;
    }

    let reason = if !gate::may_push(event) {
        Some(SkipReason::GateDenied)
    } else if tags.is_empty() {
        warn!("Variant {}: no tags derived for {} event", variant, event.kind);
        Some(SkipReason::NoTags)
    } else if stages.dry_run {
        Some(SkipReason::DryRun)
    } else {
        None
    };

    if let Some(reason) = reason {
        return VariantOutcome::Built { image, tags, reason };
    }

    match publish(stages.registry.as_ref(), &image, &tags).await {
        Ok(()) => VariantOutcome::Published { image, tags },
        Err(failure) => VariantOutcome::Failed {
            error: failure.into(),
        },
    }
}
