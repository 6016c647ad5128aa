//! Steward actuation dispatcher.
//!
//! Per pass, per resource: apply resolvers, compute desired and current,
//! diff them, and dispatch create/update through the bound handler. Delete is
//! a separate signal and bypasses the diff step. Passes across resources run
//! concurrently on a bounded pool with per-resource fault isolation.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use rustc_hash::FxHashSet;
use serde_json::Value as Json;
use tracing::{info, warn};

use steward_core::{
    diff_resolved, DynResource, ExportSource, ResourceId, StewardResult, SubmittedResource, Task,
};
use steward_registry::{KindRegistry, ResolverPipeline};

fn reconcile_width() -> usize {
    std::env::var("STEWARD_RECONCILE_WIDTH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(8)
        .max(1)
}

/// What a single reconciliation pass did for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Created(Vec<Task>),
    Updated(Vec<Task>),
    /// Desired and current agree; nothing dispatched.
    Unchanged,
    /// A previous actuation is still outstanding; skipped until the next cycle.
    Deferred,
    Deleted(Vec<Task>),
}

impl PassOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Created(_) => "created",
            PassOutcome::Updated(_) => "updated",
            PassOutcome::Unchanged => "unchanged",
            PassOutcome::Deferred => "deferred",
            PassOutcome::Deleted(_) => "deleted",
        }
    }
}

/// Removes the id from the in-flight set when the dispatch section ends.
struct InFlightGuard<'a> {
    set: &'a Mutex<FxHashSet<ResourceId>>,
    id: ResourceId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.id);
    }
}

/// The dispatcher. Holds the kind registry and resolver pipeline, plus a
/// process-local in-flight set so two concurrent passes for the same id
/// cannot both reach actuation.
pub struct Reconciler {
    registry: Arc<KindRegistry>,
    resolvers: Arc<ResolverPipeline>,
    in_flight: Mutex<FxHashSet<ResourceId>>,
    width: usize,
}

impl Reconciler {
    pub fn new(registry: Arc<KindRegistry>, resolvers: Arc<ResolverPipeline>) -> Self {
        Self { registry, resolvers, in_flight: Mutex::new(FxHashSet::default()), width: reconcile_width() }
    }

    /// Override the concurrent fan-out width (default from
    /// `STEWARD_RECONCILE_WIDTH`, 8).
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    /// Normalize a submission through its bound handler.
    pub fn normalize(&self, submitted: &SubmittedResource) -> StewardResult<DynResource> {
        let handler = self.registry.lookup_kind(&submitted.kind)?;
        handler.normalize(submitted)
    }

    fn try_begin(&self, id: &ResourceId) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap();
        if !set.insert(id.clone()) {
            return None;
        }
        Some(InFlightGuard { set: &self.in_flight, id: id.clone() })
    }

    /// One reconciliation pass for one resource.
    pub async fn check_resource(&self, resource: &DynResource) -> StewardResult<PassOutcome> {
        let t0 = Instant::now();
        counter!("reconcile_pass_total", 1u64);
        let handler = self.registry.lookup_kind(&resource.kind)?;

        // Resolvers run strictly before diffing; current reads live state
        // keyed by whatever identifying fields resolution settled on.
        let resolved = self.resolvers.apply(resource.clone())?;
        let desired = handler.desired(&resolved).await?;
        let current = handler.current(&resolved).await?;

        let outcome = match current {
            Some(live) => {
                let diff = diff_resolved(&desired, &live);
                if !diff.has_changes() {
                    info!(id = %resource.id(), "reconcile: no changes");
                    PassOutcome::Unchanged
                } else if handler.actuation_in_progress(resource.id()).await? {
                    info!(id = %resource.id(), "reconcile: actuation still in progress; deferring");
                    PassOutcome::Deferred
                } else {
                    match self.try_begin(resource.id()) {
                        None => {
                            warn!(id = %resource.id(), "reconcile: concurrent pass holds dispatch; deferring");
                            PassOutcome::Deferred
                        }
                        Some(_guard) => {
                            info!(id = %resource.id(), diff = %diff.describe(), "reconcile: update dispatched");
                            PassOutcome::Updated(handler.update(&resolved, &diff).await?)
                        }
                    }
                }
            }
            None => {
                let diff = diff_resolved(&desired, &Json::Null);
                if handler.actuation_in_progress(resource.id()).await? {
                    info!(id = %resource.id(), "reconcile: actuation still in progress; deferring");
                    PassOutcome::Deferred
                } else {
                    match self.try_begin(resource.id()) {
                        None => {
                            warn!(id = %resource.id(), "reconcile: concurrent pass holds dispatch; deferring");
                            PassOutcome::Deferred
                        }
                        Some(_guard) => {
                            info!(id = %resource.id(), "reconcile: create dispatched");
                            PassOutcome::Created(handler.create(&resolved, &diff).await?)
                        }
                    }
                }
            }
        };

        match outcome {
            PassOutcome::Created(_) => counter!("reconcile_create_total", 1u64),
            PassOutcome::Updated(_) => counter!("reconcile_update_total", 1u64),
            PassOutcome::Unchanged => counter!("reconcile_noop_total", 1u64),
            PassOutcome::Deferred => counter!("reconcile_deferred_total", 1u64),
            PassOutcome::Deleted(_) => counter!("reconcile_delete_total", 1u64),
        }
        histogram!("reconcile_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        Ok(outcome)
    }

    /// Teardown for a resource marked for removal. No diff is computed.
    pub async fn delete_resource(&self, resource: &DynResource) -> StewardResult<PassOutcome> {
        let t0 = Instant::now();
        let handler = self.registry.lookup_kind(&resource.kind)?;
        let outcome = match self.try_begin(resource.id()) {
            None => {
                warn!(id = %resource.id(), "reconcile: concurrent pass holds dispatch; deferring delete");
                PassOutcome::Deferred
            }
            Some(_guard) => {
                info!(id = %resource.id(), "reconcile: delete dispatched");
                counter!("reconcile_delete_total", 1u64);
                PassOutcome::Deleted(handler.delete(resource).await?)
            }
        };
        histogram!("reconcile_pass_ms", t0.elapsed().as_secs_f64() * 1000.0);
        Ok(outcome)
    }

    /// Reverse-engineer a submittable spec from live resources of a kind.
    pub async fn export(
        &self,
        api_version: &str,
        kind: &str,
        source: &ExportSource,
    ) -> StewardResult<Json> {
        let handler = self.registry.lookup(api_version, kind)?;
        handler.export(source).await
    }

    /// Run one pass for every resource, at most `width` concurrently. One
    /// resource's failure lands in its own slot and aborts nothing else.
    pub async fn check_all(
        &self,
        resources: &[DynResource],
    ) -> Vec<(ResourceId, StewardResult<PassOutcome>)> {
        let t0 = Instant::now();
        let out: Vec<(ResourceId, StewardResult<PassOutcome>)> = stream::iter(
            resources
                .iter()
                .map(|r| async move { (r.id().clone(), self.check_resource(r).await) }),
        )
        .buffer_unordered(self.width)
        .collect()
        .await;
        let failed = out.iter().filter(|(_, r)| r.is_err()).count();
        info!(
            resources = out.len(),
            failed,
            took_ms = %t0.elapsed().as_millis(),
            "reconcile: batch done"
        );
        out
    }
}
