//! Steward reconciliation contract.
//!
//! Each resource kind implements [`ResourceHandler`] once: a typed protocol
//! of normalize → resolve desired → fetch current → actuate. The registry and
//! dispatcher work against the object-safe [`DynHandler`] form, which erases
//! the kind-specific spec and resolved-model types behind JSON;
//! [`HandlerAdapter`] bridges the two, carrying the kind's explicit decode
//! function with it.

#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as Json;

use steward_core::{
    DynResource, ExportSource, ResolvedDiff, Resource, ResourceId, ResourceKind,
    ResourceMetadata, StewardError, StewardResult, SubmittedResource, Task,
};

/// The per-kind reconciliation protocol.
///
/// `Spec` is the declared desired configuration; `Resolved` is the diff-able
/// representation computed from either side. The two may differ in shape:
/// `to_resolved` is free to fan out (one spec, N regional models) or follow
/// references, but must never mutate live infrastructure.
///
/// `create` and `update` default to `upsert`; a kind overrides either when
/// creation and update semantics diverge. `upsert`, `delete` and `export`
/// default to a capability-gap error so callers can tell "not implemented"
/// apart from an actuation failure.
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync + 'static {
    type Spec: Serialize + DeserializeOwned + Send + Sync;
    type Resolved: Serialize + Send + Sync;

    fn kind(&self) -> ResourceKind;

    /// Build the persisted-shape resource from a submission. Deterministic id,
    /// fresh uid; resolvers are not consulted here.
    fn normalize(&self, submitted: &SubmittedResource) -> StewardResult<Resource<Self::Spec>> {
        let kind = self.kind();
        if submitted.kind != kind {
            return Err(StewardError::Validation(format!(
                "submitted kind {} does not match handler {}",
                submitted.kind, kind
            )));
        }
        let spec: Self::Spec = serde_json::from_value(submitted.spec.clone()).map_err(|e| {
            StewardError::Validation(format!("decoding {} spec: {}", kind, e))
        })?;
        let metadata = ResourceMetadata::derive(&kind, submitted);
        Ok(Resource { kind, metadata, spec })
    }

    /// Kind-specific desired model. The dispatcher hands in the resource
    /// after the resolver pipeline has run.
    async fn to_resolved(&self, resource: &Resource<Self::Spec>) -> StewardResult<Self::Resolved>;

    /// Read the live state keyed by the identifying fields the resolved model
    /// carries. `None` means the resource does not exist downstream yet.
    async fn current(&self, resource: &Resource<Self::Spec>)
        -> StewardResult<Option<Self::Resolved>>;

    async fn create(
        &self,
        resource: &Resource<Self::Spec>,
        diff: &ResolvedDiff,
    ) -> StewardResult<Vec<Task>> {
        self.upsert(resource, diff).await
    }

    async fn update(
        &self,
        resource: &Resource<Self::Spec>,
        diff: &ResolvedDiff,
    ) -> StewardResult<Vec<Task>> {
        self.upsert(resource, diff).await
    }

    async fn upsert(
        &self,
        _resource: &Resource<Self::Spec>,
        _diff: &ResolvedDiff,
    ) -> StewardResult<Vec<Task>> {
        Err(StewardError::Capability(format!("{}: upsert not implemented", self.kind())))
    }

    async fn delete(&self, _resource: &Resource<Self::Spec>) -> StewardResult<Vec<Task>> {
        Err(StewardError::Capability(format!("{}: delete not implemented", self.kind())))
    }

    /// Reverse-engineer a submittable spec from currently-live resources.
    async fn export(&self, _source: &ExportSource) -> StewardResult<Self::Spec> {
        Err(StewardError::Capability(format!("{}: export not implemented", self.kind())))
    }

    /// Whether a previous actuation for this id is still outstanding.
    /// Kinds that do not track task completion assume idle.
    async fn actuation_in_progress(&self, _id: &ResourceId) -> StewardResult<bool> {
        Ok(false)
    }
}

/// Object-safe form of the contract, erased over JSON. This is what the
/// registry stores and the dispatcher calls; resolved models cross this
/// boundary in their serialized form so the generic diff can compare them
/// without knowing their shape.
#[async_trait::async_trait]
pub trait DynHandler: Send + Sync {
    fn kind(&self) -> &ResourceKind;

    /// Decode a raw spec through this kind's decoder, returning the
    /// canonicalized form (defaults filled in by the typed shape).
    fn decode_spec(&self, raw: &Json) -> StewardResult<Json>;

    fn normalize(&self, submitted: &SubmittedResource) -> StewardResult<DynResource>;

    /// Desired resolved model for a resource the resolver pipeline has
    /// already been applied to.
    async fn desired(&self, resource: &DynResource) -> StewardResult<Json>;

    async fn current(&self, resource: &DynResource) -> StewardResult<Option<Json>>;

    async fn create(&self, resource: &DynResource, diff: &ResolvedDiff)
        -> StewardResult<Vec<Task>>;

    async fn update(&self, resource: &DynResource, diff: &ResolvedDiff)
        -> StewardResult<Vec<Task>>;

    async fn delete(&self, resource: &DynResource) -> StewardResult<Vec<Task>>;

    async fn export(&self, source: &ExportSource) -> StewardResult<Json>;

    async fn actuation_in_progress(&self, id: &ResourceId) -> StewardResult<bool>;
}

impl std::fmt::Debug for dyn DynHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynHandler").field("kind", self.kind()).finish()
    }
}

/// Bridges a typed [`ResourceHandler`] into the erased [`DynHandler`] form.
pub struct HandlerAdapter<H: ResourceHandler> {
    kind: ResourceKind,
    inner: H,
}

impl<H: ResourceHandler> HandlerAdapter<H> {
    pub fn new(inner: H) -> Self {
        Self { kind: inner.kind(), inner }
    }

    pub fn arc(inner: H) -> Arc<dyn DynHandler> {
        Arc::new(Self::new(inner))
    }

    fn typed(&self, resource: &DynResource) -> StewardResult<Resource<H::Spec>> {
        let spec: H::Spec = serde_json::from_value(resource.spec.clone()).map_err(|e| {
            StewardError::Validation(format!(
                "decoding {} spec for {}: {}",
                self.kind,
                resource.id(),
                e
            ))
        })?;
        Ok(resource.with_spec(spec))
    }

    fn to_json<T: Serialize>(&self, value: &T) -> StewardResult<Json> {
        serde_json::to_value(value).map_err(|e| {
            StewardError::Internal(format!("serializing {} resolved model: {}", self.kind, e))
        })
    }
}

#[async_trait::async_trait]
impl<H: ResourceHandler> DynHandler for HandlerAdapter<H> {
    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn decode_spec(&self, raw: &Json) -> StewardResult<Json> {
        let spec: H::Spec = serde_json::from_value(raw.clone()).map_err(|e| {
            StewardError::Validation(format!("decoding {} spec: {}", self.kind, e))
        })?;
        serde_json::to_value(&spec)
            .map_err(|e| StewardError::Internal(format!("re-encoding {} spec: {}", self.kind, e)))
    }

    fn normalize(&self, submitted: &SubmittedResource) -> StewardResult<DynResource> {
        let resource = self.inner.normalize(submitted)?;
        let spec = self.to_json(&resource.spec)?;
        Ok(resource.with_spec(spec))
    }

    async fn desired(&self, resource: &DynResource) -> StewardResult<Json> {
        let typed = self.typed(resource)?;
        let resolved = self.inner.to_resolved(&typed).await?;
        self.to_json(&resolved)
    }

    async fn current(&self, resource: &DynResource) -> StewardResult<Option<Json>> {
        let typed = self.typed(resource)?;
        match self.inner.current(&typed).await? {
            Some(live) => Ok(Some(self.to_json(&live)?)),
            None => Ok(None),
        }
    }

    async fn create(
        &self,
        resource: &DynResource,
        diff: &ResolvedDiff,
    ) -> StewardResult<Vec<Task>> {
        let typed = self.typed(resource)?;
        self.inner.create(&typed, diff).await
    }

    async fn update(
        &self,
        resource: &DynResource,
        diff: &ResolvedDiff,
    ) -> StewardResult<Vec<Task>> {
        let typed = self.typed(resource)?;
        self.inner.update(&typed, diff).await
    }

    async fn delete(&self, resource: &DynResource) -> StewardResult<Vec<Task>> {
        let typed = self.typed(resource)?;
        self.inner.delete(&typed).await
    }

    async fn export(&self, source: &ExportSource) -> StewardResult<Json> {
        let spec = self.inner.export(source).await?;
        self.to_json(&spec)
    }

    async fn actuation_in_progress(&self, id: &ResourceId) -> StewardResult<bool> {
        self.inner.actuation_in_progress(id).await
    }
}
