//! Steward kind registry and resolver pipeline.
//!
//! The registry binds `(apiVersion, kind)` to exactly one erased handler; the
//! binding doubles as the polymorphic decoder for that kind's spec. The
//! resolver pipeline is the ordered set of pure transforms applied to a
//! resource before it is compared against reality.

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use tracing::{debug, info};

use steward_api::DynHandler;
use steward_core::{DynResource, ResourceKind, StewardError, StewardResult};

mod submit;

pub use submit::parse_submitted;

/// Startup-built lookup table from kind key to handler. Immutable once the
/// wiring layer finishes registration.
#[derive(Default)]
pub struct KindRegistry {
    handlers: FxHashMap<String, Arc<dyn DynHandler>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler under its own (apiVersion, kind). A second binding for
    /// the same pair is rejected.
    pub fn register(&mut self, handler: Arc<dyn DynHandler>) -> StewardResult<()> {
        let kind = handler.kind().clone();
        let key = kind.key();
        if self.handlers.contains_key(&key) {
            return Err(StewardError::DuplicateKind {
                api_version: kind.api_version,
                kind: kind.kind,
            });
        }
        info!(kind = %key, "registry: kind bound");
        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Absence of a binding is a first-class failure naming both fields;
    /// no fallback handler is ever tried.
    pub fn lookup(&self, api_version: &str, kind: &str) -> StewardResult<Arc<dyn DynHandler>> {
        self.handlers
            .get(&format!("{}/{}", api_version, kind))
            .cloned()
            .ok_or_else(|| StewardError::UnsupportedKind {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }

    pub fn lookup_kind(&self, kind: &ResourceKind) -> StewardResult<Arc<dyn DynHandler>> {
        self.lookup(&kind.api_version, &kind.kind)
    }

    /// Decode a raw spec through the bound kind's decoder.
    pub fn decode_spec(&self, kind: &ResourceKind, raw: &Json) -> StewardResult<Json> {
        self.lookup_kind(kind)?.decode_spec(raw)
    }

    /// All bound kinds in stable order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut out: Vec<ResourceKind> =
            self.handlers.values().map(|h| h.kind().clone()).collect();
        out.sort_by(|a, b| a.api_version.cmp(&b.api_version).then(a.kind.cmp(&b.kind)));
        out
    }
}

/// A pure transform applied to resources it supports before diffing.
/// Resolution must not touch live infrastructure.
pub trait Resolver: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, resource: &DynResource) -> bool;

    fn resolve(&self, resource: DynResource) -> anyhow::Result<DynResource>;
}

/// Left fold over registered resolvers in registration order. Resolvers whose
/// support predicate does not match are skipped, not invoked.
#[derive(Default)]
pub struct ResolverPipeline {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resolver: Arc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    pub fn apply(&self, resource: DynResource) -> StewardResult<DynResource> {
        let mut current = resource;
        for resolver in &self.resolvers {
            if !resolver.supports(&current) {
                continue;
            }
            debug!(resolver = resolver.name(), id = %current.id(), "registry: resolver applied");
            current = resolver
                .resolve(current)
                .with_context(|| format!("resolver {}", resolver.name()))
                .map_err(StewardError::from)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use steward_api::{HandlerAdapter, ResourceHandler};
    use steward_core::{Resource, ResourceMetadata, SubmittedResource};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct NullSpec {}

    struct NullHandler {
        kind: ResourceKind,
    }

    #[async_trait::async_trait]
    impl ResourceHandler for NullHandler {
        type Spec = NullSpec;
        type Resolved = NullSpec;

        fn kind(&self) -> ResourceKind {
            self.kind.clone()
        }

        async fn to_resolved(
            &self,
            _resource: &Resource<Self::Spec>,
        ) -> StewardResult<Self::Resolved> {
            Ok(NullSpec {})
        }

        async fn current(
            &self,
            _resource: &Resource<Self::Spec>,
        ) -> StewardResult<Option<Self::Resolved>> {
            Ok(None)
        }
    }

    fn handler(api_version: &str, kind: &str) -> Arc<dyn DynHandler> {
        HandlerAdapter::arc(NullHandler { kind: ResourceKind::new(api_version, kind) })
    }

    fn resource(spec: Json) -> DynResource {
        let kind = ResourceKind::new("test/v1", "Widget");
        let sub = SubmittedResource {
            kind: kind.clone(),
            name: "frontend".into(),
            account: "prod".into(),
            application: "fnord".into(),
            spec: spec.clone(),
        };
        Resource { metadata: ResourceMetadata::derive(&kind, &sub), kind, spec }
    }

    #[test]
    fn lookup_returns_the_registered_handler() {
        let mut reg = KindRegistry::new();
        let h = handler("test/v1", "Widget");
        reg.register(h.clone()).unwrap();
        let found = reg.lookup("test/v1", "Widget").unwrap();
        assert!(Arc::ptr_eq(&h, &found));
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut reg = KindRegistry::new();
        reg.register(handler("test/v1", "Widget")).unwrap();
        let err = reg.register(handler("test/v1", "Widget")).unwrap_err();
        assert!(matches!(err, StewardError::DuplicateKind { .. }), "got {err}");
        // A different kind under the same apiVersion is fine.
        reg.register(handler("test/v1", "Gadget")).unwrap();
        assert_eq!(reg.kinds().len(), 2);
    }

    #[test]
    fn missing_binding_names_both_fields() {
        let reg = KindRegistry::new();
        let err = reg.lookup("v1", "Unknown").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("v1"), "msg={msg}");
        assert!(msg.contains("Unknown"), "msg={msg}");
    }

    struct TagResolver {
        name: &'static str,
        only_kind: &'static str,
    }

    impl Resolver for TagResolver {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, resource: &DynResource) -> bool {
            resource.kind.kind == self.only_kind
        }

        fn resolve(&self, mut resource: DynResource) -> anyhow::Result<DynResource> {
            let tags = resource
                .spec
                .as_object_mut()
                .ok_or_else(|| anyhow::anyhow!("spec is not an object"))?
                .entry("applied")
                .or_insert_with(|| Json::Array(Vec::new()));
            tags.as_array_mut().unwrap().push(Json::String(self.name.to_string()));
            Ok(resource)
        }
    }

    #[test]
    fn resolvers_chain_in_registration_order_and_skip_non_matching() {
        let mut pipeline = ResolverPipeline::new();
        pipeline.push(Arc::new(TagResolver { name: "first", only_kind: "Widget" }));
        pipeline.push(Arc::new(TagResolver { name: "never", only_kind: "Gadget" }));
        pipeline.push(Arc::new(TagResolver { name: "second", only_kind: "Widget" }));

        let out = pipeline.apply(resource(serde_json::json!({}))).unwrap();
        assert_eq!(out.spec["applied"], serde_json::json!(["first", "second"]));
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = ResolverPipeline::new();
        let input = resource(serde_json::json!({ "a": 1 }));
        let out = pipeline.apply(input.clone()).unwrap();
        assert_eq!(out.spec, input.spec);
        assert_eq!(out.metadata.uid, input.metadata.uid);
    }
}
