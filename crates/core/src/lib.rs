//! Steward core types: resources, kinds, ids, and the structural diff.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use smallvec::SmallVec;
use uuid::Uuid;

pub mod diff;
mod error;

pub use diff::{diff_resolved, DiffSummary, ResolvedDiff};
pub use error::{StewardError, StewardResult};

/// A reconcilable resource kind, addressed as `<apiVersion>/<kind>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResourceKind {
    pub api_version: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { api_version: api_version.into(), kind: kind.into() }
    }

    /// Registry discriminator, e.g. `"ec2/v1/Cluster"` collapses to one string key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.api_version, self.kind)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Deterministic resource address. The same submitted spec always derives the
/// same id; it is the key actuation and in-flight tracking go through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn derive(kind: &ResourceKind, account: &str, name: &str) -> Self {
        Self(format!("{}:{}:{}", kind.kind.to_ascii_lowercase(), account, name))
    }

    /// Rehydrate an id from its stored form.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A desired-state declaration as received from a submitter, before
/// normalization. The spec payload is raw JSON until the bound kind decodes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedResource {
    pub kind: ResourceKind,
    pub name: String,
    pub account: String,
    pub application: String,
    pub spec: Json,
}

/// Metadata attached to a persisted resource by `normalize`.
///
/// `id` is deterministic; `uid` is freshly generated on every normalize call,
/// so re-submitting the same spec produces a new uid over the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub id: ResourceId,
    pub uid: Uuid,
    pub application: String,
    /// Free-form annotation pairs carried alongside the spec.
    pub annotations: SmallVec<[(String, String); 4]>,
}

impl ResourceMetadata {
    pub fn derive(kind: &ResourceKind, submitted: &SubmittedResource) -> Self {
        Self {
            id: ResourceId::derive(kind, &submitted.account, &submitted.name),
            uid: Uuid::new_v4(),
            application: submitted.application.clone(),
            annotations: SmallVec::new(),
        }
    }
}

/// Persisted, addressable wrapper around one kind's spec.
///
/// `S` is the kind-specific spec shape; the erased form used by the registry
/// and dispatcher is [`DynResource`] with a raw JSON spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource<S = Json> {
    pub kind: ResourceKind,
    pub metadata: ResourceMetadata,
    pub spec: S,
}

/// Resource with its spec still in wire form.
pub type DynResource = Resource<Json>;

impl<S> Resource<S> {
    pub fn id(&self) -> &ResourceId {
        &self.metadata.id
    }

    /// Rewrap the same identity around a different spec representation.
    pub fn with_spec<T>(&self, spec: T) -> Resource<T> {
        Resource { kind: self.kind.clone(), metadata: self.metadata.clone(), spec }
    }
}

/// Handle to an in-flight actuation operation against the live system.
/// Completion is observed externally; this core never polls it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// Address of live resources to reverse-engineer a submittable spec from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSource {
    pub account: String,
    pub name: String,
}

pub mod prelude {
    pub use super::{
        diff_resolved, DiffSummary, DynResource, ExportSource, ResolvedDiff, Resource,
        ResourceId, ResourceKind, ResourceMetadata, StewardError, StewardResult,
        SubmittedResource, Task,
    };
}
