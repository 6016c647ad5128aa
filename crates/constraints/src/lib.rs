//! Steward constraints: the manual-judgment gate state machine.
//!
//! A gate starts `PENDING` (created when the gate is first evaluated,
//! upstream of this crate) and moves to `OVERRIDE_PASS` or `OVERRIDE_FAIL`
//! exactly once, on receipt of an external decision event. Both judged states
//! are terminal: a late or duplicated callback is rejected rather than
//! allowed to rewrite who decided, or when.

#![forbid(unsafe_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use steward_core::{ResourceId, StewardError, StewardResult};

pub mod store;

pub use store::SqliteConstraintStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintStatus {
    Pending,
    OverridePass,
    OverrideFail,
}

impl ConstraintStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConstraintStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintStatus::Pending => "PENDING",
            ConstraintStatus::OverridePass => "OVERRIDE_PASS",
            ConstraintStatus::OverrideFail => "OVERRIDE_FAIL",
        }
    }
}

impl std::str::FromStr for ConstraintStatus {
    type Err = StewardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ConstraintStatus::Pending),
            "OVERRIDE_PASS" => Ok(ConstraintStatus::OverridePass),
            "OVERRIDE_FAIL" => Ok(ConstraintStatus::OverrideFail),
            other => Err(StewardError::Validation(format!("unknown constraint status: {other}"))),
        }
    }
}

impl std::fmt::Display for ConstraintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending-or-judged approval gate tied to one resource version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintState {
    pub uid: Uuid,
    pub resource_id: ResourceId,
    /// The artifact/resource version whose promotion this gate blocks.
    pub version: String,
    pub status: ConstraintStatus,
    pub created_at: DateTime<Utc>,
    pub judged_by: Option<String>,
    pub judged_at: Option<DateTime<Utc>>,
}

impl ConstraintState {
    pub fn pending(uid: Uuid, resource_id: ResourceId, version: impl Into<String>) -> Self {
        Self {
            uid,
            resource_id,
            version: version.into(),
            status: ConstraintStatus::Pending,
            created_at: Utc::now(),
            judged_by: None,
            judged_at: None,
        }
    }
}

/// Persistence collaborator. `store` is a full-row overwrite, atomic per
/// call; per-uid write serialization is the store's concern, not this
/// machine's.
pub trait ConstraintStore: Send + Sync {
    fn get_by_uid(&self, uid: Uuid) -> anyhow::Result<Option<ConstraintState>>;
    fn store(&self, state: &ConstraintState) -> anyhow::Result<()>;
}

/// Identity collaborator: resolves a provider user id to a stable email.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_email(&self, user_id: &str) -> anyhow::Result<String>;
}

/// A decision as delivered by the notification provider's callback, already
/// stripped of provider payload details (see the notify crate's adapter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub constraint_uid: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub decision: ConstraintStatus,
}

/// Applies decision events to persisted gates.
pub struct ConstraintMachine {
    store: Arc<dyn ConstraintStore>,
    identity: Arc<dyn IdentityResolver>,
}

impl ConstraintMachine {
    pub fn new(store: Arc<dyn ConstraintStore>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self { store, identity }
    }

    /// Transition one gate on an inbound decision.
    ///
    /// An unknown uid is fatal for the event and writes nothing. A gate that
    /// is already terminal rejects the event with a conflict. On success the
    /// successor state is persisted by full overwrite and returned.
    pub async fn apply_decision(&self, event: &DecisionEvent) -> StewardResult<ConstraintState> {
        if !event.decision.is_terminal() {
            return Err(StewardError::Validation(format!(
                "decision for constraint {} is not a judgment: {}",
                event.constraint_uid, event.decision
            )));
        }
        let prior = self
            .store
            .get_by_uid(event.constraint_uid)
            .map_err(StewardError::from)?
            .ok_or_else(|| {
                StewardError::NotFound(format!("constraint {} not found", event.constraint_uid))
            })?;
        if prior.status.is_terminal() {
            counter!("constraint_rejudge_rejected_total", 1u64);
            return Err(StewardError::Conflict(format!(
                "constraint {} already judged {}",
                prior.uid, prior.status
            )));
        }

        let judged_by = self
            .identity
            .resolve_email(&event.user_id)
            .await
            .map_err(StewardError::from)?;
        let next = ConstraintState {
            status: event.decision,
            judged_by: Some(judged_by),
            judged_at: Some(Utc::now()),
            ..prior
        };
        self.store.store(&next).map_err(StewardError::from)?;
        counter!("constraint_judged_total", 1u64);
        info!(
            uid = %next.uid,
            status = %next.status,
            judged_by = %next.judged_by.as_deref().unwrap_or("-"),
            "constraint: judged"
        );
        Ok(next)
    }
}
