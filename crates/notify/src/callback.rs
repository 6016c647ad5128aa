//! Adapter over the notification provider's callback payload.
//!
//! Everything that knows the provider's JSON layout lives here, so schema
//! drift on their side stays out of the state machine and the renderer.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

use steward_constraints::{ConstraintStatus, DecisionEvent};
use steward_core::{StewardError, StewardResult};

/// Inbound interactive-callback payload, structurally (not provider-SDK) typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionCallback {
    pub actions: Vec<CallbackAction>,
    pub user: CallbackUser,
    pub message: CallbackMessage,
}

/// One invoked action; `action_id` is `"<constraintUid>:<discriminator>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAction {
    pub action_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackUser {
    pub id: String,
    pub name: String,
}

/// The prior rendered message, kept raw. Block extraction is positional and
/// can fail; only this module is allowed to try.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackMessage {
    pub blocks: Vec<Json>,
}

/// Extract the decision this callback carries.
pub fn decision_event(cb: &DecisionCallback) -> StewardResult<DecisionEvent> {
    let action = cb
        .actions
        .first()
        .ok_or_else(|| StewardError::Validation("callback carries no actions".into()))?;
    let uid_str = action
        .action_id
        .split(':')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            StewardError::Validation(format!("malformed action id: {}", action.action_id))
        })?;
    let constraint_uid = Uuid::parse_str(uid_str).map_err(|e| {
        StewardError::Validation(format!("action id {} has no uid prefix: {}", action.action_id, e))
    })?;
    let decision: ConstraintStatus = action.value.parse()?;
    Ok(DecisionEvent {
        constraint_uid,
        user_id: cb.user.id.clone(),
        user_name: cb.user.name.clone(),
        decision,
    })
}

fn block_text(block: &Json) -> Option<&str> {
    block.get("text").and_then(|t| t.get("text")).and_then(|v| v.as_str())
}

/// Commit summary from its known position in the prior message.
pub(crate) fn commit_text(message: &CallbackMessage) -> Result<String> {
    let block = message.blocks.get(1).ok_or_else(|| anyhow!("prior message has no commit section"))?;
    let text = block_text(block).ok_or_else(|| anyhow!("commit section has no text"))?;
    Ok(text.to_string())
}

/// Git-info text plus its link button, from the section after the commit.
pub(crate) fn git_info(message: &CallbackMessage) -> Result<(String, Option<crate::Accessory>)> {
    let block = message
        .blocks
        .get(2)
        .ok_or_else(|| anyhow!("prior message has no git-info section"))?;
    let text = block_text(block).ok_or_else(|| anyhow!("git-info section has no text"))?;
    let link = match block.get("accessory") {
        None => None,
        Some(acc) => {
            if acc.get("type").and_then(|v| v.as_str()) != Some("button") {
                return Err(anyhow!("git-info accessory is not a button"));
            }
            let label = acc
                .get("text")
                .and_then(|t| t.get("text"))
                .and_then(|v| v.as_str())
                .context("git-info button has no label")?;
            let url = acc
                .get("url")
                .and_then(|v| v.as_str())
                .context("git-info button has no url")?;
            Some(crate::Accessory::Button { text: label.to_string(), url: url.to_string() })
        }
    };
    Ok((text.to_string(), link))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cb(action_id: String, value: &str) -> DecisionCallback {
        DecisionCallback {
            actions: vec![CallbackAction { action_id, value: value.into() }],
            user: CallbackUser { id: "U123".into(), name: "alex".into() },
            message: CallbackMessage { blocks: Vec::new() },
        }
    }

    #[test]
    fn decision_event_parses_uid_prefix_and_value() {
        let uid = Uuid::new_v4();
        let event = decision_event(&cb(format!("{uid}:judgment"), "OVERRIDE_FAIL")).unwrap();
        assert_eq!(event.constraint_uid, uid);
        assert_eq!(event.decision, ConstraintStatus::OverrideFail);
        assert_eq!(event.user_id, "U123");
        assert_eq!(event.user_name, "alex");
    }

    #[test]
    fn decision_event_rejects_malformed_payloads() {
        let mut none = cb("x".into(), "OVERRIDE_PASS");
        none.actions.clear();
        assert!(matches!(decision_event(&none).unwrap_err(), StewardError::Validation(_)));

        let err = decision_event(&cb("not-a-uuid:judgment".into(), "OVERRIDE_PASS")).unwrap_err();
        assert!(matches!(err, StewardError::Validation(_)), "got {err}");

        let uid = Uuid::new_v4();
        let err = decision_event(&cb(format!("{uid}:judgment"), "SHRUG")).unwrap_err();
        assert!(matches!(err, StewardError::Validation(_)), "got {err}");
    }
}
