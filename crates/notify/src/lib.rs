//! Steward notification rendering.
//!
//! When a gate is judged, the original interactive notification is rewritten:
//! the old content is shown struck through with a decision line appended, so
//! the message is history, not state. Rendering is UX-only: any failure to
//! pick apart the prior message is logged and yields an empty block list,
//! never an error to the caller.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use steward_constraints::{ConstraintState, ConstraintStatus};

pub mod callback;

pub use callback::{decision_event, CallbackAction, CallbackMessage, CallbackUser, DecisionCallback};

/// One display block in an outbound notification, ordered top to bottom.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: String,
    },
    Section {
        markdown: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        accessory: Option<Accessory>,
    },
    Context {
        text: String,
    },
}

/// Secondary element attached to a section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Accessory {
    Image { url: String, alt: String },
    Button { text: String, url: String },
}

/// Markdown strike-through across paragraph breaks: each paragraph gets its
/// own `~` pair, since the markers do not span blank lines.
fn strike(text: &str) -> String {
    format!("~{}~", text.replace("\n\n", "~\n\n~"))
}

/// Decision line appended under the struck-through original, e.g.
/// `@alex hit :white_check_mark: approve on 2026-08-06 14:02:11 UTC`.
pub fn fallback_text(display_name: &str, state: &ConstraintState) -> Result<String> {
    let (action, emoji) = match state.status {
        ConstraintStatus::OverridePass => ("approve", ":white_check_mark:"),
        ConstraintStatus::OverrideFail => ("reject", ":x:"),
        ConstraintStatus::Pending => {
            return Err(anyhow!("constraint {} has not been judged", state.uid))
        }
    };
    let at = state
        .judged_at
        .ok_or_else(|| anyhow!("judged constraint {} is missing its timestamp", state.uid))?;
    Ok(format!(
        "@{} hit {} {} on {}",
        display_name,
        emoji,
        action,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    ))
}

/// Re-render the prior notification for a judged gate.
///
/// Returns the new ordered block list, or an empty list when the prior
/// message does not have the expected shape; the user just misses a visual
/// update in that case.
pub fn render_judged(cb: &DecisionCallback, state: &ConstraintState) -> Vec<Block> {
    match render_inner(cb, state) {
        Ok(blocks) => blocks,
        Err(e) => {
            warn!(uid = %state.uid, error = %e, "notify: could not re-render judged constraint");
            Vec::new()
        }
    }
}

fn render_inner(cb: &DecisionCallback, state: &ConstraintState) -> Result<Vec<Block>> {
    let commit = callback::commit_text(&cb.message)?;
    let (git_text, link) = callback::git_info(&cb.message)?;
    let fallback = fallback_text(&cb.user.name, state)?;
    Ok(vec![
        Block::Header { text: "No longer awaiting manual judgment".into() },
        Block::Section { markdown: strike(&commit), accessory: None },
        Block::Section { markdown: strike(&git_text), accessory: link },
        Block::Context { text: fallback },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use steward_core::ResourceId;
    use uuid::Uuid;

    fn judged(status: ConstraintStatus) -> ConstraintState {
        ConstraintState {
            uid: Uuid::new_v4(),
            resource_id: ResourceId::from_raw("cluster:prod:frontend"),
            version: "v42".into(),
            status,
            created_at: chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            judged_by: Some("alex@example.com".into()),
            judged_at: Some(chrono::Utc.timestamp_opt(1_700_000_600, 0).unwrap()),
        }
    }

    fn prior_message() -> Vec<serde_json::Value> {
        vec![
            serde_json::json!({
                "type": "header",
                "text": { "type": "plain_text", "text": "Awaiting manual judgment" }
            }),
            serde_json::json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": "fix login flow\n\nbump deps" }
            }),
            serde_json::json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": "fnord/api · abc1234" },
                "accessory": {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "See commit" },
                    "url": "https://git.example.com/fnord/api/commit/abc1234"
                }
            }),
        ]
    }

    fn cb() -> DecisionCallback {
        DecisionCallback {
            actions: vec![CallbackAction {
                action_id: format!("{}:OVERRIDE_PASS", Uuid::new_v4()),
                value: "OVERRIDE_PASS".into(),
            }],
            user: CallbackUser { id: "U123".into(), name: "alex".into() },
            message: CallbackMessage { blocks: prior_message() },
        }
    }

    #[test]
    fn fallback_text_maps_statuses_to_action_words() {
        let pass = fallback_text("alex", &judged(ConstraintStatus::OverridePass)).unwrap();
        assert_eq!(pass, "@alex hit :white_check_mark: approve on 2023-11-14 22:23:20 UTC");

        let fail = fallback_text("alex", &judged(ConstraintStatus::OverrideFail)).unwrap();
        assert!(fail.contains(":x: reject on"), "fail={fail}");

        assert!(fallback_text("alex", &judged(ConstraintStatus::Pending)).is_err());
    }

    #[test]
    fn strike_wraps_each_paragraph() {
        assert_eq!(strike("one line"), "~one line~");
        assert_eq!(strike("a\n\nb"), "~a~\n\n~b~");
    }

    #[test]
    fn renders_the_judged_message() {
        let blocks = render_judged(&cb(), &judged(ConstraintStatus::OverridePass));
        assert_eq!(blocks.len(), 4);
        assert_eq!(
            blocks[0],
            Block::Header { text: "No longer awaiting manual judgment".into() }
        );
        assert_eq!(
            blocks[1],
            Block::Section { markdown: "~fix login flow~\n\n~bump deps~".into(), accessory: None }
        );
        match &blocks[2] {
            Block::Section { markdown, accessory } => {
                assert_eq!(markdown, "~fnord/api · abc1234~");
                assert_eq!(
                    accessory,
                    &Some(Accessory::Button {
                        text: "See commit".into(),
                        url: "https://git.example.com/fnord/api/commit/abc1234".into(),
                    })
                );
            }
            other => panic!("expected section, got {:?}", other),
        }
        match &blocks[3] {
            Block::Context { text } => assert!(text.starts_with("@alex hit "), "text={text}"),
            other => panic!("expected context, got {:?}", other),
        }
    }

    #[test]
    fn malformed_prior_message_yields_no_blocks() {
        // Missing git-info section entirely.
        let mut short = cb();
        short.message.blocks.truncate(2);
        assert!(render_judged(&short, &judged(ConstraintStatus::OverridePass)).is_empty());

        // Commit section without text.
        let mut bad = cb();
        bad.message.blocks[1] = serde_json::json!({ "type": "section" });
        assert!(render_judged(&bad, &judged(ConstraintStatus::OverridePass)).is_empty());

        // No blocks at all.
        let mut empty = cb();
        empty.message.blocks.clear();
        assert!(render_judged(&empty, &judged(ConstraintStatus::OverridePass)).is_empty());
    }

    #[test]
    fn block_wire_shape_is_tagged() {
        let v = serde_json::to_value(Block::Header { text: "hi".into() }).unwrap();
        assert_eq!(v, serde_json::json!({ "type": "header", "text": "hi" }));

        let v = serde_json::to_value(Block::Section {
            markdown: "~x~".into(),
            accessory: Some(Accessory::Button { text: "b".into(), url: "u".into() }),
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "type": "section",
                "markdown": "~x~",
                "accessory": { "type": "button", "text": "b", "url": "u" }
            })
        );
    }
}
