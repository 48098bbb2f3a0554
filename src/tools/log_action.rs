//! Log action tool: record autonomous actions in the ledger.

use crate::agent::CardContext;
use crate::cards::{ActionKind, CardStore, NewLedgerEntry};

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tool for appending to the action ledger.
#[derive(Clone)]
pub struct LogActionTool {
    cards: Arc<dyn CardStore>,
    card: Option<CardContext>,
}

impl LogActionTool {
    /// With a card attached, every entry references that card.
    pub fn new(cards: Arc<dyn CardStore>, card: Option<CardContext>) -> Self {
        Self { cards, card }
    }
}

/// Error type for log action tool.
#[derive(Debug, thiserror::Error)]
#[error("Failed to log action: {0}")]
pub struct LogActionError(String);

/// Arguments for log action tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogActionArgs {
    pub kind: ActionKind,
    /// One-line description of the action taken.
    pub subject: String,
    /// Source type, e.g. `gmail_event`.
    #[serde(default)]
    pub ref_type: Option<String>,
    /// Source identifier.
    #[serde(default)]
    pub ref_id: Option<String>,
}

/// Output from log action tool.
#[derive(Debug, Serialize)]
pub struct LogActionOutput {
    pub success: bool,
    pub entry_id: String,
    pub ref_type: String,
    pub ref_id: String,
}

impl Tool for LogActionTool {
    const NAME: &'static str = "log_action";

    type Error = LogActionError;
    type Args = LogActionArgs;
    type Output = LogActionOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Record an autonomous action you took to the ledger (visible in the Ledger view). \
                Call this whenever you act on the user's behalf without surfacing a card."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "kind": {
                        "type": "string",
                        "enum": ["auto_archive", "auto_decline", "sync", "ingest", "reminder"]
                    },
                    "subject": {
                        "type": "string",
                        "description": "One-line description of the action taken"
                    },
                    "refType": {
                        "type": "string",
                        "description": "Source type, e.g. 'gmail_event', 'calendar_event'"
                    },
                    "refId": {
                        "type": "string",
                        "description": "Source identifier"
                    }
                },
                "required": ["kind", "subject"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        if args.kind == ActionKind::UserAction {
            return Err(LogActionError(
                "user_action entries are recorded by the UI, not the agent".to_string(),
            ));
        }

        let (ref_type, ref_id) = match &self.card {
            Some(card) => ("card".to_string(), card.card_id.clone()),
            None => (
                args.ref_type.unwrap_or_else(|| "agent".to_string()),
                args.ref_id.unwrap_or_else(|| "none".to_string()),
            ),
        };

        let entry = self
            .cards
            .record_action(NewLedgerEntry {
                kind: args.kind,
                ref_type,
                ref_id,
                details: serde_json::json!({ "subject": args.subject }),
            })
            .await;

        Ok(LogActionOutput {
            success: true,
            entry_id: entry.id,
            ref_type: entry.ref_type,
            ref_id: entry.ref_id,
        })
    }
}
