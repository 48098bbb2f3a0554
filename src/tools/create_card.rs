//! Create card tool: surface a decision to the user.

use crate::cards::{CardAction, CardPriority, CardStore, CardType, NewCard};

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_TITLE_CHARS: usize = 120;

/// Tool for surfacing a card in the UI.
#[derive(Clone)]
pub struct CreateCardTool {
    cards: Arc<dyn CardStore>,
}

impl CreateCardTool {
    pub fn new(cards: Arc<dyn CardStore>) -> Self {
        Self { cards }
    }
}

/// Error type for create card tool.
#[derive(Debug, thiserror::Error)]
#[error("Card creation failed: {0}")]
pub struct CreateCardError(String);

/// Arguments for create card tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardArgs {
    #[serde(rename = "type")]
    pub card_type: CardType,
    /// Short, action-oriented title shown in the UI.
    pub title: String,
    /// Supporting context the user needs to make the decision.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub priority: Option<CardPriority>,
    /// Action buttons shown on the card.
    #[serde(default)]
    pub actions: Vec<CardAction>,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
}

/// Output from create card tool.
#[derive(Debug, Serialize)]
pub struct CreateCardOutput {
    pub success: bool,
    pub card_id: String,
    pub message: String,
}

impl Tool for CreateCardTool {
    const NAME: &'static str = "create_card";

    type Error = CreateCardError;
    type Args = CreateCardArgs;
    type Output = CreateCardOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Surface a card to the user in the UI when you need their input or a decision. \
                Use this when the action is ambiguous, high-stakes, or requires explicit approval."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["email", "calendar", "system"]
                    },
                    "title": {
                        "type": "string",
                        "description": "Short, action-oriented title shown in the UI (max ~80 chars)"
                    },
                    "context": {
                        "type": "string",
                        "description": "Supporting context the user needs to make the decision"
                    },
                    "priority": {
                        "type": "string",
                        "enum": ["low", "medium", "high"]
                    },
                    "actions": {
                        "type": "array",
                        "description": "Action buttons shown on the card (2-4 recommended)",
                        "items": {
                            "type": "object",
                            "properties": {
                                "label": {
                                    "type": "string",
                                    "description": "Button label shown to the user"
                                },
                                "action": {
                                    "type": "string",
                                    "description": "Action identifier sent back on click"
                                }
                            },
                            "required": ["label", "action"]
                        }
                    },
                    "sourceType": { "type": "string" },
                    "sourceId": { "type": "string" }
                },
                "required": ["type", "title", "priority", "actions"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let title = args.title.trim();
        if title.is_empty() {
            return Err(CreateCardError("title must not be empty".to_string()));
        }
        let title: String = title.chars().take(MAX_TITLE_CHARS).collect();

        let card = self
            .cards
            .create_card(NewCard {
                card_type: args.card_type,
                title,
                context: args.context,
                priority: args.priority,
                actions: args.actions,
                source_type: args.source_type,
                source_id: args.source_id,
            })
            .await;

        Ok(CreateCardOutput {
            success: true,
            card_id: card.id,
            message: "Card created and surfaced to the user.".to_string(),
        })
    }
}
