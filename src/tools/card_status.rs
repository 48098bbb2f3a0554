//! Dismiss and skip tools for the card a chat is attached to.

use crate::agent::CardContext;
use crate::cards::{Card, CardStore};

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error type for the card status tools.
#[derive(Debug, thiserror::Error)]
pub enum CardStatusError {
    #[error("No card is attached to this conversation; {0} only works from a card chat")]
    NoCardContext(&'static str),

    #[error("Card {0} is no longer active")]
    NotActive(String),
}

/// Both tools take no arguments.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CardStatusArgs {}

/// Output from the card status tools.
#[derive(Debug, Serialize)]
pub struct CardStatusOutput {
    pub success: bool,
    pub card_id: String,
    pub message: String,
}

fn no_arguments() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

fn attached_card<'a>(
    card: Option<&'a CardContext>,
    tool: &'static str,
) -> Result<&'a CardContext, CardStatusError> {
    card.ok_or(CardStatusError::NoCardContext(tool))
}

fn completed(card: Option<Card>, id: &str, verb: &str) -> Result<CardStatusOutput, CardStatusError> {
    let card = card.ok_or_else(|| CardStatusError::NotActive(id.to_string()))?;
    Ok(CardStatusOutput {
        success: true,
        message: format!("Card \"{}\" {verb}.", card.title),
        card_id: card.id,
    })
}

/// Tool for dismissing the attached card.
#[derive(Clone)]
pub struct DismissCardTool {
    cards: Arc<dyn CardStore>,
    card: Option<CardContext>,
}

impl DismissCardTool {
    pub fn new(cards: Arc<dyn CardStore>, card: Option<CardContext>) -> Self {
        Self { cards, card }
    }
}

impl Tool for DismissCardTool {
    const NAME: &'static str = "dismiss_card";

    type Error = CardStatusError;
    type Args = CardStatusArgs;
    type Output = CardStatusOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Dismiss the card this conversation is about once it has been handled \
                or the user no longer needs it."
                .to_string(),
            parameters: no_arguments(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        let card = attached_card(self.card.as_ref(), Self::NAME)?;
        let dismissed = self.cards.dismiss_card(&card.card_id).await;
        completed(dismissed, &card.card_id, "dismissed")
    }
}

/// Tool for skipping the attached card.
#[derive(Clone)]
pub struct SkipCardTool {
    cards: Arc<dyn CardStore>,
    card: Option<CardContext>,
}

impl SkipCardTool {
    pub fn new(cards: Arc<dyn CardStore>, card: Option<CardContext>) -> Self {
        Self { cards, card }
    }
}

impl Tool for SkipCardTool {
    const NAME: &'static str = "skip_card";

    type Error = CardStatusError;
    type Args = CardStatusArgs;
    type Output = CardStatusOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Skip the card this conversation is about when the user wants to deal \
                with it later."
                .to_string(),
            parameters: no_arguments(),
        }
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        let card = attached_card(self.card.as_ref(), Self::NAME)?;
        let skipped = self.cards.skip_card(&card.card_id).await;
        completed(skipped, &card.card_id, "skipped")
    }
}
