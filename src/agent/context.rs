//! Agent profile parsing and system prompt assembly.

use crate::cards::Card;
use crate::memory::PromptSources;

const DEFAULT_AGENT_NAME: &str = "assistant";
const NO_USER_CONTEXT: &str = "(no user context loaded yet)";

/// Parsed `agent.md`.
///
/// The file starts with `key: value` lines, ended by the first blank line or
/// markdown heading. Everything after that line is the persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: String,
    /// `provider/model`, overriding the configured default.
    pub model: Option<String>,
    pub offline_fallback: Option<String>,
    pub persona: String,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            model: None,
            offline_fallback: None,
            persona: String::new(),
        }
    }
}

impl AgentProfile {
    pub fn parse(raw: &str) -> Self {
        let lines: Vec<&str> = raw.lines().collect();
        let mut profile = Self::default();

        let terminator = lines
            .iter()
            .position(|line| line.trim().is_empty() || line.starts_with('#'));
        let header = &lines[..terminator.unwrap_or(lines.len())];

        for line in header {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "name" if !value.is_empty() => profile.name = value.to_string(),
                "model" if !value.is_empty() => profile.model = Some(value.to_string()),
                "offline_fallback" if !value.is_empty() => {
                    profile.offline_fallback = Some(value.to_string())
                }
                _ => {}
            }
        }

        // The terminating line is consumed. Without one, the whole file is
        // also the persona.
        let body_start = terminator.map_or(0, |end| end + 1);
        profile.persona = lines[body_start..].join("\n").trim().to_string();
        profile
    }
}

/// The card a conversation is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContext {
    pub card_id: String,
    pub title: String,
    pub context: String,
}

impl From<&Card> for CardContext {
    fn from(card: &Card) -> Self {
        Self {
            card_id: card.id.clone(),
            title: card.title.clone(),
            context: card.context.clone(),
        }
    }
}

/// Layer the prompt sources into one system prompt.
///
/// Order: persona, global instructions, user context, long-term memory,
/// recent daily log, current card. Empty sources are skipped, except user
/// context which gets a placeholder.
pub fn build_system_prompt(
    profile: &AgentProfile,
    sources: &PromptSources,
    card: Option<&CardContext>,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    if !profile.persona.is_empty() {
        sections.push(profile.persona.clone());
    }
    if let Some(instructions) = non_empty(&sources.global_instructions) {
        sections.push(instructions.to_string());
    }

    let user_context = non_empty(&sources.user_profile).unwrap_or(NO_USER_CONTEXT);
    sections.push(format!("## User Context\n\n{user_context}"));

    if let Some(memory) = non_empty(&sources.long_term_memory) {
        sections.push(format!("## Long-term Memory\n\n{memory}"));
    }
    if let Some(log) = non_empty(&sources.recent_daily_log) {
        sections.push(format!("## Recent Daily Log\n\n{log}"));
    }
    if let Some(card) = card {
        let mut block = format!(
            "## Current Card\n\nThe user is asking about this card (id {}).\n\nTitle: {}",
            card.card_id, card.title
        );
        if !card.context.trim().is_empty() {
            block.push_str(&format!("\nContext: {}", card.context.trim()));
        }
        sections.push(block);
    }

    sections.join("\n\n")
}

fn non_empty(source: &Option<String>) -> Option<&str> {
    source
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}
