//! Gmail push-hook payloads.

use super::InboundSource;

use serde::{Deserialize, Serialize};

/// Messages described individually in an event; the rest are only counted.
const MAX_DESCRIBED_MESSAGES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: Option<String>,
    pub thread_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub body_truncated: bool,
    pub labels: Vec<String>,
}

/// Body of one Gmail hook delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GmailHookPayload {
    pub source: Option<String>,
    pub account: Option<String>,
    pub history_id: Option<String>,
    pub deleted_message_ids: Vec<String>,
    pub messages: Vec<GmailMessage>,
}

impl GmailHookPayload {
    pub fn account(&self) -> Option<&str> {
        self.account
            .as_deref()
            .map(str::trim)
            .filter(|account| !account.is_empty())
    }
}

/// Groups Gmail deliveries by account.
#[derive(Debug, Clone, Copy, Default)]
pub struct GmailSource;

impl InboundSource for GmailSource {
    type Item = GmailHookPayload;

    fn ingestion_key(&self, item: &GmailHookPayload) -> Option<String> {
        item.account().map(|account| format!("gmail:{account}"))
    }

    fn session_key(&self, ingestion_key: &str) -> String {
        ingestion_key.to_string()
    }

    fn describe(&self, batch: &[GmailHookPayload]) -> String {
        describe_batch(batch)
    }
}

/// Render a batch of deliveries as one event description for the agent.
pub fn describe_batch(batch: &[GmailHookPayload]) -> String {
    let messages: Vec<&GmailMessage> = batch.iter().flat_map(|payload| &payload.messages).collect();

    if messages.is_empty() {
        let history_id = batch
            .iter()
            .rev()
            .find_map(|payload| payload.history_id.as_deref())
            .unwrap_or_default();
        return format!("New Gmail activity (historyId {history_id})");
    }

    let described: Vec<String> = messages
        .iter()
        .take(MAX_DESCRIBED_MESSAGES)
        .map(|message| {
            format!(
                "\"{}\" from {}",
                message.subject.as_deref().unwrap_or("(no subject)"),
                message.from.as_deref().unwrap_or("unknown"),
            )
        })
        .collect();

    format!(
        "New Gmail: {} message(s) — {}",
        messages.len(),
        described.join("; ")
    )
}
