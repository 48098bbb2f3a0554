//! Memory get tool: read allow-listed memory files.

use crate::memory::MemoryStore;

use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tool for reading memory files.
#[derive(Clone)]
pub struct MemoryGetTool {
    memory: Arc<dyn MemoryStore>,
}

impl MemoryGetTool {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self { memory }
    }
}

/// Error type for memory get tool.
#[derive(Debug, thiserror::Error)]
#[error("Memory read failed: {0}")]
pub struct MemoryGetError(String);

impl From<crate::error::Error> for MemoryGetError {
    fn from(error: crate::error::Error) -> Self {
        MemoryGetError(format!("{error}"))
    }
}

/// Arguments for memory get tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryGetArgs {
    /// `MEMORY.md`, `user.md` or `memory/<name>.md`.
    pub path: String,
    /// First line to return, 1-based.
    #[serde(default)]
    pub from: Option<usize>,
    /// Number of lines to return.
    #[serde(default)]
    pub lines: Option<usize>,
}

/// Output from memory get tool.
#[derive(Debug, Serialize)]
pub struct MemoryGetOutput {
    pub path: String,
    pub text: String,
}

impl Tool for MemoryGetTool {
    const NAME: &'static str = "memory_get";

    type Error = MemoryGetError;
    type Args = MemoryGetArgs;
    type Output = MemoryGetOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: "Read a memory file: MEMORY.md, user.md, or a daily log under memory/. \
                Optionally read only a range of lines."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "MEMORY.md, user.md, or memory/YYYY-MM-DD.md"
                    },
                    "from": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "First line to return (1-based)"
                    },
                    "lines": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Number of lines to return"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let file = self
            .memory
            .read_memory_file(&args.path, args.from, args.lines)
            .await?;
        Ok(MemoryGetOutput {
            path: file.path,
            text: file.text,
        })
    }
}
