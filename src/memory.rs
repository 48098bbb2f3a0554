//! Markdown memory store: agent profile, user context, long-term memory, daily logs.
//!
//! Contents are opaque text. Mutation is append-only and reads through
//! [`MemoryStore::read_memory_file`] are limited to an allow-list.

use crate::config::Config;
use crate::error::{MemoryError, Result};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt as _;

const AGENT_PROFILE_FILE: &str = "agent.md";
const INSTRUCTIONS_FILE: &str = "AGENTS.md";
const USER_FILE: &str = "user.md";
const MEMORY_FILE: &str = "MEMORY.md";
const DAILY_LOG_DIR: &str = "memory";

/// Raw text sources the system prompt is assembled from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptSources {
    pub agent_profile: Option<String>,
    pub global_instructions: Option<String>,
    pub user_profile: Option<String>,
    pub long_term_memory: Option<String>,
    pub recent_daily_log: Option<String>,
}

/// A (possibly sliced) memory file read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryFile {
    pub path: String,
    pub text: String,
}

/// Context and memory provider consumed by the agent.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load_prompt_sources(&self) -> Result<PromptSources>;

    async fn append_user_context(&self, text: &str) -> Result<()>;

    async fn append_memory(&self, text: &str) -> Result<()>;

    async fn append_daily_log(&self, text: &str) -> Result<()>;

    /// Read an allow-listed memory file. `from` is a 1-based line number and
    /// `count` the number of lines to return from there.
    async fn read_memory_file(
        &self,
        path: &str,
        from: Option<usize>,
        count: Option<usize>,
    ) -> Result<MemoryFile>;
}

/// Check a model-supplied memory path against the allow-list.
///
/// Accepts `MEMORY.md`, `user.md` and `memory/<name>.md`, optionally prefixed
/// with `./`. Returns the normalized relative path.
pub fn validate_memory_path(path: &str) -> std::result::Result<String, MemoryError> {
    let trimmed = path.trim();
    if trimmed.contains('\\')
        || trimmed.contains('\0')
        || trimmed.starts_with('/')
        || trimmed.split('/').any(|segment| segment == "..")
    {
        return Err(MemoryError::Traversal(path.to_string()));
    }

    let normalized = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let allowed = match normalized.split_once('/') {
        None => normalized == MEMORY_FILE || normalized == USER_FILE,
        Some((DAILY_LOG_DIR, name)) => {
            !name.contains('/')
                && name.len() > ".md".len()
                && name.ends_with(".md")
                && !name.starts_with('.')
        }
        Some(_) => false,
    };

    if allowed {
        Ok(normalized.to_string())
    } else {
        Err(MemoryError::NotAllowed(path.to_string()))
    }
}

/// Return `count` lines starting at 1-based line `from`.
fn slice_lines(text: &str, from: Option<usize>, count: Option<usize>) -> String {
    if from.is_none() && count.is_none() {
        return text.to_string();
    }
    let skip = from.unwrap_or(1).saturating_sub(1);
    let lines = text.lines().skip(skip);
    match count {
        Some(count) => lines.take(count).collect::<Vec<_>>().join("\n"),
        None => lines.collect::<Vec<_>>().join("\n"),
    }
}

/// [`MemoryStore`] backed by a directory of markdown files.
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    root: PathBuf,
}

impl FileMemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the configured context directory.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.context_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn daily_log_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(DAILY_LOG_DIR)
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    async fn append(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open {} for append", path.display()))?;
        file.write_all(text.as_bytes())
            .await
            .with_context(|| format!("failed to append to {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("failed to flush {}", path.display()))?;
        Ok(())
    }

    async fn recent_daily_log(&self, today: NaiveDate) -> Option<String> {
        let mut sections = Vec::new();
        for date in [today.pred_opt(), Some(today)].into_iter().flatten() {
            if let Some(text) = load_optional_file(&self.daily_log_path(date)).await {
                sections.push(format!("### {}\n\n{}", date.format("%Y-%m-%d"), text.trim()));
            }
        }
        (!sections.is_empty()).then(|| sections.join("\n\n"))
    }
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    async fn load_prompt_sources(&self) -> Result<PromptSources> {
        let today = Local::now().date_naive();
        Ok(PromptSources {
            agent_profile: load_optional_file(&self.root.join(AGENT_PROFILE_FILE)).await,
            global_instructions: load_optional_file(&self.root.join(INSTRUCTIONS_FILE)).await,
            user_profile: load_optional_file(&self.root.join(USER_FILE)).await,
            long_term_memory: load_optional_file(&self.root.join(MEMORY_FILE)).await,
            recent_daily_log: self.recent_daily_log(today).await,
        })
    }

    async fn append_user_context(&self, text: &str) -> Result<()> {
        let date = Local::now().format("%Y-%m-%d");
        let entry = format!("\n## Observed [{date}]\n\n{}\n", text.trim());
        self.append(&self.root.join(USER_FILE), &entry).await
    }

    async fn append_memory(&self, text: &str) -> Result<()> {
        let entry = format!("\n{}\n", text.trim());
        self.append(&self.root.join(MEMORY_FILE), &entry).await
    }

    async fn append_daily_log(&self, text: &str) -> Result<()> {
        let now = Local::now();
        let entry = format!("- {} {}\n", now.format("%H:%M"), text.trim());
        self.append(&self.daily_log_path(now.date_naive()), &entry)
            .await
    }

    async fn read_memory_file(
        &self,
        path: &str,
        from: Option<usize>,
        count: Option<usize>,
    ) -> Result<MemoryFile> {
        let relative = validate_memory_path(path)?;
        let full_path = self.root.join(&relative);
        let text = match tokio::fs::read_to_string(&full_path).await {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(MemoryError::Io {
                    path: relative,
                    source,
                }
                .into());
            }
        };

        Ok(MemoryFile {
            text: slice_lines(&text, from, count),
            path: relative,
        })
    }
}

/// Read a file, treating a missing or blank file as absent.
async fn load_optional_file(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(%error, path = %path.display(), "failed to read context file");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn allow_list_accepts_known_files() {
        assert_eq!(validate_memory_path("MEMORY.md").ok().as_deref(), Some("MEMORY.md"));
        assert_eq!(validate_memory_path("./user.md").ok().as_deref(), Some("user.md"));
        assert_eq!(
            validate_memory_path("memory/2026-10-15.md").ok().as_deref(),
            Some("memory/2026-10-15.md")
        );
    }

    #[test]
    fn traversal_is_rejected() {
        for path in ["../../etc/passwd", "memory/../secrets.md", "/etc/passwd", "memory\\x.md"] {
            assert!(
                matches!(validate_memory_path(path), Err(MemoryError::Traversal(_))),
                "{path} should be rejected as traversal"
            );
        }
    }

    #[test]
    fn paths_outside_the_allow_list_are_rejected() {
        for path in ["secrets.md", "agent.md", "memory/nested/x.md", "memory/.md", "memory/notes.txt"] {
            assert!(
                matches!(validate_memory_path(path), Err(MemoryError::NotAllowed(_))),
                "{path} should not be readable"
            );
        }
    }

    #[test]
    fn slicing_uses_one_based_lines() {
        let text = "a\nb\nc\nd";
        assert_eq!(slice_lines(text, Some(2), Some(2)), "b\nc");
        assert_eq!(slice_lines(text, Some(3), None), "c\nd");
        assert_eq!(slice_lines(text, None, Some(1)), "a");
        assert_eq!(slice_lines(text, None, None), text);
        assert_eq!(slice_lines(text, Some(10), Some(2)), "");
    }

    #[tokio::test]
    async fn appends_are_readable_through_the_allow_list() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = FileMemoryStore::new(dir.path());

        store
            .append_user_context("Prefers meetings after 10am.")
            .await
            .expect("user context should append");
        store
            .append_memory("Alice is the Q4 planning owner.")
            .await
            .expect("memory should append");

        let user = store
            .read_memory_file("user.md", None, None)
            .await
            .expect("user.md should be readable");
        assert!(user.text.contains("## Observed ["));
        assert!(user.text.contains("Prefers meetings after 10am."));

        let memory = store
            .read_memory_file("MEMORY.md", Some(2), Some(1))
            .await
            .expect("MEMORY.md should be readable");
        assert_eq!(memory.text, "Alice is the Q4 planning owner.");
    }

    #[tokio::test]
    async fn daily_log_lands_in_todays_file_and_prompt_sources() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = FileMemoryStore::new(dir.path());

        store
            .append_daily_log("Archived 3 newsletters")
            .await
            .expect("daily log should append");

        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        let log = store
            .read_memory_file(&format!("memory/{today}.md"), None, None)
            .await
            .expect("daily log should be readable");
        assert!(log.text.contains("Archived 3 newsletters"));

        let sources = store
            .load_prompt_sources()
            .await
            .expect("sources should load");
        let recent = sources.recent_daily_log.expect("recent log should be present");
        assert!(recent.contains("Archived 3 newsletters"));
        assert!(sources.user_profile.is_none());
    }

    #[tokio::test]
    async fn disallowed_read_is_an_error_not_an_empty_file() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        std::fs::write(dir.path().join("secrets.md"), "token=abc").expect("fixture should write");
        let store = FileMemoryStore::new(dir.path());

        let error = store
            .read_memory_file("secrets.md", None, None)
            .await
            .expect_err("secrets.md is not allow-listed");
        assert!(matches!(error, Error::Memory(MemoryError::NotAllowed(_))));
    }

    #[test]
    fn config_picks_the_context_dir() {
        let config = Config {
            context_dir: PathBuf::from("/tmp/assistant-context"),
            ..Config::default()
        };
        let store = FileMemoryStore::from_config(&config);
        assert_eq!(store.root(), Path::new("/tmp/assistant-context"));
    }

    #[tokio::test]
    async fn missing_allowed_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let store = FileMemoryStore::new(dir.path());
        let file = store
            .read_memory_file("memory/2020-01-01.md", None, None)
            .await
            .expect("missing daily log should read as empty");
        assert_eq!(file.text, "");
    }
}
