//! AI CLI analysis backends.
//!
//! Each supported provider is a unit struct that knows how to build its
//! command line; [`CliBackend`] owns the shared invocation path (prompt on
//! stdin, captured output, timeout). The provider set is closed: unknown
//! names are a configuration error at parse time, not a runtime surprise.

mod claude;
mod cursor;
mod gemini;

pub use claude::Claude;
pub use cursor::Cursor;
pub use gemini::Gemini;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::analyzer::SANITY_PROMPT;
use crate::error::{Result, TriageError};

/// Default per-call timeout, in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 10;

/// Timeout for the pre-flight sanity call, which needs no thinking time.
const SANITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Gemini,
    Cursor,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Claude, Self::Gemini, Self::Cursor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Cursor => "cursor",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            "cursor" => Ok(Self::Cursor),
            other => Err(TriageError::Config(format!(
                "Unknown AI provider: '{other}'. Valid providers: {}",
                Self::ALL.map(ProviderKind::as_str).join(", ")
            ))),
        }
    }
}

/// Command construction for one provider binary.
pub trait ProviderCommand: Send + Sync {
    fn binary(&self) -> &'static str;

    /// Arguments for a one-shot, prompt-on-stdin invocation.
    fn args(&self, model: &str, workdir: Option<&Path>) -> Vec<String>;

    /// True when the binary takes its working directory as an argument
    /// instead of inheriting the spawn cwd.
    fn uses_own_cwd(&self) -> bool {
        false
    }
}

pub fn provider(kind: ProviderKind) -> &'static dyn ProviderCommand {
    match kind {
        ProviderKind::Claude => &Claude,
        ProviderKind::Gemini => &Gemini,
        ProviderKind::Cursor => &Cursor,
    }
}

/// A single backend call that did not produce usable output.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{provider} CLI error: analysis timed out after {minutes} minute(s)")]
    Timeout { provider: String, minutes: u64 },

    #[error("{provider} CLI error: {detail}")]
    Failed { provider: String, detail: String },

    #[error("failed to launch {provider} CLI: {source}")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },
}

/// Seam between the walker and the analysis backend. The production
/// implementation shells out to a provider CLI; tests substitute fakes.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// One analysis call. `Err` carries human-readable failure text and is
    /// converted by the caller into an UNKNOWN verdict, never propagated.
    async fn invoke(
        &self,
        prompt: &str,
        workdir: Option<&Path>,
    ) -> std::result::Result<String, BackendError>;

    /// Cheap pre-flight call so a misconfigured backend is caught once,
    /// before the main fan-out burns a call per failure group.
    async fn sanity_check(&self) -> std::result::Result<(), BackendError> {
        self.invoke(SANITY_PROMPT, None).await.map(|_| ())
    }

    /// Label used in logs and error messages, e.g. `CLAUDE (sonnet)`.
    fn describe(&self) -> String;
}

/// Invokes a provider CLI as a subprocess.
#[derive(Debug)]
pub struct CliBackend {
    kind: ProviderKind,
    model: String,
    timeout: Duration,
}

impl CliBackend {
    pub fn new(kind: ProviderKind, model: impl Into<String>, timeout_minutes: u64) -> Result<Self> {
        let model = model.into();
        if model.is_empty() {
            return Err(TriageError::Config(
                "No AI model configured. Set AI_MODEL or the backend.model config key.".to_string(),
            ));
        }
        Ok(Self {
            kind,
            model,
            timeout: Duration::from_secs(timeout_minutes.max(1) * 60),
        })
    }

    fn provider_info(&self) -> String {
        format!("{} ({})", self.kind.as_str().to_uppercase(), self.model)
    }

    async fn run(
        &self,
        prompt: &str,
        workdir: Option<&Path>,
        timeout: Duration,
    ) -> std::result::Result<String, BackendError> {
        let spec = provider(self.kind);
        let mut command = Command::new(spec.binary());
        command
            .args(spec.args(&self.model, workdir))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let (false, Some(dir)) = (spec.uses_own_cwd(), workdir) {
            command.current_dir(dir);
        }

        debug!("Spawning {} CLI", self.provider_info());
        let mut child = command.spawn().map_err(|source| BackendError::Spawn {
            provider: self.provider_info(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|source| BackendError::Spawn {
                    provider: self.provider_info(),
                    source,
                })?;
            // Dropping stdin closes the pipe so the CLI sees EOF.
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| BackendError::Spawn {
                provider: self.provider_info(),
                source,
            })?,
            Err(_) => {
                return Err(BackendError::Timeout {
                    provider: self.provider_info(),
                    minutes: timeout.as_secs() / 60,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let detail = if !stderr.trim().is_empty() {
                stderr
            } else if !stdout.trim().is_empty() {
                stdout
            } else {
                "unknown error (no output)".to_string()
            };
            return Err(BackendError::Failed {
                provider: self.provider_info(),
                detail,
            });
        }

        if stdout.trim().is_empty() {
            return Err(BackendError::Failed {
                provider: self.provider_info(),
                detail: "empty output".to_string(),
            });
        }

        debug!(
            "{} CLI response length: {} chars",
            self.provider_info(),
            stdout.len()
        );
        Ok(stdout)
    }
}

#[async_trait]
impl AnalysisBackend for CliBackend {
    async fn invoke(
        &self,
        prompt: &str,
        workdir: Option<&Path>,
    ) -> std::result::Result<String, BackendError> {
        info!("Calling {} CLI", self.provider_info());
        self.run(prompt, workdir, self.timeout).await
    }

    async fn sanity_check(&self) -> std::result::Result<(), BackendError> {
        self.run(SANITY_PROMPT, None, SANITY_TIMEOUT).await.map(|_| ())
    }

    fn describe(&self) -> String {
        self.provider_info()
    }
}

/// Working directory handed to every backend call so the CLI can read the
/// code under test. Validated once at startup.
pub fn validate_workdir(workdir: Option<&Path>) -> Result<Option<PathBuf>> {
    match workdir {
        None => Ok(None),
        Some(path) if path.is_dir() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(TriageError::Config(format!(
            "Backend working directory does not exist: {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers_parse() {
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert_eq!("GEMINI".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("cursor".parse::<ProviderKind>().unwrap(), ProviderKind::Cursor);
    }

    #[test]
    fn test_unknown_provider_is_a_config_error_listing_the_valid_set() {
        let err = "copilot".parse::<ProviderKind>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("copilot"));
        assert!(message.contains("claude, gemini, cursor"));
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[test]
    fn test_provider_kind_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::Claude).unwrap(),
            "\"claude\""
        );
        let parsed: ProviderKind = serde_json::from_str("\"cursor\"").unwrap();
        assert_eq!(parsed, ProviderKind::Cursor);
    }

    #[test]
    fn test_claude_command_line() {
        let spec = provider(ProviderKind::Claude);
        assert_eq!(spec.binary(), "claude");
        assert_eq!(
            spec.args("sonnet", None),
            vec!["--model", "sonnet", "--dangerously-skip-permissions", "-p"]
        );
        assert!(!spec.uses_own_cwd());
    }

    #[test]
    fn test_gemini_command_line() {
        let spec = provider(ProviderKind::Gemini);
        assert_eq!(spec.binary(), "gemini");
        assert_eq!(spec.args("flash", None), vec!["--model", "flash", "--yolo"]);
    }

    #[test]
    fn test_cursor_command_line_carries_its_workspace() {
        let spec = provider(ProviderKind::Cursor);
        assert_eq!(spec.binary(), "agent");
        assert!(spec.uses_own_cwd());
        assert_eq!(
            spec.args("fast", Some(Path::new("/tmp/repo"))),
            vec!["--force", "--model", "fast", "--print", "--workspace", "/tmp/repo"]
        );
        assert_eq!(
            spec.args("fast", None),
            vec!["--force", "--model", "fast", "--print"]
        );
    }

    #[test]
    fn test_empty_model_is_rejected() {
        let err = CliBackend::new(ProviderKind::Claude, "", 10).unwrap_err();
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[test]
    fn test_backend_describe_labels_provider_and_model() {
        let backend = CliBackend::new(ProviderKind::Gemini, "flash", 10).unwrap();
        assert_eq!(backend.describe(), "GEMINI (flash)");
    }

    #[test]
    fn test_validate_workdir() {
        assert_eq!(validate_workdir(None).unwrap(), None);

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            validate_workdir(Some(dir.path())).unwrap(),
            Some(dir.path().to_path_buf())
        );

        let missing = dir.path().join("does-not-exist");
        assert!(validate_workdir(Some(&missing)).is_err());
    }
}
