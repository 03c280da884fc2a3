use std::path::Path;

use super::ProviderCommand;

/// Claude Code CLI (`claude` binary).
pub struct Claude;

impl ProviderCommand for Claude {
    fn binary(&self) -> &'static str {
        "claude"
    }

    fn args(&self, model: &str, _workdir: Option<&Path>) -> Vec<String> {
        vec![
            "--model".to_string(),
            model.to_string(),
            "--dangerously-skip-permissions".to_string(),
            "-p".to_string(),
        ]
    }
}
