use std::path::Path;

use super::ProviderCommand;

/// Gemini CLI (`gemini` binary).
pub struct Gemini;

impl ProviderCommand for Gemini {
    fn binary(&self) -> &'static str {
        "gemini"
    }

    fn args(&self, model: &str, _workdir: Option<&Path>) -> Vec<String> {
        vec![
            "--model".to_string(),
            model.to_string(),
            "--yolo".to_string(),
        ]
    }
}
