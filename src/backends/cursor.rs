use std::path::Path;

use super::ProviderCommand;

/// Cursor agent CLI (`agent` binary). Takes its workspace as an argument
/// rather than inheriting the spawn cwd.
pub struct Cursor;

impl ProviderCommand for Cursor {
    fn binary(&self) -> &'static str {
        "agent"
    }

    fn args(&self, model: &str, workdir: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--force".to_string(),
            "--model".to_string(),
            model.to_string(),
            "--print".to_string(),
        ];
        if let Some(dir) = workdir {
            args.push("--workspace".to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    fn uses_own_cwd(&self) -> bool {
        true
    }
}
