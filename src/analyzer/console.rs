use std::sync::LazyLock;

use regex::Regex;

/// Lines returned from the end of the console when no error line matched.
const FALLBACK_TAIL_LINES: usize = 200;

/// Leading context kept before each matched error line.
const CONTEXT_LINES_BEFORE: usize = 2;

static ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(error|fail(ed|ure)?|exception|traceback|assert(ion)?|warn(ing)?|critical|fatal)\b",
    )
    .expect("error pattern is valid")
});

/// Lines like `Build folder » job #123 completed: FAILURE` printed by
/// pipeline builds that trigger downstream jobs.
static CHILD_BUILD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Build\s+(.+?)\s+#(\d+)\s+completed:\s*(FAILURE|UNSTABLE)")
        .expect("child build pattern is valid")
});

/// Extract error, failure, and warning lines (with a little leading context
/// and any indented stack-trace continuation) from a full console log.
///
/// Falls back to the last [`FALLBACK_TAIL_LINES`] lines when nothing matches,
/// since the tail usually carries the failure.
pub fn extract_relevant_lines(console: &str) -> String {
    let lines: Vec<&str> = console.lines().collect();
    let mut relevant: Vec<&str> = Vec::new();
    let mut seen = vec![false; lines.len()];
    let mut in_traceback = false;

    for (i, line) in lines.iter().enumerate() {
        if ERROR_PATTERN.is_match(line) {
            let start = i.saturating_sub(CONTEXT_LINES_BEFORE);
            for j in start..i {
                if !seen[j] {
                    relevant.push(lines[j]);
                    seen[j] = true;
                }
            }
            if !seen[i] {
                relevant.push(line);
                seen[i] = true;
            }
            in_traceback = true;
        } else if in_traceback {
            // Indented or blank lines continue the current stack trace.
            if line.starts_with(' ') || line.starts_with('\t') || line.trim().is_empty() {
                if !seen[i] {
                    relevant.push(line);
                    seen[i] = true;
                }
            } else {
                in_traceback = false;
            }
        }
    }

    if !relevant.is_empty() {
        return relevant.join("\n");
    }

    if lines.len() > FALLBACK_TAIL_LINES {
        lines[lines.len() - FALLBACK_TAIL_LINES..].join("\n")
    } else {
        console.to_string()
    }
}

/// Extract failed child builds advertised in console output.
///
/// Folder paths printed as `parent » child` are converted to the `parent/child`
/// form the Jenkins API expects.
pub fn extract_failed_children(console: &str) -> Vec<(String, u32)> {
    CHILD_BUILD_PATTERN
        .captures_iter(console)
        .filter_map(|cap| {
            let job = cap[1].trim().replace(" » ", "/");
            let build = cap[2].parse::<u32>().ok()?;
            Some((job, build))
        })
        .collect()
}
