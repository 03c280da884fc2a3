//! Turns raw backend output into a typed [`AnalysisVerdict`].
//!
//! Backends are asked for JSON but answer with whatever they like, so the
//! parser is a chain of named fallback stages with a fixed priority order:
//! fenced ```json block, bare ``` fence, first-`{`-to-last-`}` JSON span,
//! `=== SECTION ===` marker text, and finally an UNKNOWN verdict carrying the
//! raw text verbatim. Normalization never fails; an unparseable response is a
//! valid observable outcome.

use serde::Deserialize;

use crate::models::{AnalysisVerdict, BugReport, Classification, CodeFix, IssueMatch};

/// Why a syntactically valid JSON response was rejected as a verdict.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum VerdictShapeError {
    /// Both a code fix and a bug report were present.
    ConflictingPayloads,
    /// Classified PRODUCT_BUG but no bug report attached.
    MissingBugReport,
    /// A payload present under a classification it does not belong to.
    MismatchedPayload,
}

/// Wire shape of a backend response. Accepts both this tool's canonical
/// field names and the looser names backends were prompted with
/// (`CODE ISSUE`, `details`, `product_bug_report`, `jira_search_keywords`).
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    classification: Option<String>,
    #[serde(default, alias = "details")]
    narrative: Option<String>,
    #[serde(default)]
    code_fix: Option<CodeFix>,
    #[serde(default, alias = "product_bug_report")]
    bug_report: Option<RawBugReport>,
}

#[derive(Debug, Deserialize)]
struct RawBugReport {
    #[serde(default)]
    title: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    component: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    evidence: String,
    #[serde(default, alias = "jira_search_keywords")]
    search_keywords: Vec<String>,
    #[serde(default)]
    matches: Vec<IssueMatch>,
}

impl From<RawBugReport> for BugReport {
    fn from(raw: RawBugReport) -> Self {
        Self {
            title: raw.title,
            severity: raw.severity,
            component: raw.component,
            description: raw.description,
            evidence: raw.evidence,
            search_keywords: raw.search_keywords,
            matches: raw.matches,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    CodeIssue,
    ProductBug,
    Unknown,
}

/// "CODE ISSUE", "code_issue", and "CODE-ISSUE" all mean the same thing.
fn parse_label(raw: &str) -> Label {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    match normalized.as_str() {
        "CODE_ISSUE" => Label::CodeIssue,
        "PRODUCT_BUG" => Label::ProductBug,
        _ => Label::Unknown,
    }
}

impl TryFrom<RawVerdict> for AnalysisVerdict {
    type Error = VerdictShapeError;

    fn try_from(raw: RawVerdict) -> Result<Self, Self::Error> {
        if raw.code_fix.is_some() && raw.bug_report.is_some() {
            return Err(VerdictShapeError::ConflictingPayloads);
        }

        let label = raw
            .classification
            .as_deref()
            .map(parse_label)
            .unwrap_or(Label::Unknown);

        let classification = match label {
            Label::CodeIssue => {
                if raw.bug_report.is_some() {
                    return Err(VerdictShapeError::MismatchedPayload);
                }
                Classification::CodeIssue {
                    code_fix: raw.code_fix,
                }
            }
            Label::ProductBug => {
                if raw.code_fix.is_some() {
                    return Err(VerdictShapeError::MismatchedPayload);
                }
                let bug_report = raw.bug_report.ok_or(VerdictShapeError::MissingBugReport)?;
                Classification::ProductBug {
                    bug_report: bug_report.into(),
                }
            }
            Label::Unknown => {
                if raw.code_fix.is_some() || raw.bug_report.is_some() {
                    return Err(VerdictShapeError::MismatchedPayload);
                }
                Classification::Unknown
            }
        };

        Ok(Self {
            narrative: raw.narrative.unwrap_or_default(),
            classification,
        })
    }
}

/// Normalize a raw backend response into a verdict. Never fails.
pub fn normalize(raw_text: &str) -> AnalysisVerdict {
    let text = strip_code_fence(raw_text.trim());

    if let Some(span) = brace_span(text) {
        if let Ok(raw) = serde_json::from_str::<RawVerdict>(span) {
            if let Ok(verdict) = AnalysisVerdict::try_from(raw) {
                return verdict;
            }
        }
    }

    if let Some(verdict) = parse_sections(raw_text) {
        return verdict;
    }

    AnalysisVerdict::unknown(raw_text)
}

/// Strip a ```json fence if present, else a bare ``` fence. An unclosed
/// fence leaves the text untouched for the later stages.
fn strip_code_fence(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    } else if let Some(start) = text.find("```") {
        let body = &text[start + "```".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    text
}

/// Span from the first `{` to the last `}`, if any.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Companion mode for backends that answer in `=== SECTION ===` text instead
/// of JSON. Returns `None` when the text has no CLASSIFICATION marker at all.
fn parse_sections(text: &str) -> Option<AnalysisVerdict> {
    let classification_text = extract_section(text, "CLASSIFICATION")?;

    let narrative = extract_section(text, "ANALYSIS")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| text.trim().to_string());

    let classification = match parse_label(&classification_text) {
        Label::CodeIssue => Classification::CodeIssue {
            code_fix: extract_code_fix_section(text),
        },
        Label::ProductBug => Classification::ProductBug {
            bug_report: extract_bug_report_section(text),
        },
        Label::Unknown => Classification::Unknown,
    };

    Some(AnalysisVerdict {
        narrative,
        classification,
    })
}

fn extract_code_fix_section(text: &str) -> Option<CodeFix> {
    let section = extract_section(text, "CODE FIX").filter(|s| !s.is_empty())?;
    Some(CodeFix {
        file: extract_field(&section, "File"),
        line: extract_field(&section, "Line"),
        change: extract_field(&section, "Change"),
    })
}

fn extract_bug_report_section(text: &str) -> BugReport {
    let section = extract_section(text, "BUG REPORT").unwrap_or_default();
    let or_unknown = |value: String| {
        if value.is_empty() {
            "unknown".to_string()
        } else {
            value
        }
    };
    BugReport {
        title: extract_field(&section, "Title"),
        severity: or_unknown(extract_field(&section, "Severity")),
        component: or_unknown(extract_field(&section, "Component")),
        description: extract_field(&section, "Description"),
        evidence: extract_field(&section, "Evidence"),
        search_keywords: split_keywords(&extract_field(&section, "Keywords")),
        matches: Vec::new(),
    }
}

fn split_keywords(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Content between `=== NAME ===` and the next marker (or end of text),
/// trimmed. `None` when the marker is absent; lookup is case-insensitive.
fn extract_section(text: &str, name: &str) -> Option<String> {
    let mut collecting = false;
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let is_marker =
            trimmed.len() > 6 && trimmed.starts_with("===") && trimmed.ends_with("===");
        if is_marker {
            if collecting {
                break;
            }
            let inner = trimmed.trim_matches('=').trim();
            if inner.eq_ignore_ascii_case(name) {
                collecting = true;
            }
        } else if collecting {
            lines.push(line);
        }
    }

    collecting.then(|| lines.join("\n").trim().to_string())
}

/// First `Key: value` line matching `field` (case-insensitive); colons inside
/// the value are preserved. Empty string when absent.
fn extract_field(section: &str, field: &str) -> String {
    for line in section.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(field) {
                return value.trim().to_string();
            }
        }
    }
    String::new()
}
