//! Prompt construction for the analysis backend.

use crate::models::TestFailure;

/// Trivial prompt used by the pre-flight sanity check.
pub const SANITY_PROMPT: &str = "Hi";

/// Response contract appended to every analysis prompt.
const JSON_RESPONSE_SCHEMA: &str = r#"Respond with a JSON object using this EXACT schema (no markdown, no extra text, just the JSON):

If CODE ISSUE:
{
  "classification": "CODE ISSUE",
  "details": "Your detailed analysis of what caused this failure",
  "code_fix": {
    "file": "exact/file/path.py",
    "line": "line number",
    "change": "specific code change that fixes all affected tests"
  }
}

If PRODUCT BUG:
{
  "classification": "PRODUCT BUG",
  "details": "Your detailed analysis of what caused this failure",
  "product_bug_report": {
    "title": "concise bug title",
    "severity": "critical/high/medium/low",
    "component": "affected component",
    "description": "what product behavior is broken",
    "evidence": "relevant log snippets",
    "jira_search_keywords": ["keyword1", "keyword2", "keyword3"]
  }
}"#;

/// Prompt for one signature group: the representative error plus every
/// affected test name, so one analysis covers the whole group.
pub fn failure_group_prompt(failures: &[TestFailure], console_context: &str) -> String {
    let representative = &failures[0];
    let test_list = failures
        .iter()
        .map(|f| format!("- {}", f.test_name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Analyze this test failure from a Jenkins CI job.\n\n\
         AFFECTED TESTS ({count} tests with same error):\n{test_list}\n\n\
         ERROR: {error}\n\
         STACK TRACE:\n{stack}\n\n\
         CONSOLE CONTEXT:\n{console_context}\n\n\
         Note: Multiple tests failed with the same error. Provide ONE analysis that applies to all of them.\n\n\
         {schema}\n",
        count = failures.len(),
        error = representative.error_message,
        stack = representative.stack_trace,
        schema = JSON_RESPONSE_SCHEMA,
    )
}

/// Whole-console prompt used when a failed build has no structured test
/// report.
pub fn console_prompt(job_name: &str, build_number: u32, console_context: &str) -> String {
    format!(
        "Analyze this failed Jenkins job:\n\n\
         Job: {job_name} #{build_number}\n\n\
         CONSOLE OUTPUT (errors/failures/warnings extracted):\n{console_context}\n\n\
         {schema}\n",
        schema = JSON_RESPONSE_SCHEMA,
    )
}
