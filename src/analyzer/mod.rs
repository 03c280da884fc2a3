//! The recursive build walker.
//!
//! Walks a failed build and its failed children (depth-limited), groups leaf
//! test failures by error signature, dispatches one backend analysis per
//! unique signature through the shared bounded executor, and assembles the
//! results into a [`BuildAnalysisNode`] tree. Pipeline builds that failed
//! only because children failed are pure aggregators: they carry child nodes
//! and a summary, never verdicts of their own.

pub mod console;
pub mod grouping;
pub mod prompts;
pub mod response;

#[cfg(test)]
mod tests;

pub use grouping::{group_by_signature, signature, FailureSignature};
pub use prompts::SANITY_PROMPT;
pub use response::normalize;

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};

use crate::backends::AnalysisBackend;
use crate::error::{Result, TriageError};
use crate::executor::BoundedExecutor;
use crate::jenkins::types::{self, BuildInfo};
use crate::jenkins::{build_url, BuildSource};
use crate::models::{AnalysisVerdict, BuildAnalysisNode, FailureVerdict, TestFailure};

/// How many generations of failed children are walked below the root build.
pub const DEFAULT_MAX_DEPTH: usize = 3;

const PASSED_SUMMARY: &str = "Build passed successfully. No failures to analyze.";
const DEPTH_NOTE: &str = "Max depth reached - analysis stopped to prevent infinite recursion";

struct AnalyzerInner {
    source: Arc<dyn BuildSource>,
    backend: Arc<dyn AnalysisBackend>,
    executor: BoundedExecutor,
    max_depth: usize,
    workdir: Option<PathBuf>,
}

/// Orchestrates one analysis run. Cheap to clone; all shared state is
/// read-only behind an `Arc` apart from the injected executor budget.
#[derive(Clone)]
pub struct Analyzer {
    inner: Arc<AnalyzerInner>,
}

impl Analyzer {
    pub fn new(
        source: Arc<dyn BuildSource>,
        backend: Arc<dyn AnalysisBackend>,
        executor: BoundedExecutor,
        max_depth: usize,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(AnalyzerInner {
                source,
                backend,
                executor,
                max_depth,
                workdir,
            }),
        }
    }

    /// Analyze the root build.
    ///
    /// Fetch errors on the root are the one hard failure of a run; every
    /// error further down degrades into a terminal node or an UNKNOWN
    /// verdict, so a partially failed run still returns a tree.
    pub async fn analyze(&self, job_name: &str, build_number: u32) -> Result<BuildAnalysisNode> {
        let inner = &self.inner;
        let url = build_url(inner.source.base_url(), job_name, build_number);
        info!("Starting analysis for {job_name} #{build_number}");

        let build_info = inner.source.build_info(job_name, build_number).await?;

        if passed(&build_info) {
            info!("{job_name} #{build_number} passed; nothing to analyze");
            let mut node = BuildAnalysisNode::new(job_name, build_number, url);
            node.summary = Some(PASSED_SUMMARY.to_string());
            return Ok(node);
        }

        let console_text = inner.source.console_text(job_name, build_number).await?;

        let mut children = types::extract_failed_children(&build_info);
        if children.is_empty() {
            children = console::extract_failed_children(&console_text);
        }
        debug!("Extracted {} failed child build(s)", children.len());

        // One cheap call catches a misconfigured backend before the fan-out
        // burns a call per failure group.
        info!(
            "Running pre-flight sanity check for {}",
            inner.backend.describe()
        );
        inner
            .backend
            .sanity_check()
            .await
            .map_err(|e| TriageError::Backend(e.to_string()))?;

        let node = if children.is_empty() {
            analyze_leaf(
                Arc::clone(inner),
                job_name.to_string(),
                build_number,
                url,
                &console_text,
            )
            .await
        } else {
            analyze_children(
                Arc::clone(inner),
                job_name.to_string(),
                build_number,
                url,
                children,
                0,
            )
            .await
        };

        info!(
            "Analysis complete: {} verdict(s) across the tree",
            node.verdict_count()
        );
        Ok(node)
    }
}

fn passed(info: &BuildInfo) -> bool {
    info.result.as_deref() == Some("SUCCESS")
}

/// Walk one non-root build. Never fails: every error becomes a terminal node
/// so sibling branches keep going.
fn walk(
    inner: Arc<AnalyzerInner>,
    job_name: String,
    build_number: u32,
    depth: usize,
) -> BoxFuture<'static, BuildAnalysisNode> {
    async move {
        let url = build_url(inner.source.base_url(), &job_name, build_number);

        if depth >= inner.max_depth {
            return BuildAnalysisNode::with_note(job_name, build_number, url, DEPTH_NOTE);
        }

        let build_info = match inner.source.build_info(&job_name, build_number).await {
            Ok(info) => info,
            Err(e) => {
                warn!("{job_name} #{build_number}: {e}");
                return BuildAnalysisNode::with_note(
                    job_name,
                    build_number,
                    url,
                    format!("Failed to get build info: {e}"),
                );
            }
        };

        if passed(&build_info) {
            let mut node = BuildAnalysisNode::new(job_name, build_number, url);
            node.summary = Some(PASSED_SUMMARY.to_string());
            return node;
        }

        let console_text = match inner.source.console_text(&job_name, build_number).await {
            Ok(text) => text,
            Err(e) => {
                warn!("{job_name} #{build_number}: {e}");
                return BuildAnalysisNode::with_note(
                    job_name,
                    build_number,
                    url,
                    format!("Failed to get console output: {e}"),
                );
            }
        };

        let mut children = types::extract_failed_children(&build_info);
        if children.is_empty() {
            children = console::extract_failed_children(&console_text);
        }

        if children.is_empty() {
            analyze_leaf(inner, job_name, build_number, url, &console_text).await
        } else {
            analyze_children(inner, job_name, build_number, url, children, depth + 1).await
        }
    }
    .boxed()
}

/// Aggregator branch: recurse into each failed child in parallel and derive
/// this node's summary from the children. No verdicts of its own.
async fn analyze_children(
    inner: Arc<AnalyzerInner>,
    job_name: String,
    build_number: u32,
    url: String,
    children: Vec<(String, u32)>,
    child_depth: usize,
) -> BuildAnalysisNode {
    info!(
        "{job_name} #{build_number}: recursing into {} failed child build(s)",
        children.len()
    );

    let units: Vec<_> = children
        .iter()
        .cloned()
        .map(|(child_job, child_number)| {
            walk(Arc::clone(&inner), child_job, child_number, child_depth)
        })
        .collect();

    let results = inner.executor.run_nested(units).await;

    let mut child_nodes = Vec::with_capacity(children.len());
    for ((child_job, child_number), result) in children.into_iter().zip(results) {
        match result {
            Ok(node) => child_nodes.push(node),
            Err(e) => child_nodes.push(BuildAnalysisNode::with_note(
                child_job,
                child_number,
                String::new(),
                format!("Analysis failed: {e}"),
            )),
        }
    }

    let total_verdicts: usize = child_nodes.iter().map(BuildAnalysisNode::verdict_count).sum();
    let mut summary = format!(
        "Pipeline failed due to {} failed child job(s).",
        child_nodes.len()
    );
    if total_verdicts > 0 {
        summary.push_str(&format!(
            " Total: {total_verdicts} failure(s) analyzed. See child analyses below."
        ));
    }

    let mut node = BuildAnalysisNode::new(job_name, build_number, url);
    node.summary = Some(summary);
    node.children = child_nodes;
    node
}

/// Leaf branch: group test failures by signature and analyze one group per
/// backend call, or fall back to a single whole-console analysis when the
/// build has no structured test report.
async fn analyze_leaf(
    inner: Arc<AnalyzerInner>,
    job_name: String,
    build_number: u32,
    url: String,
    console_text: &str,
) -> BuildAnalysisNode {
    // Best effort: a missing or unreadable report just means console-only
    // analysis.
    let report = match inner.source.test_report(&job_name, build_number).await {
        Ok(report) => report,
        Err(e) => {
            debug!("{job_name} #{build_number}: no usable test report: {e}");
            None
        }
    };
    let failures = report
        .as_ref()
        .map(types::extract_failures)
        .unwrap_or_default();

    let console_context = console::extract_relevant_lines(console_text);

    if failures.is_empty() {
        return analyze_console_only(inner, job_name, build_number, url, console_context).await;
    }

    let groups = group_by_signature(failures);
    let unique_errors = groups.len();
    let group_list: Vec<Vec<TestFailure>> = groups.into_values().collect();
    let total_failures: usize = group_list.iter().map(Vec::len).sum();
    info!("Grouped {total_failures} failures into {unique_errors} unique error types");

    let units: Vec<_> = group_list
        .iter()
        .cloned()
        .map(|group| {
            let inner = Arc::clone(&inner);
            let context = console_context.clone();
            async move {
                let prompt = prompts::failure_group_prompt(&group, &context);
                let verdict = invoke_and_normalize(&inner, prompt).await;
                group
                    .into_iter()
                    .map(|f| FailureVerdict {
                        test_name: f.test_name,
                        error: f.error_message,
                        verdict: verdict.clone(),
                    })
                    .collect::<Vec<_>>()
            }
        })
        .collect();

    let results = inner.executor.run_bounded(units).await;

    let mut verdicts = Vec::with_capacity(total_failures);
    for (group, result) in group_list.into_iter().zip(results) {
        match result {
            Ok(group_verdicts) => verdicts.extend(group_verdicts),
            Err(e) => {
                // The whole group gets an error verdict; siblings are
                // untouched.
                for f in group {
                    verdicts.push(FailureVerdict {
                        test_name: f.test_name,
                        error: f.error_message,
                        verdict: AnalysisVerdict::unknown(format!("Analysis failed: {e}")),
                    });
                }
            }
        }
    }

    let summary = if unique_errors < verdicts.len() {
        format!(
            "{} failure(s) analyzed ({unique_errors} unique error type(s))",
            verdicts.len()
        )
    } else {
        format!("{} failure(s) analyzed", verdicts.len())
    };

    let mut node = BuildAnalysisNode::new(job_name, build_number, url);
    node.summary = Some(summary);
    node.verdicts = verdicts;
    node
}

async fn analyze_console_only(
    inner: Arc<AnalyzerInner>,
    job_name: String,
    build_number: u32,
    url: String,
    console_context: String,
) -> BuildAnalysisNode {
    let prompt = prompts::console_prompt(&job_name, build_number, &console_context);

    let unit = {
        let inner = Arc::clone(&inner);
        async move { invoke_and_normalize(&inner, prompt).await }
    };
    let verdict = match inner
        .executor
        .run_bounded(vec![unit])
        .await
        .into_iter()
        .next()
        .expect("single unit batch yields one result")
    {
        Ok(verdict) => verdict,
        Err(e) => AnalysisVerdict::unknown(format!("Analysis failed: {e}")),
    };

    let mut node = BuildAnalysisNode::new(job_name.clone(), build_number, url);
    node.summary = Some("Analysis complete".to_string());
    node.verdicts = vec![FailureVerdict {
        test_name: format!("{job_name}#{build_number}"),
        error: "Console-only analysis".to_string(),
        verdict,
    }];
    node
}

/// One backend call, any outcome collapsed into a verdict: parse failures
/// fall back inside [`response::normalize`], backend failures become UNKNOWN
/// verdicts carrying the error text.
async fn invoke_and_normalize(inner: &AnalyzerInner, prompt: String) -> AnalysisVerdict {
    match inner
        .backend
        .invoke(&prompt, inner.workdir.as_deref())
        .await
    {
        Ok(text) => response::normalize(&text),
        Err(e) => AnalysisVerdict::unknown(e.to_string()),
    }
}
