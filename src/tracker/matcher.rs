//! Issue cross-reference pass.
//!
//! Runs strictly after the analysis tree is complete: collects every
//! PRODUCT_BUG report carrying search keywords, deduplicates by sorted
//! keyword set so permuted keyword lists share one query, searches the
//! tracker through the bounded executor, scores candidates by keyword
//! overlap, and attaches the matches in place. This pass never fails the
//! run; every error degrades to an empty match list.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::executor::BoundedExecutor;
use crate::models::{BuildAnalysisNode, IssueMatch};
use crate::tracker::{IssueCandidate, IssueTracker};

/// Search the tracker for issues matching each bug report's keywords and
/// fill `BugReport::matches` across the tree. No-op without a tracker.
pub async fn attach_issue_matches(
    root: &mut BuildAnalysisNode,
    tracker: Option<Arc<dyn IssueTracker>>,
    executor: &BoundedExecutor,
) {
    let Some(tracker) = tracker else {
        return;
    };

    // Sorted keyword tuples, so ["login","auth"] and ["auth","login"] search
    // once. Insertion order is kept for deterministic query dispatch.
    let mut keyword_sets: IndexMap<Vec<String>, usize> = IndexMap::new();
    root.visit_bug_reports(&mut |report| {
        if report.search_keywords.is_empty() {
            return;
        }
        let mut key = report.search_keywords.clone();
        key.sort();
        *keyword_sets.entry(key).or_insert(0) += 1;
    });

    if keyword_sets.is_empty() {
        debug!("No bug reports with search keywords; skipping tracker lookup");
        return;
    }

    let report_count: usize = keyword_sets.values().sum();
    info!(
        "Searching tracker for {} unique keyword set(s) across {report_count} bug report(s)",
        keyword_sets.len()
    );

    let keys: Vec<Vec<String>> = keyword_sets.into_keys().collect();
    let units: Vec<_> = keys
        .iter()
        .cloned()
        .map(|keywords| {
            let tracker = Arc::clone(&tracker);
            async move {
                match tracker.search(&keywords).await {
                    Ok(candidates) => score_candidates(&keywords, candidates),
                    Err(e) => {
                        warn!("Tracker search failed for {keywords:?}: {e}");
                        Vec::new()
                    }
                }
            }
        })
        .collect();

    let results = executor.run_bounded(units).await;

    let mut matches_by_key: HashMap<Vec<String>, Vec<IssueMatch>> = HashMap::new();
    for (key, result) in keys.into_iter().zip(results) {
        let matches = result.unwrap_or_else(|e| {
            warn!("Tracker search task failed: {e}");
            Vec::new()
        });
        matches_by_key.insert(key, matches);
    }

    let mut total_matches = 0;
    root.visit_bug_reports_mut(&mut |report| {
        if report.search_keywords.is_empty() {
            return;
        }
        let mut key = report.search_keywords.clone();
        key.sort();
        if let Some(matches) = matches_by_key.get(&key) {
            total_matches += matches.len();
            report.matches = matches.clone();
        }
    });
    info!("Tracker search complete: {total_matches} match(es) attached");
}

/// Convert candidates to matches with a keyword-overlap relevance score,
/// highest first.
fn score_candidates(keywords: &[String], candidates: Vec<IssueCandidate>) -> Vec<IssueMatch> {
    let mut matches: Vec<IssueMatch> = candidates
        .into_iter()
        .map(|candidate| {
            let relevance = compute_relevance(keywords, &candidate.key, &candidate.summary);
            IssueMatch {
                key: candidate.key,
                summary: candidate.summary,
                status: candidate.status,
                priority: candidate.priority,
                url: candidate.url,
                relevance,
            }
        })
        .collect();
    matches.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matches
}

/// Fraction of keywords appearing in the issue key or summary,
/// case-insensitive, rounded to two decimals.
fn compute_relevance(keywords: &[String], key: &str, summary: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let searchable = format!("{key} {summary}").to_lowercase();
    let hits = keywords
        .iter()
        .filter(|kw| searchable.contains(&kw.to_lowercase()))
        .count();
    ((hits as f64 / keywords.len() as f64) * 100.0).round() / 100.0
}
