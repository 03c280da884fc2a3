use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single failing test case extracted from a Jenkins test report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Fully qualified test name (`className.methodName`).
    pub test_name: String,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub stack_trace: String,
    /// Test duration in seconds.
    #[serde(default)]
    pub duration: f64,
    /// Test status as reported by Jenkins (FAILED, REGRESSION, ...).
    #[serde(default)]
    pub status: String,
}

/// A concrete source change proposed for a CODE_ISSUE verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeFix {
    pub file: String,
    /// Line reference as emitted by the backend; kept as text because
    /// backends answer with things like "42" or "40-45".
    #[serde(default)]
    pub line: String,
    pub change: String,
}

/// An existing tracker issue that may already cover a reported bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueMatch {
    pub key: String,
    pub summary: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub url: String,
    /// Keyword-overlap relevance in [0, 1]; consumers sort descending.
    #[serde(default)]
    pub relevance: f64,
}

/// Structured bug report carried by a PRODUCT_BUG verdict.
///
/// `matches` starts empty and is filled exactly once by the issue
/// cross-reference pass after the analysis tree is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    pub title: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub search_keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<IssueMatch>,
}

/// Verdict classification with its payload.
///
/// A CODE_ISSUE may carry a fix, a PRODUCT_BUG always carries a report, and
/// nothing else is representable, so a verdict can never hold both payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "classification", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    CodeIssue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_fix: Option<CodeFix>,
    },
    ProductBug {
        bug_report: BugReport,
    },
    Unknown,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CodeIssue { .. } => "CODE_ISSUE",
            Self::ProductBug { .. } => "PRODUCT_BUG",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// The structured outcome of analyzing one failure group or one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    /// Free-text analysis from the backend.
    #[serde(default)]
    pub narrative: String,
    #[serde(flatten)]
    pub classification: Classification,
}

impl AnalysisVerdict {
    /// Fallback verdict used whenever the backend output could not be
    /// interpreted; the raw text is preserved verbatim as the narrative.
    pub fn unknown(narrative: impl Into<String>) -> Self {
        Self {
            narrative: narrative.into(),
            classification: Classification::Unknown,
        }
    }

    pub fn bug_report(&self) -> Option<&BugReport> {
        match &self.classification {
            Classification::ProductBug { bug_report } => Some(bug_report),
            _ => None,
        }
    }

    pub fn bug_report_mut(&mut self) -> Option<&mut BugReport> {
        match &mut self.classification {
            Classification::ProductBug { bug_report } => Some(bug_report),
            _ => None,
        }
    }
}

/// One analyzed test failure: the verdict for its signature group applied to
/// this specific test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureVerdict {
    pub test_name: String,
    pub error: String,
    pub verdict: AnalysisVerdict,
}

/// Node of the recursive build analysis tree.
///
/// Aggregator (pipeline) nodes carry children and no verdicts; leaf nodes
/// carry verdicts and no children. Terminal notes record why a branch was not
/// analyzed further (fetch error, depth limit, passed build).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildAnalysisNode {
    pub job_name: String,
    pub build_number: u32,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<FailureVerdict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BuildAnalysisNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl BuildAnalysisNode {
    pub fn new(job_name: impl Into<String>, build_number: u32, url: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            build_number,
            url: url.into(),
            summary: None,
            verdicts: Vec::new(),
            children: Vec::new(),
            note: None,
        }
    }

    /// Terminal node that explains why the branch was not analyzed.
    pub fn with_note(
        job_name: impl Into<String>,
        build_number: u32,
        url: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        let mut node = Self::new(job_name, build_number, url);
        node.note = Some(note.into());
        node
    }

    /// Total verdicts in this node and all descendants.
    pub fn verdict_count(&self) -> usize {
        self.verdicts.len()
            + self
                .children
                .iter()
                .map(BuildAnalysisNode::verdict_count)
                .sum::<usize>()
    }

    /// Apply `f` to every bug report in the subtree.
    pub fn visit_bug_reports<F: FnMut(&BugReport)>(&self, f: &mut F) {
        for fv in &self.verdicts {
            if let Some(report) = fv.verdict.bug_report() {
                f(report);
            }
        }
        for child in &self.children {
            child.visit_bug_reports(f);
        }
    }

    /// Mutable variant of [`visit_bug_reports`], used by the issue
    /// cross-reference pass to attach matches in place.
    ///
    /// [`visit_bug_reports`]: Self::visit_bug_reports
    pub fn visit_bug_reports_mut<F: FnMut(&mut BugReport)>(&mut self, f: &mut F) {
        for fv in &mut self.verdicts {
            if let Some(report) = fv.verdict.bug_report_mut() {
                f(report);
            }
        }
        for child in &mut self.children {
            child.visit_bug_reports_mut(f);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Completed,
    Failed,
}

/// Envelope written by the `analyze` subcommand: the analysis tree plus run
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub job_id: String,
    pub job_name: String,
    pub build_number: u32,
    pub url: String,
    pub status: AnalysisStatus,
    pub backend: String,
    pub model: String,
    pub summary: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub root: BuildAnalysisNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bug_report() -> BugReport {
        BugReport {
            title: "Login fails with valid credentials".to_string(),
            severity: "high".to_string(),
            component: "auth".to_string(),
            description: "Valid users are rejected at login".to_string(),
            evidence: "HTTP 401 in console log".to_string(),
            search_keywords: vec!["login".to_string(), "auth".to_string()],
            matches: Vec::new(),
        }
    }

    #[test]
    fn test_verdict_serde_round_trip() {
        let verdict = AnalysisVerdict {
            narrative: "Assertion expects the old default".to_string(),
            classification: Classification::CodeIssue {
                code_fix: Some(CodeFix {
                    file: "tests/test_login.py".to_string(),
                    line: "42".to_string(),
                    change: "update expected status to 403".to_string(),
                }),
            },
        };

        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("\"classification\":\"CODE_ISSUE\""));
        let back: AnalysisVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, verdict);
    }

    #[test]
    fn test_product_bug_round_trip_keeps_matches() {
        let mut report = sample_bug_report();
        report.matches.push(IssueMatch {
            key: "PROJ-1".to_string(),
            summary: "Login broken".to_string(),
            status: "Open".to_string(),
            priority: "High".to_string(),
            url: "https://jira.example.com/browse/PROJ-1".to_string(),
            relevance: 1.0,
        });
        let verdict = AnalysisVerdict {
            narrative: "Backend rejects valid sessions".to_string(),
            classification: Classification::ProductBug { bug_report: report },
        };

        let json = serde_json::to_string(&verdict).unwrap();
        let back: AnalysisVerdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, verdict);
        assert_eq!(back.bug_report().unwrap().matches.len(), 1);
    }

    #[test]
    fn test_verdict_count_is_recursive() {
        let leaf_verdict = FailureVerdict {
            test_name: "tests.test_a".to_string(),
            error: "boom".to_string(),
            verdict: AnalysisVerdict::unknown("raw"),
        };

        let mut child = BuildAnalysisNode::new("child", 2, "");
        child.verdicts = vec![leaf_verdict.clone(), leaf_verdict.clone()];

        let mut root = BuildAnalysisNode::new("root", 1, "");
        root.verdicts = vec![leaf_verdict];
        root.children = vec![child];

        assert_eq!(root.verdict_count(), 3);
    }

    #[test]
    fn test_visit_bug_reports_mut_reaches_nested_reports() {
        let verdict = AnalysisVerdict {
            narrative: "broken".to_string(),
            classification: Classification::ProductBug {
                bug_report: sample_bug_report(),
            },
        };
        let mut child = BuildAnalysisNode::new("child", 2, "");
        child.verdicts.push(FailureVerdict {
            test_name: "tests.test_b".to_string(),
            error: "x".to_string(),
            verdict,
        });
        let mut root = BuildAnalysisNode::new("root", 1, "");
        root.children.push(child);

        let mut seen = 0;
        root.visit_bug_reports_mut(&mut |report| {
            seen += 1;
            report.matches.push(IssueMatch {
                key: "PROJ-9".to_string(),
                summary: String::new(),
                status: String::new(),
                priority: String::new(),
                url: String::new(),
                relevance: 0.5,
            });
        });

        assert_eq!(seen, 1);
        let attached = &root.children[0].verdicts[0]
            .verdict
            .bug_report()
            .unwrap()
            .matches;
        assert_eq!(attached.len(), 1);
    }

    #[test]
    fn test_unknown_verdict_preserves_raw_text() {
        let verdict = AnalysisVerdict::unknown("backend said something odd");
        assert_eq!(verdict.classification, Classification::Unknown);
        assert_eq!(verdict.narrative, "backend said something odd");
        assert!(verdict.bug_report().is_none());
    }
}
