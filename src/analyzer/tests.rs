use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::analyzer::{Analyzer, DEFAULT_MAX_DEPTH};
use crate::backends::{AnalysisBackend, BackendError};
use crate::error::{FetchErrorKind, Result, TriageError};
use crate::executor::BoundedExecutor;
use crate::jenkins::types::{BuildInfo, Case, SubBuild, Suite, TestReport};
use crate::jenkins::BuildSource;
use crate::models::{Classification, TestFailure};

const CODE_ISSUE_RESPONSE: &str = "```json\n{\"classification\": \"CODE ISSUE\", \"details\": \"the wait is too short\", \"code_fix\": {\"file\": \"tests/conftest.py\", \"line\": \"10\", \"change\": \"raise the timeout\"}}\n```";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MapSource {
    infos: HashMap<(String, u32), BuildInfo>,
    consoles: HashMap<(String, u32), String>,
    reports: HashMap<(String, u32), TestReport>,
}

impl MapSource {
    fn new() -> Self {
        Self::default()
    }

    fn with_build(mut self, job: &str, number: u32, result: &str, children: &[(&str, u32)]) -> Self {
        let sub_builds = children
            .iter()
            .map(|(child_job, child_number)| SubBuild {
                result: Some("FAILURE".to_string()),
                job_name: (*child_job).to_string(),
                build_number: *child_number,
            })
            .collect();
        self.infos.insert(
            (job.to_string(), number),
            BuildInfo {
                result: Some(result.to_string()),
                sub_builds,
                actions: Vec::new(),
            },
        );
        self
    }

    fn with_console(mut self, job: &str, number: u32, text: &str) -> Self {
        self.consoles
            .insert((job.to_string(), number), text.to_string());
        self
    }

    fn with_report(mut self, job: &str, number: u32, failures: Vec<TestFailure>) -> Self {
        let cases = failures
            .into_iter()
            .map(|f| Case {
                class_name: String::new(),
                name: f.test_name,
                status: f.status,
                error_details: Some(f.error_message),
                error_stack_trace: Some(f.stack_trace),
                duration: f.duration,
            })
            .collect();
        self.reports.insert(
            (job.to_string(), number),
            TestReport {
                suites: vec![Suite { cases }],
                child_reports: Vec::new(),
            },
        );
        self
    }
}

#[async_trait]
impl BuildSource for MapSource {
    async fn build_info(&self, job_name: &str, build_number: u32) -> Result<BuildInfo> {
        self.infos
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .ok_or_else(|| {
                TriageError::fetch(
                    FetchErrorKind::NotFound,
                    format!("{job_name} #{build_number} not found"),
                )
            })
    }

    async fn console_text(&self, job_name: &str, build_number: u32) -> Result<String> {
        Ok(self
            .consoles
            .get(&(job_name.to_string(), build_number))
            .cloned()
            .unwrap_or_default())
    }

    async fn test_report(&self, job_name: &str, build_number: u32) -> Result<Option<TestReport>> {
        Ok(self
            .reports
            .get(&(job_name.to_string(), build_number))
            .cloned())
    }

    fn base_url(&self) -> &str {
        "https://jenkins.example.com"
    }
}

/// Every build fails with exactly one failed child, forever.
struct ChainSource;

#[async_trait]
impl BuildSource for ChainSource {
    async fn build_info(&self, _job_name: &str, build_number: u32) -> Result<BuildInfo> {
        Ok(BuildInfo {
            result: Some("FAILURE".to_string()),
            sub_builds: vec![SubBuild {
                result: Some("FAILURE".to_string()),
                job_name: "chain".to_string(),
                build_number: build_number + 1,
            }],
            actions: Vec::new(),
        })
    }

    async fn console_text(&self, _job_name: &str, _build_number: u32) -> Result<String> {
        Ok(String::new())
    }

    async fn test_report(&self, _job_name: &str, _build_number: u32) -> Result<Option<TestReport>> {
        Ok(None)
    }

    fn base_url(&self) -> &str {
        "https://jenkins.example.com"
    }
}

struct FakeBackend {
    calls: AtomicUsize,
    response: std::result::Result<String, String>,
    sanity_ok: bool,
}

impl FakeBackend {
    fn returning(text: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Ok(text.to_string()),
            sanity_ok: true,
        })
    }

    fn failing(detail: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Err(detail.to_string()),
            sanity_ok: true,
        })
    }

    fn with_bad_sanity() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            response: Ok("{}".to_string()),
            sanity_ok: false,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for FakeBackend {
    async fn invoke(
        &self,
        _prompt: &str,
        _workdir: Option<&Path>,
    ) -> std::result::Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(detail) => Err(BackendError::Failed {
                provider: "FAKE (model)".to_string(),
                detail: detail.clone(),
            }),
        }
    }

    async fn sanity_check(&self) -> std::result::Result<(), BackendError> {
        if self.sanity_ok {
            Ok(())
        } else {
            Err(BackendError::Failed {
                provider: "FAKE (model)".to_string(),
                detail: "sanity check failed".to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        "FAKE (model)".to_string()
    }
}

fn analyzer_with(source: impl BuildSource + 'static, backend: Arc<FakeBackend>) -> Analyzer {
    Analyzer::new(
        Arc::new(source),
        backend,
        BoundedExecutor::new(10),
        DEFAULT_MAX_DEPTH,
        None,
    )
}

fn failure(name: &str, error: &str, stack: &str) -> TestFailure {
    TestFailure {
        test_name: name.to_string(),
        error_message: error.to_string(),
        stack_trace: stack.to_string(),
        duration: 0.5,
        status: "FAILED".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_passed_root_short_circuits_with_no_verdicts() {
    let source = MapSource::new().with_build("demo", 1, "SUCCESS", &[]);
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("demo", 1).await.unwrap();

    assert!(node.verdicts.is_empty());
    assert!(node.children.is_empty());
    assert!(node.summary.unwrap().contains("passed successfully"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_failures_sharing_a_signature_get_one_backend_call() {
    // 5 failures, 3 sharing one signature and 2 each unique: 3 calls, not 5.
    let failures = vec![
        failure("tests.t1", "shared error", "frame"),
        failure("tests.t2", "shared error", "frame"),
        failure("tests.t3", "shared error", "frame"),
        failure("tests.t4", "unique error one", "frame"),
        failure("tests.t5", "unique error two", "frame"),
    ];
    let source = MapSource::new()
        .with_build("demo", 2, "FAILURE", &[])
        .with_console("demo", 2, "ERROR: tests failed")
        .with_report("demo", 2, failures);
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("demo", 2).await.unwrap();

    assert_eq!(backend.calls(), 3);
    assert_eq!(node.verdicts.len(), 5);
    assert!(node.summary.unwrap().contains("3 unique error type(s)"));

    let by_name: HashMap<&str, _> = node
        .verdicts
        .iter()
        .map(|v| (v.test_name.as_str(), &v.verdict))
        .collect();
    assert_eq!(by_name["tests.t1"], by_name["tests.t2"]);
    assert_eq!(by_name["tests.t1"], by_name["tests.t3"]);
    match &by_name["tests.t1"].classification {
        Classification::CodeIssue { code_fix: Some(fix) } => {
            assert_eq!(fix.file, "tests/conftest.py");
        }
        other => panic!("expected code issue with fix, got {other:?}"),
    }
}

#[tokio::test]
async fn test_pipeline_with_failed_child_is_a_pure_aggregator() {
    let source = MapSource::new()
        .with_build("pipeline", 10, "FAILURE", &[("deploy", 4)])
        .with_build("deploy", 4, "FAILURE", &[])
        .with_console("deploy", 4, "ERROR: deploy exploded");
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("pipeline", 10).await.unwrap();

    assert!(node.verdicts.is_empty());
    assert_eq!(node.children.len(), 1);
    assert!(node.summary.unwrap().contains("1 failed child job"));

    let child = &node.children[0];
    assert_eq!(child.job_name, "deploy");
    assert_eq!(child.verdicts.len(), 1);
    assert_eq!(child.verdicts[0].error, "Console-only analysis");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_aggregator_rule_skips_own_failures_when_children_failed() {
    // A pipeline build with failed children is never analyzed directly, even
    // if it has a test report of its own.
    let source = MapSource::new()
        .with_build("pipeline", 11, "FAILURE", &[("child", 1)])
        .with_report("pipeline", 11, vec![failure("tests.own", "boom", "s")])
        .with_build("child", 1, "FAILURE", &[])
        .with_console("child", 1, "ERROR: broken");
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("pipeline", 11).await.unwrap();

    assert!(node.verdicts.is_empty());
    assert_eq!(node.children.len(), 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_unbounded_child_chain_stops_at_max_depth() {
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(ChainSource, Arc::clone(&backend));

    let node = analyzer.analyze("chain", 1).await.unwrap();

    let mut current = &node;
    let mut hops = 0;
    while current.note.is_none() {
        assert_eq!(current.children.len(), 1, "each level has exactly one child");
        current = &current.children[0];
        hops += 1;
        assert!(hops < 10, "walker did not terminate");
    }

    // Root, then max_depth walked generations, then the terminal node.
    assert_eq!(hops, DEFAULT_MAX_DEPTH + 1);
    assert!(current.note.as_ref().unwrap().contains("Max depth reached"));
    assert_eq!(node.verdict_count(), 0);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_root_fetch_error_fails_the_run() {
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(MapSource::new(), backend);

    let err = analyzer.analyze("ghost", 1).await.unwrap_err();

    match err {
        TriageError::Fetch { kind, .. } => assert_eq!(kind, FetchErrorKind::NotFound),
        other => panic!("expected fetch error, got {other}"),
    }
}

#[tokio::test]
async fn test_child_fetch_error_does_not_stop_siblings() {
    let source = MapSource::new()
        .with_build("pipeline", 3, "FAILURE", &[("ghost", 7), ("real", 8)])
        .with_build("real", 8, "FAILURE", &[])
        .with_console("real", 8, "ERROR: flaky network");
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("pipeline", 3).await.unwrap();

    assert_eq!(node.children.len(), 2);
    let ghost = &node.children[0];
    assert!(ghost
        .note
        .as_ref()
        .unwrap()
        .contains("Failed to get build info"));
    assert!(ghost.verdicts.is_empty());

    let real = &node.children[1];
    assert_eq!(real.verdicts.len(), 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_backend_failure_becomes_an_unknown_verdict() {
    let source = MapSource::new()
        .with_build("demo", 4, "FAILURE", &[])
        .with_report("demo", 4, vec![failure("tests.t", "boom", "s")]);
    let backend = FakeBackend::failing("quota exhausted");
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("demo", 4).await.unwrap();

    assert_eq!(node.verdicts.len(), 1);
    let verdict = &node.verdicts[0].verdict;
    assert_eq!(verdict.classification, Classification::Unknown);
    assert!(verdict.narrative.contains("quota exhausted"));
}

#[tokio::test]
async fn test_sanity_check_failure_aborts_before_the_fan_out() {
    let source = MapSource::new()
        .with_build("demo", 5, "FAILURE", &[])
        .with_report("demo", 5, vec![failure("tests.t", "boom", "s")]);
    let backend = FakeBackend::with_bad_sanity();
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let err = analyzer.analyze("demo", 5).await.unwrap_err();

    assert!(matches!(err, TriageError::Backend(_)));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_children_found_in_console_when_metadata_has_none() {
    let source = MapSource::new()
        .with_build("pipeline", 6, "FAILURE", &[])
        .with_console(
            "pipeline",
            6,
            "Build workers » deploy #21 completed: FAILURE\n",
        )
        .with_build("workers/deploy", 21, "FAILURE", &[])
        .with_console("workers/deploy", 21, "ERROR: out of disk");
    let backend = FakeBackend::returning(CODE_ISSUE_RESPONSE);
    let analyzer = analyzer_with(source, Arc::clone(&backend));

    let node = analyzer.analyze("pipeline", 6).await.unwrap();

    assert_eq!(node.children.len(), 1);
    assert_eq!(node.children[0].job_name, "workers/deploy");
    assert_eq!(node.children[0].build_number, 21);
}
