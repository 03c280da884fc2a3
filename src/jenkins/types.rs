//! Serde models for the Jenkins JSON API, plus extraction helpers for the
//! shapes the walker cares about: failed child builds and failing test cases.

use serde::Deserialize;

use crate::models::TestFailure;

const FAILED_RESULTS: [&str; 2] = ["FAILURE", "UNSTABLE"];

/// Subset of `GET .../api/json` for one build.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    #[serde(default)]
    pub result: Option<String>,

    /// Child builds reported by the Pipeline plugin.
    #[serde(default)]
    pub sub_builds: Vec<SubBuild>,

    /// Jenkins emits `null` entries in the actions array.
    #[serde(default)]
    pub actions: Vec<Option<Action>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubBuild {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub job_name: String,
    #[serde(default)]
    pub build_number: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default, rename = "_class")]
    pub class_name: String,
    /// Builds triggered by older plugins (parameterized trigger and friends).
    #[serde(default)]
    pub triggered_builds: Vec<TriggeredBuild>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredBuild {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub build_number: Option<u32>,
}

/// Subset of `GET .../testReport/api/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    #[serde(default)]
    pub suites: Vec<Suite>,

    /// Some configurations nest per-child reports instead of flattening
    /// suites at the top level.
    #[serde(default)]
    pub child_reports: Vec<ChildReport>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildReport {
    #[serde(default)]
    pub result: Option<ChildReportResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildReportResult {
    #[serde(default)]
    pub suites: Vec<Suite>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suite {
    #[serde(default)]
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error_details: Option<String>,
    #[serde(default)]
    pub error_stack_trace: Option<String>,
    #[serde(default)]
    pub duration: f64,
}

fn is_failed(result: Option<&str>) -> bool {
    result.is_some_and(|r| FAILED_RESULTS.contains(&r))
}

/// Failed child builds from structured build metadata: `subBuilds` first,
/// then `triggeredBuilds` hanging off actions, recovering the job name from
/// the build URL when the field is missing.
pub fn extract_failed_children(info: &BuildInfo) -> Vec<(String, u32)> {
    let mut children: Vec<(String, u32)> = Vec::new();

    for sub in &info.sub_builds {
        if is_failed(sub.result.as_deref()) && !sub.job_name.is_empty() && sub.build_number > 0 {
            children.push((sub.job_name.clone(), sub.build_number));
        }
    }

    for action in info.actions.iter().flatten() {
        if action.triggered_builds.is_empty() && !action.class_name.contains("BuildAction") {
            continue;
        }
        for triggered in &action.triggered_builds {
            if !is_failed(triggered.result.as_deref()) {
                continue;
            }
            let job_name = match &triggered.job_name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => match triggered.url.as_deref().and_then(|u| super::parse_build_url(u).ok()) {
                    Some((name, _)) => name,
                    None => continue,
                },
            };
            let number = triggered.number.or(triggered.build_number).unwrap_or(0);
            if number > 0 {
                children.push((job_name, number));
            }
        }
    }

    children
}

/// All FAILED and REGRESSION cases from a test report, with fully qualified
/// names.
pub fn extract_failures(report: &TestReport) -> Vec<TestFailure> {
    let nested = report
        .child_reports
        .iter()
        .filter_map(|c| c.result.as_ref())
        .flat_map(|r| r.suites.iter());

    report
        .suites
        .iter()
        .chain(nested)
        .flat_map(|suite| suite.cases.iter())
        .filter(|case| case.status == "FAILED" || case.status == "REGRESSION")
        .map(|case| {
            let test_name = if case.class_name.is_empty() {
                case.name.clone()
            } else {
                format!("{}.{}", case.class_name, case.name)
            };
            TestFailure {
                test_name,
                error_message: case.error_details.clone().unwrap_or_default(),
                stack_trace: case.error_stack_trace.clone().unwrap_or_default(),
                duration: case.duration,
                status: case.status.clone(),
            }
        })
        .collect()
}
