use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::error::{Result, TriageError};

/// A tracker issue returned by a search, before relevance scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueCandidate {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub url: String,
}

/// Seam between the cross-reference pass and the issue tracker. The
/// production implementation is [`JiraClient`]; tests substitute fakes.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn search(&self, keywords: &[String]) -> Result<Vec<IssueCandidate>>;
}

/// Jira credentials. Cloud uses email + API token against REST API v3;
/// Server/DC uses a personal access token against v2.
#[derive(Debug, Clone)]
pub enum JiraAuth {
    Cloud { email: String, api_token: String },
    Server { pat: String },
}

/// HTTP client for the Jira REST search API.
pub struct JiraClient {
    client: Client,
    base_url: String,
    project_key: Option<String>,
    max_results: usize,
    auth: JiraAuth,
}

impl JiraClient {
    pub fn new(
        base_url: &str,
        project_key: Option<String>,
        max_results: usize,
        auth: JiraAuth,
        ssl_verify: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("citriage/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!ssl_verify)
            .build()
            .map_err(|e| TriageError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_key,
            max_results,
            auth,
        })
    }

    fn api_path(&self) -> &'static str {
        match self.auth {
            JiraAuth::Cloud { .. } => "/rest/api/3",
            JiraAuth::Server { .. } => "/rest/api/2",
        }
    }

    /// JQL of the form `(text ~ "kw1" OR text ~ "kw2")`, optionally scoped
    /// to the configured project, newest updates first.
    fn build_jql(&self, keywords: &[String]) -> String {
        let clauses = keywords
            .iter()
            .map(|kw| format!("text ~ \"{}\"", kw.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR ");
        let mut jql = format!("({clauses})");
        if let Some(project) = &self.project_key {
            jql = format!("project = \"{project}\" AND {jql}");
        }
        jql.push_str(" ORDER BY updated DESC");
        jql
    }

    fn parse_issue(&self, issue: &Value) -> IssueCandidate {
        let fields = issue.get("fields").cloned().unwrap_or_default();
        let name_of = |field: &str| -> String {
            fields
                .get(field)
                .and_then(|v| v.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let key = issue
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        IssueCandidate {
            url: format!("{}/browse/{key}", self.base_url),
            summary: fields
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            // Cloud v3 renders descriptions as a rich-text document; only
            // plain strings are kept.
            description: fields
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: name_of("status"),
            priority: name_of("priority"),
            key,
        }
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn search(&self, keywords: &[String]) -> Result<Vec<IssueCandidate>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let jql = self.build_jql(keywords);
        debug!("Jira search: {jql}");

        let url = format!("{}{}/search", self.base_url, self.api_path());
        let mut request = self.client.get(&url).query(&[
            ("jql", jql.as_str()),
            ("maxResults", &self.max_results.to_string()),
            ("fields", "summary,description,status,priority"),
        ]);
        request = match &self.auth {
            JiraAuth::Cloud { email, api_token } => request.basic_auth(email, Some(api_token)),
            JiraAuth::Server { pat } => request.bearer_auth(pat),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TriageError::Api(format!(
                "Jira search returned {status} for {url}"
            )));
        }

        let data: Value = response.json().await?;
        let candidates = data
            .get("issues")
            .and_then(Value::as_array)
            .map(|issues| issues.iter().map(|issue| self.parse_issue(issue)).collect())
            .unwrap_or_default();

        Ok(candidates)
    }
}
