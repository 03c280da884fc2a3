use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

use super::types::{BuildInfo, TestReport};
use crate::error::{FetchErrorKind, Result, TriageError};

/// Read-only view of a CI server, as much of it as the walker needs. The
/// production implementation is [`JenkinsClient`]; tests substitute fakes.
#[async_trait]
pub trait BuildSource: Send + Sync {
    async fn build_info(&self, job_name: &str, build_number: u32) -> Result<BuildInfo>;

    async fn console_text(&self, job_name: &str, build_number: u32) -> Result<String>;

    /// Structured test report, `None` when the build has none. Absence is
    /// not an error.
    async fn test_report(&self, job_name: &str, build_number: u32) -> Result<Option<TestReport>>;

    fn base_url(&self) -> &str;
}

/// Jenkins REST client authenticated with username + API token.
#[derive(Clone)]
pub struct JenkinsClient {
    client: Client,
    base_url: String,
    username: String,
    token: String,
}

impl JenkinsClient {
    pub fn new(base_url: &str, username: &str, token: &str, ssl_verify: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("citriage/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!ssl_verify)
            .build()
            .map_err(|e| TriageError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            token: token.to_string(),
        })
    }

    fn api_url(&self, job_name: &str, build_number: u32, suffix: &str) -> String {
        format!(
            "{}{}",
            super::build_url(&self.base_url, job_name, build_number),
            suffix
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await
            .map_err(|e| TriageError::fetch(FetchErrorKind::Transport, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(classify_status(status, url))
    }
}

fn classify_status(status: StatusCode, url: &str) -> TriageError {
    match status {
        StatusCode::NOT_FOUND => {
            TriageError::fetch(FetchErrorKind::NotFound, format!("{url} returned 404"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TriageError::fetch(
            FetchErrorKind::Auth,
            format!("{url} returned {status}; check Jenkins credentials and permissions"),
        ),
        _ => TriageError::fetch(FetchErrorKind::Protocol, format!("{url} returned {status}")),
    }
}

#[async_trait]
impl BuildSource for JenkinsClient {
    async fn build_info(&self, job_name: &str, build_number: u32) -> Result<BuildInfo> {
        let url = self.api_url(job_name, build_number, "api/json");
        debug!("GET {url}");
        let response = self.get(&url).await?;
        response
            .json()
            .await
            .map_err(|e| TriageError::fetch(FetchErrorKind::Protocol, e.to_string()))
    }

    async fn console_text(&self, job_name: &str, build_number: u32) -> Result<String> {
        let url = self.api_url(job_name, build_number, "consoleText");
        debug!("GET {url}");
        let response = self.get(&url).await?;
        response
            .text()
            .await
            .map_err(|e| TriageError::fetch(FetchErrorKind::Transport, e.to_string()))
    }

    async fn test_report(&self, job_name: &str, build_number: u32) -> Result<Option<TestReport>> {
        let url = self.api_url(job_name, build_number, "testReport/api/json");
        debug!("GET {url}");
        match self.get(&url).await {
            Ok(response) => {
                let report = response
                    .json()
                    .await
                    .map_err(|e| TriageError::fetch(FetchErrorKind::Protocol, e.to_string()))?;
                Ok(Some(report))
            }
            // No test report recorded for this build.
            Err(TriageError::Fetch {
                kind: FetchErrorKind::NotFound,
                ..
            }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
