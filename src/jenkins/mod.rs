mod client;
pub mod types;

pub use client::{BuildSource, JenkinsClient};

use crate::error::{Result, TriageError};

/// Browser/API URL for a build, expanding folder job names: `a/b` #3 becomes
/// `<base>/job/a/job/b/3/`.
pub fn build_url(base_url: &str, job_name: &str, build_number: u32) -> String {
    let job_path = job_name.split('/').collect::<Vec<_>>().join("/job/");
    format!(
        "{}/job/{}/{}/",
        base_url.trim_end_matches('/'),
        job_path,
        build_number
    )
}

/// Parse a Jenkins build URL back into `(job_name, build_number)`, handling
/// nested folders: `.../job/folder/job/my-job/456` yields `folder/my-job`.
pub fn parse_build_url(url: &str) -> Result<(String, u32)> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TriageError::Api(format!("Invalid Jenkins URL '{url}': {e}")))?;
    let parts: Vec<&str> = parsed
        .path()
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let build_number: u32 = parts
        .last()
        .and_then(|last| last.parse().ok())
        .ok_or_else(|| {
            TriageError::Api(format!("Could not parse build number from URL: {url}"))
        })?;

    let mut job_parts: Vec<&str> = Vec::new();
    let mut i = 0;
    while i + 1 < parts.len() {
        if parts[i] == "job" {
            job_parts.push(parts[i + 1]);
            i += 2;
        } else {
            i += 1;
        }
    }

    let job_name = if job_parts.is_empty() {
        // Not a /job/ style path; assume the segment before the build number.
        if parts.len() < 2 {
            return Err(TriageError::Api(format!("Invalid Jenkins URL format: {url}")));
        }
        parts[parts.len() - 2].to_string()
    } else {
        job_parts.join("/")
    };

    Ok((job_name, build_number))
}
