mod client;
mod matcher;

pub use client::{IssueCandidate, IssueTracker, JiraAuth, JiraClient};
pub use matcher::attach_issue_matches;
