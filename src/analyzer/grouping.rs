use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::models::TestFailure;

/// Dedup key for a test failure: two failures with the same signature are
/// treated as the same root cause. Hash collisions are accepted as "same
/// cause" rather than guarded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FailureSignature(String);

impl std::fmt::Display for FailureSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 over the error message plus the first 5 stack-trace lines.
pub fn signature(failure: &TestFailure) -> FailureSignature {
    let stack_head: Vec<&str> = failure.stack_trace.lines().take(5).collect();
    let text = format!("{}|{}", failure.error_message, stack_head.join("|"));
    FailureSignature(hex::encode(Sha256::digest(text.as_bytes())))
}

/// Group failures by signature, preserving first-seen order so the analysis
/// fan-out is deterministic. The union of all groups is exactly the input
/// list.
pub fn group_by_signature(failures: Vec<TestFailure>) -> IndexMap<FailureSignature, Vec<TestFailure>> {
    let mut groups: IndexMap<FailureSignature, Vec<TestFailure>> = IndexMap::new();
    for failure in failures {
        groups.entry(signature(&failure)).or_default().push(failure);
    }
    groups
}
