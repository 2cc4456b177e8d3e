use std::collections::BTreeSet;
use std::path::PathBuf;

use thiserror::Error;

use crate::decision::Verdict;
use crate::matcher;

/// Errors raised while loading the blocklist.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The blocklist could not be opened or read. A missing file is fatal:
    /// starting with an empty policy would silently disable blocking.
    #[error("failed to read blocklist {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An immutable set of blocked host patterns.
///
/// A candidate (`host` or `host:port`) is blocked when any entry equals it or
/// is a prefix of it. No DNS resolution happens here; matching is purely
/// textual.
#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    entries: BTreeSet<String>,
}

impl HostPolicy {
    /// Build a policy from an iterator of patterns.
    ///
    /// Patterns are trimmed; empty patterns are discarded so that a stray
    /// blank line can never block every destination.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { entries }
    }

    /// Returns `true` if `candidate` is covered by any entry.
    pub fn is_blocked(&self, candidate: &str) -> bool {
        matcher::is_prefix_match(&self.entries, candidate)
    }

    /// The entry that blocks `candidate`, if any.
    pub fn matching_entry(&self, candidate: &str) -> Option<&str> {
        matcher::find_prefix(&self.entries, candidate)
    }

    /// Evaluate `candidate` and return a [`Verdict`].
    pub fn check(&self, candidate: &str) -> Verdict {
        match self.matching_entry(candidate) {
            Some(entry) => {
                tracing::debug!(candidate, entry, "destination matched blocklist");
                Verdict::Block {
                    entry: entry.to_string(),
                }
            }
            None => Verdict::Allow,
        }
    }

    /// Number of distinct entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_collapse() {
        let policy = HostPolicy::new(["a.example", "a.example", " a.example "]);
        assert_eq!(policy.len(), 1);
    }

    #[test]
    fn blank_patterns_are_dropped() {
        let policy = HostPolicy::new(["", "   ", "a.example"]);
        assert_eq!(policy.entries().collect::<Vec<_>>(), vec!["a.example"]);
        assert!(!policy.is_blocked("b.example"));
    }

    #[test]
    fn empty_policy_blocks_nothing() {
        let policy = HostPolicy::default();
        assert!(policy.is_empty());
        assert!(!policy.is_blocked("anything:443"));
        assert_eq!(policy.check("anything"), Verdict::Allow);
    }

    #[test]
    fn check_reports_matching_entry() {
        let policy = HostPolicy::new(["blocked.example"]);
        let verdict = policy.check("blocked.example:443");
        assert_eq!(verdict.entry(), Some("blocked.example"));
        assert!(policy.check("allowed.example:443") == Verdict::Allow);
    }

    #[test]
    fn blocked_iff_equal_or_prefixed() {
        let policy = HostPolicy::new(["blocked.example", "10.0.0.", "tracker.net:80"]);
        let cases = [
            ("blocked.example", true),
            ("blocked.example:443", true),
            ("blocked.examples.org", true),
            ("10.0.0.7:22", true),
            ("10.0.1.7:22", false),
            ("tracker.net:80", true),
            ("tracker.net:8080", true),
            ("tracker.net:443", false),
            ("allowed.example", false),
            ("", false),
        ];
        for (candidate, expected) in cases {
            assert_eq!(policy.is_blocked(candidate), expected, "candidate {candidate:?}");
        }
    }

    #[test]
    fn read_error_message_names_path() {
        let err = PolicyError::Read {
            path: PathBuf::from("/nope/blacklist.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/nope/blacklist.txt"), "unexpected message: {msg}");
        assert!(msg.contains("not found"));
    }
}
