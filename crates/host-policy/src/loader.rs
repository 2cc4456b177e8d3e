use std::path::Path;

use crate::policy::{HostPolicy, PolicyError};

/// Load a [`HostPolicy`] from a blocklist file on disk.
///
/// The file holds one pattern per line. Loading is all-or-nothing: any I/O
/// error, including a missing file, is returned to the caller.
pub fn load_policy(path: impl AsRef<Path>) -> Result<HostPolicy, PolicyError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let policy = parse_policy(&contents);
    tracing::info!(
        path = %path.display(),
        entries = policy.len(),
        "blocklist loaded"
    );
    Ok(policy)
}

/// Parse blocklist text.
///
/// Each line is trimmed. Blank lines and lines starting with `#` are skipped.
pub fn parse_policy(contents: &str) -> HostPolicy {
    HostPolicy::new(
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#')),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_trims_and_skips_blank_lines() {
        let policy = parse_policy("  ads.example  \n\n\ttracker.net\t\r\n   \n");
        assert_eq!(
            policy.entries().collect::<Vec<_>>(),
            vec!["ads.example", "tracker.net"]
        );
    }

    #[test]
    fn parse_skips_comments() {
        let policy = parse_policy("# ad networks\nads.example\n  # indented comment\n");
        assert_eq!(policy.len(), 1);
        assert!(policy.is_blocked("ads.example:443"));
    }

    #[test]
    fn parse_deduplicates() {
        let policy = parse_policy("a.example\nb.example\na.example\n");
        assert_eq!(policy.len(), 2);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "blocked.example").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  10.1.2.3:22  ").unwrap();

        let policy = load_policy(file.path()).unwrap();
        assert_eq!(policy.len(), 2);
        assert!(policy.is_blocked("blocked.example:443"));
        assert!(policy.is_blocked("10.1.2.3:22"));
        assert!(!policy.is_blocked("10.1.2.3:80"));
    }

    #[test]
    fn load_empty_file_is_an_empty_policy() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let policy = load_policy(file.path()).unwrap();
        assert!(policy.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_policy("/does/not/exist/blacklist.txt").unwrap_err();
        assert!(
            err.to_string().contains("failed to read blocklist"),
            "unexpected error: {err}"
        );
        let PolicyError::Read { source, .. } = err;
        assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
    }
}
