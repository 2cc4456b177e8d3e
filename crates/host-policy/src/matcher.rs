use std::collections::BTreeSet;

/// Find the shortest entry in `entries` that equals `candidate` or is a
/// prefix of it.
///
/// Every prefix of `candidate` that ends on a char boundary is looked up in
/// the set, so the cost is bounded by the candidate length rather than the
/// number of entries. Comparison is byte-exact and case-sensitive.
pub fn find_prefix<'a>(entries: &'a BTreeSet<String>, candidate: &str) -> Option<&'a str> {
    if candidate.is_empty() {
        return None;
    }

    candidate
        .char_indices()
        .map(|(idx, ch)| idx + ch.len_utf8())
        .find_map(|end| entries.get(&candidate[..end]))
        .map(String::as_str)
}

/// Check whether `candidate` is covered by any entry (exact or prefix match).
pub fn is_prefix_match(entries: &BTreeSet<String>, candidate: &str) -> bool {
    find_prefix(entries, candidate).is_some()
}

/// Split an `host:port` authority into host and port.
///
/// Bracketed IPv6 literals (`[::1]:443`) are unwrapped. Returns `None` when
/// there is no port, or the port is not a valid `u16`.
pub fn split_host_port(authority: &str) -> Option<(&str, u16)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let port = rest[end + 1..].strip_prefix(':')?.parse().ok()?;
        return Some((host, port));
    }

    let (host, port) = authority.rsplit_once(':')?;
    // A bare IPv6 literal has more than one colon and no brackets.
    if host.contains(':') || host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // ---- prefix matching ----

    #[test]
    fn exact_entry_matches() {
        let entries = set(&["blocked.example"]);
        assert!(is_prefix_match(&entries, "blocked.example"));
    }

    #[test]
    fn bare_host_blocks_every_port() {
        let entries = set(&["blocked.example"]);
        assert!(is_prefix_match(&entries, "blocked.example:443"));
        assert!(is_prefix_match(&entries, "blocked.example:80"));
    }

    #[test]
    fn host_port_entry_only_blocks_that_port() {
        let entries = set(&["blocked.example:8443"]);
        assert!(is_prefix_match(&entries, "blocked.example:8443"));
        assert!(!is_prefix_match(&entries, "blocked.example:443"));
        assert!(!is_prefix_match(&entries, "blocked.example"));
    }

    #[test]
    fn disjoint_hosts_are_not_matched() {
        let entries = set(&["blocked.example", "tracker.net"]);
        assert!(!is_prefix_match(&entries, "allowed.example:443"));
        assert!(!is_prefix_match(&entries, "www.blocked.example"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let entries = set(&["blocked.example"]);
        assert!(!is_prefix_match(&entries, "Blocked.example"));
    }

    #[test]
    fn empty_candidate_never_matches() {
        let entries = set(&["a"]);
        assert!(!is_prefix_match(&entries, ""));
    }

    #[test]
    fn shortest_entry_is_reported() {
        let entries = set(&["ads.", "ads.example.com"]);
        assert_eq!(find_prefix(&entries, "ads.example.com:443"), Some("ads."));
    }

    #[test]
    fn multibyte_candidates_are_walked_on_char_boundaries() {
        let entries = set(&["bücher"]);
        assert!(is_prefix_match(&entries, "bücher.de:443"));
        assert!(!is_prefix_match(&entries, "bü"));
    }

    // ---- host/port splitting ----

    #[test]
    fn split_plain_host_port() {
        assert_eq!(split_host_port("example.com:443"), Some(("example.com", 443)));
    }

    #[test]
    fn split_bracketed_ipv6() {
        assert_eq!(split_host_port("[::1]:8080"), Some(("::1", 8080)));
    }

    #[test]
    fn split_rejects_missing_or_bad_port() {
        assert_eq!(split_host_port("example.com"), None);
        assert_eq!(split_host_port("example.com:http"), None);
        assert_eq!(split_host_port("example.com:70000"), None);
        assert_eq!(split_host_port(":443"), None);
        assert_eq!(split_host_port("::1"), None);
        assert_eq!(split_host_port("[::1]"), None);
    }
}
