/// The outcome of checking a destination against the blocklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No entry covers the destination.
    Allow,
    /// The destination is covered by `entry`.
    Block { entry: String },
}

impl Verdict {
    /// Returns `true` for [`Verdict::Block`].
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    /// The entry that caused the block, if any.
    pub fn entry(&self) -> Option<&str> {
        match self {
            Verdict::Allow => None,
            Verdict::Block { entry } => Some(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_has_no_entry() {
        let v = Verdict::Allow;
        assert!(!v.is_blocked());
        assert!(v.entry().is_none());
    }

    #[test]
    fn block_carries_entry() {
        let v = Verdict::Block {
            entry: "ads.example".to_string(),
        };
        assert!(v.is_blocked());
        assert_eq!(v.entry(), Some("ads.example"));
    }
}
