//! # host-policy
//!
//! The static host blocklist for the hostgate proxy. The list is read once at
//! startup from a line-oriented text file and never changes afterwards, so a
//! loaded [`HostPolicy`] can be shared between connection tasks behind an
//! `Arc` without any locking.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use host_policy::loader;
//!
//! let policy = loader::load_policy("blacklist.txt").unwrap();
//! if policy.is_blocked("ads.example.com:443") {
//!     println!("blocked");
//! }
//! ```

mod decision;
pub mod loader;
pub mod matcher;
mod policy;

// Re-export primary public API at crate root.
pub use decision::Verdict;
pub use policy::{HostPolicy, PolicyError};
