//! Byte accounting and bidirectional relay for hostgate tunnels.
//!
//! [`MeteredStream`] wraps any tokio stream and counts the bytes that pass
//! through it in each direction. [`relay`] pumps two metered streams into
//! each other until both directions have finished and reports how many bytes
//! crossed in each direction.
//!
//! ```text
//!  client  <-->  MeteredStream(a)  ==relay==  MeteredStream(b)  <-->  target
//! ```

pub mod metered;
pub mod relay;

pub use metered::{Meter, MeteredStream};
pub use relay::{relay, RelayTotals};
