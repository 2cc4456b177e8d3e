//! Ingress handlers for the hostgate proxy.
//!
//! Two listeners are provided:
//!
//! - [`HttpProxy`] accepts HTTP/1.1. A `CONNECT` request opens an opaque
//!   tunnel; in [`HttpMode::Forward`] any other request is re-issued against
//!   its origin and the response streamed back.
//! - [`SocksProxy`] accepts SOCKS5 `CONNECT` requests without
//!   authentication. By default its outbound leg goes through a second SOCKS5
//!   hop.
//!
//! ```text
//!  client --HTTP/CONNECT--> HttpProxy  --direct-->  target
//!  client --SOCKS5-------->  SocksProxy --SOCKS5-->  upstream --> target
//!                               |
//!                         [HostPolicy]  [AuditSink]
//! ```
//!
//! Every handler consults the shared [`host_policy::HostPolicy`] before
//! dialing. Blocked targets receive `HTTP/1.1 418 I'm a teapot`. Tunnels are
//! relayed by [`relay_engine::relay`] and their byte totals recorded in the
//! connection's [`ConnectionContext`].

pub mod connect;
pub mod context;
pub mod error;
pub mod forward;
pub mod head;
pub mod listener;
pub mod outbound;
pub mod socks;

pub use context::{client_identity, ConnectionContext, Outcome, Protocol};
pub use error::{DialError, HandshakeError};
pub use forward::Forwarder;
pub use listener::{HttpMode, HttpProxy, HttpProxyConfig, SocksProxy, SocksProxyConfig};
pub use outbound::{Outbound, OutboundStream};
