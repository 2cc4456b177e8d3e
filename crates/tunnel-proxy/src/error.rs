use std::io;

use thiserror::Error;

/// A client broke protocol before a relay was established.
///
/// These only ever end the offending connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("method {0} is not accepted on this listener")]
    UnsupportedMethod(String),

    #[error("invalid target address {0:?}")]
    InvalidTarget(String),

    #[error("unsupported SOCKS version {0:#04x}")]
    SocksVersion(u8),

    #[error("client offered no acceptable SOCKS5 auth method")]
    NoAcceptableAuth,

    #[error("unsupported SOCKS5 command {0:#04x}")]
    SocksCommand(u8),

    #[error("unsupported SOCKS5 address type {0:#04x}")]
    AddressType(u8),

    #[error("client i/o failed during handshake: {0}")]
    Io(#[from] io::Error),
}

/// The outbound leg could not be opened.
#[derive(Debug, Error)]
#[error("failed to reach {target}: {source}")]
pub struct DialError {
    pub target: String,
    #[source]
    pub source: io::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_error_names_target() {
        let err = DialError {
            target: "example.com:443".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "failed to reach example.com:443: refused");
    }

    #[test]
    fn socks_codes_are_hex() {
        assert_eq!(
            HandshakeError::SocksCommand(2).to_string(),
            "unsupported SOCKS5 command 0x02"
        );
    }
}
