use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tunnel_proxy::{HttpMode, Outbound};

use crate::cli::Cli;

/// Value of an upstream setting that means "dial the target directly".
const DIRECT: &str = "direct";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_blocklist_file")]
    pub blocklist_file: PathBuf,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub socks: SocksConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocklist_file: default_blocklist_file(),
            http: HttpConfig::default(),
            socks: SocksConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_listen")]
    pub listen_addr: String,
    #[serde(default)]
    pub mode: HttpMode,
    /// SOCKS5 server for CONNECT tunnels; `None` dials directly.
    #[serde(default)]
    pub upstream: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_listen(),
            mode: HttpMode::default(),
            upstream: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SocksConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_socks_listen")]
    pub listen_addr: String,
    /// SOCKS5 server for SOCKS tunnels; `None` dials directly.
    #[serde(default = "default_socks_upstream")]
    pub upstream: Option<String>,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            listen_addr: default_socks_listen(),
            upstream: default_socks_upstream(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// JSON-lines connection log; disabled when unset.
    #[serde(default)]
    pub audit_log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            audit_log_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_blocklist_file() -> PathBuf {
    PathBuf::from("blacklist.txt")
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_socks_listen() -> String {
    "0.0.0.0:1081".to_string()
}

fn default_socks_upstream() -> Option<String> {
    Some("127.0.0.1:1080".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Where the loaded settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// The file does not exist.
    Defaults,
}

/// Load configuration from a YAML file.
///
/// A missing file yields the defaults. Runs before logging is set up, so the
/// caller reports [`ConfigSource::Defaults`] once the subscriber exists.
pub fn load(path: &Path) -> anyhow::Result<(Config, ConfigSource)> {
    if !path.exists() {
        return Ok((Config::default(), ConfigSource::Defaults));
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let cfg = serde_yml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok((cfg, ConfigSource::File))
}

impl Config {
    /// Apply command-line overrides on top of the file settings.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(ref blocklist) = cli.blocklist {
            self.blocklist_file = blocklist.clone();
        }
        if let Some(ref listen) = cli.http_listen {
            self.http.listen_addr = listen.clone();
        }
        if let Some(mode) = cli.http_mode {
            self.http.mode = mode.into();
        }
        if let Some(port) = cli.port {
            self.http.listen_addr = with_port(&self.http.listen_addr, port);
        }
        if let Some(ref listen) = cli.socks_listen {
            self.socks.listen_addr = listen.clone();
        }
        if let Some(ref upstream) = cli.socks_upstream {
            self.socks.upstream = Some(upstream.clone());
        }
        if cli.no_socks {
            self.socks.enabled = false;
        }
    }
}

/// Replace (or add) the port of a `host:port` listen address.
fn with_port(addr: &str, port: u16) -> String {
    let host = match addr.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        Some(_) => "0.0.0.0",
        None => addr,
    };
    format!("{host}:{port}")
}

pub fn parse_listen_addr(addr: &str, what: &str) -> anyhow::Result<SocketAddr> {
    addr.parse()
        .with_context(|| format!("invalid {what} listen address {addr:?}"))
}

/// `None` or `direct` dial directly; anything else names a SOCKS5 server.
pub fn parse_outbound(upstream: Option<&str>) -> anyhow::Result<Outbound> {
    match upstream {
        None => Ok(Outbound::Direct),
        Some(value) if value.eq_ignore_ascii_case(DIRECT) => Ok(Outbound::Direct),
        Some(value) => {
            let proxy = value
                .parse()
                .with_context(|| format!("invalid SOCKS5 upstream address {value:?}"))?;
            Ok(Outbound::Socks5 { proxy })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (cfg, source) = load(&dir.path().join("absent.yaml")).unwrap();

        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(cfg.blocklist_file, PathBuf::from("blacklist.txt"));
        assert_eq!(cfg.http.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.http.mode, HttpMode::Forward);
        assert!(cfg.http.upstream.is_none());
        assert!(cfg.socks.enabled);
        assert_eq!(cfg.socks.listen_addr, "0.0.0.0:1081");
        assert_eq!(cfg.socks.upstream.as_deref(), Some("127.0.0.1:1080"));
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.logging.audit_log_path.is_none());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostgate.yaml");
        std::fs::write(
            &path,
            "blocklist_file: /etc/hostgate/blocked.txt\n\
             http:\n  mode: tunnel_only\n\
             socks:\n  upstream: null\n\
             logging:\n  audit_log_path: /var/log/hostgate.jsonl\n",
        )
        .unwrap();

        let (cfg, source) = load(&path).unwrap();
        assert_eq!(source, ConfigSource::File);
        assert_eq!(cfg.blocklist_file, PathBuf::from("/etc/hostgate/blocked.txt"));
        assert_eq!(cfg.http.mode, HttpMode::TunnelOnly);
        assert_eq!(cfg.http.listen_addr, "0.0.0.0:8080");
        assert!(cfg.socks.upstream.is_none());
        assert!(cfg.socks.enabled);
        assert_eq!(
            cfg.logging.audit_log_path,
            Some(PathBuf::from("/var/log/hostgate.jsonl"))
        );
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostgate.yaml");
        std::fs::write(&path, "http: [not, a, map]\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn cli_overrides_file_settings() {
        let cli = Cli::try_parse_from([
            "hostgate",
            "--blocklist",
            "other.txt",
            "--http-listen",
            "127.0.0.1:3128",
            "--http-mode",
            "tunnel-only",
            "--port",
            "9000",
            "--socks-upstream",
            "direct",
            "--no-socks",
        ])
        .unwrap();

        let mut cfg = Config::default();
        cfg.apply_cli(&cli);

        assert_eq!(cfg.blocklist_file, PathBuf::from("other.txt"));
        assert_eq!(cfg.http.listen_addr, "127.0.0.1:9000");
        assert_eq!(cfg.http.mode, HttpMode::TunnelOnly);
        assert_eq!(cfg.socks.upstream.as_deref(), Some("direct"));
        assert!(!cfg.socks.enabled);
    }

    #[test]
    fn port_replaces_only_the_port() {
        assert_eq!(with_port("0.0.0.0:8080", 80), "0.0.0.0:80");
        assert_eq!(with_port("[::]:8080", 80), "[::]:80");
        assert_eq!(with_port(":8080", 80), "0.0.0.0:80");
    }

    #[test]
    fn outbound_parsing() {
        assert_eq!(parse_outbound(None).unwrap(), Outbound::Direct);
        assert_eq!(parse_outbound(Some("direct")).unwrap(), Outbound::Direct);
        assert_eq!(
            parse_outbound(Some("127.0.0.1:1080")).unwrap(),
            Outbound::Socks5 {
                proxy: "127.0.0.1:1080".parse().unwrap()
            }
        );
        assert!(parse_outbound(Some("localhost")).is_err());
    }

    #[test]
    fn listen_addr_errors_name_the_listener() {
        let err = parse_listen_addr("nowhere", "SOCKS").unwrap_err();
        assert!(err.to_string().contains("invalid SOCKS listen address"));
    }
}
