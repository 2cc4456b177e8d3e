use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use tunnel_proxy::HttpMode;

#[derive(Parser, Debug)]
#[command(
    name = "hostgate",
    version,
    about = "Forward proxy (HTTP, CONNECT, SOCKS5) with a static host blocklist"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hostgate.yaml")]
    pub config: PathBuf,

    /// Path to the blocklist, one host pattern per line (overrides config file setting)
    #[arg(short, long)]
    pub blocklist: Option<PathBuf>,

    /// HTTP listener address (overrides config file setting)
    #[arg(long)]
    pub http_listen: Option<String>,

    /// What the HTTP listener does with non-CONNECT requests
    #[arg(long, value_enum)]
    pub http_mode: Option<ModeArg>,

    /// Port for the HTTP listener, applied after `--http-listen`
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// SOCKS5 listener address (overrides config file setting)
    #[arg(long)]
    pub socks_listen: Option<String>,

    /// Upstream SOCKS5 server for SOCKS tunnels, or `direct`
    #[arg(long)]
    pub socks_upstream: Option<String>,

    /// Do not start the SOCKS5 listener
    #[arg(long)]
    pub no_socks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Forward,
    TunnelOnly,
}

impl From<ModeArg> for HttpMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Forward => HttpMode::Forward,
            ModeArg::TunnelOnly => HttpMode::TunnelOnly,
        }
    }
}
