mod cli;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use tunnel_proxy::{HttpProxy, HttpProxyConfig, SocksProxy, SocksProxyConfig};

use crate::cli::Cli;

/// How long to wait for the connection log to drain on exit.
const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let (mut cfg, cfg_source) = config::load(&cli.config)?;
    cfg.apply_cli(&cli);

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    if cfg_source == config::ConfigSource::Defaults {
        tracing::warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    info!(
        config_file = %cli.config.display(),
        blocklist = %cfg.blocklist_file.display(),
        http = %cfg.http.listen_addr,
        socks = cfg.socks.enabled.then_some(cfg.socks.listen_addr.as_str()),
        "hostgate starting"
    );

    // 4. Resolve addresses before touching the filesystem.
    let http_addr = config::parse_listen_addr(&cfg.http.listen_addr, "HTTP")?;
    let http_outbound = config::parse_outbound(cfg.http.upstream.as_deref())?;
    let socks_addr = config::parse_listen_addr(&cfg.socks.listen_addr, "SOCKS")?;
    let socks_outbound = config::parse_outbound(cfg.socks.upstream.as_deref())?;

    // 5. Load the blocklist. Starting without one would block nothing.
    let policy = host_policy::loader::load_policy(&cfg.blocklist_file)
        .context("failed to load blocklist")?;
    let policy = Arc::new(policy);

    // 6. Start the connection log, if configured.
    let (audit, audit_handle) = match cfg.logging.audit_log_path {
        Some(ref path) => {
            let (sink, handle) = AuditSink::start(path)
                .await
                .with_context(|| format!("failed to start connection log {}", path.display()))?;
            (sink, Some(handle))
        }
        None => (AuditSink::disabled(), None),
    };

    // 7. Bind listeners.
    let http = HttpProxy::bind(HttpProxyConfig {
        listen_addr: http_addr,
        mode: cfg.http.mode,
        outbound: http_outbound,
        policy: Arc::clone(&policy),
        audit: audit.clone(),
    })
    .await
    .with_context(|| format!("failed to bind HTTP listener on {http_addr}"))?;

    let socks = if cfg.socks.enabled {
        let proxy = SocksProxy::bind(SocksProxyConfig {
            listen_addr: socks_addr,
            outbound: socks_outbound,
            policy: Arc::clone(&policy),
            audit: audit.clone(),
        })
        .await
        .with_context(|| format!("failed to bind SOCKS listener on {socks_addr}"))?;
        Some(proxy)
    } else {
        info!("SOCKS listener disabled");
        None
    };

    audit
        .log(AuditEntry::new(
            AuditEventType::ProxyStarted,
            AuditSource::new("hostgate"),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
                "blocklist_entries": policy.len(),
                "http_mode": format!("{:?}", cfg.http.mode),
                "socks_enabled": socks.is_some(),
            }),
        ))
        .await;

    // 8. Serve until a listener stops or a shutdown signal arrives.
    let socks_run = async move {
        match socks {
            Some(proxy) => proxy.run().await,
            None => std::future::pending().await,
        }
    };

    let reason = tokio::select! {
        _ = http.run() => "http listener exited",
        _ = socks_run => "socks listener exited",
        signal = shutdown_signal() => signal?,
    };

    // 9. Log shutdown.
    info!(reason, "hostgate shutting down");

    audit
        .log(AuditEntry::new(
            AuditEventType::ProxyStopped,
            AuditSource::new("hostgate"),
            serde_json::json!({ "reason": reason }),
        ))
        .await;
    drop(audit);

    if let Some(handle) = audit_handle {
        if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, handle).await.is_err() {
            tracing::warn!("connection log still busy at exit; recent entries may be lost");
        }
    }

    Ok(())
}

/// Resolve once SIGINT (or SIGTERM on unix) arrives.
async fn shutdown_signal() -> Result<&'static str> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to register SIGTERM handler")?;

        tokio::select! {
            r = ctrl_c => {
                r.context("failed to listen for ctrl-c")?;
                Ok("received SIGINT (ctrl-c)")
            }
            _ = sigterm.recv() => Ok("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for ctrl-c")?;
        Ok("received SIGINT (ctrl-c)")
    }
}
