//! # opsync-server
//!
//! Sync gateway binary — opens the database, starts the materializer
//! loop, and serves the HTTP API until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use opsync_engine::notify::LogDispatcher;
use opsync_server::config::ServerConfig;
use opsync_server::server::OpsyncServer;
use opsync_server::{materialize_loop, metrics};
use opsync_store::connection::{new_file, ConnectionConfig};
use opsync_store::migrations::run_migrations;

/// Offline-first sync gateway.
#[derive(Parser, Debug)]
#[command(name = "opsync-server", about = "Offline-first sync gateway")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8700")]
    port: u16,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Seconds between materializer sweeps.
    #[arg(long, default_value = "300")]
    materialize_interval_secs: u64,

    /// How many days ahead to materialize occurrences.
    #[arg(long, default_value = "14")]
    materialize_window_days: u32,
}

impl Cli {
    fn default_db_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".opsync").join("opsync.db")
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let db_path = args.db_path.unwrap_or_else(Cli::default_db_path);
    ensure_parent_dir(&db_path)?;
    let db_str = db_path.to_string_lossy();
    let pool = new_file(&db_str, &ConnectionConfig::default())
        .context("Failed to open database")?;
    {
        let conn = pool.get().context("Failed to get DB connection")?;
        let _ = run_migrations(&conn).context("Failed to run migrations")?;
    }

    let metrics_handle = metrics::install_recorder();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        materialize_interval_secs: args.materialize_interval_secs,
        materialize_window_days: args.materialize_window_days,
        ..ServerConfig::default()
    };

    let server = OpsyncServer::new(config.clone(), pool.clone(), Arc::new(LogDispatcher))
        .with_metrics(metrics_handle);

    let materializer = materialize_loop::spawn(
        pool,
        config.materialize_interval_secs,
        config.materialize_window_days,
        server.shutdown().token(),
    );

    let (addr, serve_handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("opsync listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .drain(vec![serve_handle, materializer], std::time::Duration::from_secs(30))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_default_host() {
        let cli = Cli::parse_from(["opsync-server"]);
        assert_eq!(cli.host, "127.0.0.1");
    }

    #[test]
    fn cli_default_port() {
        let cli = Cli::parse_from(["opsync-server"]);
        assert_eq!(cli.port, 8700);
    }

    #[test]
    fn cli_custom_port() {
        let cli = Cli::parse_from(["opsync-server", "--port", "8080"]);
        assert_eq!(cli.port, 8080);
    }

    #[test]
    fn cli_db_path() {
        let cli = Cli::parse_from(["opsync-server", "--db-path", "/tmp/test.db"]);
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/test.db")));
    }

    #[test]
    fn cli_materializer_window() {
        let cli = Cli::parse_from(["opsync-server", "--materialize-window-days", "30"]);
        assert_eq!(cli.materialize_window_days, 30);
    }

    #[test]
    fn cli_db_path_defaults_to_none() {
        let cli = Cli::parse_from(["opsync-server"]);
        assert_eq!(cli.db_path, None);
    }
}
