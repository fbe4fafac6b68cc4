use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vicp_registry::AdminCredentials;
use vicp_rpc::{start_server, AppState};
use vicp_storage::{KeyValueStore, MemoryStore, SledStore};

mod config;

use config::{AppConfig, StoreBackend};

fn build_cli() -> Command {
    Command::new("vicp-node")
        .version(env!("CARGO_PKG_VERSION"))
        .about("VICP record registration service")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (defaults to config/vicp.toml when present)"),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override RPC bind host"),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override RPC port"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("BACKEND")
                .value_parser(["sled", "memory"])
                .help("Storage backend"),
        )
        .arg(
            Arg::new("db-path")
                .long("db-path")
                .value_name("DIR")
                .help("Sled database directory"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "compact"])
                .help("Select log output format"),
        )
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if let Some(store) = matches.get_one::<String>("store") {
        config.store_backend = store.clone();
    }

    if let Some(db_path) = matches.get_one::<String>("db-path") {
        config.db_path = db_path.clone();
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "compact" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config = load_config_with_overrides(&matches)?;

    init_logging(&config)?;

    info!("Starting VICP registry node v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config.config_path {
        info!("Config file: {}", path.display());
    } else {
        info!("Config file: (built-in defaults)");
    }

    let credentials = AdminCredentials::new(&config.admin_user, &config.admin_pass);
    let rpc_addr = config.rpc_addr();

    match config.backend()? {
        StoreBackend::Sled => {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                fs::create_dir_all(parent)?;
            }
            let store = Arc::new(
                SledStore::open(&config.db_path)
                    .with_context(|| format!("failed to open sled database at {}", config.db_path))?,
            );
            info!("Storage backend: sled ({})", config.db_path);

            let state = AppState::new(store.clone(), credentials, config.list_page_size);
            start_server(state, &rpc_addr, shutdown_signal()).await?;

            store.flush()?;
        }
        StoreBackend::Memory => {
            warn!("Storage backend: memory; records are lost on shutdown");
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            let state = AppState::new(store, credentials, config.list_page_size);
            start_server(state, &rpc_addr, shutdown_signal()).await?;
        }
    }

    info!("VICP registry node shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_replace_loaded_values() {
        let matches = build_cli()
            .try_get_matches_from([
                "vicp-node",
                "--rpc-host",
                "0.0.0.0",
                "--rpc-port",
                "9100",
                "--store",
                "memory",
                "--db-path",
                "/tmp/vicp",
                "--log-level",
                "debug",
                "--log-format",
                "compact",
            ])
            .unwrap();

        let mut config = AppConfig::load(None).unwrap();
        apply_overrides(&matches, &mut config);

        assert_eq!(config.rpc_addr(), "0.0.0.0:9100");
        assert_eq!(config.backend().unwrap(), StoreBackend::Memory);
        assert_eq!(config.db_path, "/tmp/vicp");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, "compact");
    }

    #[test]
    fn cli_rejects_unknown_backend() {
        assert!(build_cli()
            .try_get_matches_from(["vicp-node", "--store", "postgres"])
            .is_err());
    }

    #[test]
    fn missing_credentials_fail_startup_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vicp.toml");
        fs::write(&path, "[storage]\nbackend = \"memory\"\n").unwrap();

        let matches = build_cli()
            .try_get_matches_from(["vicp-node", "--config", path.to_str().unwrap()])
            .unwrap();
        let err = load_config_with_overrides(&matches).unwrap_err();
        assert!(err.to_string().contains("ADMIN_USER"));
    }
}
