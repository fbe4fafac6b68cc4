use anyhow::Result;
use config::{Config, File as ConfigFile};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use vicp_registry::DEFAULT_LIST_PAGE_SIZE;

/// Config file picked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/vicp.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sled,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "sled" => Ok(StoreBackend::Sled),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("Unknown storage backend '{other}' (expected sled or memory)"),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            StoreBackend::Sled => "sled",
            StoreBackend::Memory => "memory",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_path: Option<PathBuf>,

    // RPC
    pub rpc_host: String,
    pub rpc_port: u16,

    // Storage
    pub store_backend: String,
    pub db_path: String,

    // Administration
    pub admin_user: String,
    pub admin_pass: String,
    pub list_page_size: usize,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl AppConfig {
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            Some(path)
        } else {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Some(path)
            } else {
                None
            }
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(config::Environment::with_prefix("VICP"));

        let config = builder.build()?;
        let mut app_config = Self::from_config(&config)?;
        app_config.config_path = resolved_path;
        Ok(app_config)
    }

    fn from_config(config: &Config) -> Result<Self> {
        let rpc_port = match get_string_value(config, &["RPC_PORT", "rpc.port"]) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|err| anyhow::anyhow!("Invalid RPC_PORT '{raw}': {err}"))?,
            None => 8787,
        };
        let list_page_size =
            match get_string_value(config, &["LIST_PAGE_SIZE", "registry.list_page_size"]) {
                Some(raw) => raw
                    .parse::<usize>()
                    .map_err(|err| anyhow::anyhow!("Invalid LIST_PAGE_SIZE '{raw}': {err}"))?,
                None => DEFAULT_LIST_PAGE_SIZE,
            };

        Ok(Self {
            config_path: None,
            rpc_host: get_string_value(config, &["RPC_HOST", "rpc.host"])
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            rpc_port,
            store_backend: get_string_value(config, &["STORE", "storage.backend"])
                .unwrap_or_else(|| "sled".to_string()),
            db_path: get_string_value(config, &["DB_PATH", "storage.db_path"])
                .unwrap_or_else(|| "./data/vicp-db".to_string()),
            admin_user: get_string_value(config, &["ADMIN_USER", "admin.user"]).unwrap_or_default(),
            admin_pass: get_string_value(config, &["ADMIN_PASS", "admin.pass"]).unwrap_or_default(),
            list_page_size,
            log_level: get_string_value(config, &["LOG_LEVEL", "log.level"])
                .unwrap_or_else(|| "info".to_string()),
            log_format: get_string_value(config, &["LOG_FORMAT", "log.format"])
                .unwrap_or_else(|| "pretty".to_string()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin_user.is_empty() {
            anyhow::bail!("ADMIN_USER must be set (admin.user or VICP_ADMIN_USER)");
        }
        if self.admin_pass.is_empty() {
            anyhow::bail!("ADMIN_PASS must be set (admin.pass or VICP_ADMIN_PASS)");
        }
        if self.list_page_size == 0 {
            anyhow::bail!("LIST_PAGE_SIZE must be greater than zero");
        }
        if self.rpc_port == 0 {
            anyhow::bail!("RPC_PORT must be greater than zero");
        }
        let backend = self.backend()?;
        if backend == StoreBackend::Sled && self.db_path.trim().is_empty() {
            anyhow::bail!("DB_PATH must not be empty for the sled backend");
        }
        Ok(())
    }

    pub fn backend(&self) -> Result<StoreBackend> {
        self.store_backend.parse()
    }

    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_host, self.rpc_port)
    }
}

fn get_string_value(config: &Config, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        config
            .get_string(key)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
