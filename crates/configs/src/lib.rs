use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 7070;
pub const DEFAULT_DAPR_HTTP_PORT: u16 = 3500;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            worker_threads: Some(4),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

/// Which state store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Dapr,
    Memory,
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dapr" => Ok(StoreBackend::Dapr),
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            other => Err(anyhow!(
                "unknown store backend `{other}` (expected dapr, memory or file)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_dapr_host")]
    pub dapr_host: String,
    /// Sidecar HTTP port; `None` means "take `DAPR_HTTP_PORT` or 3500".
    #[serde(default)]
    pub dapr_http_port: Option<u16>,
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub probe_on_connect: bool,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
    #[serde(default = "default_file_path")]
    pub file_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Dapr,
            dapr_host: default_dapr_host(),
            dapr_http_port: None,
            timeout_ms: default_store_timeout_ms(),
            probe_on_connect: true,
            connect_retries: default_connect_retries(),
            connect_backoff_ms: default_connect_backoff_ms(),
            file_path: default_file_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HttpConfig {
    /// Map store failures to 502 instead of the legacy 404/400 codes.
    #[serde(default)]
    pub strict_status_codes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_admin_addr")]
    pub addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { enabled: false, addr: default_admin_addr() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_shutdown_timeout() -> u64 { DEFAULT_SHUTDOWN_TIMEOUT_SECS }
fn default_dapr_host() -> String { "127.0.0.1".into() }
fn default_store_timeout_ms() -> u64 { 5000 }
fn default_true() -> bool { true }
fn default_connect_retries() -> u32 { 5 }
fn default_connect_backoff_ms() -> u64 { 200 }
fn default_file_path() -> String { "data/state.json".into() }
fn default_admin_addr() -> String { "127.0.0.1:9188".into() }
fn default_log_format() -> String { "compact".into() }

fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_default() -> Result<AppConfig> {
    load_from_file(&config_path())
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).with_context(|| format!("read config {path}"))?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `config.toml` if present (defaults otherwise), apply env overrides,
    /// then normalize and validate.
    pub fn load_and_validate() -> Result<Self> {
        Self::load_and_validate_from(&config_path(), |key| std::env::var(key).ok())
    }

    /// Only a missing file falls back to defaults; unreadable or malformed
    /// files are errors.
    pub fn load_and_validate_from<F>(path: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(content) => {
                load_from_str(&content).with_context(|| format!("parse config {path}"))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => return Err(e).with_context(|| format!("read config {path}")),
        };
        cfg.apply_env(lookup)?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Apply environment overrides through `lookup` so tests can inject values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = port.parse().with_context(|| format!("SERVER_PORT `{port}`"))?;
        }
        if let Some(threads) = lookup("TOKIO_WORKER_THREADS") {
            let threads = threads
                .parse::<usize>()
                .with_context(|| format!("TOKIO_WORKER_THREADS `{threads}`"))?;
            self.server.worker_threads = Some(threads);
        }
        if self.store.dapr_http_port.is_none() {
            if let Some(port) = lookup("DAPR_HTTP_PORT") {
                let port = port.parse().with_context(|| format!("DAPR_HTTP_PORT `{port}`"))?;
                self.store.dapr_http_port = Some(port);
            }
        }
        if let Some(backend) = lookup("STATE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Some(path) = lookup("STATE_FILE") {
            self.store.file_path = path;
        }
        Ok(())
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.store.validate()?;
        self.admin.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = default_host();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(anyhow!("server.shutdown_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(anyhow!("store.timeout_ms must be positive"));
        }
        match self.backend {
            StoreBackend::Dapr if self.dapr_host.trim().is_empty() => {
                Err(anyhow!("store.dapr_host is empty"))
            }
            StoreBackend::Dapr if self.dapr_http_port == Some(0) => {
                Err(anyhow!("store.dapr_http_port must be in 1..=65535"))
            }
            StoreBackend::File if self.file_path.trim().is_empty() => {
                Err(anyhow!("store.file_path is empty"))
            }
            _ => Ok(()),
        }
    }

    pub fn http_port(&self) -> u16 {
        self.dapr_http_port.unwrap_or(DEFAULT_DAPR_HTTP_PORT)
    }

    /// Base URL of the sidecar HTTP API, without trailing slash.
    pub fn dapr_base_url(&self) -> String {
        format!("http://{}:{}", self.dapr_host, self.http_port())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

impl AdminConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled {
            self.addr
                .parse::<SocketAddr>()
                .with_context(|| format!("admin.addr `{}` is not a socket address", self.addr))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_service_contract() {
        let mut cfg = AppConfig::default();
        cfg.normalize_and_validate().unwrap();
        assert_eq!(cfg.server.port, 7070);
        assert_eq!(cfg.server.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.store.backend, StoreBackend::Dapr);
        assert_eq!(cfg.store.dapr_base_url(), "http://127.0.0.1:3500");
        assert!(!cfg.http.strict_status_codes);
        assert!(!cfg.admin.enabled);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg = load_from_str(
            r#"
            [server]
            port = 9090

            [store]
            backend = "memory"

            [http]
            strict_status_codes = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.shutdown_timeout_secs, 5);
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert!(cfg.http.strict_status_codes);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SERVER_PORT", "8181"),
            ("DAPR_HTTP_PORT", "3600"),
            ("STATE_BACKEND", "file"),
            ("STATE_FILE", "/tmp/s.json"),
        ]
        .into_iter()
        .collect();
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        cfg.normalize_and_validate().unwrap();
        assert_eq!(cfg.server.port, 8181);
        assert_eq!(cfg.store.http_port(), 3600);
        assert_eq!(cfg.store.backend, StoreBackend::File);
        assert_eq!(cfg.store.file_path, "/tmp/s.json");
    }

    #[test]
    fn configured_dapr_port_wins_over_env() {
        let mut cfg = load_from_str("[store]\ndapr_http_port = 3501\n").unwrap();
        cfg.apply_env(|k| (k == "DAPR_HTTP_PORT").then(|| "9999".to_string())).unwrap();
        assert_eq!(cfg.store.http_port(), 3501);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut cfg = load_from_str("[server]\nport = 0\n").unwrap();
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = load_from_str("[server]\nshutdown_timeout_secs = 0\n").unwrap();
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = load_from_str("[admin]\nenabled = true\naddr = \"nope\"\n").unwrap();
        assert!(cfg.normalize_and_validate().is_err());

        assert!(load_from_str("[store]\nbackend = \"redis\"\n").is_err());
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn zero_worker_threads_normalized() {
        let mut cfg = load_from_str("[server]\nworker_threads = 0\n").unwrap();
        cfg.normalize_and_validate().unwrap();
        assert_eq!(cfg.server.worker_threads, Some(4));
    }

    #[test]
    fn bad_worker_thread_override_is_rejected() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_env(|k| (k == "TOKIO_WORKER_THREADS").then(|| "four".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TOKIO_WORKER_THREADS"));

        cfg.apply_env(|k| (k == "TOKIO_WORKER_THREADS").then(|| "8".to_string())).unwrap();
        assert_eq!(cfg.server.worker_threads, Some(8));
    }

    fn temp_config_path(tag: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("configs-{tag}-{}-{nanos}.toml", std::process::id()))
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let path = temp_config_path("missing");
        let cfg = AppConfig::load_and_validate_from(path.to_str().unwrap(), |_| None).unwrap();
        assert_eq!(cfg.server.port, DEFAULT_PORT);
        assert_eq!(cfg.store.backend, StoreBackend::Dapr);
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let path = temp_config_path("malformed");
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();
        let res = AppConfig::load_and_validate_from(path.to_str().unwrap(), |_| None);
        std::fs::remove_file(&path).ok();
        let err = res.unwrap_err();
        assert!(format!("{err:#}").contains("parse config"), "{err:#}");
    }

    #[test]
    fn present_config_file_is_used() {
        let path = temp_config_path("valid");
        std::fs::write(&path, "[server]\nport = 9191\n").unwrap();
        let res = AppConfig::load_and_validate_from(path.to_str().unwrap(), |_| None);
        std::fs::remove_file(&path).ok();
        assert_eq!(res.unwrap().server.port, 9191);
    }
}
