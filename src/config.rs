use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub jwt: JwtConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,

    pub google: GoogleConfig,

    /// File the values were read from; `None` when running on defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// Emit logs as JSON lines instead of the human-readable format.
    pub json_logs: bool,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,

    /// Upper bound for a single store call made on behalf of a request.
    pub request_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/url-shortener.db".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,

    pub access_exp_minutes: i64,

    pub refresh_exp_days: i64,

    pub reset_password_exp_minutes: i64,

    pub verify_email_exp_minutes: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me".to_string(),
            access_exp_minutes: 30,
            refresh_exp_days: 30,
            reset_password_exp_minutes: 10,
            verify_email_exp_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    /// OAuth client id that Google ID tokens must be issued for.
    /// Google sign-in is disabled while this is unset.
    pub client_id: Option<String>,

    /// JWKS endpoint holding Google's current signing keys.
    pub certs_url: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            certs_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            jwt: JwtConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            google: GoogleConfig::default(),
            source: None,
        }
    }
}

impl Config {
    /// Loads the first config file found, then applies `APP_*` environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::from_first_existing(&Self::config_paths())?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Runs before logging is set up, so the chosen file is recorded in
    /// [`Config::source`] rather than logged here.
    fn from_first_existing(paths: &[PathBuf]) -> Result<Self> {
        match paths.iter().find(|path| path.exists()) {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("APP_DATABASE_URL") {
            self.general.database_url = url;
        }
        if let Some(level) = lookup("APP_LOG_LEVEL") {
            self.general.log_level = level;
        }
        if let Some(host) = lookup("APP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("APP_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("APP_PORT is not a valid port: {port}"))?;
        }
        if let Some(secret) = lookup("APP_JWT_SECRET") {
            self.jwt.secret = secret;
        }
        if let Some(client_id) = lookup("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(client_id).filter(|id| !id.trim().is_empty());
        }
        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("url-shortener").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".url-shortener").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt.secret.trim().is_empty() {
            anyhow::bail!("JWT secret cannot be empty");
        }

        if self.jwt.access_exp_minutes <= 0
            || self.jwt.refresh_exp_days <= 0
            || self.jwt.reset_password_exp_minutes <= 0
            || self.jwt.verify_email_exp_minutes <= 0
        {
            anyhow::bail!("JWT expiries must be greater than zero");
        }

        if self.general.max_db_connections == 0 {
            anyhow::bail!("max_db_connections must be > 0");
        }

        Ok(())
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
