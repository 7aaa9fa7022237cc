// src/config.rs - Configuration management. Loaded once at startup, immutable after.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub smtp: SmtpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
    pub client_shutdown: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    pub bcrypt_cost: u32,
    pub max_login_attempts: u32,
    pub lockout_duration_minutes: u64,
    pub activation_token_hours: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
    pub max_upload_size: usize,
    pub require_https: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub activation_base_url: String,
    // When set, messages are logged instead of sent. Tests rely on this.
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub console_enabled: bool,
}

// Defaults usable by tests without any ENV setup
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
            client_timeout: 30,
            client_shutdown: 5,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:srm.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            idle_timeout: 600,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dummy_development_secret_32_chars!".to_string(),
            token_expiration_hours: 24,
            bcrypt_cost: 10,
            max_login_attempts: 5,
            lockout_duration_minutes: 15,
            activation_token_hours: 48,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://127.0.0.1:8080".to_string(),
                "http://localhost:8080".to_string(),
            ],
            max_request_size: 1024 * 1024,
            max_upload_size: 10 * 1024 * 1024,
            require_https: false,
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            from_address: "no-reply@srm.local".to_string(),
            activation_base_url: "http://localhost:8080".to_string(),
            dry_run: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            console_enabled: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            smtp: SmtpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config() -> Result<Config> {
    load_env_file()?;

    let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
        let path = Path::new(&config_file);
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", config_file))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", config_file))?
    } else {
        Config::default()
    };

    override_with_env(&mut config);

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn override_with_env(config: &mut Config) {
    if let Ok(host) = env::var("BIND_ADDRESS") {
        config.server.host = host;
    }
    if let Ok(port_str) = env::var("SRM_PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            config.server.port = port;
        }
    }
    if let Ok(workers_str) = env::var("SRM_WORKERS") {
        if let Ok(workers) = workers_str.parse::<usize>() {
            config.server.workers = Some(workers);
        }
    }
    if let Ok(jwt_secret) = env::var("JWT_SECRET") {
        config.auth.jwt_secret = jwt_secret;
    }
    if let Ok(expiration_str) = env::var("AUTH_TOKEN_EXPIRATION_HOURS") {
        if let Ok(expiration) = expiration_str.parse::<i64>() {
            config.auth.token_expiration_hours = expiration;
        }
    }
    if let Ok(bcrypt_str) = env::var("AUTH_BCRYPT_COST") {
        if let Ok(bcrypt) = bcrypt_str.parse::<u32>() {
            config.auth.bcrypt_cost = bcrypt;
        }
    }
    if let Ok(max_str) = env::var("AUTH_MAX_LOGIN_ATTEMPTS") {
        if let Ok(max) = max_str.parse::<u32>() {
            config.auth.max_login_attempts = max;
        }
    }
    if let Ok(lockout_str) = env::var("AUTH_LOCKOUT_DURATION_MINUTES") {
        if let Ok(lockout) = lockout_str.parse::<u64>() {
            config.auth.lockout_duration_minutes = lockout;
        }
    }
    if let Ok(url) = env::var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Ok(max_conn_str) = env::var("DATABASE_MAX_CONNECTIONS") {
        if let Ok(max_conn) = max_conn_str.parse::<u32>() {
            config.database.max_connections = max_conn;
        }
    }
    if let Ok(min_conn_str) = env::var("DATABASE_MIN_CONNECTIONS") {
        if let Ok(min_conn) = min_conn_str.parse::<u32>() {
            config.database.min_connections = min_conn;
        }
    }
    if let Ok(origins_str) = env::var("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(host) = env::var("SMTP_HOST") {
        config.smtp.host = host;
    }
    if let Ok(port_str) = env::var("SMTP_PORT") {
        if let Ok(port) = port_str.parse::<u16>() {
            config.smtp.port = port;
        }
    }
    if let Ok(username) = env::var("SMTP_USERNAME") {
        config.smtp.username = Some(username);
    }
    if let Ok(password) = env::var("SMTP_PASSWORD") {
        config.smtp.password = Some(password);
    }
    if let Ok(from) = env::var("SMTP_FROM") {
        config.smtp.from_address = from;
    }
    if let Ok(base) = env::var("ACTIVATION_BASE_URL") {
        config.smtp.activation_base_url = base;
    }
    if let Ok(dry_run) = env::var("SMTP_DRY_RUN") {
        config.smtp.dry_run = dry_run == "1" || dry_run.eq_ignore_ascii_case("true");
    }
    if let Ok(level) = env::var("RUST_LOG") {
        config.logging.level = level;
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            ));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(anyhow::anyhow!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            ));
        }

        if self.auth.activation_token_hours <= 0 {
            return Err(anyhow::anyhow!("activation_token_hours must be positive"));
        }

        if self.smtp.from_address.is_empty() {
            return Err(anyhow::anyhow!("SMTP from_address must not be empty"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        env::var("SRM_ENV").map(|v| v == "production").unwrap_or(false)
    }

    pub fn print_startup_info(&self) {
        log::info!("SRM starting up...");
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!(
            "Database: {}",
            if self.database.url.contains("sqlite") {
                "SQLite"
            } else if self.database.url.contains("postgres") {
                "PostgreSQL"
            } else {
                "Unknown"
            }
        );
        log::info!("Auth: JWT ({}h expiration)", self.auth.token_expiration_hours);
        log::info!(
            "Mail: {}:{}{}",
            self.smtp.host,
            self.smtp.port,
            if self.smtp.dry_run { " (dry run)" } else { "" }
        );
        log::info!("Logging: {} level", self.logging.level);

        if !self.is_production() {
            log::warn!("Running in development mode");
        }

        if self.security.require_https {
            log::info!("HTTPS enforcement enabled");
        } else if self.is_production() {
            log::warn!("HTTPS not required in production mode");
        }
    }
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        env::remove_var("SRM_ENV");
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(!config.is_production());
        assert!(config.auth.jwt_secret.len() >= 32);
        assert!(config.smtp.dry_run);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "a".repeat(32);
        assert!(config.validate().is_ok());

        config.database.max_connections = 1;
        config.database.min_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_loading() {
        let toml_content = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [auth]
        jwt_secret = "test_secret_123456789012345678901234567890"

        [smtp]
        host = "mail.example.com"
        port = 587
        "#;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, toml_content).unwrap();

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.auth.jwt_secret,
            "test_secret_123456789012345678901234567890"
        );
        assert_eq!(config.smtp.host, "mail.example.com");
        assert_eq!(config.smtp.port, 587);
        // Sections not in the file keep their defaults
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_env_override() {
        let mut config = Config::default();
        env::set_var("SRM_PORT", "9090");
        env::set_var("JWT_SECRET", "env_secret_123456789012345678901234567890");
        env::set_var("SMTP_HOST", "relay.example.com");

        override_with_env(&mut config);
        assert_eq!(config.server.port, 9090);
        assert_eq!(
            config.auth.jwt_secret,
            "env_secret_123456789012345678901234567890"
        );
        assert_eq!(config.smtp.host, "relay.example.com");

        env::remove_var("SRM_PORT");
        env::remove_var("JWT_SECRET");
        env::remove_var("SMTP_HOST");
    }
}
