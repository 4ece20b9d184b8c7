use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use tracing::warn;

/// Command line options for the server.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Override bind address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Override server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding the database.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

/// Token signing settings.
#[derive(Clone)]
pub struct AuthSettings {
    pub secret_key: String,
    pub token_ttl_minutes: i64,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret_key", &"<redacted>")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

impl AuthSettings {
    /// Settings with a fresh random secret; tokens do not survive a restart.
    pub fn ephemeral() -> Self {
        Self {
            secret_key: random_secret(),
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EmailSettings {
    pub from: String,
    pub frontend_url: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            from: default_email_from(),
            frontend_url: default_frontend_url(),
        }
    }
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind: String,
    /// Directory for the SQLite database.
    pub data_dir: PathBuf,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
    pub auth: AuthSettings,
    pub email: EmailSettings,
    /// Name of the payment processor.
    pub payment_processor: String,
}

impl Config {
    /// Defaults suitable for tests and local runs against `data_dir`.
    pub fn for_data_dir(bind: impl Into<String>, data_dir: PathBuf) -> Self {
        Self {
            bind: bind.into(),
            data_dir,
            logging_enabled: true,
            auth: AuthSettings::ephemeral(),
            email: EmailSettings::default(),
            payment_processor: default_processor(),
        }
    }
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    auth: FileAuth,
    #[serde(default)]
    email: FileEmail,
    #[serde(default)]
    payments: FilePayments,
}

#[derive(Deserialize)]
struct FileServer {
    #[serde(default = "default_port")]
    port: u16,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize)]
struct FileAuth {
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default = "default_token_ttl")]
    token_ttl_minutes: i64,
}

#[derive(Deserialize)]
struct FileEmail {
    #[serde(default = "default_email_from")]
    from: String,
    #[serde(default = "default_frontend_url")]
    frontend_url: String,
}

#[derive(Deserialize)]
struct FilePayments {
    #[serde(default = "default_processor")]
    processor: String,
}

fn default_port() -> u16 {
    8000
}

fn default_logging() -> bool {
    true
}

fn default_token_ttl() -> i64 {
    30
}

fn default_email_from() -> String {
    "noreply@artisan-booking.local".into()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".into()
}

fn default_processor() -> String {
    "sandbox".into()
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Default for FileAuth {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

impl Default for FileEmail {
    fn default() -> Self {
        Self {
            from: default_email_from(),
            frontend_url: default_frontend_url(),
        }
    }
}

impl Default for FilePayments {
    fn default() -> Self {
        Self {
            processor: default_processor(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("ARTISAN_MARKET_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/artisan_market.toml"));

        let file_cfg = match fs::read(&config_path) {
            Ok(bytes) => {
                let contents = String::from_utf8_lossy(&bytes);
                toml::from_str::<FileConfig>(&contents).context("invalid config file")?
            }
            Err(_) => FileConfig::default(),
        };
        let mut port = file_cfg.server.port;
        let mut logging = file_cfg.logging.enabled;
        let mut secret_key = file_cfg.auth.secret_key;

        // environment overrides
        if let Ok(p) = std::env::var("ARTISAN_MARKET_PORT") {
            if let Ok(p) = p.parse::<u16>() {
                port = p;
            }
        }
        if let Ok(l) = std::env::var("ARTISAN_MARKET_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        if let Ok(s) = std::env::var("ARTISAN_MARKET_SECRET_KEY") {
            if !s.is_empty() {
                secret_key = Some(s);
            }
        }

        // CLI overrides
        if let Some(p) = cli.port {
            port = p;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        if !(1024..=65535).contains(&port) {
            anyhow::bail!("invalid_port");
        }
        if file_cfg.auth.token_ttl_minutes <= 0 {
            anyhow::bail!("invalid_token_ttl");
        }

        let bind = if let Some(b) = &cli.bind {
            b.clone()
        } else if let Ok(b) = std::env::var("BIND") {
            b
        } else {
            format!("127.0.0.1:{}", port)
        };

        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| std::env::var("DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let secret_key = match secret_key {
            Some(s) => s,
            None => {
                warn!("no secret key configured, generating one; tokens will not survive a restart");
                random_secret()
            }
        };

        Ok(Self {
            bind,
            data_dir,
            logging_enabled: logging,
            auth: AuthSettings {
                secret_key,
                token_ttl_minutes: file_cfg.auth.token_ttl_minutes,
            },
            email: EmailSettings {
                from: file_cfg.email.from,
                frontend_url: file_cfg.email.frontend_url,
            },
            payment_processor: file_cfg.payments.processor,
        })
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

/// Determine the default data directory.
pub fn default_data_dir() -> PathBuf {
    if let Some(proj) = ProjectDirs::from("org", "artisan-market", "artisan_market") {
        proj.data_dir().to_path_buf()
    } else {
        PathBuf::from("./artisan_market_data")
    }
}
