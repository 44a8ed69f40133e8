use common::config::StorageConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::crud::descriptor::Locale;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

fn default_token_ttl_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocaleConfig {
    pub code: String,
    pub name: String,
}

/// Admin panel behaviour shared by every entity configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    /// Ordered; the first entry is the fallback locale.
    pub locales: Vec<LocaleConfig>,
    pub page_size: u64,
    pub page_sizes: Vec<u64>,
    /// File consulted by `sync-settings`.
    pub settings_file: String,
}

impl AdminConfig {
    pub fn locales(&self) -> Vec<Locale> {
        self.locales
            .iter()
            .map(|l| Locale::new(&l.code, &l.name))
            .collect()
    }

    pub fn locale_codes(&self) -> Vec<String> {
        self.locales.iter().map(|l| l.code.clone()).collect()
    }

    /// `requested` when it is one of the configured sizes, else the default.
    pub fn page_size(&self, requested: Option<u64>) -> u64 {
        match requested {
            Some(size) if self.page_sizes.contains(&size) => size,
            _ => self.page_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImagesConfig {
    /// Re-encode uploaded images in the background.
    pub optimize: bool,
    /// Longest side after optimization, in pixels.
    pub max_dimension: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            optimize: true,
            max_dimension: 2048,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub admin: AdminConfig,
    pub images: ImagesConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    /// Defaults, then `config/config.toml`, then `BACKOFFICE__*` variables.
    pub fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            .set_default("database.url", "sqlite://./data/backoffice.db?mode=rwc")?
            .set_default("admin.locales", vec![default_locale()])?
            .set_default("admin.page_size", 15)?
            .set_default("admin.page_sizes", vec![10, 15, 25, 50, 100])?
            .set_default("admin.settings_file", "config/settings.toml")?
            .set_default("images.optimize", true)?
            .set_default("images.max_dimension", 2048)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., BACKOFFICE__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("BACKOFFICE").separator("__")))
    }
}

fn default_locale() -> config::Value {
    let mut table = config::Map::new();
    table.insert("code".to_string(), config::Value::from("en"));
    table.insert("name".to_string(), config::Value::from("English"));
    config::Value::from(table)
}
