use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub tokens: TokenSettings,
    #[serde(default)]
    pub password: PasswordSettings,
}

#[derive(serde::Deserialize, Clone, Debug, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create databases.
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Signing settings for access and refresh tokens
#[derive(serde::Deserialize, Clone, Debug)]
pub struct TokenSettings {
    pub access_secret: String,
    pub access_token_expiry: i64,  // seconds (86400 = 24 hours)
    #[serde(default)]
    pub access_issuer: Option<String>,
    pub refresh_secret: String,
    pub refresh_token_expiry: i64, // seconds (31536000 = 1 year)
    pub refresh_issuer: String,
}

impl TokenSettings {
    /// Reject configurations that could only fail later, at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("tokens.access_secret".to_string()));
        }
        if self.refresh_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("tokens.refresh_secret".to_string()));
        }
        if self.refresh_issuer.trim().is_empty() {
            return Err(ConfigError::MissingRequired("tokens.refresh_issuer".to_string()));
        }
        check_token_expiry("tokens.access_token_expiry", self.access_token_expiry)?;
        check_token_expiry("tokens.refresh_token_expiry", self.refresh_token_expiry)?;
        Ok(())
    }
}

/// Upper bound for any token TTL: ten years.
pub const MAX_TOKEN_EXPIRY_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// A TTL must be positive and small enough that `now + ttl` stays a sane
/// Unix timestamp.
pub fn check_token_expiry(key: &str, seconds: i64) -> Result<(), ConfigError> {
    if seconds <= 0 {
        return Err(ConfigError::InvalidValue(format!("{} must be positive", key)));
    }
    if seconds > MAX_TOKEN_EXPIRY_SECONDS {
        return Err(ConfigError::InvalidValue(format!(
            "{} must not exceed {} seconds",
            key, MAX_TOKEN_EXPIRY_SECONDS
        )));
    }
    Ok(())
}

/// bcrypt work factor
#[derive(serde::Deserialize, Clone, Debug)]
pub struct PasswordSettings {
    pub hash_cost: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self { hash_cost: 10 }
    }
}

/// Load settings from `configuration.yaml` (optional) overlaid with
/// `APP__SECTION__KEY` environment variables.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8080)?
        .set_default("application.store", "postgres")?
        .set_default("tokens.access_token_expiry", 86400)?
        .set_default("tokens.refresh_token_expiry", 31536000)?
        .set_default("password.hash_cost", 10)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    let settings = settings.try_deserialize::<Settings>()?;
    settings.tokens.validate()?;
    Ok(settings)
}
