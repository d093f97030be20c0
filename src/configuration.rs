use config::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub housekeeping: HousekeepingSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    /// Keep everything in process memory instead of Postgres (local runs).
    #[serde(default)]
    pub in_memory: bool,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Token issuance settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
    pub audience: Vec<String>,
    /// Upper bound for a single storage call, in milliseconds.
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,
}

impl JwtSettings {
    pub fn access_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_expiry)
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_token_expiry)
    }

    pub fn storage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Best-effort revocation cache
#[derive(serde::Deserialize, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,
}

impl CacheSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: default_cache_timeout_ms(),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct HousekeepingSettings {
    pub interval_seconds: u64,
}

impl HousekeepingSettings {
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_seconds)
    }
}

impl Default for HousekeepingSettings {
    fn default() -> Self {
        Self {
            interval_seconds: crate::housekeeper::DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

/// Longest accepted token lifetime (ten years).
const MAX_TOKEN_TTL_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

impl Settings {
    /// Reject values that would make token arithmetic overflow or stop the
    /// housekeeper.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ttl("jwt.access_token_expiry", self.jwt.access_token_expiry)?;
        check_ttl("jwt.refresh_token_expiry", self.jwt.refresh_token_expiry)?;

        if self.jwt.storage_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "jwt.storage_timeout_ms must be positive".to_string(),
            ));
        }
        if self.cache.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "cache.timeout_ms must be positive".to_string(),
            ));
        }
        if self.housekeeping.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "housekeeping.interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_ttl(key: &str, seconds: i64) -> Result<(), ConfigError> {
    if seconds <= 0 || seconds > MAX_TOKEN_TTL_SECONDS {
        return Err(ConfigError::Message(format!(
            "{} must be between 1 and {} seconds, got {}",
            key, MAX_TOKEN_TTL_SECONDS, seconds
        )));
    }
    Ok(())
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_storage_timeout_ms() -> u64 {
    5_000
}

fn default_cache_timeout_ms() -> u64 {
    50
}

/// Load `configuration.yaml` (optional) and apply `APP__SECTION__KEY`
/// environment overrides on top.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    load_settings(settings)
}

/// Deserialize and validate an assembled configuration.
pub fn load_settings(config: config::Config) -> Result<Settings, ConfigError> {
    let settings = config.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
