use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DRAFT_DIR: &str = "data/drafts";
const DEFAULT_FRESHNESS_HOURS: i64 = 24;
const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 2_000;
const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 30;
const DEFAULT_ROLLING_MILL_PREFIX: &str = "RM";
const DEFAULT_REQUEST_TITLE: &str = "Malzeme Satın Alma Talebi";
const DEFAULT_REQUEST_DESCRIPTION: &str = "Proje için gerekli malzemeler";

/// Draft persistence settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DraftConfig {
    /// Directory holding one JSON document per draft key
    #[serde(default = "default_draft_dir")]
    pub store_dir: PathBuf,

    /// Drafts older than this are discarded on load
    #[serde(default = "default_freshness_hours")]
    #[validate(range(min = 1))]
    pub freshness_hours: i64,

    /// Quiet period after the last edit before an autosave fires
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,

    /// Periodic autosave tick
    #[serde(default = "default_autosave_interval_secs")]
    #[validate(range(min = 1))]
    pub autosave_interval_secs: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            store_dir: default_draft_dir(),
            freshness_hours: default_freshness_hours(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            autosave_interval_secs: default_autosave_interval_secs(),
        }
    }
}

impl DraftConfig {
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freshness_hours)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}

/// Bounds applied by the request validator
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(default = "default_title_min_len")]
    pub title_min_len: usize,

    #[serde(default = "default_title_max_len")]
    pub title_max_len: usize,

    #[serde(default = "default_description_max_len")]
    pub description_max_len: usize,

    /// Minimum number of suppliers a request must compare
    #[serde(default = "default_min_suppliers")]
    #[validate(range(min = 1))]
    pub min_suppliers: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            title_min_len: default_title_min_len(),
            title_max_len: default_title_max_len(),
            description_max_len: default_description_max_len(),
            min_suppliers: default_min_suppliers(),
        }
    }
}

/// Submission payload settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SubmissionConfig {
    /// Job numbers starting with this prefix mark a rolling-mill request
    #[serde(default = "default_rolling_mill_prefix")]
    #[validate(length(min = 1))]
    pub rolling_mill_prefix: String,

    /// Title used for server-side drafts saved without one
    #[serde(default = "default_request_title")]
    pub default_title: String,

    #[serde(default = "default_request_description")]
    pub default_description: String,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            rolling_mill_prefix: default_rolling_mill_prefix(),
            default_title: default_request_title(),
            default_description: default_request_description(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Upper bound on handling time for one HTTP request
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub drafts: DraftConfig,

    #[serde(default)]
    #[validate]
    pub validation: ValidationConfig,

    #[serde(default)]
    #[validate]
    pub submission: SubmissionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            drafts: DraftConfig::default(),
            validation: ValidationConfig::default(),
            submission: SubmissionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.validation.title_min_len > self.validation.title_max_len {
            let mut err = ValidationError::new("title_bounds");
            err.message = Some("validation.title_min_len must not exceed title_max_len".into());
            errors.add("validation", err);
        }

        if self.drafts.autosave_debounce_ms == 0 {
            let mut err = ValidationError::new("autosave_debounce_ms");
            err.message = Some("drafts.autosave_debounce_ms must be greater than 0".into());
            errors.add("drafts", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_draft_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DRAFT_DIR)
}

fn default_freshness_hours() -> i64 {
    DEFAULT_FRESHNESS_HOURS
}

fn default_autosave_debounce_ms() -> u64 {
    DEFAULT_AUTOSAVE_DEBOUNCE_MS
}

fn default_autosave_interval_secs() -> u64 {
    DEFAULT_AUTOSAVE_INTERVAL_SECS
}

fn default_title_min_len() -> usize {
    3
}

fn default_title_max_len() -> usize {
    100
}

fn default_description_max_len() -> usize {
    500
}

fn default_min_suppliers() -> usize {
    2
}

fn default_rolling_mill_prefix() -> String {
    DEFAULT_ROLLING_MILL_PREFIX.to_string()
}

fn default_request_title() -> String {
    DEFAULT_REQUEST_TITLE.to_string()
}

fn default_request_description() -> String {
    DEFAULT_REQUEST_DESCRIPTION.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("purchase_request_core={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit config directory
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("host", DEFAULT_HOST)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
