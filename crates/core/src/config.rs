use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub quote: QuoteConfig,
    pub lookups: LookupsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct QuoteConfig {
    /// Quote time-to-live; after this a quote can no longer be fetched or
    /// redeemed.
    pub ttl_secs: u64,
    /// Expected quote currency, used by fixtures and dataset validation.
    pub currency: String,
    /// Key for the HMAC integrity code over issued quotes.
    pub signing_key: SecretString,
}

#[derive(Clone, Debug)]
pub struct LookupsConfig {
    /// Upper bound for any single collaborator call.
    pub timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub ttl_secs: Option<u64>,
    pub currency: Option<String>,
    pub signing_key: Option<String>,
    pub lookup_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote: QuoteConfig {
                ttl_secs: 900,
                currency: "EUR".to_string(),
                signing_key: String::new().into(),
            },
            lookups: LookupsConfig { timeout_ms: 2_000 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl EngineConfig {
    /// Defaults, then an optional TOML file (with `${VAR}` interpolation),
    /// then `PRICEKIT_*` environment variables, then programmatic overrides,
    /// validated last.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pricekit.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(quote) = patch.quote {
            if let Some(ttl_secs) = quote.ttl_secs {
                self.quote.ttl_secs = ttl_secs;
            }
            if let Some(currency) = quote.currency {
                self.quote.currency = currency;
            }
            if let Some(signing_key_value) = quote.signing_key {
                self.quote.signing_key = signing_key_value.into();
            }
        }

        if let Some(lookups) = patch.lookups {
            if let Some(timeout_ms) = lookups.timeout_ms {
                self.lookups.timeout_ms = timeout_ms;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PRICEKIT_QUOTE_TTL_SECS") {
            self.quote.ttl_secs = parse_u64("PRICEKIT_QUOTE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("PRICEKIT_QUOTE_CURRENCY") {
            self.quote.currency = value;
        }
        if let Some(value) = read_env("PRICEKIT_QUOTE_SIGNING_KEY") {
            self.quote.signing_key = value.into();
        }

        if let Some(value) = read_env("PRICEKIT_LOOKUPS_TIMEOUT_MS") {
            self.lookups.timeout_ms = parse_u64("PRICEKIT_LOOKUPS_TIMEOUT_MS", &value)?;
        }

        let log_level =
            read_env("PRICEKIT_LOGGING_LEVEL").or_else(|| read_env("PRICEKIT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRICEKIT_LOGGING_FORMAT").or_else(|| read_env("PRICEKIT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(ttl_secs) = overrides.ttl_secs {
            self.quote.ttl_secs = ttl_secs;
        }
        if let Some(currency) = overrides.currency {
            self.quote.currency = currency;
        }
        if let Some(signing_key) = overrides.signing_key {
            self.quote.signing_key = signing_key.into();
        }
        if let Some(timeout_ms) = overrides.lookup_timeout_ms {
            self.lookups.timeout_ms = timeout_ms;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quote.ttl_secs == 0 || self.quote.ttl_secs > 86_400 {
            return Err(ConfigError::Validation(
                "quote.ttl_secs must be in range 1..=86400".to_string(),
            ));
        }

        let currency = self.quote.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Validation(
                "quote.currency must be a 3-letter uppercase code (e.g. EUR)".to_string(),
            ));
        }

        if self.quote.signing_key.expose_secret().len() < 16 {
            return Err(ConfigError::Validation(
                "quote.signing_key is required and must be at least 16 characters. Set it in pricekit.toml or via PRICEKIT_QUOTE_SIGNING_KEY".to_string(),
            ));
        }

        if self.lookups.timeout_ms == 0 || self.lookups.timeout_ms > 60_000 {
            return Err(ConfigError::Validation(
                "lookups.timeout_ms must be in range 1..=60000".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            _ => Err(ConfigError::Validation(
                "logging.level must be one of trace|debug|info|warn|error".to_string(),
            )),
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pricekit.toml"), PathBuf::from("config/pricekit.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    quote: Option<QuotePatch>,
    lookups: Option<LookupsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotePatch {
    ttl_secs: Option<u64>,
    currency: Option<String>,
    signing_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupsPatch {
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
