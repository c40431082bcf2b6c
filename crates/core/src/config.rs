use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cooldown::CooldownPolicy;
use crate::matcher::ScoringRules;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub coaching: CoachingConfig,
    pub advisory: AdvisoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Product-tuned constants for matching, cooldowns, and the advisory cadence.
#[derive(Clone, Debug, PartialEq)]
pub struct CoachingConfig {
    pub window_secs: u64,
    pub feed_capacity: usize,
    pub debounce_secs: u64,
    pub confidence_threshold: f64,
    pub transcript_lines: usize,
    pub transcript_char_cap: usize,
    pub recap_lines: usize,
    pub recap_char_cap: usize,
    pub whisper_ttl_secs: u64,
    pub alt_score_margin: u32,
    pub multi_trigger_bonus: u32,
    pub cooldown_use_secs: u64,
    pub cooldown_dismiss_secs: u64,
    pub cooldown_advisory_tip_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub allowed_origin: Option<String>,
    pub event_channel_capacity: usize,
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
    pub log_level: Option<String>,
    pub advisory_enabled: Option<bool>,
    pub advisory_endpoint: Option<String>,
    pub advisory_api_key: Option<String>,
    pub server_port: Option<u16>,
    pub debounce_secs: Option<u64>,
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

impl Default for CoachingConfig {
    fn default() -> Self {
        let cooldowns = CooldownPolicy::default();
        let rules = ScoringRules::default();
        Self {
            window_secs: 40,
            feed_capacity: 50,
            debounce_secs: 8,
            confidence_threshold: 0.35,
            transcript_lines: 14,
            transcript_char_cap: 4_000,
            recap_lines: 4,
            recap_char_cap: 900,
            whisper_ttl_secs: 8,
            alt_score_margin: rules.alt_score_margin,
            multi_trigger_bonus: rules.multi_trigger_bonus,
            cooldown_use_secs: cooldowns.use_secs,
            cooldown_dismiss_secs: cooldowns.dismiss_secs,
            cooldown_advisory_tip_secs: cooldowns.advisory_tip_secs,
        }
    }
}

impl CoachingConfig {
    pub fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            use_secs: self.cooldown_use_secs,
            dismiss_secs: self.cooldown_dismiss_secs,
            advisory_tip_secs: self.cooldown_advisory_tip_secs,
        }
    }

    pub fn scoring_rules(&self) -> ScoringRules {
        ScoringRules {
            alt_score_margin: self.alt_score_margin,
            multi_trigger_bonus: self.multi_trigger_bonus,
            ..ScoringRules::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coaching: CoachingConfig::default(),
            advisory: AdvisoryConfig {
                enabled: false,
                endpoint: None,
                api_key: None,
                model: "coach-small".to_string(),
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8787,
                allowed_origin: None,
                event_channel_capacity: 256,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("callcoach.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(coaching) = patch.coaching {
            let target = &mut self.coaching;
            set(&mut target.window_secs, coaching.window_secs);
            set(&mut target.feed_capacity, coaching.feed_capacity);
            set(&mut target.debounce_secs, coaching.debounce_secs);
            set(&mut target.confidence_threshold, coaching.confidence_threshold);
            set(&mut target.transcript_lines, coaching.transcript_lines);
            set(&mut target.transcript_char_cap, coaching.transcript_char_cap);
            set(&mut target.recap_lines, coaching.recap_lines);
            set(&mut target.recap_char_cap, coaching.recap_char_cap);
            set(&mut target.whisper_ttl_secs, coaching.whisper_ttl_secs);
            set(&mut target.alt_score_margin, coaching.alt_score_margin);
            set(&mut target.multi_trigger_bonus, coaching.multi_trigger_bonus);
            set(&mut target.cooldown_use_secs, coaching.cooldown_use_secs);
            set(&mut target.cooldown_dismiss_secs, coaching.cooldown_dismiss_secs);
            set(&mut target.cooldown_advisory_tip_secs, coaching.cooldown_advisory_tip_secs);
        }

        if let Some(advisory) = patch.advisory {
            if let Some(enabled) = advisory.enabled {
                self.advisory.enabled = enabled;
            }
            if let Some(endpoint) = advisory.endpoint {
                self.advisory.endpoint = Some(endpoint);
            }
            if let Some(advisory_api_key_value) = advisory.api_key {
                self.advisory.api_key = Some(secret_value(advisory_api_key_value));
            }
            if let Some(model) = advisory.model {
                self.advisory.model = model;
            }
            if let Some(timeout_secs) = advisory.timeout_secs {
                self.advisory.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(allowed_origin) = server.allowed_origin {
                self.server.allowed_origin = Some(allowed_origin);
            }
            if let Some(capacity) = server.event_channel_capacity {
                self.server.event_channel_capacity = capacity;
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
        if let Some(value) = read_env("CALLCOACH_COACHING_WINDOW_SECS") {
            self.coaching.window_secs = parse_value("CALLCOACH_COACHING_WINDOW_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_FEED_CAPACITY") {
            self.coaching.feed_capacity = parse_value("CALLCOACH_COACHING_FEED_CAPACITY", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_DEBOUNCE_SECS") {
            self.coaching.debounce_secs = parse_value("CALLCOACH_COACHING_DEBOUNCE_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_CONFIDENCE_THRESHOLD") {
            self.coaching.confidence_threshold =
                parse_value("CALLCOACH_COACHING_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_WHISPER_TTL_SECS") {
            self.coaching.whisper_ttl_secs =
                parse_value("CALLCOACH_COACHING_WHISPER_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_COOLDOWN_USE_SECS") {
            self.coaching.cooldown_use_secs =
                parse_value("CALLCOACH_COACHING_COOLDOWN_USE_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_COOLDOWN_DISMISS_SECS") {
            self.coaching.cooldown_dismiss_secs =
                parse_value("CALLCOACH_COACHING_COOLDOWN_DISMISS_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_COACHING_COOLDOWN_ADVISORY_TIP_SECS") {
            self.coaching.cooldown_advisory_tip_secs =
                parse_value("CALLCOACH_COACHING_COOLDOWN_ADVISORY_TIP_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLCOACH_ADVISORY_ENABLED") {
            self.advisory.enabled = parse_value("CALLCOACH_ADVISORY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_ADVISORY_ENDPOINT") {
            self.advisory.endpoint = Some(value);
        }
        if let Some(value) = read_env("CALLCOACH_ADVISORY_API_KEY") {
            self.advisory.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CALLCOACH_ADVISORY_MODEL") {
            self.advisory.model = value;
        }
        if let Some(value) = read_env("CALLCOACH_ADVISORY_TIMEOUT_SECS") {
            self.advisory.timeout_secs = parse_value("CALLCOACH_ADVISORY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLCOACH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CALLCOACH_SERVER_PORT") {
            self.server.port = parse_value("CALLCOACH_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CALLCOACH_SERVER_ALLOWED_ORIGIN") {
            self.server.allowed_origin = Some(value);
        }
        if let Some(value) = read_env("CALLCOACH_SERVER_EVENT_CHANNEL_CAPACITY") {
            self.server.event_channel_capacity =
                parse_value("CALLCOACH_SERVER_EVENT_CHANNEL_CAPACITY", &value)?;
        }

        let log_level =
            read_env("CALLCOACH_LOGGING_LEVEL").or_else(|| read_env("CALLCOACH_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CALLCOACH_LOGGING_FORMAT").or_else(|| read_env("CALLCOACH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(enabled) = overrides.advisory_enabled {
            self.advisory.enabled = enabled;
        }
        if let Some(endpoint) = overrides.advisory_endpoint {
            self.advisory.endpoint = Some(endpoint);
        }
        if let Some(api_key) = overrides.advisory_api_key {
            self.advisory.api_key = Some(secret_value(api_key));
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(debounce_secs) = overrides.debounce_secs {
            self.coaching.debounce_secs = debounce_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_coaching(&self.coaching)?;
        validate_advisory(&self.advisory)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("callcoach.toml"), PathBuf::from("config/callcoach.toml")]
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

/// One day; no coaching timer is meaningful beyond a single call.
const MAX_DURATION_SECS: u64 = 86_400;

fn validate_coaching(coaching: &CoachingConfig) -> Result<(), ConfigError> {
    let positive = [
        ("coaching.window_secs", coaching.window_secs),
        ("coaching.debounce_secs", coaching.debounce_secs),
        ("coaching.whisper_ttl_secs", coaching.whisper_ttl_secs),
        ("coaching.feed_capacity", coaching.feed_capacity as u64),
        ("coaching.transcript_lines", coaching.transcript_lines as u64),
        ("coaching.transcript_char_cap", coaching.transcript_char_cap as u64),
        ("coaching.recap_lines", coaching.recap_lines as u64),
        ("coaching.recap_char_cap", coaching.recap_char_cap as u64),
    ];
    if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
    }

    let durations = [
        ("coaching.window_secs", coaching.window_secs),
        ("coaching.debounce_secs", coaching.debounce_secs),
        ("coaching.whisper_ttl_secs", coaching.whisper_ttl_secs),
        ("coaching.cooldown_use_secs", coaching.cooldown_use_secs),
        ("coaching.cooldown_dismiss_secs", coaching.cooldown_dismiss_secs),
        ("coaching.cooldown_advisory_tip_secs", coaching.cooldown_advisory_tip_secs),
    ];
    if let Some((key, _)) = durations.iter().find(|(_, value)| *value > MAX_DURATION_SECS) {
        return Err(ConfigError::Validation(format!(
            "{key} must not exceed {MAX_DURATION_SECS} seconds"
        )));
    }

    if !(0.0..=1.0).contains(&coaching.confidence_threshold) {
        return Err(ConfigError::Validation(
            "coaching.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if coaching.cooldown_dismiss_secs > coaching.cooldown_use_secs {
        return Err(ConfigError::Validation(
            "coaching.cooldown_dismiss_secs must not exceed coaching.cooldown_use_secs".to_string(),
        ));
    }

    Ok(())
}

fn validate_advisory(advisory: &AdvisoryConfig) -> Result<(), ConfigError> {
    if advisory.timeout_secs == 0 || advisory.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "advisory.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if advisory.enabled {
        let Some(endpoint) = advisory.endpoint.as_deref().map(str::trim) else {
            return Err(ConfigError::Validation(
                "advisory.endpoint is required when advisory.enabled is true".to_string(),
            ));
        };
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "advisory.endpoint must start with http:// or https://".to_string(),
            ));
        }
        let blank_key =
            advisory.api_key.as_ref().is_some_and(|key| key.expose_secret().trim().is_empty());
        if blank_key {
            return Err(ConfigError::Validation(
                "advisory.api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.event_channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "server.event_channel_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    coaching: Option<CoachingPatch>,
    advisory: Option<AdvisoryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CoachingPatch {
    window_secs: Option<u64>,
    feed_capacity: Option<usize>,
    debounce_secs: Option<u64>,
    confidence_threshold: Option<f64>,
    transcript_lines: Option<usize>,
    transcript_char_cap: Option<usize>,
    recap_lines: Option<usize>,
    recap_char_cap: Option<usize>,
    whisper_ttl_secs: Option<u64>,
    alt_score_margin: Option<u32>,
    multi_trigger_bonus: Option<u32>,
    cooldown_use_secs: Option<u64>,
    cooldown_dismiss_secs: Option<u64>,
    cooldown_advisory_tip_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AdvisoryPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    allowed_origin: Option<String>,
    event_channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
