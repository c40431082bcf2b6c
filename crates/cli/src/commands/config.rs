use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use callcoach_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let coaching = &config.coaching;
    let advisory = &config.advisory;
    let server = &config.server;
    let api_key = match &advisory.api_key {
        Some(key) => redact_key(key.expose_secret()),
        None => "<unset>".to_string(),
    };

    let fields = vec![
        field(
            "coaching.window_secs",
            coaching.window_secs.to_string(),
            &["CALLCOACH_COACHING_WINDOW_SECS"],
        ),
        field(
            "coaching.feed_capacity",
            coaching.feed_capacity.to_string(),
            &["CALLCOACH_COACHING_FEED_CAPACITY"],
        ),
        field(
            "coaching.debounce_secs",
            coaching.debounce_secs.to_string(),
            &["CALLCOACH_COACHING_DEBOUNCE_SECS"],
        ),
        field(
            "coaching.confidence_threshold",
            coaching.confidence_threshold.to_string(),
            &["CALLCOACH_COACHING_CONFIDENCE_THRESHOLD"],
        ),
        field("coaching.transcript_lines", coaching.transcript_lines.to_string(), &[]),
        field("coaching.transcript_char_cap", coaching.transcript_char_cap.to_string(), &[]),
        field("coaching.recap_lines", coaching.recap_lines.to_string(), &[]),
        field("coaching.recap_char_cap", coaching.recap_char_cap.to_string(), &[]),
        field(
            "coaching.whisper_ttl_secs",
            coaching.whisper_ttl_secs.to_string(),
            &["CALLCOACH_COACHING_WHISPER_TTL_SECS"],
        ),
        field("coaching.alt_score_margin", coaching.alt_score_margin.to_string(), &[]),
        field("coaching.multi_trigger_bonus", coaching.multi_trigger_bonus.to_string(), &[]),
        field(
            "coaching.cooldown_use_secs",
            coaching.cooldown_use_secs.to_string(),
            &["CALLCOACH_COACHING_COOLDOWN_USE_SECS"],
        ),
        field(
            "coaching.cooldown_dismiss_secs",
            coaching.cooldown_dismiss_secs.to_string(),
            &["CALLCOACH_COACHING_COOLDOWN_DISMISS_SECS"],
        ),
        field(
            "coaching.cooldown_advisory_tip_secs",
            coaching.cooldown_advisory_tip_secs.to_string(),
            &["CALLCOACH_COACHING_COOLDOWN_ADVISORY_TIP_SECS"],
        ),
        field("advisory.enabled", advisory.enabled.to_string(), &["CALLCOACH_ADVISORY_ENABLED"]),
        field(
            "advisory.endpoint",
            advisory.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["CALLCOACH_ADVISORY_ENDPOINT"],
        ),
        field("advisory.api_key", api_key, &["CALLCOACH_ADVISORY_API_KEY"]),
        field("advisory.model", advisory.model.clone(), &["CALLCOACH_ADVISORY_MODEL"]),
        field(
            "advisory.timeout_secs",
            advisory.timeout_secs.to_string(),
            &["CALLCOACH_ADVISORY_TIMEOUT_SECS"],
        ),
        field(
            "server.bind_address",
            server.bind_address.clone(),
            &["CALLCOACH_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", server.port.to_string(), &["CALLCOACH_SERVER_PORT"]),
        field(
            "server.allowed_origin",
            server.allowed_origin.clone().unwrap_or_else(|| "<any>".to_string()),
            &["CALLCOACH_SERVER_ALLOWED_ORIGIN"],
        ),
        field(
            "server.event_channel_capacity",
            server.event_channel_capacity.to_string(),
            &["CALLCOACH_SERVER_EVENT_CHANNEL_CAPACITY"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["CALLCOACH_LOGGING_LEVEL", "CALLCOACH_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CALLCOACH_LOGGING_FORMAT", "CALLCOACH_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|field| render_line(field.key, &field.value, source(field.key, field.env_keys))),
    );

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("callcoach.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/callcoach.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first four characters so operators can tell keys apart.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix = trimmed.chars().take(4).collect::<String>();
    format!("{prefix}***")
}
