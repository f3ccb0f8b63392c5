use std::env;
use std::fs;
use std::path::Path;

use serde::Serialize;
use toml::Value;

use decalops_core::config::{resolve_config_path, AppConfig, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the layer each value came from.
pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let entries = vec![
        ConfigEntry {
            key: "database.url",
            value: redact_url(&config.database.url),
            source: source("database.url", &["DECALOPS_DATABASE_URL"]),
        },
        ConfigEntry {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            source: source("database.max_connections", &["DECALOPS_DATABASE_MAX_CONNECTIONS"]),
        },
        ConfigEntry {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            source: source("database.timeout_secs", &["DECALOPS_DATABASE_TIMEOUT_SECS"]),
        },
        ConfigEntry {
            key: "logging.level",
            value: config.logging.level.clone(),
            source: source("logging.level", &["DECALOPS_LOGGING_LEVEL", "DECALOPS_LOG_LEVEL"]),
        },
        ConfigEntry {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            source: source("logging.format", &["DECALOPS_LOGGING_FORMAT", "DECALOPS_LOG_FORMAT"]),
        },
        ConfigEntry {
            key: "workflow.custom_service_id",
            value: config.workflow.custom_service_id.clone(),
            source: source(
                "workflow.custom_service_id",
                &["DECALOPS_WORKFLOW_CUSTOM_SERVICE_ID"],
            ),
        },
        ConfigEntry {
            key: "workflow.currency",
            value: config.workflow.currency.clone(),
            source: source("workflow.currency", &["DECALOPS_WORKFLOW_CURRENCY"]),
        },
    ];

    let lines = entries
        .iter()
        .map(|entry| render_line(entry.key, &entry.value, &entry.source))
        .collect::<Vec<_>>();
    let message = format!(
        "effective config (source precedence: env > file > default):\n{}",
        lines.join("\n")
    );

    match serde_json::to_value(&entries) {
        Ok(data) => CommandResult::success_with_data("config", message, Some(data)),
        Err(_) => CommandResult::success("config", message),
    }
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
    for env_key in env_keys {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
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

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Hides credentials embedded in a connection URL.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    match rest.split_once('@') {
        Some((_, host)) => format!("{scheme}://***@{host}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_url};

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: toml::Value =
            "[database]\nurl = \"sqlite://shop.db\"\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "database.url"));
        assert!(!contains_path(&doc, "database.timeout_secs"));
        assert!(!contains_path(&doc, "workflow.currency"));
    }

    #[test]
    fn url_credentials_are_redacted() {
        assert_eq!(redact_url("sqlite://decalops.db"), "sqlite://decalops.db");
        assert_eq!(redact_url("sqlite://user:pw@host/db"), "sqlite://***@host/db");
        assert_eq!(redact_url("sqlite::memory:"), "sqlite::memory:");
    }
}
