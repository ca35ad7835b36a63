//! Structured logging with JSON output and sensitive data redaction.

use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

const REDACTED: &str = "[REDACTED]";

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// command output.
///
/// # Errors
///
/// Returns [`TelemetryError::LoggingInit`] if a global subscriber is already set.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(format!("bad log level: {e}")))?;

    let output = if config.json_logs {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(service = %config.service_name, json = config.json_logs, "Logging initialized");
    Ok(())
}

/// Copy of `value` with every object field whose name contains one of
/// `fields` (case-insensitive) replaced by `"[REDACTED]"`.
#[must_use]
pub fn redact_sensitive(value: &Value, fields: &[String]) -> Value {
    let needles: Vec<String> = fields.iter().map(|f| f.to_ascii_lowercase()).collect();
    redact_with(value, &needles)
}

fn redact_with(value: &Value, needles: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let lowered = key.to_ascii_lowercase();
                    let scrubbed = if needles.iter().any(|n| lowered.contains(n.as_str())) {
                        Value::String(REDACTED.into())
                    } else {
                        redact_with(inner, needles)
                    };
                    (key.clone(), scrubbed)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| redact_with(v, needles)).collect()),
        other => other.clone(),
    }
}

/// Mask a secret down to its last five characters, e.g. `"...AbCdE"`.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 5 {
        return "...".to_string();
    }
    let tail: String = secret.chars().skip(count - 5).collect();
    format!("...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_redact_fields;
    use serde_json::json;

    #[test]
    fn test_redact_sensitive() {
        let value = json!({
            "nick": "Bruce",
            "access_token": "oauth-abc",
            "data": {
                "Authorization": "Bot xyz",
                "roles": ["1", "2"]
            }
        });

        let redacted = redact_sensitive(&value, &default_redact_fields());

        assert_eq!(redacted["nick"], "Bruce");
        assert_eq!(redacted["access_token"], "[REDACTED]");
        assert_eq!(redacted["data"]["Authorization"], "[REDACTED]");
        assert_eq!(redacted["data"]["roles"], json!(["1", "2"]));
    }

    #[test]
    fn test_redact_nested_array() {
        let value = json!({
            "members": [
                {"nick": "a", "token": "t1"},
                {"nick": "b", "token": "t2"}
            ]
        });

        let redacted = redact_sensitive(&value, &["token".to_string()]);

        assert_eq!(redacted["members"][0]["nick"], "a");
        assert_eq!(redacted["members"][0]["token"], "[REDACTED]");
        assert_eq!(redacted["members"][1]["token"], "[REDACTED]");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("MTIzNDU2Nzg5.abcdef"), "...bcdef");
        assert_eq!(mask_secret("abc"), "...");
        assert_eq!(mask_secret(""), "...");
    }
}
