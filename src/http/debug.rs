use std::borrow::Cow;

use reqwest::Url;
use reqwest::header::HeaderValue;
use serde_json::Value;

const REDACTION: &str = "***REDACTED***";
const DEFAULT_MAX_BODY_CHARS: usize = 4_000;

/// Header names, query parameters and JSON keys whose values never reach
/// debug output. Compared case-insensitively.
const SENSITIVE_KEYS: &[&str] = &[
    "key",
    "api_key",
    "apikey",
    "openai_api_key",
    "token",
    "access_token",
    "authorization",
    "secret",
    "password",
    "x-api-key",
    "openai-organization",
];

/// How `--http-debug` shows an exchange on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDebugConfig {
    pub enabled: bool,
    pub redact_secrets: bool,
    pub max_body_chars: usize,
}

impl HttpDebugConfig {
    pub fn from_flag(enabled: bool) -> Self {
        Self {
            enabled,
            redact_secrets: true,
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::from_flag(false)
    }

    pub fn show_url(&self, url: &Url) -> String {
        if !self.redact_secrets || url.query().is_none() {
            return url.to_string();
        }

        let pairs = url
            .query_pairs()
            .map(|(name, value)| {
                let value = if is_sensitive_key(&name) {
                    Cow::Borrowed(REDACTION)
                } else {
                    value
                };
                (name, value)
            })
            .collect::<Vec<_>>();

        let mut shown = url.clone();
        shown.query_pairs_mut().clear().extend_pairs(pairs);
        shown.to_string()
    }

    pub fn show_header(&self, name: &str, value: &HeaderValue) -> String {
        if self.redact_secrets && is_sensitive_key(name) {
            return REDACTION.to_string();
        }
        value
            .to_str()
            .map_or_else(|_| "<non-utf8>".to_string(), str::to_string)
    }

    /// Body text with secrets masked (JSON bodies only) and cut to
    /// `max_body_chars`.
    pub fn show_body(&self, raw: &str) -> String {
        let body = if self.redact_secrets {
            redact_json_text(raw)
        } else {
            raw.to_string()
        };
        truncate(&body, self.max_body_chars)
    }
}

fn redact_json_text(raw: &str) -> String {
    let Ok(mut json) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    redact_json_value(&mut json);
    serde_json::to_string(&json).unwrap_or_else(|_| raw.to_string())
}

fn redact_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *item = Value::from(REDACTION);
                } else {
                    redact_json_value(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json_value),
        _ => {}
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        None => input.to_string(),
        Some((cut, _)) => format!(
            "{}... <truncated {} chars>",
            &input[..cut],
            input[cut..].chars().count()
        ),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(key))
}
