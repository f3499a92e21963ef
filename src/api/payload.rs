use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// The request that failed to match, reconstructed from an engine error message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveredPayload {
    pub method: Option<String>,
    /// Origin and path of the request URL. The query string is moved to `query`.
    pub url: String,
    pub query: BTreeMap<String, String>,
    /// Header values by name. Only the first value of a repeated header is kept.
    pub headers: BTreeMap<String, String>,
    /// The body parsed as JSON, or the raw string if it is not valid JSON.
    pub body: Option<Value>,
}

#[derive(Debug, Error)]
#[error("could not parse payload from error message: {reason}")]
pub struct PayloadParseError {
    message: String,
    reason: String,
}

impl PayloadParseError {
    fn new<R: Into<String>>(message: &str, reason: R) -> Self {
        Self {
            message: message.to_string(),
            reason: reason.into(),
        }
    }

    /// The error message that could not be parsed.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Recovers the unmatched request from the message of a no-match error.
pub trait PayloadParser {
    fn parse(&self, message: &str) -> Result<RecoveredPayload, PayloadParseError>;
}

/// Reads the first JSON object embedded in the message. The object must have a `url` field and
/// may have `method`, `headers` and `body` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPayloadParser;

impl PayloadParser for JsonPayloadParser {
    fn parse(&self, message: &str) -> Result<RecoveredPayload, PayloadParseError> {
        let object = JsonObjects::new(message)
            .next()
            .ok_or_else(|| PayloadParseError::new(message, "no JSON object found"))?;

        let raw_url = object
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| PayloadParseError::new(message, "field `url` is missing"))?;
        let url = Url::parse(raw_url)
            .map_err(|e| PayloadParseError::new(message, format!("invalid url {}: {}", raw_url, e)))?;

        let query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let headers = match object.get("headers") {
            Some(Value::Object(headers)) => headers
                .iter()
                .filter_map(|(name, value)| first_value(value).map(|v| (name.clone(), v)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let body = match object.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(
                serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone())),
            ),
            Some(other) => Some(other.clone()),
        };

        Ok(RecoveredPayload {
            method: object
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string),
            url: format!("{}{}", url.origin().ascii_serialization(), url.path()),
            query,
            headers,
            body,
        })
    }
}

fn first_value(value: &Value) -> Option<String> {
    match value {
        Value::Array(values) => values.first().and_then(first_value),
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Iterates over the JSON objects embedded in a text, skipping brace-delimited fragments that
/// are not valid JSON.
pub(crate) struct JsonObjects<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> JsonObjects<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl Iterator for JsonObjects<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        while let Some(offset) = self.text[self.pos..].find('{') {
            let start = self.pos + offset;
            self.pos = start + 1;

            if let Some(len) = balanced_len(&self.text[start..]) {
                let candidate = &self.text[start..start + len];
                if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                    self.pos = start + len;
                    return Some(value);
                }
            }
        }
        None
    }
}

/// Byte length of the brace-balanced fragment at the start of `text`. Braces inside string
/// literals are ignored.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }

    None
}
