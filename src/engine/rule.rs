use crate::{common::util::BodyBytes, Method};
use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// An expected value that is either compared literally or matched against a regular expression.
#[derive(Debug, Clone)]
pub enum ValuePattern {
    Exact(String),
    Regex(Regex),
}

impl ValuePattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            ValuePattern::Exact(expected) => expected == value,
            ValuePattern::Regex(re) => re.is_match(value),
        }
    }
}

impl fmt::Display for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePattern::Exact(v) => write!(f, "{}", v),
            ValuePattern::Regex(re) => write!(f, "{}", re.as_str()),
        }
    }
}

impl From<&str> for ValuePattern {
    fn from(value: &str) -> Self {
        ValuePattern::Exact(value.to_string())
    }
}

impl From<String> for ValuePattern {
    fn from(value: String) -> Self {
        ValuePattern::Exact(value)
    }
}

impl From<Regex> for ValuePattern {
    fn from(value: Regex) -> Self {
        ValuePattern::Regex(value)
    }
}

/// The request path a rule is registered for.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Exact(String),
    Regex(Regex),
}

impl PathPattern {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(expected) => expected == path,
            PathPattern::Regex(re) => re.is_match(path),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathPattern::Exact(p) => write!(f, "{}", p),
            PathPattern::Regex(re) => write!(f, "{}", re.as_str()),
        }
    }
}

/// How a rule treats the query string of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMatcher {
    /// The request query must consist of exactly these parameters.
    Exact(BTreeMap<String, String>),
    /// Any query string is accepted.
    Any,
}

impl QueryMatcher {
    /// JSON view used when comparing against a recovered request.
    pub fn to_json(&self) -> Value {
        match self {
            QueryMatcher::Exact(params) => Value::Object(
                params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            QueryMatcher::Any => Value::Bool(true),
        }
    }
}

/// How a rule treats the request body.
#[derive(Debug, Clone)]
pub enum BodyMatcher {
    Json(Value),
    Exact(String),
    Regex(Regex),
}

impl BodyMatcher {
    pub fn to_json(&self) -> Value {
        match self {
            BodyMatcher::Json(v) => v.clone(),
            BodyMatcher::Exact(s) => Value::String(s.clone()),
            BodyMatcher::Regex(re) => Value::String(re.as_str().to_string()),
        }
    }
}

/// The response a rule replies with.
#[derive(Debug, Clone)]
pub struct ReplyTemplate {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: BodyBytes,
}

impl Default for ReplyTemplate {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: BodyBytes(Bytes::new()),
        }
    }
}

/// Everything a rule expects from a request, plus what it replies with.
#[derive(Debug, Clone)]
pub struct RuleDefinition {
    pub method: Method,
    pub path: PathPattern,
    pub headers: Vec<(String, ValuePattern)>,
    pub query: Option<QueryMatcher>,
    pub body: Option<BodyMatcher>,
    pub times: usize,
    pub persist: bool,
    pub reply: ReplyTemplate,
}

impl RuleDefinition {
    pub fn new(method: Method, path: PathPattern) -> Self {
        Self {
            method,
            path,
            headers: Vec::new(),
            query: None,
            body: None,
            times: 1,
            persist: false,
            reply: ReplyTemplate::default(),
        }
    }
}

/// Builds the route key of a rule, e.g. `POST http://example.com:80/foo`.
pub(crate) fn route_key(method: Method, base_path: &str, path: &PathPattern) -> String {
    format!("{} {}{}", method, base_path, path)
}

/// A snapshot of one registered rule (an "interceptor") together with its match state at the
/// time the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Rule {
    pub(crate) id: usize,
    pub(crate) key: String,
    pub(crate) base_path: String,
    pub(crate) definition: Arc<RuleDefinition>,
    pub(crate) counter: usize,
}

impl Rule {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The scope origin, e.g. `http://example.com:80`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn method(&self) -> Method {
        self.definition.method
    }

    pub fn path(&self) -> &PathPattern {
        &self.definition.path
    }

    pub fn match_headers(&self) -> &[(String, ValuePattern)] {
        &self.definition.headers
    }

    pub fn query(&self) -> Option<&QueryMatcher> {
        self.definition.query.as_ref()
    }

    pub fn body(&self) -> Option<&BodyMatcher> {
        self.definition.body.as_ref()
    }

    /// Number of requests this rule has answered.
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn is_consumed(&self) -> bool {
        is_consumed(&self.definition, self.counter)
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.counter == other.counter && self.key == other.key
    }
}

#[inline]
pub(crate) fn is_consumed(definition: &RuleDefinition, counter: usize) -> bool {
    !definition.persist && counter >= definition.times
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn route_key_test() {
        let key = route_key(
            Method::POST,
            "http://example.com:80",
            &PathPattern::Exact("/foo".to_string()),
        );
        assert_eq!(key, "POST http://example.com:80/foo");
    }

    #[test]
    fn consumption_test() {
        let mut definition = RuleDefinition::new(Method::GET, PathPattern::Exact("/".into()));
        assert!(!is_consumed(&definition, 0));
        assert!(is_consumed(&definition, 1));

        definition.times = 3;
        assert!(!is_consumed(&definition, 2));

        definition.persist = true;
        assert!(!is_consumed(&definition, 10));
    }

    #[test]
    fn value_pattern_test() {
        assert!(ValuePattern::from("secret").matches("secret"));
        assert!(!ValuePattern::from("secret").matches("Secret"));

        let pattern = ValuePattern::from(Regex::new("^token [0-9]+$").unwrap());
        assert!(pattern.matches("token 123"));
        assert_eq!(pattern.to_string(), "^token [0-9]+$");
    }

    #[test]
    fn query_matcher_to_json_test() {
        let mut params = BTreeMap::new();
        params.insert("a".to_string(), "b".to_string());

        assert_eq!(
            QueryMatcher::Exact(params).to_json(),
            serde_json::json!({ "a": "b" })
        );
        assert_eq!(QueryMatcher::Any.to_json(), Value::Bool(true));
    }
}
