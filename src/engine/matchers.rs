use std::collections::BTreeMap;

use assert_json_diff::{assert_json_matches_no_panic, CompareMode, Config};
use serde_json::Value;

use crate::engine::{
    client::InterceptedRequest,
    rule::{BodyMatcher, QueryMatcher, ValuePattern},
    state::RuleEntry,
};

pub(crate) trait Matcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool;
}

pub(crate) fn all() -> Vec<Box<dyn Matcher + Send + Sync>> {
    vec![
        Box::new(MethodMatcher),
        Box::new(PathMatcher),
        Box::new(QueryParamsMatcher),
        Box::new(HeaderMatcher),
        Box::new(BadHeaderMatcher),
        Box::new(BodyContentMatcher),
    ]
}

// ************************************************************************************************
// Method
// ************************************************************************************************
pub(crate) struct MethodMatcher;

impl Matcher for MethodMatcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool {
        req.method == rule.definition.method
    }
}

// ************************************************************************************************
// Path
// ************************************************************************************************
pub(crate) struct PathMatcher;

impl Matcher for PathMatcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool {
        rule.definition.path.matches(req.url.path())
    }
}

// ************************************************************************************************
// Query
// ************************************************************************************************
pub(crate) struct QueryParamsMatcher;

impl Matcher for QueryParamsMatcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool {
        match &rule.definition.query {
            None => req.url.query().map_or(true, str::is_empty),
            Some(QueryMatcher::Any) => true,
            Some(QueryMatcher::Exact(expected)) => {
                let actual: BTreeMap<String, String> = req
                    .url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                &actual == expected
            }
        }
    }
}

// ************************************************************************************************
// Headers
// ************************************************************************************************
pub(crate) struct HeaderMatcher;

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool {
        rule.definition
            .headers
            .iter()
            .chain(rule.options.reqheaders.iter())
            .all(|(name, pattern)| header_matches(req, name, pattern))
    }
}

pub(crate) struct BadHeaderMatcher;

impl Matcher for BadHeaderMatcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool {
        rule.options
            .badheaders
            .iter()
            .all(|name| !req.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)))
    }
}

#[inline]
fn header_matches(req: &InterceptedRequest, name: &str, pattern: &ValuePattern) -> bool {
    req.headers
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case(name))
        .any(|(_, v)| pattern.matches(v))
}

// ************************************************************************************************
// Body
// ************************************************************************************************
pub(crate) struct BodyContentMatcher;

impl Matcher for BodyContentMatcher {
    fn matches(&self, req: &InterceptedRequest, rule: &RuleEntry) -> bool {
        let body = req.body.to_maybe_lossy_str();
        match &rule.definition.body {
            None => true,
            Some(BodyMatcher::Exact(expected)) => expected == body.as_ref(),
            Some(BodyMatcher::Regex(re)) => re.is_match(&body),
            Some(BodyMatcher::Json(expected)) => match serde_json::from_str::<Value>(&body) {
                Ok(actual) => json_equals(expected, &actual),
                Err(_) => false,
            },
        }
    }
}

#[inline]
fn json_equals(expected: &Value, actual: &Value) -> bool {
    assert_json_matches_no_panic(actual, expected, Config::new(CompareMode::Strict)).is_ok()
}
