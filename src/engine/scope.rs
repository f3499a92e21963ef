use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::{
    common::util::BodyBytes,
    engine::{
        rule::{BodyMatcher, PathPattern, QueryMatcher, Rule, RuleDefinition, ValuePattern},
        Engine,
    },
    Method,
};

/// Options that apply to every rule of a scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeOptions {
    /// Headers every request must carry.
    pub reqheaders: Vec<(String, ValuePattern)>,
    /// Headers no request may carry.
    pub badheaders: Vec<String>,
}

impl ScopeOptions {
    pub fn reqheader<N: Into<String>, V: Into<ValuePattern>>(mut self, name: N, value: V) -> Self {
        self.reqheaders.push((name.into(), value.into()));
        self
    }

    pub fn badheader<N: Into<String>>(mut self, name: N) -> Self {
        self.badheaders.push(name.into());
        self
    }
}

/// A handle to the rules registered for one origin.
///
/// Scopes are created by [`Engine::scope`]. Rules are added with one of the request methods
/// (e.g. [`post`](Scope::post)) followed by [`Interceptor::reply`], which hands the scope back
/// so more rules can be chained:
///
/// ```
/// use mockdiff::engine::Engine;
/// use serde_json::json;
///
/// let engine = Engine::new();
/// engine
///     .scope("http://example.com")
///     .unwrap()
///     .get("/health")
///     .reply(204, "")
///     .post("/users")
///     .json_body(json!({ "name": "Fred" }))
///     .reply_json(201, json!({ "id": 1 }));
///
/// assert_eq!(engine.active_mocks().len(), 2);
/// ```
///
/// A scope is removed by [`Engine::clean_all`]. Rules added through a handle of a removed scope
/// are ignored.
#[derive(Clone)]
pub struct Scope {
    engine: Engine,
    id: usize,
    base_path: String,
    options: Arc<ScopeOptions>,
}

impl Scope {
    pub(crate) fn new(
        engine: Engine,
        id: usize,
        base_path: String,
        options: Arc<ScopeOptions>,
    ) -> Self {
        Self {
            engine,
            id,
            base_path,
            options,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The normalized origin of this scope, e.g. `http://example.com:80`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn options(&self) -> &ScopeOptions {
        &self.options
    }

    pub fn intercept<P: Into<String>>(&self, method: Method, path: P) -> Interceptor {
        Interceptor::new(self.clone(), method, PathPattern::Exact(path.into()))
    }

    pub fn intercept_regex(&self, method: Method, path: Regex) -> Interceptor {
        Interceptor::new(self.clone(), method, PathPattern::Regex(path))
    }

    pub fn get<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::GET, path)
    }

    pub fn post<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::POST, path)
    }

    pub fn put<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::PUT, path)
    }

    pub fn patch<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::PATCH, path)
    }

    pub fn delete<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::DELETE, path)
    }

    pub fn head<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::HEAD, path)
    }

    pub fn options_request<P: Into<String>>(&self, path: P) -> Interceptor {
        self.intercept(Method::OPTIONS, path)
    }

    /// The rules of this scope grouped by route key. Keys and rules keep registration order.
    pub fn keyed_interceptors(&self) -> IndexMap<String, Vec<Rule>> {
        self.engine.lock().keyed_rules(self.id)
    }

    pub fn active_mocks(&self) -> Vec<String> {
        self.engine.lock().active_mocks(Some(self.id))
    }

    pub fn pending_mocks(&self) -> Vec<String> {
        self.engine.lock().pending_mocks(Some(self.id))
    }

    /// Returns `true` if every rule of this scope has been satisfied.
    pub fn is_done(&self) -> bool {
        self.pending_mocks().is_empty()
    }

    fn register(&self, definition: RuleDefinition) {
        self.engine.lock().add_rule(
            self.id,
            &self.base_path,
            self.options.clone(),
            definition,
        );
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("base_path", &self.base_path)
            .field("options", &self.options)
            .finish()
    }
}

/// Builder for a single rule. Nothing is registered until one of the `reply` methods is called.
pub struct Interceptor {
    scope: Scope,
    definition: RuleDefinition,
}

impl Interceptor {
    fn new(scope: Scope, method: Method, path: PathPattern) -> Self {
        Self {
            scope,
            definition: RuleDefinition::new(method, path),
        }
    }

    /// Requires a header with exactly this value. Header names are case-insensitive.
    pub fn match_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.definition
            .headers
            .push((name.into(), ValuePattern::Exact(value.into())));
        self
    }

    /// Requires a header whose value matches `value`.
    pub fn match_header_regex<N: Into<String>>(mut self, name: N, value: Regex) -> Self {
        self.definition
            .headers
            .push((name.into(), ValuePattern::Regex(value)));
        self
    }

    /// Requires the query string to consist of exactly these parameters.
    pub fn query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params: BTreeMap<String, String> = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.definition.query = Some(QueryMatcher::Exact(params));
        self
    }

    /// Accepts any query string.
    pub fn query_any(mut self) -> Self {
        self.definition.query = Some(QueryMatcher::Any);
        self
    }

    /// Requires a JSON body equal to `body`. Formatting and key order do not matter.
    pub fn json_body(mut self, body: Value) -> Self {
        self.definition.body = Some(BodyMatcher::Json(body));
        self
    }

    /// Requires exactly this body.
    pub fn body<B: Into<String>>(mut self, body: B) -> Self {
        self.definition.body = Some(BodyMatcher::Exact(body.into()));
        self
    }

    pub fn body_regex(mut self, body: Regex) -> Self {
        self.definition.body = Some(BodyMatcher::Regex(body));
        self
    }

    /// The number of requests this rule answers before it is consumed. Defaults to 1.
    pub fn times(mut self, times: usize) -> Self {
        self.definition.times = times;
        self
    }

    pub fn once(self) -> Self {
        self.times(1)
    }

    pub fn twice(self) -> Self {
        self.times(2)
    }

    pub fn thrice(self) -> Self {
        self.times(3)
    }

    /// Keeps the rule active no matter how often it is called.
    pub fn persist(mut self) -> Self {
        self.definition.persist = true;
        self
    }

    /// Adds a header to the response.
    pub fn reply_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.definition
            .reply
            .headers
            .push((name.into(), value.into()));
        self
    }

    /// Registers the rule with the given response and returns the scope for chaining.
    pub fn reply<B: Into<Bytes>>(mut self, status: u16, body: B) -> Scope {
        let body: Bytes = body.into();
        self.definition.reply.status = status;
        self.definition.reply.body = BodyBytes::from(body);
        self.scope.register(self.definition);
        self.scope
    }

    /// Registers the rule with a JSON response and returns the scope for chaining.
    pub fn reply_json(mut self, status: u16, body: Value) -> Scope {
        let has_content_type = self
            .definition
            .reply
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            self = self.reply_header("content-type", "application/json");
        }
        self.reply(status, body.to_string())
    }
}
