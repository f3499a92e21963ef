use std::{collections::BTreeMap, sync::Arc};

use indexmap::IndexMap;
use serde::Serialize;

use crate::engine::{
    client::{InterceptedRequest, Response},
    matchers::{self, Matcher},
    rule::{is_consumed, route_key, Rule, RuleDefinition},
    scope::ScopeOptions,
    Error, NO_MATCH_MESSAGE_PREFIX,
};

pub(crate) struct ScopeEntry {
    pub id: usize,
    pub base_path: String,
}

pub(crate) struct RuleEntry {
    pub id: usize,
    pub scope_id: usize,
    pub key: String,
    pub base_path: String,
    pub definition: Arc<RuleDefinition>,
    pub options: Arc<ScopeOptions>,
    pub counter: usize,
}

impl RuleEntry {
    fn snapshot(&self) -> Rule {
        Rule {
            id: self.id,
            key: self.key.clone(),
            base_path: self.base_path.clone(),
            definition: self.definition.clone(),
            counter: self.counter,
        }
    }

    fn is_consumed(&self) -> bool {
        is_consumed(&self.definition, self.counter)
    }

    fn is_pending(&self) -> bool {
        !self.is_consumed() && !(self.definition.persist && self.counter > 0)
    }
}

pub(crate) struct EngineState {
    next_scope_id: usize,
    next_rule_id: usize,
    scopes: Vec<ScopeEntry>,
    rules: Vec<RuleEntry>,
    matchers: Vec<Box<dyn Matcher + Send + Sync>>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            next_scope_id: 0,
            next_rule_id: 0,
            scopes: Vec::new(),
            rules: Vec::new(),
            matchers: matchers::all(),
        }
    }
}

impl EngineState {
    pub fn add_scope(&mut self, base_path: &str) -> usize {
        let id = self.next_scope_id;
        self.scopes.push(ScopeEntry {
            id,
            base_path: base_path.to_string(),
        });
        self.next_scope_id += 1;
        id
    }

    pub fn add_rule(
        &mut self,
        scope_id: usize,
        base_path: &str,
        options: Arc<ScopeOptions>,
        definition: RuleDefinition,
    ) -> Option<usize> {
        // Scope ids are never reused, so a missing scope was removed by a reset.
        if !self.scopes.iter().any(|s| s.id == scope_id) {
            tracing::warn!(
                "Ignoring rule {} {}{} for scope {} which was removed by a reset",
                definition.method,
                base_path,
                definition.path,
                scope_id
            );
            return None;
        }

        let id = self.next_rule_id;
        let key = route_key(definition.method, base_path, &definition.path);

        tracing::debug!("Adding rule {} with key {}", id, key);

        self.rules.push(RuleEntry {
            id,
            scope_id,
            key,
            base_path: base_path.to_string(),
            definition: Arc::new(definition),
            options,
            counter: 0,
        });
        self.next_rule_id += 1;
        Some(id)
    }

    /// Rules of one scope grouped by route key, in registration order.
    pub fn keyed_rules(&self, scope_id: usize) -> IndexMap<String, Vec<Rule>> {
        let mut result: IndexMap<String, Vec<Rule>> = IndexMap::new();
        for rule in self.rules.iter().filter(|r| r.scope_id == scope_id) {
            result
                .entry(rule.key.clone())
                .or_default()
                .push(rule.snapshot());
        }
        result
    }

    pub fn active_mocks(&self, scope_id: Option<usize>) -> Vec<String> {
        self.rules_of(scope_id)
            .filter(|r| !r.is_consumed())
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn pending_mocks(&self, scope_id: Option<usize>) -> Vec<String> {
        self.rules_of(scope_id)
            .filter(|r| r.is_pending())
            .map(|r| r.key.clone())
            .collect()
    }

    pub fn reset(&mut self) {
        self.scopes.clear();
        self.rules.clear();
    }

    pub fn serve(&mut self, req: &InterceptedRequest) -> Result<Response, Error> {
        let origin = req.origin().ok_or_else(|| {
            Error::InvalidRequest(format!("request URL {} has no origin", req.url))
        })?;

        if !self.scopes.iter().any(|s| s.base_path == origin) {
            return Err(Error::NetConnectNotAllowed {
                url: req.url.to_string(),
            });
        }

        let matchers = &self.matchers;
        let found = self.rules.iter_mut().find(|rule| {
            rule.base_path == origin
                && !rule.is_consumed()
                && matchers.iter().all(|m| m.matches(req, rule))
        });

        match found {
            Some(rule) => {
                rule.counter += 1;
                tracing::debug!(
                    "Matched {} {} with rule {} ({} call(s))",
                    req.method,
                    req.url,
                    rule.key,
                    rule.counter
                );
                Ok(Response::from(&rule.definition.reply))
            }
            None => {
                tracing::debug!("No rule matched {} {}", req.method, req.url);
                Err(Error::NoMatch {
                    message: format!(
                        "{} {}",
                        NO_MATCH_MESSAGE_PREFIX,
                        describe_unmatched(req)?
                    ),
                })
            }
        }
    }

    fn rules_of(&self, scope_id: Option<usize>) -> impl Iterator<Item = &RuleEntry> {
        self.rules
            .iter()
            .filter(move |r| scope_id.map_or(true, |id| r.scope_id == id))
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum HeaderValues {
    Single(String),
    Multiple(Vec<String>),
}

#[derive(Serialize)]
struct UnmatchedRequest<'a> {
    method: String,
    url: &'a str,
    headers: BTreeMap<String, HeaderValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

/// Serializes a request the way it is embedded into no-match messages. Header names are
/// lowercased and headers that occur more than once are reported as arrays.
pub(crate) fn describe_unmatched(req: &InterceptedRequest) -> Result<String, Error> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &req.headers {
        grouped
            .entry(name.to_lowercase())
            .or_default()
            .push(value.clone());
    }

    let headers = grouped
        .into_iter()
        .map(|(name, mut values)| {
            let values = if values.len() == 1 {
                HeaderValues::Single(values.remove(0))
            } else {
                HeaderValues::Multiple(values)
            };
            (name, values)
        })
        .collect();

    let unmatched = UnmatchedRequest {
        method: req.method.to_string(),
        url: req.url.as_str(),
        headers,
        body: if req.body.is_empty() {
            None
        } else {
            Some(req.body.to_string())
        },
    };

    Ok(serde_json::to_string_pretty(&unmatched)?)
}
