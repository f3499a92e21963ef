//! An in-process HTTP interception engine.
//!
//! Rules are registered on [`Scope`]s, one scope per origin (`scheme://host:port`). Requests are
//! sent through the engine's [`Client`] and never leave the process: the first unconsumed rule
//! that matches a request answers it. A request that no rule matches fails with an [`Error`]
//! whose [`code`](Error::code) is [`ErrorCode::NoMatch`] and whose message embeds a JSON
//! description of the request.
//!
//! The diagnostic layer ([`crate::Mock`]) only relies on the parts of this module listed below:
//!
//! * [`Engine::scope`] / [`Engine::scope_with`] to create scopes,
//! * [`Scope::keyed_interceptors`] to read the rules of a scope,
//! * [`Engine::active_mocks`] to learn which route keys still have unconsumed rules,
//! * [`Engine::clean_all`] to reset everything,
//! * [`ErrorCode::NoMatch`] and the no-match message format.
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use url::Url;

mod client;
mod matchers;
mod rule;
mod scope;
mod state;

pub use client::{Client, InterceptedRequest, RequestBuilder, Response};
pub use rule::{
    BodyMatcher, PathPattern, QueryMatcher, ReplyTemplate, Rule, RuleDefinition, ValuePattern,
};
pub use scope::{Interceptor, Scope, ScopeOptions};

use state::EngineState;

/// Prefix of the message carried by [`Error::NoMatch`].
pub const NO_MATCH_MESSAGE_PREFIX: &str = "No match for request";

/// Machine readable discriminator of an engine [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoMatch,
    NetConnectNotAllowed,
    InvalidBaseUrl,
    InvalidRequest,
    Json,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoMatch => "ERR_NO_MATCH",
            ErrorCode::NetConnectNotAllowed => "ERR_NET_CONNECT_NOT_ALLOWED",
            ErrorCode::InvalidBaseUrl => "ERR_INVALID_BASE_URL",
            ErrorCode::InvalidRequest => "ERR_INVALID_REQUEST",
            ErrorCode::Json => "ERR_JSON",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// No registered rule matched the request. The message embeds the request as JSON.
    #[error("{message}")]
    NoMatch { message: String },
    #[error("net connect not allowed: no scope is registered for {url}")]
    NetConnectNotAllowed { url: String },
    #[error("invalid base URL {base}: {reason}")]
    InvalidBaseUrl { base: String, reason: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NoMatch { .. } => ErrorCode::NoMatch,
            Error::NetConnectNotAllowed { .. } => ErrorCode::NetConnectNotAllowed,
            Error::InvalidBaseUrl { .. } => ErrorCode::InvalidBaseUrl,
            Error::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Error::Json(_) => ErrorCode::Json,
        }
    }
}

/// A handle to an interception engine. Cloning the handle is cheap and all clones share the
/// same rules.
#[derive(Clone, Default)]
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope for the origin of `base` (e.g. `http://example.com`).
    pub fn scope(&self, base: &str) -> Result<Scope, Error> {
        self.scope_with(base, ScopeOptions::default())
    }

    /// Creates a scope for the origin of `base` with additional scope wide options.
    pub fn scope_with(&self, base: &str, options: ScopeOptions) -> Result<Scope, Error> {
        let base_path = normalize_base(base)?;
        let options = Arc::new(options);
        let id = self.lock().add_scope(&base_path);

        tracing::debug!("Created scope {} for {}", id, base_path);

        Ok(Scope::new(self.clone(), id, base_path, options))
    }

    /// Route keys of all rules that have not been consumed yet, in registration order.
    pub fn active_mocks(&self) -> Vec<String> {
        self.lock().active_mocks(None)
    }

    /// Like [`active_mocks`](Engine::active_mocks) but without persisted rules that
    /// have already been called.
    pub fn pending_mocks(&self) -> Vec<String> {
        self.lock().pending_mocks(None)
    }

    /// Returns `true` if every registered rule has been satisfied.
    pub fn is_done(&self) -> bool {
        self.pending_mocks().is_empty()
    }

    /// Removes every scope and rule.
    pub fn clean_all(&self) {
        tracing::debug!("Removing all scopes and rules");
        self.lock().reset();
    }

    /// Returns a client that sends its requests through this engine.
    pub fn client(&self) -> Client {
        Client::new(self.clone())
    }

    pub(crate) fn dispatch(&self, req: &InterceptedRequest) -> Result<Response, Error> {
        self.lock().serve(req)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }
}

/// Reduces a base URL to `scheme://host:port`, filling in the default port of the scheme.
pub(crate) fn normalize_base(base: &str) -> Result<String, Error> {
    let invalid = |reason: &str| Error::InvalidBaseUrl {
        base: base.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(base).map_err(|e| invalid(&e.to_string()))?;
    origin_of(&url).ok_or_else(|| invalid("URL has no host or port"))
}

pub(crate) fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}://{}:{}", url.scheme(), host, port))
}
