use std::{ops::Deref, sync::Arc};

use indexmap::IndexMap;

use crate::{
    api::{
        payload::{JsonPayloadParser, PayloadParser},
        registry::Registry,
        report::{ReportConfig, ReportSink, Reporter, StdoutSink},
    },
    engine::{self, Engine, Rule, Scope, ScopeOptions},
};

/// Rules grouped by route key. Keys keep the order in which they were first seen.
pub type InterceptorMap = IndexMap<String, Vec<Rule>>;

/// An [`Engine`] that remembers every scope it creates and explains requests that match none of
/// them.
///
/// All engine operations are available on a `Mock` through [`Deref`]. `scope`, `scope_with` and
/// `clean_all` are shadowed so the registry stays in sync with the engine.
///
/// ```
/// use mockdiff::Mock;
/// use serde_json::{json, Value};
///
/// let mock = Mock::new();
/// mock.scope("http://example.com")
///     .unwrap()
///     .get("/health")
///     .reply_json(200, json!({ "status": "up" }));
///
/// let client = mock.client();
/// let status: Value = mock
///     .run_in_context_blocking(|| async move {
///         let response = client.get("http://example.com/health").send().await?;
///         Ok(response.json::<Value>()?)
///     })
///     .unwrap();
///
/// assert_eq!(status, json!({ "status": "up" }));
/// ```
pub struct Mock {
    engine: Engine,
    registry: Registry,
    pub(crate) parser: Box<dyn PayloadParser + Send + Sync>,
    pub(crate) reporter: Reporter,
}

impl Mock {
    /// A mock with a fresh engine, a fresh registry and reports on standard output.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    /// Creates a scope through the engine and records it.
    pub fn scope(&self, base: &str) -> Result<Scope, engine::Error> {
        self.scope_with(base, ScopeOptions::default())
    }

    /// Creates a scope with options through the engine and records it.
    pub fn scope_with(&self, base: &str, options: ScopeOptions) -> Result<Scope, engine::Error> {
        let scope = self.engine.scope_with(base, options)?;
        self.registry.record(scope.clone());
        Ok(scope)
    }

    /// All scopes created through this mock since it was built or last cleaned.
    pub fn scopes(&self) -> Vec<Scope> {
        self.registry.scopes()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Resets the engine and forgets all recorded scopes.
    pub fn clean_all(&self) {
        self.engine.clean_all();
        self.registry.clear();
    }

    /// All rules of all recorded scopes, grouped by route key. Rules of the same key keep scope
    /// creation order first and registration order second.
    pub fn get_interceptors(&self) -> InterceptorMap {
        let mut result = InterceptorMap::new();
        for scope in self.registry.scopes() {
            for (key, rules) in scope.keyed_interceptors() {
                result.entry(key).or_default().extend(rules);
            }
        }
        result
    }

    /// Like [`get_interceptors`](Mock::get_interceptors), restricted to route keys the engine
    /// still reports as active.
    pub fn get_active_interceptors(&self) -> InterceptorMap {
        let active = self.engine.active_mocks();
        let mut interceptors = self.get_interceptors();
        interceptors.retain(|key, _| active.contains(key));
        interceptors
    }
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Mock {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl std::fmt::Debug for Mock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mock")
            .field("registry", &self.registry)
            .field("reporter", &self.reporter)
            .finish()
    }
}

/// Assembles a [`Mock`] from its parts.
pub struct MockBuilder {
    engine: Option<Engine>,
    registry: Option<Registry>,
    parser: Box<dyn PayloadParser + Send + Sync>,
    config: ReportConfig,
    sink: Arc<dyn ReportSink>,
}

impl Default for MockBuilder {
    fn default() -> Self {
        Self {
            engine: None,
            registry: None,
            parser: Box::new(JsonPayloadParser),
            config: ReportConfig::default(),
            sink: Arc::new(StdoutSink),
        }
    }
}

impl MockBuilder {
    /// Wraps an existing engine. Scopes created on the engine directly are not recorded.
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Records scopes in `registry` instead of a new one.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn parser<P: PayloadParser + Send + Sync + 'static>(mut self, parser: P) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn report_config(mut self, config: ReportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sink<S: ReportSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn build(self) -> Mock {
        Mock {
            engine: self.engine.unwrap_or_default(),
            registry: self.registry.unwrap_or_default(),
            parser: self.parser,
            reporter: Reporter::new(self.config, self.sink),
        }
    }
}
