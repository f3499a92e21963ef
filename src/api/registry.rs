use std::sync::{Arc, Mutex};

use crate::engine::Scope;

/// The ordered list of scopes created through a [`Mock`](crate::Mock).
///
/// A registry only grows until it is cleared together with the engine it tracks. Cloning a
/// registry yields a handle to the same list, so a registry can be shared between a `Mock`
/// and code that inspects it. Independent test contexts should each use their own registry.
#[derive(Clone, Default)]
pub struct Registry {
    scopes: Arc<Mutex<Vec<Scope>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, scope: Scope) {
        tracing::trace!("Registering scope {} ({})", scope.id(), scope.base_path());
        self.scopes.lock().unwrap().push(scope);
    }

    /// All recorded scopes in creation order.
    pub fn scopes(&self) -> Vec<Scope> {
        self.scopes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.scopes.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn clear(&self) {
        self.scopes.lock().unwrap().clear();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.scopes().iter()).finish()
    }
}
