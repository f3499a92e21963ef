use std::{error::Error as StdError, future::Future};

use thiserror::Error;

use crate::{
    api::{mock::Mock, report::ReportError},
    common::util::Join,
    engine::{self, ErrorCode},
};

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The failure returned by [`Mock::run_in_context`].
#[derive(Debug, Error)]
pub enum RunError {
    /// The callback sent a request that matched no rule.
    #[error("No match for request")]
    NoMatch,
    /// Any other failure of the callback, unchanged.
    #[error(transparent)]
    Other(BoxError),
}

impl RunError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            RunError::NoMatch => FailureKind::NoMatch,
            RunError::Other(_) => FailureKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NoMatch,
    Other,
}

/// States of a single [`Mock::run_in_context`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Succeeded,
    Failed(FailureKind),
}

impl Mock {
    /// Runs `callback` and explains a failed request match.
    ///
    /// If the callback fails because the engine found no rule for a request, every rule that is
    /// still active is compared with that request and the result is written to the report sink.
    /// The call then fails with [`RunError::NoMatch`]. Any other failure is returned as
    /// [`RunError::Other`] without a report.
    pub async fn run_in_context<F, Fut, T>(&self, callback: F) -> Result<T, RunError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        transition(RunState::Running);

        let err = match callback().await {
            Ok(value) => {
                transition(RunState::Succeeded);
                return Ok(value);
            }
            Err(err) => err,
        };

        let message = match find_no_match(err.as_ref()) {
            Some(message) => message,
            None => {
                transition(RunState::Failed(FailureKind::Other));
                return Err(RunError::Other(err));
            }
        };

        transition(RunState::Failed(FailureKind::NoMatch));

        if let Err(report_err) = self.report_unmatched(&message) {
            tracing::warn!("Cannot explain unmatched request: {}", report_err);
        }

        Err(RunError::NoMatch)
    }

    /// Blocking variant of [`run_in_context`](Mock::run_in_context). The callback is driven on the
    /// current thread, so it must not depend on a runtime that is not running.
    pub fn run_in_context_blocking<F, Fut, T>(&self, callback: F) -> Result<T, RunError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BoxError>>,
    {
        self.run_in_context(callback).join()
    }

    fn report_unmatched(&self, message: &str) -> Result<(), ReportError> {
        let interceptors = self.get_active_interceptors();
        let payload = self.parser.parse(message)?;

        tracing::debug!(
            "Comparing unmatched request {} with {} active route(s)",
            payload.url,
            interceptors.len()
        );

        self.reporter.report(&interceptors, &payload)
    }
}

#[inline]
fn transition(state: RunState) {
    tracing::trace!("Context runner state: {:?}", state);
}

/// Searches the error and its sources for an engine no-match error and returns its message.
fn find_no_match(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(engine_err) = e.downcast_ref::<engine::Error>() {
            if engine_err.code() == ErrorCode::NoMatch {
                return Some(engine_err.to_string());
            }
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapper(engine::Error);

    impl fmt::Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    fn no_match() -> engine::Error {
        engine::Error::NoMatch {
            message: "No match for request {\"url\": \"http://example.com/\"}".to_string(),
        }
    }

    #[test]
    fn finds_direct_no_match_test() {
        let err: BoxError = Box::new(no_match());
        assert!(find_no_match(err.as_ref()).unwrap().starts_with("No match for request"));
    }

    #[test]
    fn finds_wrapped_no_match_test() {
        let err: BoxError = Box::new(Wrapper(no_match()));
        assert!(find_no_match(err.as_ref()).is_some());
    }

    #[test]
    fn ignores_other_engine_errors_test() {
        let err: BoxError = Box::new(engine::Error::NetConnectNotAllowed {
            url: "http://example.com/".to_string(),
        });
        assert!(find_no_match(err.as_ref()).is_none());

        let err: BoxError = "plain".into();
        assert!(find_no_match(err.as_ref()).is_none());
    }

    #[test]
    fn failure_kind_test() {
        assert_eq!(RunError::NoMatch.failure_kind(), FailureKind::NoMatch);
        assert_eq!(RunError::Other("x".into()).failure_kind(), FailureKind::Other);
        assert_eq!(RunError::NoMatch.to_string(), "No match for request");
    }
}
