//! `mockdiff` is a Rust crate that explains why an HTTP request in your tests did not match any
//! of your mocks. It contains two major components:
//!
//! * an **interception engine** ([`engine`]) on which you register expected requests and their
//!   replies, and through which your code sends its requests, and
//! * a **diagnostics layer** ([`Mock`]) that wraps the engine, remembers every scope you create and
//!   prints a diff between the request that failed to match and every rule that is still active.
//!
//! # Getting Started
//! Add `mockdiff` to your `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! mockdiff = "0.1"
//! ```
//!
//! You can then use `mockdiff` in your tests like shown in the following example:
//! ```rust
//! use mockdiff::prelude::*;
//! use serde_json::{json, Value};
//!
//! let mock = Mock::new();
//!
//! mock.scope("http://example.com")
//!     .unwrap()
//!     .post("/foo")
//!     .match_header("X-API-KEY", "secret")
//!     .query([("a", "b")])
//!     .json_body(json!({ "foo": "bar" }))
//!     .reply_json(200, json!({ "status": "success" }));
//!
//! let client = mock.client();
//! let result = mock.run_in_context_blocking(|| async move {
//!     let response = client
//!         .post("http://example.com/foo")
//!         .query(&[("a", "b")])
//!         .header("X-API-KEY", "wrong")
//!         .json(&json!({ "foo": "bar" }))
//!         .send()
//!         .await?;
//!     Ok(response.json::<Value>()?)
//! });
//!
//! assert_eq!(result.unwrap_err().to_string(), "No match for request");
//! ```
//! Because the `X-API-KEY` header differs, the engine refuses the request. Before the run fails,
//! `mockdiff` prints a report like the following to standard output:
//!
//! ```text
//!  Possible match
//! URL: POST http://example.com/foo
//! Query:
//!   {
//!     "a": "b"
//!   }
//! Headers:
//!   {
//! -   "x-api-key": "secret"
//! +   "x-api-key": "wrong"
//!   }
//! Body:
//!   {
//!     "foo": "bar"
//!   }
//! ```
//!
//! # Reports
//! Reports are advisory. They are written to a [`ReportSink`], which is standard output unless
//! a different sink is passed to [`MockBuilder::sink`]. Lines are colored when the `color`
//! feature is enabled (the default) and [`ReportConfig::color`] is not turned off.
//!
//! A report is only produced for a failure that the engine signals with
//! [`ErrorCode::NoMatch`](engine::ErrorCode::NoMatch). Any other failure of the callback is
//! returned unchanged in [`RunError::Other`].
//!
//! # Isolation
//! Every [`Mock`] owns its engine and its [`Registry`] unless you pass shared ones to
//! [`MockBuilder`]. Tests that run in parallel therefore do not see each other's scopes.
//!
//! # Logging
//! `mockdiff` logs through [`tracing`](https://docs.rs/tracing). With the `log` feature of
//! `tracing` the events are also visible to any `log` compatible logger, e.g. `env_logger`.
pub mod engine;

mod api;
mod common;

pub use api::{
    BoxError, BufferSink, ExpectedRequest, FailureKind, InterceptorMap, JsonPayloadParser, Mock,
    MockBuilder, PayloadParseError, PayloadParser, RecoveredPayload, Registry, ReportConfig,
    ReportError, ReportSink, Reporter, RunError, RunState, StdoutSink,
};
pub use common::{data::Method, util::BodyBytes};

pub mod prelude {
    #[doc(no_inline)]
    pub use crate::engine::{Engine, Scope, ScopeOptions};
    #[doc(no_inline)]
    pub use crate::{Method, Method::*, Mock, RunError};
}
