pub use context::{BoxError, FailureKind, RunError, RunState};
pub use mock::{InterceptorMap, Mock, MockBuilder};
pub use payload::{JsonPayloadParser, PayloadParseError, PayloadParser, RecoveredPayload};
pub use registry::Registry;
pub use report::{
    BufferSink, ExpectedRequest, ReportConfig, ReportError, ReportSink, Reporter, StdoutSink,
};

mod context;
mod mock;
mod payload;
mod registry;
mod report;
