use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Write},
    sync::{Arc, Mutex},
};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::{
    api::{mock::InterceptorMap, payload::PayloadParseError, RecoveredPayload},
    common::{
        data::{diff_lines, LineDiff},
        util::remove_trailing_linebreak,
    },
    engine::Rule,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Payload(#[from] PayloadParseError),
    #[error("invalid rule URL {0}: {1}")]
    InvalidUrl(String, url::ParseError),
    #[error("cannot serialize diff input: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot write report: {0}")]
    Io(#[from] io::Error),
}

/// Receives rendered reports.
pub trait ReportSink: Send + Sync {
    fn write_report(&self, report: &str) -> io::Result<()>;
}

/// Writes reports to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl ReportSink for StdoutSink {
    fn write_report(&self, report: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(report.as_bytes())?;
        out.flush()
    }
}

/// Collects reports in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    buffer: Arc<Mutex<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }
}

impl ReportSink for BufferSink {
    fn write_report(&self, report: &str) -> io::Result<()> {
        self.buffer.lock().unwrap().push_str(report);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Emit ANSI colors. Has no effect unless the `color` feature is enabled.
    pub color: bool,
    /// Text of the banner that opens every block.
    pub banner: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            color: cfg!(feature = "color"),
            banner: String::from("Possible match"),
        }
    }
}

impl ReportConfig {
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn banner<S: Into<String>>(mut self, banner: S) -> Self {
        self.banner = banner.into();
        self
    }
}

/// What a rule expects, in a shape that can be compared with a [`RecoveredPayload`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedRequest {
    pub method: String,
    /// Scope origin joined with the rule path. Default ports are omitted.
    pub url: String,
    /// `null` without a query requirement, `true` if any query is accepted.
    pub query: Value,
    pub headers: BTreeMap<String, String>,
    /// `null` without a body requirement.
    pub body: Value,
}

impl ExpectedRequest {
    pub fn from_rule(rule: &Rule) -> Result<Self, ReportError> {
        let mut url = Url::parse(rule.base_path())
            .map_err(|e| ReportError::InvalidUrl(rule.base_path().to_string(), e))?;
        url.set_path(&rule.path().to_string());

        Ok(Self {
            method: rule.method().to_string(),
            url: url.to_string(),
            query: rule.query().map_or(Value::Null, |q| q.to_json()),
            headers: rule
                .match_headers()
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
            body: rule.body().map_or(Value::Null, |b| b.to_json()),
        })
    }
}

pub(crate) struct Comparison {
    pub query: Vec<LineDiff>,
    pub headers: Vec<LineDiff>,
    pub body: Vec<LineDiff>,
}

/// Diffs an expectation against the received request. Only headers the rule names take part,
/// and header names are compared case-insensitively.
pub(crate) fn compare(
    expected: &ExpectedRequest,
    received: &RecoveredPayload,
) -> Result<Comparison, ReportError> {
    let (expected_headers, received_headers) = fold_headers(&expected.headers, &received.headers);

    Ok(Comparison {
        query: diff_json(&expected.query, &serde_json::to_value(&received.query)?)?,
        headers: diff_json(
            &serde_json::to_value(expected_headers)?,
            &serde_json::to_value(received_headers)?,
        )?,
        body: diff_json(&expected.body, received.body.as_ref().unwrap_or(&Value::Null))?,
    })
}

pub(crate) fn fold_headers(
    expected: &BTreeMap<String, String>,
    received: &BTreeMap<String, String>,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let names: BTreeSet<String> = expected.keys().map(|k| k.to_lowercase()).collect();

    let expected = expected
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();
    let received = received
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .filter(|(k, _)| names.contains(k))
        .collect();

    (expected, received)
}

fn diff_json(expected: &Value, actual: &Value) -> Result<Vec<LineDiff>, ReportError> {
    let expected = format!("{}\n", serde_json::to_string_pretty(expected)?);
    let actual = format!("{}\n", serde_json::to_string_pretty(actual)?);
    Ok(diff_lines(&expected, &actual))
}

#[derive(Clone, Copy)]
enum Style {
    Banner,
    Label,
    Method,
    Added,
    Removed,
}

#[cfg(feature = "color")]
fn paint(text: &str, style: Style, color: bool) -> String {
    use colored::Colorize;

    if !color {
        return text.to_string();
    }

    match style {
        Style::Banner => text.black().on_yellow().to_string(),
        Style::Label => text.yellow().bold().to_string(),
        Style::Method => text.magenta().to_string(),
        Style::Added => text.green().to_string(),
        Style::Removed => text.red().to_string(),
    }
}

#[cfg(not(feature = "color"))]
fn paint(text: &str, _style: Style, _color: bool) -> String {
    text.to_string()
}

/// Renders one "possible match" block per active rule and hands it to a [`ReportSink`].
#[derive(Clone)]
pub struct Reporter {
    config: ReportConfig,
    sink: Arc<dyn ReportSink>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(ReportConfig::default(), Arc::new(StdoutSink))
    }
}

impl Reporter {
    pub fn new(config: ReportConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Renders the report for all unconsumed rules in `interceptors`, in key order and then
    /// list order. Returns an empty string if there are no such rules.
    pub fn render(
        &self,
        interceptors: &InterceptorMap,
        received: &RecoveredPayload,
    ) -> Result<String, ReportError> {
        let mut output = String::new();
        for rule in interceptors.values().flatten().filter(|r| !r.is_consumed()) {
            let expected = ExpectedRequest::from_rule(rule)?;
            let comparison = compare(&expected, received)?;
            output.push_str(&self.render_block(&expected, &comparison));
        }
        Ok(output)
    }

    /// Renders the report and writes it to the sink. Nothing is written if there are no rules.
    pub fn report(
        &self,
        interceptors: &InterceptorMap,
        received: &RecoveredPayload,
    ) -> Result<(), ReportError> {
        let output = self.render(interceptors, received)?;
        if !output.is_empty() {
            self.sink.write_report(&output)?;
        }
        Ok(())
    }

    fn render_block(&self, expected: &ExpectedRequest, comparison: &Comparison) -> String {
        let color = self.config.color;
        let mut output = String::new();

        output.push_str(&paint(&format!(" {} ", self.config.banner), Style::Banner, color));
        output.push('\n');
        output.push_str(&format!(
            "{}{} {}\n",
            paint("URL: ", Style::Label, color),
            paint(&expected.method, Style::Method, color),
            expected.url
        ));

        for (label, diff) in [
            ("Query:", &comparison.query),
            ("Headers:", &comparison.headers),
            ("Body:", &comparison.body),
        ] {
            output.push_str(&paint(label, Style::Label, color));
            output.push('\n');
            output.push_str(&self.render_diff(diff));
        }

        output.push('\n');
        output
    }

    fn render_diff(&self, diff: &[LineDiff]) -> String {
        let color = self.config.color;
        let mut output = String::new();

        for d in diff {
            let (prefix, edit, style) = match d {
                LineDiff::Same(edit) => (" ", edit, None),
                LineDiff::Added(edit) => ("+", edit, Some(Style::Added)),
                LineDiff::Removed(edit) => ("-", edit, Some(Style::Removed)),
            };

            for line in remove_trailing_linebreak(edit).split('\n') {
                let line = format!("{} {}", prefix, line);
                match style {
                    Some(style) => output.push_str(&paint(&line, style, color)),
                    None => output.push_str(&line),
                }
                output.push('\n');
            }
        }

        output
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("config", &self.config)
            .finish()
    }
}
