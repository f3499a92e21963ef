use similar::{ChangeTag, TextDiff};

/// HTTP methods a rule can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a line diff, including its line break.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineDiff {
    Same(String),
    Added(String),
    Removed(String),
}

/// Diffs `expected` against `actual` line by line.
pub(crate) fn diff_lines(expected: &str, actual: &str) -> Vec<LineDiff> {
    TextDiff::from_lines(expected, actual)
        .iter_all_changes()
        .map(|change| {
            let line = change.to_string_lossy().into_owned();
            match change.tag() {
                ChangeTag::Equal => LineDiff::Same(line),
                ChangeTag::Insert => LineDiff::Added(line),
                ChangeTag::Delete => LineDiff::Removed(line),
            }
        })
        .collect()
}
