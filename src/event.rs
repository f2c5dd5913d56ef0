//! `go test -json` event model
//!
//! Each line written by `go test -json` (via `test2json`) is one [`TestEvent`].
//! Events are grouped by package, and a test's subtests share the parent's
//! name as a slash-separated prefix (`TestA/Sub/Leaf`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::BufRead;
use std::time::Duration;
use thiserror::Error;

/// Separator between a test and its subtests in the `Test` field
pub const PATH_SEPARATOR: char = '/';

/// Unix seconds of Go's zero `time.Time` (`0001-01-01T00:00:00Z`)
const GO_ZERO_TIME_UNIX_SECS: i64 = -62_135_596_800;

/// Errors raised while decoding the event stream
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed test event on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read test event stream: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to a test (the `Action` field)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Run,
    Pass,
    Fail,
    Skip,
    Output,
    /// Actions that carry no folding semantics (`pause`, `cont`, `bench`, `start`, ...)
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Run => "run",
            Action::Pass => "pass",
            Action::Fail => "fail",
            Action::Skip => "skip",
            Action::Output => "output",
            Action::Other(other) => other,
        }
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "run" => Action::Run,
            "pass" => Action::Pass,
            "fail" => Action::Fail,
            "skip" => Action::Skip,
            "output" => Action::Output,
            _ => Action::Other(value),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test duration, encoded on the wire as fractional seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Elapsed(Duration);

impl Elapsed {
    pub fn new(duration: Duration) -> Self {
        Elapsed(duration)
    }

    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        Duration::try_from_secs_f64(secs).ok().map(Elapsed)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Serialize for Elapsed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for Elapsed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map(Elapsed)
            .map_err(serde::de::Error::custom)
    }
}

/// Human readable, in the largest unit below the value (`1.5s`, `250ms`, `0s`)
impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }

        let (value, unit) = if nanos < 1_000 {
            (nanos as f64, "ns")
        } else if nanos < 1_000_000 {
            (nanos as f64 / 1e3, "µs")
        } else if nanos < 1_000_000_000 {
            (nanos as f64 / 1e6, "ms")
        } else {
            (nanos as f64 / 1e9, "s")
        };

        let text = format!("{value:.3}");
        let text = text.trim_end_matches('0').trim_end_matches('.');
        write!(f, "{text}{unit}")
    }
}

/// One line of `go test -json` output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestEvent {
    /// When the event happened; `None` when absent or Go's zero time
    #[serde(
        rename = "Time",
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,

    pub action: Action,

    /// Import path of the package the event belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,

    /// Test and subtest path; empty for package-level events
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub test: String,

    /// Set on `pass` and `fail`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Elapsed>,

    /// Set on `output`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let timestamp = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(timestamp.filter(|t| t.timestamp() != GO_ZERO_TIME_UNIX_SECS))
}

impl TestEvent {
    pub fn new(action: Action, package: impl Into<String>, test: impl Into<String>) -> Self {
        TestEvent {
            timestamp: None,
            action,
            package: package.into(),
            test: test.into(),
            elapsed: None,
            output: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(Elapsed::new(elapsed));
        self
    }

    pub fn with_output(mut self, text: impl Into<String>) -> Self {
        self.output = Some(text.into());
        self
    }

    /// Test path segments; an empty path has none
    pub fn path_segments(&self) -> Vec<&str> {
        if self.test.is_empty() {
            Vec::new()
        } else {
            self.test.split(PATH_SEPARATOR).collect()
        }
    }

    pub fn elapsed_duration(&self) -> Duration {
        self.elapsed.map(|e| e.as_duration()).unwrap_or_default()
    }
}

/// Decode a single JSON record; `line` is only used for error reporting
pub fn decode_line(line: usize, text: &str) -> Result<TestEvent, DecodeError> {
    serde_json::from_str(text).map_err(|source| DecodeError::Malformed { line, source })
}

/// Pull-based decoder over a line-oriented reader
///
/// Yields one item per non-blank line. Callers are expected to stop at the
/// first error.
pub struct EventStream<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> EventStream<R> {
    pub fn new(reader: R) -> Self {
        EventStream {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far
    pub fn lines_read(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Result<TestEvent, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line += 1;
                    let text = self.buf.trim();
                    if text.is_empty() {
                        continue;
                    }
                    return Some(decode_line(self.line, text));
                }
                Err(e) => return Some(Err(DecodeError::Io(e))),
            }
        }
    }
}
