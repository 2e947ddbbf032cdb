use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Coarse stage of the remote research workflow.
///
/// Variants are declared in progress order; `Error` sits outside that order
/// and is reachable from any non-terminal phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Planning,
    Searching,
    Synthesizing,
    Done,
    Error,
}

impl Phase {
    /// Position in the forward ordering, `None` for `Error`.
    pub fn rank(self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Planning => Some(1),
            Self::Searching => Some(2),
            Self::Synthesizing => Some(3),
            Self::Done => Some(4),
            Self::Error => None,
        }
    }

    /// Whether no further events may change the state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Percent shown for a phase when no explicit `progress` event was sent.
    ///
    /// `None` for `Error`, which keeps whatever percent was reached.
    pub fn progress_floor(self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Planning => Some(33),
            Self::Searching => Some(66),
            Self::Synthesizing => Some(90),
            Self::Done => Some(100),
            Self::Error => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Searching => "searching",
            Self::Synthesizing => "synthesizing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a phase name is not one of the known phases.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    /// Empty input maps to `Idle`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "idle" => Ok(Self::Idle),
            "planning" => Ok(Self::Planning),
            "searching" => Ok(Self::Searching),
            "synthesizing" => Ok(Self::Synthesizing),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

/// Progress percentages sent by the remote workflow at each milestone.
pub mod milestones {
    pub const PLANNING: u8 = 10;
    pub const PLAN_COMPLETE: u8 = 33;
    pub const SEARCHING: u8 = 40;
    pub const SEARCH_COMPLETE: u8 = 66;
    pub const SYNTHESIZING: u8 = 75;
    pub const SYNTHESIS_COMPLETE: u8 = 90;
    pub const DONE: u8 = 100;
}

/// A search result the report can cite by number.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snippet: String,
    /// Search query that surfaced this source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Search tool that found it (`source` on the wire).
    #[serde(
        rename = "source",
        alias = "origin_tool",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub origin_tool: Option<String>,
}

/// Report layout chosen when the research run was requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStructure {
    #[default]
    BulletSummary,
    TwoColumn,
    DetailedReport,
}

impl ReportStructure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BulletSummary => "bullet_summary",
            Self::TwoColumn => "two_column",
            Self::DetailedReport => "detailed_report",
        }
    }
}

impl fmt::Display for ReportStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStructure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bullet_summary" => Ok(Self::BulletSummary),
            "two_column" => Ok(Self::TwoColumn),
            "detailed_report" => Ok(Self::DetailedReport),
            other => Err(format!("unknown report template: {other}")),
        }
    }
}

/// Final research report carried by the `done` event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    #[serde(default)]
    pub structure: ReportStructure,
    /// Markdown body (`content` on the wire).
    #[serde(rename = "content", default, deserialize_with = "null_as_default")]
    pub raw_content: String,
    /// Entries that are not valid sources are dropped individually.
    #[serde(default, deserialize_with = "lenient_sources")]
    pub citations: Vec<Source>,
    #[serde(default)]
    pub dual_search: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_tool: Option<String>,
}

impl ReportDocument {
    /// Builds a report from a `done` payload.
    ///
    /// Accepts `{ "report": {...} }` or the document itself. A payload that
    /// does not have the document shape is kept as raw content so the caller
    /// still has something to display.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let doc = payload.get("report").unwrap_or(payload);
        match serde_json::from_value::<ReportDocument>(doc.clone()) {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(error = %err, "done payload is not a report document; keeping it as raw content");
                let raw_content = match doc {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                ReportDocument {
                    raw_content,
                    ..ReportDocument::default()
                }
            }
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_sources<'de, D>(deserializer: D) -> Result<Vec<Source>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => items,
        Some(other) => {
            tracing::debug!(kind = %json_kind(&other), "citations is not a list; ignoring it");
            return Ok(Vec::new());
        }
        None => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Source>(item) {
            Ok(source) => Some(source),
            Err(err) => {
                tracing::debug!(error = %err, "skipping malformed citation");
                None
            }
        })
        .collect())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
