use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::event::{EventName, StreamEvent};
use crate::model::{Phase, ReportDocument, Source};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Everything known about one research run so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub phase: Phase,
    /// Highest percent reported by `progress` events (or 100 on `done`).
    pub percent: u8,
    pub log_lines: Vec<String>,
    pub plan: Option<String>,
    pub sources: Vec<Source>,
    /// Total number of sources found; `sources` holds only the top few.
    pub source_count: usize,
    pub report: Option<ReportDocument>,
    pub error: Option<String>,
    /// Whether any explicit `progress` event has arrived.
    pub explicit_progress: bool,
    /// Floor of the furthest phase entered; the displayed percent never
    /// drops below it.
    #[serde(default)]
    pub display_floor: u8,
}

impl ProgressState {
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Percent suitable for a progress bar.
    ///
    /// Explicit `progress` values win within a phase, but the result never
    /// falls below the floor of the current phase, so it never goes down.
    pub fn display_percent(&self) -> u8 {
        self.percent.max(self.display_floor)
    }
}

/// Applies stream events, in arrival order, to a `ProgressState`.
///
/// Single-use: start a new machine for each run.
#[derive(Debug, Default)]
pub struct PhaseStateMachine {
    state: ProgressState,
}

impl PhaseStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn snapshot(&self) -> ProgressState {
        self.state.clone()
    }

    pub fn into_state(self) -> ProgressState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies one event. Returns `false` when the event was ignored.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        if self.state.is_terminal() {
            trace!(event = %event.name, phase = %self.state.phase, "event after terminal state ignored");
            return false;
        }
        let payload = &event.payload;
        match &event.name {
            EventName::Status => {
                let raw = payload.get("phase").and_then(|v| v.as_str()).unwrap_or("");
                match raw.parse::<Phase>() {
                    Ok(Phase::Error) => self.fail(UNKNOWN_ERROR.to_string()),
                    Ok(Phase::Done) => {
                        warn!("status event cannot complete a run without a report; ignored");
                        false
                    }
                    Ok(next) => self.enter(next),
                    Err(err) => {
                        warn!(error = %err, "status event ignored");
                        false
                    }
                }
            }
            EventName::Plan => {
                let text = payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.log(format!("Plan ready ({} chars)", text.chars().count()));
                self.state.plan = Some(text);
                true
            }
            EventName::Sources => {
                let top = parse_sources(payload.get("top"));
                let count = payload
                    .get("count")
                    .and_then(|v| v.as_u64())
                    .map(|n| n as usize)
                    .unwrap_or(top.len());
                self.state.sources = top;
                self.state.source_count = count;
                self.log(format!("Found {count} sources"));
                true
            }
            EventName::Log => match payload.get("msg").and_then(|v| v.as_str()) {
                Some(msg) => {
                    self.log(msg.to_string());
                    true
                }
                None => false,
            },
            EventName::Progress => match payload.get("percent").and_then(|v| v.as_f64()) {
                Some(percent) => {
                    let percent = percent.clamp(0.0, 100.0).round() as u8;
                    self.state.percent = self.state.percent.max(percent);
                    self.state.explicit_progress = true;
                    true
                }
                None => {
                    debug!("progress event without numeric percent ignored");
                    false
                }
            },
            EventName::Done => {
                self.state.report = Some(ReportDocument::from_payload(payload));
                self.state.phase = Phase::Done;
                self.state.percent = 100;
                self.state.display_floor = 100;
                self.log("Research complete".to_string());
                true
            }
            EventName::Error => {
                let message = payload
                    .get("message")
                    .and_then(|v| v.as_str())
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or(UNKNOWN_ERROR)
                    .to_string();
                self.fail(message)
            }
            EventName::Message | EventName::Other(_) => {
                trace!(event = %event.name, "unhandled event ignored");
                false
            }
        }
    }

    fn enter(&mut self, next: Phase) -> bool {
        let current = self.state.phase;
        if next == current {
            return false;
        }
        if next.rank() < current.rank() {
            warn!(from = %current, to = %next, "backward phase transition ignored");
            return false;
        }
        debug!(from = %current, to = %next, "phase change");
        self.state.phase = next;
        if let Some(floor) = next.progress_floor() {
            self.state.display_floor = self.state.display_floor.max(floor);
        }
        self.log(format!("Phase: {next}"));
        true
    }

    fn fail(&mut self, message: String) -> bool {
        self.state.phase = Phase::Error;
        self.log(format!("Error: {message}"));
        self.state.error = Some(message);
        true
    }

    fn log(&mut self, line: String) {
        self.state.log_lines.push(line);
    }
}

fn parse_sources(value: Option<&serde_json::Value>) -> Vec<Source> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Source>(item.clone()) {
            Ok(source) => Some(source),
            Err(err) => {
                debug!(error = %err, "skipping malformed source entry");
                None
            }
        })
        .collect()
}
