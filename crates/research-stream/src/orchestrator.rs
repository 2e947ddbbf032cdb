use std::sync::Arc;

use futures::{Stream, StreamExt as _};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::{ResearchError, TransportError};
use crate::event::{EventName, StreamEvent};
use crate::frame::{DEFAULT_MAX_BUFFERED_BYTES, FrameSplitter};
use crate::model::ReportDocument;
use crate::render::{MarkdownToHtml, RenderedMarkup, ReportMarkdownRenderer};
use crate::state::{PhaseStateMachine, ProgressState};

/// Handle used to cancel an in-flight run.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The orchestrator stops pulling chunks, drops the source and applies no
    /// further events. A cancelled run never reports `done`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Snapshot published after every event that changed the state.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressUpdate {
    pub event: EventName,
    pub state: ProgressState,
}

/// A run that reached `done`, with its report rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedRun {
    pub state: ProgressState,
    pub report: ReportDocument,
    pub markup: RenderedMarkup,
    /// Rendered list of the report's citations.
    pub citations: RenderedMarkup,
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed(Box<CompletedRun>),
    /// Remote `error` event or transport failure. Partial state is kept.
    Failed { state: ProgressState, message: String },
    Cancelled { state: ProgressState },
}

impl RunOutcome {
    pub fn state(&self) -> &ProgressState {
        match self {
            Self::Completed(run) => &run.state,
            Self::Failed { state, .. } | Self::Cancelled { state } => state,
        }
    }

    pub fn into_result(self) -> Result<CompletedRun, ResearchError> {
        match self {
            Self::Completed(run) => Ok(*run),
            Self::Failed { message, .. } => Err(ResearchError::Remote(message)),
            Self::Cancelled { .. } => Err(ResearchError::Cancelled),
        }
    }
}

/// Drives frame splitting, decoding and phase tracking over a chunk source.
///
/// One orchestrator handles one run; the chunk source is consumed strictly in
/// order and each chunk's frames are fully applied before the next read.
pub struct StreamOrchestrator {
    max_buffered_bytes: Option<usize>,
    renderer: Arc<dyn MarkdownToHtml>,
    updates: Option<mpsc::Sender<ProgressUpdate>>,
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
}

impl Default for StreamOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamOrchestrator {
    pub fn new() -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        Self {
            max_buffered_bytes: Some(DEFAULT_MAX_BUFFERED_BYTES),
            renderer: Arc::new(ReportMarkdownRenderer),
            updates: None,
            abort_tx,
            abort_rx,
        }
    }

    /// Caps the splitter's incomplete tail (`None` = unbounded).
    pub fn max_buffered_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_buffered_bytes = limit;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn MarkdownToHtml>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Publishes a `ProgressUpdate` on `tx` after each applied event.
    pub fn updates(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Consumes `source` until a terminal event, source end, or cancellation.
    ///
    /// Transport errors and a source that closes early are fed to the state
    /// machine as synthetic `error` events.
    pub async fn run<S>(mut self, mut source: S) -> RunOutcome
    where
        S: Stream<Item = Result<String, TransportError>> + Unpin,
    {
        let mut splitter = FrameSplitter::new(self.max_buffered_bytes);
        let mut machine = PhaseStateMachine::new();

        while !machine.is_terminal() {
            if self.aborted() {
                return self.cancelled(machine);
            }
            let next = tokio::select! {
                biased;
                changed = self.abort_rx.changed() => {
                    match changed {
                        Ok(()) => continue,
                        Err(_) => source.next().await,
                    }
                }
                next = source.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for item in splitter.push(&chunk) {
                        if self.aborted() {
                            return self.cancelled(machine);
                        }
                        let frame = match item {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(error = %err, "dropping malformed frame data");
                                continue;
                            }
                        };
                        let event = match StreamEvent::decode(&frame) {
                            Ok(event) => event,
                            Err(err) => {
                                debug!(error = %err, "skipping undecodable frame");
                                continue;
                            }
                        };
                        self.apply(&mut machine, &event).await;
                        if machine.is_terminal() {
                            break;
                        }
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "transport failure");
                    self.apply(&mut machine, &StreamEvent::error(err.to_string()))
                        .await;
                }
                None => {
                    warn!(
                        buffered = splitter.buffered_len(),
                        "source closed before a terminal event"
                    );
                    let message = TransportError::Incomplete.to_string();
                    self.apply(&mut machine, &StreamEvent::error(message)).await;
                }
            }
        }
        drop(source);
        self.finish(machine)
    }

    fn aborted(&self) -> bool {
        *self.abort_rx.borrow()
    }

    fn cancelled(&self, machine: PhaseStateMachine) -> RunOutcome {
        info!(phase = %machine.phase(), "run cancelled");
        RunOutcome::Cancelled {
            state: machine.into_state(),
        }
    }

    async fn apply(&self, machine: &mut PhaseStateMachine, event: &StreamEvent) {
        if !machine.apply(event) {
            return;
        }
        debug!(event = %event.name, phase = %machine.phase(), percent = machine.state().percent, "event applied");
        if let Some(tx) = &self.updates {
            let update = ProgressUpdate {
                event: event.name.clone(),
                state: machine.snapshot(),
            };
            // A consumer that stopped listening does not stop the run.
            let _ = tx.send(update).await;
        }
    }

    fn finish(&self, machine: PhaseStateMachine) -> RunOutcome {
        let state = machine.into_state();
        match (&state.report, &state.error) {
            (Some(report), _) => {
                let report = report.clone();
                let markup = self.renderer.render(&report.raw_content);
                let citations = self.renderer.render_citations(&report.citations);
                info!(
                    chars = report.raw_content.len(),
                    citations = report.citations.len(),
                    "run completed"
                );
                RunOutcome::Completed(Box::new(CompletedRun {
                    state,
                    report,
                    markup,
                    citations,
                }))
            }
            (None, error) => {
                let message = error.clone().unwrap_or_else(|| "Unknown error".to_string());
                info!(message = %message, "run failed");
                RunOutcome::Failed { state, message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Phase;
    use futures::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<String, TransportError>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn three_chunk_scenario_completes_and_renders() {
        let outcome = StreamOrchestrator::new()
            .run(chunks(&[
                "event: status\ndata: {\"phase\":\"planning\"}\n\n",
                "event: progress\ndata: {\"percent\":50}\n\n",
                "event: done\ndata: {\"report\":{\"content\":\"# Hi\",\"citations\":[]}}\n\n",
            ]))
            .await;
        let run = outcome.into_result().expect("completed");
        assert_eq!(run.state.phase, Phase::Done);
        assert_eq!(run.state.percent, 100);
        assert!(run.markup.as_str().contains("<h1>Hi</h1>"));
        assert!(run.citations.is_empty());
    }

    #[tokio::test]
    async fn fragmented_stream_matches_whole_stream() {
        let whole = "event: status\ndata: {\"phase\":\"searching\"}\n\n\
event: sources\ndata: {\"count\":1,\"top\":[{\"id\":1,\"title\":\"T\",\"url\":\"https://t\",\"snippet\":\"s\"}]}\n\n\
event: done\ndata: {\"content\":\"Claim [1]\",\"citations\":[{\"id\":1,\"title\":\"T\",\"url\":\"https://t\",\"snippet\":\"s\"}]}\n\n";
        let single = StreamOrchestrator::new().run(chunks(&[whole])).await;

        let pieces: Vec<String> = whole
            .as_bytes()
            .chunks(5)
            .map(|c| String::from_utf8(c.to_vec()).expect("ascii"))
            .collect();
        let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
        let fragmented = StreamOrchestrator::new().run(chunks(&refs)).await;

        assert_eq!(single, fragmented);
        let run = fragmented.into_result().expect("completed");
        assert!(run.markup.as_str().contains(r#"data-citation-id="1""#));
        assert!(run.citations.as_str().contains(r#"id="citation-1""#));
    }

    #[tokio::test]
    async fn malformed_frames_are_skipped() {
        let outcome = StreamOrchestrator::new()
            .run(chunks(&[
                "event: status\ndata: {\"phase\":\"planning\"}\n\n",
                "event: log\ndata: {broken\n\n",
                "event: log\n\n",
                "event: log\ndata: {\"msg\":\"still going\"}\n\n",
                "event: done\ndata: {\"content\":\"ok\"}\n\n",
            ]))
            .await;
        let state = outcome.state();
        assert_eq!(state.phase, Phase::Done);
        assert!(state.log_lines.contains(&"still going".to_string()));
    }

    #[tokio::test]
    async fn transport_error_becomes_error_phase() {
        let source = stream::iter(vec![
            Ok("event: status\ndata: {\"phase\":\"searching\"}\n\n".to_string()),
            Err(TransportError::Read("connection reset".into())),
            Ok("event: done\ndata: {\"content\":\"never\"}\n\n".to_string()),
        ]);
        let outcome = StreamOrchestrator::new().run(source).await;
        match outcome {
            RunOutcome::Failed { state, message } => {
                assert_eq!(state.phase, Phase::Error);
                assert!(message.contains("connection reset"));
                assert!(state.report.is_none());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn remote_error_event_fails_the_run() {
        let outcome = StreamOrchestrator::new()
            .run(chunks(&["event: error\ndata: {\"message\":\"Missing TAVILY_API_KEY\"}\n\n"]))
            .await;
        assert!(matches!(
            outcome.into_result(),
            Err(ResearchError::Remote(msg)) if msg == "Missing TAVILY_API_KEY"
        ));
    }

    #[tokio::test]
    async fn early_close_is_reported_as_incomplete() {
        let outcome = StreamOrchestrator::new()
            .run(chunks(&["event: status\ndata: {\"phase\":\"planning\"}\n\nevent: lo"]))
            .await;
        match outcome {
            RunOutcome::Failed { message, state } => {
                assert_eq!(message, "stream ended before completion");
                assert_eq!(state.phase, Phase::Error);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_after_done_are_not_applied() {
        let outcome = StreamOrchestrator::new()
            .run(chunks(&[
                "event: done\ndata: {\"content\":\"a\"}\n\nevent: error\ndata: {\"message\":\"late\"}\n\n",
            ]))
            .await;
        let run = outcome.into_result().expect("completed");
        assert!(run.state.error.is_none());
    }

    #[tokio::test]
    async fn updates_follow_applied_events() {
        let (tx, mut rx) = mpsc::channel(16);
        let outcome = StreamOrchestrator::new()
            .updates(tx)
            .run(chunks(&[
                "event: status\ndata: {\"phase\":\"planning\"}\n\n",
                "event: token\ndata: {}\n\n",
                "event: progress\ndata: {\"percent\":10}\n\n",
                "event: done\ndata: {\"content\":\"x\"}\n\n",
            ]))
            .await;
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        let mut names = Vec::new();
        while let Some(update) = rx.recv().await {
            names.push(update.event);
        }
        assert_eq!(
            names,
            vec![EventName::Status, EventName::Progress, EventName::Done]
        );
    }

    #[tokio::test]
    async fn abort_stops_pulling_and_never_completes() {
        let orchestrator = StreamOrchestrator::new();
        let abort = orchestrator.abort_handle();
        let first = stream::iter(vec![Ok(
            "event: status\ndata: {\"phase\":\"planning\"}\n\n".to_string(),
        )]);
        let source = first.chain(stream::pending());
        let (tx, mut rx) = mpsc::channel(4);
        let task = tokio::spawn(orchestrator.updates(tx).run(Box::pin(source)));

        let update = rx.recv().await.expect("first update");
        assert_eq!(update.state.phase, Phase::Planning);
        abort.abort();
        assert!(abort.is_aborted());

        let outcome = task.await.expect("join");
        match outcome {
            RunOutcome::Cancelled { state } => {
                assert_eq!(state.phase, Phase::Planning);
                assert!(state.report.is_none());
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_before_start_applies_nothing() {
        let orchestrator = StreamOrchestrator::new();
        orchestrator.abort_handle().abort();
        let outcome = orchestrator
            .run(chunks(&["event: done\ndata: {\"content\":\"x\"}\n\n"]))
            .await;
        assert_eq!(
            outcome,
            RunOutcome::Cancelled {
                state: ProgressState::default()
            }
        );
    }
}
