use std::sync::Arc;

use futures::stream;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument as _, info_span, warn};

use crate::backend::{ChunkStream, ResearchBackend};
use crate::errors::ResearchError;
use crate::frame::DEFAULT_MAX_BUFFERED_BYTES;
use crate::orchestrator::{AbortHandle, CompletedRun, ProgressUpdate, RunOutcome, StreamOrchestrator};
use crate::render::{MarkdownToHtml, ReportMarkdownRenderer};
use crate::request::RunRequest;

pub const DEFAULT_UPDATE_BUFFER_CAPACITY: usize = 128;

/// Entry point for starting research runs against a backend.
#[derive(Clone)]
pub struct ResearchClient {
    backend: Arc<dyn ResearchBackend>,
    renderer: Arc<dyn MarkdownToHtml>,
    max_buffered_bytes: Option<usize>,
    update_buffer_capacity: usize,
}

impl ResearchClient {
    pub fn builder() -> ResearchClientBuilder {
        ResearchClientBuilder::default()
    }

    /// Validates `request` and starts the run on a background task.
    ///
    /// Must be called from within a Tokio runtime. Failure to open the event
    /// stream is reported through the run, as a failed outcome.
    pub fn start(&self, request: RunRequest) -> Result<ResearchRun, ResearchError> {
        request.validate()?;

        let run_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.update_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let orchestrator = StreamOrchestrator::new()
            .max_buffered_bytes(self.max_buffered_bytes)
            .renderer(self.renderer.clone())
            .updates(tx);
        let abort_handle = orchestrator.abort_handle();

        let backend = self.backend.clone();
        let span = info_span!("research_run", run_id = %run_id, backend = backend.id());
        tokio::spawn(
            async move {
                let source: ChunkStream = match backend.start_run(&request).await {
                    Ok(source) => source,
                    Err(err) => {
                        warn!(error = %err, "failed to open research stream");
                        Box::pin(stream::once(async move { Err::<String, _>(err) }))
                    }
                };
                let outcome = orchestrator.run(source).await;
                let _ = final_tx.send(outcome);
            }
            .instrument(span),
        );

        Ok(ResearchRun {
            run_id,
            rx,
            final_rx,
            abort_handle,
        })
    }

    /// Runs to completion and returns the rendered report.
    pub async fn collect(&self, request: RunRequest) -> Result<CompletedRun, ResearchError> {
        self.start(request)?.finish().await?.into_result()
    }
}

/// Builder for `ResearchClient`.
pub struct ResearchClientBuilder {
    backend: Option<Arc<dyn ResearchBackend>>,
    renderer: Option<Arc<dyn MarkdownToHtml>>,
    max_buffered_bytes: Option<usize>,
    update_buffer_capacity: usize,
}

impl Default for ResearchClientBuilder {
    fn default() -> Self {
        Self {
            backend: None,
            renderer: None,
            max_buffered_bytes: Some(DEFAULT_MAX_BUFFERED_BYTES),
            update_buffer_capacity: DEFAULT_UPDATE_BUFFER_CAPACITY,
        }
    }
}

impl ResearchClientBuilder {
    pub fn backend(mut self, backend: Arc<dyn ResearchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces the default report renderer.
    pub fn renderer(mut self, renderer: Arc<dyn MarkdownToHtml>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Caps buffered partial-frame bytes per run (`None` = unbounded).
    pub fn max_buffered_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_buffered_bytes = limit;
        self
    }

    /// Capacity of the progress update channel.
    ///
    /// When full, the run waits for the consumer.
    pub fn update_buffer_capacity(mut self, capacity: usize) -> Self {
        self.update_buffer_capacity = capacity;
        self
    }

    /// Applies `RESEARCH_STREAM_MAX_BUFFER_BYTES` when set (`0` = unbounded).
    pub fn limits_from_env(mut self) -> Result<Self, ResearchError> {
        if let Ok(raw) = std::env::var("RESEARCH_STREAM_MAX_BUFFER_BYTES") {
            let limit = raw.trim().parse::<usize>().map_err(|_| {
                ResearchError::Config(format!(
                    "RESEARCH_STREAM_MAX_BUFFER_BYTES is not a number: {raw}"
                ))
            })?;
            self.max_buffered_bytes = (limit > 0).then_some(limit);
        }
        Ok(self)
    }

    pub fn build(self) -> Result<ResearchClient, ResearchError> {
        let backend = self
            .backend
            .ok_or_else(|| ResearchError::Config("a research backend is required".into()))?;
        if self.update_buffer_capacity == 0 {
            return Err(ResearchError::Config(
                "update_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(ResearchClient {
            backend,
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(ReportMarkdownRenderer)),
            max_buffered_bytes: self.max_buffered_bytes,
            update_buffer_capacity: self.update_buffer_capacity,
        })
    }
}

/// Handle to a run started by `ResearchClient::start`.
///
/// Use `next_update()` to follow progress and `finish()` for the outcome.
pub struct ResearchRun {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<ProgressUpdate>,
    final_rx: oneshot::Receiver<RunOutcome>,
    abort_handle: AbortHandle,
}

impl ResearchRun {
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next state change. Returns `None` once the run has ended.
    pub async fn next_update(&mut self) -> Option<ProgressUpdate> {
        self.rx.recv().await
    }

    /// Drains remaining updates and returns how the run ended.
    ///
    /// Safe to call after consuming updates with `next_update()`.
    pub async fn finish(mut self) -> Result<RunOutcome, ResearchError> {
        while self.rx.recv().await.is_some() {}
        self.final_rx.await.map_err(|_| {
            ResearchError::protocol_msg(format!(
                "run task ended without an outcome (run_id={})",
                self.run_id
            ))
        })
    }
}
