//! Client for a remote deep-research service that streams its progress.
//!
//! The service answers a research query with an event stream (`status`,
//! `plan`, `sources`, `progress`, `done`, `error`, ...). This crate splits the
//! stream into frames, decodes them into events, folds them into a
//! monotonic progress state and renders the final markdown report to HTML.
//!
//! # Streaming a run over HTTP
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use research_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ResearchError> {
//! let client = ResearchClient::builder()
//!     .backend(Arc::new(HttpResearchBackend::from_env()?))
//!     .build()?;
//!
//! let mut run = client.start(RunRequest::new("state of solid-state batteries"))?;
//! while let Some(update) = run.next_update().await {
//!     println!("{:>3}% {}", update.state.display_percent(), update.state.phase);
//! }
//! let report = run.finish().await?.into_result()?;
//! println!("{}", report.markup);
//! # Ok(())
//! # }
//! ```
//!
//! Without a network, `StreamOrchestrator::run` accepts any stream of text
//! chunks, and `FrameSplitter`, `StreamEvent::decode`, `PhaseStateMachine`
//! and `render::render` can each be used on their own.

/// Research backend contract and the chunk stream it yields.
pub mod backend;
/// Client entry point, builder and run handle.
pub mod client;
/// Public error types.
pub mod errors;
/// Named events decoded from frames.
pub mod event;
/// Blank-line frame splitting over arbitrary chunk boundaries.
pub mod frame;
/// HTTP backend for the research service.
pub mod http;
/// Phases, sources and report documents.
pub mod model;
/// Tracing subscriber setup.
pub mod observability;
/// Per-run driver from chunks to outcome.
pub mod orchestrator;
/// Common imports for typical usage.
pub mod prelude;
/// Markdown-to-HTML report rendering.
pub mod render;
/// Request and response bodies of the research API.
pub mod request;
/// Progress state and phase transitions.
pub mod state;

pub use backend::{ChunkStream, ResearchBackend};
pub use client::{ResearchClient, ResearchClientBuilder, ResearchRun};
pub use errors::{DecodeError, FramingError, ResearchError, TransportError};
pub use event::{EventName, StreamEvent};
pub use frame::{Frame, FrameSplitter};
pub use http::{HttpBackendConfig, HttpResearchBackend};
pub use model::{Phase, ReportDocument, ReportStructure, Source};
pub use observability::{LogOutput, LogSettings, init_observability, init_observability_with};
pub use orchestrator::{AbortHandle, CompletedRun, ProgressUpdate, RunOutcome, StreamOrchestrator};
pub use render::{MarkdownToHtml, RenderedMarkup, ReportMarkdownRenderer};
pub use request::{
    ChatMessage, ChatResponse, HealthStatus, LlmProvider, MessageRole, RunConfig, RunRequest,
    SyncRunResponse,
};
pub use state::{PhaseStateMachine, ProgressState};
