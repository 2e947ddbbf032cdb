//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ChatMessage, CompletedRun, HttpBackendConfig, HttpResearchBackend, LlmProvider,
    Phase, ProgressState, ProgressUpdate, ReportStructure, ResearchBackend, ResearchClient,
    ResearchError, ResearchRun, RunConfig, RunOutcome, RunRequest, init_observability,
};
