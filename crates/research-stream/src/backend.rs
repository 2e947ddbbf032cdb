use std::pin::Pin;

use crate::errors::TransportError;
use crate::request::RunRequest;

/// Decoded text chunks of one research event stream, in arrival order.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<String, TransportError>> + Send + 'static>>;

/// Connection to a service that runs research workflows and streams events.
///
/// Implementations only open the stream; framing, decoding and phase tracking
/// happen in the orchestrator.
#[async_trait::async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Short name used in logs (for example `http`).
    fn id(&self) -> &str;

    /// Submits `request` and returns the live event stream.
    async fn start_run(&self, request: &RunRequest) -> Result<ChunkStream, TransportError>;
}
