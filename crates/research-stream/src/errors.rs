/// Framing problems detected by `FrameSplitter`.
///
/// These never abort a run: the orchestrator logs them and keeps reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// The incomplete tail grew past the configured limit and was discarded.
    #[error("frame buffer exceeded {limit} bytes ({buffered} buffered); skipping to next delimiter")]
    BufferOverflow { limit: usize, buffered: usize },
    /// A complete frame was larger than the configured limit and was dropped.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    OversizedFrame { limit: usize, size: usize },
}

/// Reasons a frame did not decode into an event.
///
/// Decoding failures are a silent-skip policy, not a run failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The frame carried no `data:` line.
    #[error("frame has no data line")]
    MissingData,
    /// The joined `data:` fragments were not valid JSON.
    #[error("invalid frame JSON: {0}")]
    InvalidJson(String),
}

/// Failures retrieving chunks from the remote research service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or no response arrived.
    #[error("request failed: {0}")]
    Request(String),
    /// The service answered with a non-success status.
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Reading the streaming body failed midway.
    #[error("stream read failed: {0}")]
    Read(String),
    /// The stream closed before a terminal event arrived.
    #[error("stream ended before completion")]
    Incomplete,
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResearchError {
    /// Invalid client or backend configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid request passed to the client.
    #[error("validation error: {0}")]
    Validation(String),
    /// The transport failed outside of a run stream.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The remote workflow reported a failure.
    #[error("remote error: {0}")]
    Remote(String),
    /// The run was cancelled before it reached a terminal state.
    #[error("run cancelled")]
    Cancelled,
    /// Internal invariant violation (for example a dropped run task).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ResearchError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
