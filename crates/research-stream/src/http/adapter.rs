use futures::StreamExt as _;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::backend::{ChunkStream, ResearchBackend};
use crate::errors::{ResearchError, TransportError};
use crate::request::{ChatResponse, HealthStatus, RunRequest, SyncRunResponse};

use super::config::HttpBackendConfig;
use super::transport::text_chunks;

const HTTP_BACKEND: &str = "http";
const EVENT_STREAM: &str = "text/event-stream";

/// Error body returned by the research service on failure.
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Research backend speaking the service's JSON/event-stream HTTP API.
///
/// `POST /run` streams events, `POST /run_sync` and `POST /chat` answer with a
/// single JSON document, `GET /health` reports capabilities.
pub struct HttpResearchBackend {
    client: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpResearchBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, ResearchError> {
        if config.base_url.trim().is_empty() {
            return Err(ResearchError::Config(
                "research service base_url must not be empty".into(),
            ));
        }
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| ResearchError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a backend from `RESEARCH_API_BASE_URL` / `RESEARCH_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ResearchError> {
        Self::new(HttpBackendConfig::from_env()?)
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    /// Runs research without streaming and returns the finished report.
    pub async fn run_sync(&self, request: &RunRequest) -> Result<SyncRunResponse, ResearchError> {
        request.validate()?;
        debug!(query_len = request.query.len(), "requesting synchronous research run");
        let response = self
            .client
            .post(self.config.endpoint("/run_sync"))
            .timeout(self.config.timeout)
            .json(request)
            .send()
            .await
            .map_err(request_failed)?;
        read_json(response).await
    }

    /// Sends a conversational follow-up.
    pub async fn chat(&self, request: &RunRequest) -> Result<ChatResponse, ResearchError> {
        request.validate()?;
        debug!(history = request.messages.len(), "sending chat request");
        let response = self
            .client
            .post(self.config.endpoint("/chat"))
            .timeout(self.config.timeout)
            .json(request)
            .send()
            .await
            .map_err(request_failed)?;
        read_json(response).await
    }

    pub async fn health(&self) -> Result<HealthStatus, ResearchError> {
        let response = self
            .client
            .get(self.config.endpoint("/health"))
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(request_failed)?;
        read_json(response).await
    }
}

#[async_trait::async_trait]
impl ResearchBackend for HttpResearchBackend {
    fn id(&self) -> &str {
        HTTP_BACKEND
    }

    async fn start_run(&self, request: &RunRequest) -> Result<ChunkStream, TransportError> {
        debug!(
            provider = %request.config.provider,
            template = %request.config.template,
            search_budget = request.config.search_budget,
            "starting research event stream"
        );
        let response = self
            .client
            .post(self.config.endpoint("/run"))
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: error_message(&body),
            });
        }
        Ok(Box::pin(text_chunks(response.bytes_stream().boxed())))
    }
}

fn request_failed(err: reqwest::Error) -> ResearchError {
    TransportError::Request(err.to_string()).into()
}

/// Extracts `{"error": "..."}` when present, else returns the body as is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error)
        .unwrap_or_else(|_| body.trim().to_string())
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ResearchError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TransportError::Read(e.to_string()))?;
    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: error_message(&body),
        }
        .into());
    }
    serde_json::from_str(&body)
        .map_err(|e| ResearchError::protocol_msg(format!("invalid response JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::model::Phase;
    use crate::orchestrator::{RunOutcome, StreamOrchestrator};
    use crate::request::{LlmProvider, RunConfig};

    /// Serves one canned HTTP response and returns the raw request it saw.
    async fn serve_once(parts: Vec<Vec<u8>>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let request = read_request(&mut socket).await;
            for part in parts {
                socket.write_all(&part).await.expect("write");
                socket.flush().await.expect("flush");
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 1024];
        loop {
            let n = socket.read(&mut tmp).await.expect("read");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn json_response(status: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    fn backend(base_url: &str) -> HttpResearchBackend {
        HttpResearchBackend::new(HttpBackendConfig::new(base_url).use_system_proxy(false))
            .expect("backend")
    }

    #[test]
    fn error_message_prefers_error_field() {
        assert_eq!(error_message(r#"{"error":"Query is required"}"#), "Query is required");
        assert_eq!(error_message(" upstream down \n"), "upstream down");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        assert!(matches!(
            HttpResearchBackend::new(HttpBackendConfig::new("  ")),
            Err(ResearchError::Config(_))
        ));
    }

    #[tokio::test]
    async fn streams_a_run_from_a_local_server() {
        let report = "Résumé [1]";
        let done = format!(
            "event: done\ndata: {}\n\n",
            serde_json::json!({"report": {"structure": "bullet_summary", "content": report}})
        );
        let done = done.into_bytes();
        let split = done.len() - 8;
        let parts = vec![
            b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n"
                .to_vec(),
            b"event: status\ndata: {\"phase\":\"planning\"}\n\n".to_vec(),
            b"event: progress\ndata: {\"percent\":40}\r\n\r\n".to_vec(),
            done[..split].to_vec(),
            done[split..].to_vec(),
        ];
        let (base_url, server) = serve_once(parts).await;

        let request = RunRequest::new("what is new in rust")
            .config(RunConfig::default().provider(LlmProvider::Gemini).search_budget(2));
        let source = backend(&base_url)
            .start_run(&request)
            .await
            .expect("stream");
        let outcome = StreamOrchestrator::new().run(source).await;

        let raw_request = server.await.expect("server");
        assert!(raw_request.starts_with("POST /run HTTP/1.1"));
        assert!(raw_request.to_ascii_lowercase().contains("accept: text/event-stream"));
        assert!(raw_request.contains("\"query\":\"what is new in rust\""));
        assert!(raw_request.contains("\"search_budget\":2"));

        let RunOutcome::Completed(run) = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(run.state.phase, Phase::Done);
        assert_eq!(run.report.raw_content, report);
        assert!(run.markup.as_str().contains("Résumé"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_transport_error() {
        let (base_url, server) = serve_once(vec![json_response(
            "400 Bad Request",
            r#"{"error":"Query is required"}"#,
        )])
        .await;
        let err = match backend(&base_url).start_run(&RunRequest::new("q")).await {
            Ok(_) => panic!("expected status error"),
            Err(err) => err,
        };
        assert_eq!(
            err,
            TransportError::Status {
                status: 400,
                body: "Query is required".into()
            }
        );
        server.await.expect("server");
    }

    #[tokio::test]
    async fn run_sync_parses_report() {
        let body = serde_json::json!({
            "report": {"structure": "two_column", "content": "| a | b |\n|---|---|\n| 1 | 2 |", "citations": []},
            "plan": "1. search",
            "sources": [{"id": 1, "title": "T", "url": "https://t.example", "snippet": "s"}],
            "actual_provider": "openai"
        })
        .to_string();
        let (base_url, server) = serve_once(vec![json_response("200 OK", &body)]).await;
        let response = backend(&base_url)
            .run_sync(&RunRequest::new("q"))
            .await
            .expect("sync");
        assert_eq!(response.plan, "1. search");
        assert_eq!(response.sources.len(), 1);
        let raw_request = server.await.expect("server");
        assert!(raw_request.starts_with("POST /run_sync HTTP/1.1"));
    }

    #[tokio::test]
    async fn chat_maps_error_body() {
        let (base_url, server) = serve_once(vec![json_response(
            "500 Internal Server Error",
            r#"{"error":"provider unavailable"}"#,
        )])
        .await;
        let err = backend(&base_url)
            .chat(&RunRequest::new("follow up"))
            .await
            .expect_err("chat should fail");
        assert_eq!(
            err,
            ResearchError::Transport(TransportError::Status {
                status: 500,
                body: "provider unavailable".into()
            })
        );
        server.await.expect("server");
    }

    #[tokio::test]
    async fn health_reports_features() {
        let body = r#"{"status":"healthy","service":"Deep Research Agent","version":"1.0.0","features":{"openai":true,"tavily":true}}"#;
        let (base_url, server) = serve_once(vec![json_response("200 OK", body)]).await;
        let health = backend(&base_url).health().await.expect("health");
        assert!(health.is_healthy());
        assert!(health.features.openai);
        assert!(!health.features.gemini);
        let raw_request = server.await.expect("server");
        assert!(raw_request.starts_with("GET /health HTTP/1.1"));
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_sending() {
        let backend = backend("http://127.0.0.1:9");
        let err = backend
            .run_sync(&RunRequest::new(""))
            .await
            .expect_err("validation");
        assert!(matches!(err, ResearchError::Validation(_)));
    }

    #[tokio::test]
    async fn smoke_live_service_when_configured() {
        let Ok(base_url) = std::env::var("RESEARCH_API_BASE_URL") else {
            return;
        };
        let backend = backend(&base_url);
        let health = backend.health().await.expect("health");
        assert!(!health.status.is_empty());
    }
}
