use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ResearchError;
use crate::model::{ReportDocument, ReportStructure, Source};

pub const MIN_SEARCH_BUDGET: u8 = 1;
pub const MAX_SEARCH_BUDGET: u8 = 10;
pub const DEFAULT_SEARCH_BUDGET: u8 = 4;

/// LLM provider the remote workflow should use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Gemini,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Role of a prior conversation turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    #[default]
    User,
    Assistant,
    Tool,
}

/// One prior conversation turn sent along with a query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-run options forwarded to the research workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub template: ReportStructure,
    /// Number of search queries to run (1..=10).
    #[serde(default = "default_search_budget")]
    pub search_budget: u8,
}

fn default_search_budget() -> u8 {
    DEFAULT_SEARCH_BUDGET
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            template: ReportStructure::default(),
            search_budget: DEFAULT_SEARCH_BUDGET,
        }
    }
}

impl RunConfig {
    pub fn provider(mut self, provider: LlmProvider) -> Self {
        self.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn template(mut self, template: ReportStructure) -> Self {
        self.template = template;
        self
    }

    pub fn search_budget(mut self, budget: u8) -> Self {
        self.search_budget = budget;
        self
    }
}

/// Body of a research (or chat) request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub query: String,
    #[serde(default)]
    pub config: RunConfig,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            config: RunConfig::default(),
            messages: Vec::new(),
        }
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Checks the constraints the remote service enforces.
    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.query.trim().is_empty() {
            return Err(ResearchError::Validation("query must not be empty".into()));
        }
        if !(MIN_SEARCH_BUDGET..=MAX_SEARCH_BUDGET).contains(&self.config.search_budget) {
            return Err(ResearchError::Validation(format!(
                "search_budget must be between {MIN_SEARCH_BUDGET} and {MAX_SEARCH_BUDGET}, got {}",
                self.config.search_budget
            )));
        }
        if let Some(model) = &self.config.model
            && model.trim().is_empty()
        {
            return Err(ResearchError::Validation("model must not be blank".into()));
        }
        Ok(())
    }
}

/// Response of the non-streaming research endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncRunResponse {
    pub report: ReportDocument,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub actual_provider: Option<LlmProvider>,
}

/// Response of the chat endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub actual_provider: Option<LlmProvider>,
}

/// Capabilities reported by the health endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFeatures {
    #[serde(default)]
    pub openai: bool,
    #[serde(default)]
    pub gemini: bool,
    #[serde(default)]
    pub tavily: bool,
    #[serde(default)]
    pub serpapi: bool,
    #[serde(default)]
    pub dual_search: bool,
}

/// Response of the health endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub features: HealthFeatures,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
