//! Command-line front end for a deep-research service.
//!
//! `run` streams a research run and prints its progress, `sync` waits for the
//! finished report, `chat` sends a follow-up and `health` checks the service.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use research_stream::prelude::*;
use research_stream::render::{MarkdownToHtml, RenderedMarkup, ReportMarkdownRenderer, escape_html};
use research_stream::request::DEFAULT_SEARCH_BUDGET;
use research_stream::{LogSettings, MessageRole, ReportDocument, init_observability_with};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "research-stream")]
#[command(about = "Run deep-research queries against a research service")]
struct Cli {
    /// Base URL of the research service (overrides RESEARCH_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Do not load environment from a .env file
    #[arg(long, global = true)]
    no_dotenv: bool,

    /// Log filter, e.g. `debug` (overrides RESEARCH_STREAM_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a research run and print progress as it arrives
    Run(QueryArgs),
    /// Run research and wait for the finished report
    Sync(QueryArgs),
    /// Ask a conversational follow-up
    Chat {
        #[command(flatten)]
        query: QueryArgs,

        /// Prior turn as `user:<text>` or `assistant:<text>` (repeatable)
        #[arg(long = "history")]
        history: Vec<String>,
    },
    /// Check service health and configured features
    Health,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Research question
    query: String,

    /// LLM provider (openai or gemini)
    #[arg(long, default_value = "openai")]
    provider: LlmProvider,

    /// Model override for the provider
    #[arg(long)]
    model: Option<String>,

    /// Report template (bullet_summary, two_column, detailed_report)
    #[arg(long, default_value = "bullet_summary")]
    template: ReportStructure,

    /// Number of search queries to run (1-10)
    #[arg(long, default_value_t = DEFAULT_SEARCH_BUDGET)]
    budget: u8,

    /// Write the rendered report as an HTML page to this file
    #[arg(long)]
    out: Option<PathBuf>,
}

impl QueryArgs {
    fn request(&self) -> RunRequest {
        let mut config = RunConfig::default()
            .provider(self.provider)
            .template(self.template)
            .search_budget(self.budget);
        if let Some(model) = &self.model {
            config = config.model(model.clone());
        }
        RunRequest::new(self.query.clone()).config(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if !cli.no_dotenv {
        let _ = dotenvy::dotenv();
    }
    let mut log_settings = LogSettings::from_env();
    if let Some(level) = &cli.log_level {
        log_settings = log_settings.filter(level.clone());
    }
    init_observability_with(log_settings);

    let mut config = HttpBackendConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config = config.base_url(base_url);
    }
    let backend = Arc::new(HttpResearchBackend::new(config)?);

    match cli.command {
        Command::Run(args) => stream_run(backend, &args).await?,
        Command::Sync(args) => sync_run(&backend, &args).await?,
        Command::Chat { query, history } => chat(&backend, &query, &history).await?,
        Command::Health => health(&backend).await?,
    }
    Ok(())
}

async fn stream_run(
    backend: Arc<HttpResearchBackend>,
    args: &QueryArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = ResearchClient::builder()
        .backend(backend)
        .limits_from_env()?
        .build()?;
    let mut run = client.start(args.request())?;
    info!(run_id = %run.run_id(), "research run started");

    let abort = run.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling run");
            abort.abort();
        }
    });

    let mut printed = 0;
    while let Some(update) = run.next_update().await {
        let percent = update.state.display_percent();
        for line in update.state.log_lines.iter().skip(printed) {
            eprintln!("[{percent:>3}%] {line}");
        }
        printed = update.state.log_lines.len();
    }

    match run.finish().await? {
        RunOutcome::Completed(done) => {
            println!("{}", done.report.raw_content);
            if let Some(path) = &args.out {
                write_page(path, &args.query, &done.markup, &done.citations)?;
                eprintln!("Report written to {}", path.display());
            }
            Ok(())
        }
        RunOutcome::Failed { message, .. } => Err(ResearchError::Remote(message).into()),
        RunOutcome::Cancelled { .. } => Err(ResearchError::Cancelled.into()),
    }
}

async fn sync_run(
    backend: &HttpResearchBackend,
    args: &QueryArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = backend.run_sync(&args.request()).await?;
    if let Some(provider) = response.actual_provider {
        eprintln!("Provider: {provider}");
    }
    eprintln!("Sources: {}", response.sources.len());
    println!("{}", response.report.raw_content);
    if let Some(path) = &args.out {
        let (markup, citations) = render_report(&response.report);
        write_page(path, &args.query, &markup, &citations)?;
        eprintln!("Report written to {}", path.display());
    }
    Ok(())
}

async fn chat(
    backend: &HttpResearchBackend,
    args: &QueryArgs,
    history: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let messages = history
        .iter()
        .map(String::as_str)
        .map(parse_history)
        .collect::<Result<Vec<_>, _>>()?;
    let response = backend
        .chat(&args.request().messages(messages))
        .await?;
    println!("{}", response.response);
    Ok(())
}

async fn health(backend: &HttpResearchBackend) -> Result<(), Box<dyn std::error::Error>> {
    let status = backend.health().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.is_healthy() {
        return Err(format!("service reported status {}", status.status).into());
    }
    Ok(())
}

fn parse_history(turn: &str) -> Result<ChatMessage, ResearchError> {
    let (role, content) = turn.split_once(':').ok_or_else(|| {
        ResearchError::Validation(format!("history entry must be role:text, got {turn:?}"))
    })?;
    let role = match role.trim() {
        "user" => MessageRole::User,
        "assistant" => MessageRole::Assistant,
        other => {
            return Err(ResearchError::Validation(format!(
                "unknown history role: {other}"
            )));
        }
    };
    Ok(ChatMessage {
        role,
        content: content.trim().to_string(),
    })
}

fn render_report(report: &ReportDocument) -> (RenderedMarkup, RenderedMarkup) {
    let renderer = ReportMarkdownRenderer;
    (
        renderer.render(&report.raw_content),
        renderer.render_citations(&report.citations),
    )
}

fn html_page(title: &str, markup: &RenderedMarkup, citations: &RenderedMarkup) -> String {
    let mut page = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<article class=\"report\">{}</article>\n",
        escape_html(title),
        markup
    );
    if !citations.is_empty() {
        page.push_str(&format!("<section class=\"sources\">{citations}</section>\n"));
    }
    page.push_str("</body>\n</html>\n");
    page
}

fn write_page(
    path: &Path,
    title: &str,
    markup: &RenderedMarkup,
    citations: &RenderedMarkup,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(html_page(title, markup, citations).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_args_build_request() {
        let cli = Cli::try_parse_from([
            "research-stream",
            "run",
            "fusion energy",
            "--provider",
            "gemini",
            "--template",
            "two_column",
            "--budget",
            "7",
            "--model",
            "gemini-2.5-flash",
        ])
        .expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let request = args.request();
        assert_eq!(request.query, "fusion energy");
        assert_eq!(request.config.provider, LlmProvider::Gemini);
        assert_eq!(request.config.template, ReportStructure::TwoColumn);
        assert_eq!(request.config.search_budget, 7);
        assert_eq!(request.config.model.as_deref(), Some("gemini-2.5-flash"));
    }

    #[test]
    fn log_level_flag_is_global() {
        let cli = Cli::try_parse_from(["research-stream", "health", "--log-level", "debug"])
            .expect("parse");
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Health));
    }

    #[test]
    fn unknown_template_is_rejected() {
        assert!(Cli::try_parse_from(["research-stream", "sync", "q", "--template", "essay"]).is_err());
    }

    #[test]
    fn history_entries_parse_roles() {
        let message = parse_history("assistant: earlier answer").expect("history");
        assert_eq!(message, ChatMessage::assistant("earlier answer"));
        assert!(parse_history("no separator").is_err());
        assert!(parse_history("system:hi").is_err());
    }

    #[test]
    fn writes_escaped_html_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("report.html");
        let report = ReportDocument {
            raw_content: "**Key** finding [1]".into(),
            ..ReportDocument::default()
        };
        let (markup, citations) = render_report(&report);
        write_page(&path, "<b>q</b>", &markup, &citations).expect("write");

        let page = std::fs::read_to_string(&path).expect("read");
        assert!(page.contains("<title>&lt;b&gt;q&lt;/b&gt;</title>"));
        assert!(page.contains("<strong>Key</strong>"));
        assert!(!page.contains("class=\"sources\""));
    }
}
