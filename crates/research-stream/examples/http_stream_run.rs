use std::sync::Arc;

use research_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ResearchError> {
    init_observability();
    let client = ResearchClient::builder()
        .backend(Arc::new(HttpResearchBackend::from_env()?))
        .build()?;

    let mut run = client.start(
        RunRequest::new("Recent progress in perovskite solar cells")
            .config(RunConfig::default().search_budget(3)),
    )?;

    while let Some(update) = run.next_update().await {
        if let Some(line) = update.state.log_lines.last() {
            println!("[{:>3}%] {line}", update.state.display_percent());
        }
    }

    match run.finish().await? {
        RunOutcome::Completed(done) => println!("{}", done.markup),
        RunOutcome::Failed { message, .. } => eprintln!("run failed: {message}"),
        RunOutcome::Cancelled { .. } => eprintln!("run cancelled"),
    }
    Ok(())
}
