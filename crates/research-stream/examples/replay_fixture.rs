//! Replays a captured event stream through the orchestrator, split into
//! small chunks the way a slow connection would deliver it.

use futures::stream;
use research_stream::{RunOutcome, StreamOrchestrator};

const FIXTURE: &str = "event: status\ndata: {\"phase\":\"planning\"}\n\n\
event: plan\ndata: {\"text\":\"1. Survey recent reviews\\n2. Compare efficiencies\"}\n\n\
event: status\ndata: {\"phase\":\"searching\"}\n\n\
event: sources\ndata: {\"count\":2,\"top\":[{\"id\":1,\"title\":\"Review\",\"url\":\"https://example.org/review\",\"snippet\":\"...\"}]}\n\n\
event: progress\ndata: {\"percent\":66}\n\n\
event: done\ndata: {\"report\":{\"structure\":\"bullet_summary\",\"content\":\"## Findings\\n- **Stability** improved [1]\"}}\n\n";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let chunks: Vec<_> = FIXTURE
        .as_bytes()
        .chunks(7)
        .map(|c| Ok(String::from_utf8_lossy(c).into_owned()))
        .collect();

    match StreamOrchestrator::new().run(stream::iter(chunks)).await {
        RunOutcome::Completed(done) => {
            for line in &done.state.log_lines {
                println!("{line}");
            }
            println!("{}", done.markup);
        }
        other => eprintln!("unexpected outcome: {other:?}"),
    }
}
