//! Command-line host for the execution bridge.
//!
//! Run with: cargo run -p stdio-host -- script.py
//!
//! Runs the script once with the reference interpreter, answering `input`
//! calls from this process's stdin, then prints the run outcome as JSON.
//! `SCRIPTBRIDGE_*` environment variables override the defaults.

use anyhow::Context;
use scriptbridge_core::RunContext;
use scriptbridge_executor::{Coordinator, CoordinatorConfig};
use scriptbridge_testkit::MiniInterpreter;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the outcome
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: stdio-host <script>")?;
    let source = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {path}"))?;

    let config = CoordinatorConfig::default().with_env_overrides()?;
    let interpreter = MiniInterpreter::new();
    let extractors = interpreter.extractors();
    let mut coordinator = Coordinator::new(interpreter, config).with_extractors(extractors);
    let mut requests = coordinator.attach_input();

    let ctx = RunContext::new(source).with_filename(path);
    let run = coordinator.run(ctx);
    tokio::pin!(run);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stderr = tokio::io::stderr();
    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            Some(request) = requests.next() => {
                stderr.write_all(request.prompt().as_bytes()).await?;
                stderr.flush().await?;
                let answered = match lines.next_line().await? {
                    Some(line) => request.respond(line),
                    None => request.refuse("stdin closed"),
                };
                if let Err(e) = answered {
                    tracing::warn!("input was not delivered: {e}");
                }
            }
        }
    };

    tracing::info!(
        elapsed_ms = outcome.elapsed_ms,
        succeeded = outcome.succeeded(),
        "run finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if !outcome.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
