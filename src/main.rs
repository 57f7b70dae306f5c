//! macrodesk binary: dashboard server, headless client and one-off generation.

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
