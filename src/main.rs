use anyhow::Result;
use faydesk::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
