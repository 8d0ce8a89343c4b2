use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tabflow_cli::cli::app::run().await
}
