use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    pagewright_cli::cli::run().await
}
