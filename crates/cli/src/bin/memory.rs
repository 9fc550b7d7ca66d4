use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    memory_cli::main_entry().await
}
