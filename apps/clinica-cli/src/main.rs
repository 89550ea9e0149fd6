#[tokio::main]
async fn main() -> anyhow::Result<()> {
    clinica_cli::run().await
}
