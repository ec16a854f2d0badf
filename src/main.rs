//! Provenance registry HTTP server

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    provenance_registry::server::run().await
}
