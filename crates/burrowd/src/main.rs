//! Burrow daemon bootstrap.
//!
//! Connects the persistence layer, reports readiness, and idles until
//! shutdown. Webhook transport and the provider HTTP client are wired in
//! by the hosting deployment.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use burrow_state::SurrealStores;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let _stores = SurrealStores::from_env().await?;
    tracing::info!("burrowd started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("burrowd shutting down");
    Ok(())
}
