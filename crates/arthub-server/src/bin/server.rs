use anyhow::{bail, Context};
use arthub_server::{
    config::{load_config, validate_config},
    Server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config().context("failed to load configuration")?;

    #[cfg(feature = "tracing")]
    arthub_server::telemetry::init_tracing(&config.logging)?;

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        bail!("configuration has {} error(s)", errors.len());
    }

    Server::new(config).run().await
}
