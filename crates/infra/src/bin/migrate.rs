//! Create the ledger tables in the configured Postgres database.

use anyhow::{Context, bail};
use tracing::info;

use stockledger_infra::LedgerConfig;
use stockledger_infra::config::ENV_DATABASE_URL;
use stockledger_infra::ledger_store::PostgresLedgerStore;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env().context("loading configuration")?;
    stockledger_observability::init_with(config.log_format, &config.log_level);

    let Some(url) = config.database_url.as_deref() else {
        bail!("{ENV_DATABASE_URL} must be set to run migrations");
    };

    info!(max_connections = config.max_connections, "connecting to postgres");
    let store = PostgresLedgerStore::connect(url, config.max_connections)
        .await
        .context("connecting to postgres")?;
    store
        .ensure_schema()
        .await
        .context("creating ledger schema")?;

    info!("ledger schema is up to date");
    Ok(())
}
