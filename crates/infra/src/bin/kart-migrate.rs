//! Applies the order and purchase schema to `DATABASE_URL`.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use kart_infra::OrdersConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kart_observability::init();

    let config = OrdersConfig::from_env().context("loading configuration")?;
    let url = config.require_database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(url)
        .await
        .context("connecting to postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    info!("migrations applied");
    Ok(())
}
