use std::sync::Arc;

use guardian_pickup::{
    routes, Config, CredentialService, CredentialStore, InMemoryStore, PostgresStore,
    ServiceSettings,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let store: Arc<dyn CredentialStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(16).connect(url).await?;
            let store = PostgresStore::new(pool);
            store.migrate().await?;
            log::info!("Using Postgres credential store");
            Arc::new(store)
        }
        None => {
            log::warn!("DATABASE_URL is not set, guardians are kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    let service = Arc::new(CredentialService::new(
        store,
        ServiceSettings::from(&config),
    ));
    let app = routes::router(service);

    log::info!(
        "Starting guardian pickup server on http://{}",
        config.bind_address
    );
    axum::Server::bind(&config.bind_address)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
