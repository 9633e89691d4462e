use std::sync::Arc;

use anyhow::Context;

use catbridge_infra::{
    CatalogClient, EngineConfig, InMemoryCatalog, MigrationEngine, OdooCatalogClient, Settings,
    SqliteStateStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    catbridge_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let client: Arc<dyn CatalogClient> = match settings.erp.clone() {
        Some(erp) => {
            tracing::info!(url = %erp.base_url, database = %erp.database, "using Odoo catalog");
            Arc::new(OdooCatalogClient::new(erp).context("failed to build ERP client")?)
        }
        None => {
            tracing::warn!("CATBRIDGE_ERP_URL not set; using in-memory catalog (dev only)");
            Arc::new(InMemoryCatalog::new().with_unit("Units"))
        }
    };

    let store = Arc::new(SqliteStateStore::new(&settings.state_db));
    tracing::info!(path = ?store.path(), "using state database");

    let config = EngineConfig::default()
        .with_template_policy(settings.template_policy)
        .with_max_retries(settings.max_task_retries);

    let engine = MigrationEngine::load(client, store, config)
        .await
        .with_context(|| format!("failed to load migration state from {:?}", settings.state_db))?;

    let app = catbridge_api::app::build_app(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
