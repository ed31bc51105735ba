use std::sync::Arc;

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::AppConfig,
};
use ingestion_pipeline::{IngestionConfig, IngestionOrchestrator, PipelineServices};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub orchestrator: Arc<IngestionOrchestrator>,
}

impl ApiState {
    /// Connect to the database and wire the production ingestion collaborators.
    pub async fn new(config: &AppConfig, storage: StorageManager) -> Result<Self, AppError> {
        let surreal_db_client = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        surreal_db_client.ensure_initialized().await?;

        let services =
            PipelineServices::from_app_config(Arc::clone(&surreal_db_client), storage.clone(), config)?;
        let orchestrator = Arc::new(IngestionOrchestrator::new(
            services,
            IngestionConfig::from_app_config(config),
        ));

        Ok(Self::from_parts(
            surreal_db_client,
            config.clone(),
            storage,
            orchestrator,
        ))
    }

    pub fn from_parts(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        storage: StorageManager,
        orchestrator: Arc<IngestionOrchestrator>,
    ) -> Self {
        Self {
            db,
            config,
            storage,
            orchestrator,
        }
    }
}
