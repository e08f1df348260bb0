use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tidy_agent::{
    todo_agents, Agent, AgentRuntime, CompletionModel, KeywordModel, ModelError,
    OpenAiCompatibleModel,
};
use tidy_core::config::{AppConfig, ConfigError, LlmProvider, LoadOptions};
use tidy_db::{connect_lazy_with_settings, migrations, ping, DbPool, SqlTodoStore};
use tracing::{info, warn};

pub const CONNECTED_MESSAGE: &str =
    "Pinged your deployment. You successfully connected to the todo store!";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<SqlTodoStore>,
    pub agent_runtime: AgentRuntime,
    pub triage: Arc<Agent>,
    /// Outcome of the startup ping and migration; failure here is not fatal.
    pub connectivity: Result<(), String>,
}

impl Application {
    pub fn connectivity_report(&self) -> String {
        match &self.connectivity {
            Ok(()) => CONNECTED_MESSAGE.to_string(),
            Err(error) => error.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid database url: {0}")]
    DatabaseUrl(#[source] sqlx::Error),
    #[error("could not build completion client: {0}")]
    Model(#[from] ModelError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    if config.llm.provider == LlmProvider::OpenAi && !config.has_llm_api_key() {
        warn!(
            event_name = "system.bootstrap.llm_key_missing",
            "no API key configured; model requests will fail until TIDY_LLM_API_KEY or GEMINI_API_KEY is set"
        );
    }

    let db_pool = connect_lazy_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .map_err(BootstrapError::DatabaseUrl)?;
    let connectivity = check_connectivity(&db_pool).await;

    let model = completion_model(&config)?;
    let agent_runtime = AgentRuntime::new(model).with_max_turns(config.llm.max_turns);
    let store = Arc::new(SqlTodoStore::new(db_pool.clone()));
    let triage = todo_agents(store.clone());

    Ok(Application { config, db_pool, store, agent_runtime, triage, connectivity })
}

async fn check_connectivity(pool: &DbPool) -> Result<(), String> {
    if let Err(error) = ping(pool).await {
        warn!(
            event_name = "system.bootstrap.database_unreachable",
            error = %error,
            "todo store ping failed"
        );
        return Err(error.to_string());
    }
    info!(event_name = "system.bootstrap.database_connected", "todo store reachable");

    if let Err(error) = migrations::run_pending(pool).await {
        warn!(
            event_name = "system.bootstrap.migration_failed",
            error = %error,
            "todo schema migration failed"
        );
        return Err(format!("database migration failed: {error}"));
    }
    info!(event_name = "system.bootstrap.migrations_applied", "todo schema ready");
    Ok(())
}

fn completion_model(config: &AppConfig) -> Result<Arc<dyn CompletionModel>, ModelError> {
    let model: Arc<dyn CompletionModel> = match config.llm.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiCompatibleModel::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.api_key.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )?),
        LlmProvider::Keyword => Arc::new(KeywordModel::new()),
    };
    Ok(model)
}
