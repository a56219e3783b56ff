//! Shared startup steps for commands. Each step maps its failure to an
//! `(error_class, message, exit_code)` triple.

use std::sync::Arc;

use drivethru_agent::{AgentRuntime, OpenAiCompatibleProvider};
use drivethru_core::config::{AppConfig, LoadOptions};
use drivethru_core::domain::menu::Menu;
use drivethru_db::{connect_with_settings, migrations, DbPool};
use tracing::info;

pub type Failure = (&'static str, String, u8);

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_PERSISTENCE: u8 = 5;
pub const EXIT_SEED_VERIFICATION: u8 = 6;
pub const EXIT_ASSET: u8 = 7;
pub const EXIT_PROVIDER: u8 = 8;

pub fn load_config(options: LoadOptions) -> Result<AppConfig, Failure> {
    AppConfig::load(options).map_err(|error| {
        ("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

pub fn async_runtime() -> Result<tokio::runtime::Runtime, Failure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        ("runtime_init", format!("failed to initialize async runtime: {error}"), EXIT_RUNTIME)
    })
}

/// Connects and applies pending migrations.
pub async fn open_database(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_PERSISTENCE))?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );
    Ok(pool)
}

pub fn load_menu(config: &AppConfig) -> Result<Arc<Menu>, Failure> {
    let menu = Menu::from_json_file(&config.agent.menu_path).map_err(|error| {
        (
            "menu_load",
            format!("could not load menu `{}`: {error}", config.agent.menu_path.display()),
            EXIT_ASSET,
        )
    })?;
    info!(
        event_name = "system.bootstrap.menu_loaded",
        correlation_id = "bootstrap",
        menu_id = %menu.menu_id,
        items = menu.items.len(),
        "menu loaded"
    );
    Ok(Arc::new(menu))
}

pub fn agent_runtime(config: &AppConfig) -> Result<AgentRuntime<OpenAiCompatibleProvider>, Failure> {
    let provider = OpenAiCompatibleProvider::from_config(&config.llm).map_err(|error| {
        ("provider_init", format!("could not build llm client: {error}"), EXIT_PROVIDER)
    })?;
    AgentRuntime::from_config(provider, config)
        .map_err(|error| ("prompt_template", error.to_string(), EXIT_ASSET))
}
