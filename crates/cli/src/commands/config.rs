use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use drivethru_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::bootstrap;
use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match bootstrap::load_config(LoadOptions::default()) {
        Ok(config) => config,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("config", error_class, message, exit_code);
        }
    };

    CommandResult { exit_code: 0, output: render(&config) }
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let prompt_template = config
        .agent
        .prompt_template_path
        .as_ref()
        .map_or_else(|| "<builtin>".to_string(), |path| path.display().to_string());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key_path: &str, value: String, env_keys: &[&str]| {
        lines.push(render_line(key_path, &value, source(key_path, env_keys)));
    };

    push("database.url", config.database.url.clone(), &["DRIVETHRU_DATABASE_URL"]);
    push(
        "database.max_connections",
        config.database.max_connections.to_string(),
        &["DRIVETHRU_DATABASE_MAX_CONNECTIONS"],
    );
    push(
        "database.timeout_secs",
        config.database.timeout_secs.to_string(),
        &["DRIVETHRU_DATABASE_TIMEOUT_SECS"],
    );
    push("llm.provider", config.llm.provider.as_str().to_string(), &["DRIVETHRU_LLM_PROVIDER"]);
    push("llm.model", config.llm.model.clone(), &["DRIVETHRU_LLM_MODEL"]);
    push("llm.base_url", config.llm.effective_base_url().to_string(), &["DRIVETHRU_LLM_BASE_URL"]);
    push("llm.api_key", api_key.to_string(), &["DRIVETHRU_LLM_API_KEY"]);
    push("llm.temperature", config.llm.temperature.to_string(), &["DRIVETHRU_LLM_TEMPERATURE"]);
    push("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["DRIVETHRU_LLM_TIMEOUT_SECS"]);
    push(
        "retry.max_attempts",
        config.retry.max_attempts.to_string(),
        &["DRIVETHRU_RETRY_MAX_ATTEMPTS"],
    );
    push(
        "retry.initial_interval_ms",
        config.retry.initial_interval_ms.to_string(),
        &["DRIVETHRU_RETRY_INITIAL_INTERVAL_MS"],
    );
    push(
        "retry.backoff_factor",
        config.retry.backoff_factor.to_string(),
        &["DRIVETHRU_RETRY_BACKOFF_FACTOR"],
    );
    push(
        "retry.max_interval_ms",
        config.retry.max_interval_ms.to_string(),
        &["DRIVETHRU_RETRY_MAX_INTERVAL_MS"],
    );
    push(
        "retry.jitter_ratio",
        config.retry.jitter_ratio.to_string(),
        &["DRIVETHRU_RETRY_JITTER_RATIO"],
    );
    push(
        "agent.menu_path",
        config.agent.menu_path.display().to_string(),
        &["DRIVETHRU_AGENT_MENU_PATH"],
    );
    push("agent.prompt_template_path", prompt_template, &["DRIVETHRU_AGENT_PROMPT_TEMPLATE_PATH"]);
    push(
        "agent.max_steps_per_turn",
        config.agent.max_steps_per_turn.to_string(),
        &["DRIVETHRU_AGENT_MAX_STEPS_PER_TURN"],
    );
    push(
        "agent.max_reprompts",
        config.agent.max_reprompts.to_string(),
        &["DRIVETHRU_AGENT_MAX_REPROMPTS"],
    );
    push("eval.dataset_name", config.eval.dataset_name.clone(), &["DRIVETHRU_EVAL_DATASET_NAME"]);
    push(
        "eval.dataset_path",
        config.eval.dataset_path.display().to_string(),
        &["DRIVETHRU_EVAL_DATASET_PATH"],
    );
    push(
        "eval.max_concurrency",
        config.eval.max_concurrency.to_string(),
        &["DRIVETHRU_EVAL_MAX_CONCURRENCY"],
    );
    push(
        "logging.level",
        config.logging.level.clone(),
        &["DRIVETHRU_LOGGING_LEVEL", "DRIVETHRU_LOG_LEVEL"],
    );
    push(
        "logging.format",
        config.logging.format.as_str().to_string(),
        &["DRIVETHRU_LOGGING_FORMAT", "DRIVETHRU_LOG_FORMAT"],
    );

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("drivethru.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/drivethru.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
