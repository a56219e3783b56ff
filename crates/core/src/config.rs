use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::dataset::DEFAULT_DATASET_NAME;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub agent: AgentConfig,
    pub eval: EvalConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Backoff policy for the decision call. Attempts count the first call.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
    pub jitter_ratio: f64,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub menu_path: PathBuf,
    pub prompt_template_path: Option<PathBuf>,
    pub max_steps_per_turn: u32,
    pub max_reprompts: u32,
}

#[derive(Clone, Debug)]
pub struct EvalConfig {
    pub dataset_name: String,
    pub dataset_path: PathBuf,
    pub max_concurrency: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "ollama")]
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mistral => "mistral",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAi | Self::Mistral)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub menu_path: Option<PathBuf>,
    pub dataset_path: Option<PathBuf>,
    pub eval_max_concurrency: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://drivethru.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                temperature: 0.0,
                timeout_secs: 30,
            },
            retry: RetryConfig::default(),
            agent: AgentConfig::default(),
            eval: EvalConfig {
                dataset_name: DEFAULT_DATASET_NAME.to_string(),
                dataset_path: PathBuf::from("datasets/order-correctness-v1.json"),
                max_concurrency: 1,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            menu_path: PathBuf::from("menus/breakfast-v2.json"),
            prompt_template_path: None,
            max_steps_per_turn: 8,
            max_reprompts: 2,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 500,
            backoff_factor: 2.0,
            max_interval_ms: 8_000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "mistral" => Ok(Self::Mistral),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|mistral|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("drivethru.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_attempts) = retry.max_attempts {
                self.retry.max_attempts = max_attempts;
            }
            if let Some(initial_interval_ms) = retry.initial_interval_ms {
                self.retry.initial_interval_ms = initial_interval_ms;
            }
            if let Some(backoff_factor) = retry.backoff_factor {
                self.retry.backoff_factor = backoff_factor;
            }
            if let Some(max_interval_ms) = retry.max_interval_ms {
                self.retry.max_interval_ms = max_interval_ms;
            }
            if let Some(jitter_ratio) = retry.jitter_ratio {
                self.retry.jitter_ratio = jitter_ratio;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(menu_path) = agent.menu_path {
                self.agent.menu_path = menu_path;
            }
            if let Some(prompt_template_path) = agent.prompt_template_path {
                self.agent.prompt_template_path = Some(prompt_template_path);
            }
            if let Some(max_steps_per_turn) = agent.max_steps_per_turn {
                self.agent.max_steps_per_turn = max_steps_per_turn;
            }
            if let Some(max_reprompts) = agent.max_reprompts {
                self.agent.max_reprompts = max_reprompts;
            }
        }

        if let Some(eval) = patch.eval {
            if let Some(dataset_name) = eval.dataset_name {
                self.eval.dataset_name = dataset_name;
            }
            if let Some(dataset_path) = eval.dataset_path {
                self.eval.dataset_path = dataset_path;
            }
            if let Some(max_concurrency) = eval.max_concurrency {
                self.eval.max_concurrency = max_concurrency;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DRIVETHRU_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DRIVETHRU_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("DRIVETHRU_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("DRIVETHRU_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DRIVETHRU_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("DRIVETHRU_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DRIVETHRU_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("DRIVETHRU_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DRIVETHRU_LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("DRIVETHRU_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("DRIVETHRU_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DRIVETHRU_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("DRIVETHRU_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_RETRY_INITIAL_INTERVAL_MS") {
            self.retry.initial_interval_ms =
                parse_env("DRIVETHRU_RETRY_INITIAL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_RETRY_BACKOFF_FACTOR") {
            self.retry.backoff_factor = parse_env("DRIVETHRU_RETRY_BACKOFF_FACTOR", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_RETRY_MAX_INTERVAL_MS") {
            self.retry.max_interval_ms = parse_env("DRIVETHRU_RETRY_MAX_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_RETRY_JITTER_RATIO") {
            self.retry.jitter_ratio = parse_env("DRIVETHRU_RETRY_JITTER_RATIO", &value)?;
        }

        if let Some(value) = read_env("DRIVETHRU_AGENT_MENU_PATH") {
            self.agent.menu_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("DRIVETHRU_AGENT_PROMPT_TEMPLATE_PATH") {
            self.agent.prompt_template_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("DRIVETHRU_AGENT_MAX_STEPS_PER_TURN") {
            self.agent.max_steps_per_turn =
                parse_env("DRIVETHRU_AGENT_MAX_STEPS_PER_TURN", &value)?;
        }
        if let Some(value) = read_env("DRIVETHRU_AGENT_MAX_REPROMPTS") {
            self.agent.max_reprompts = parse_env("DRIVETHRU_AGENT_MAX_REPROMPTS", &value)?;
        }

        if let Some(value) = read_env("DRIVETHRU_EVAL_DATASET_NAME") {
            self.eval.dataset_name = value;
        }
        if let Some(value) = read_env("DRIVETHRU_EVAL_DATASET_PATH") {
            self.eval.dataset_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("DRIVETHRU_EVAL_MAX_CONCURRENCY") {
            self.eval.max_concurrency = parse_env("DRIVETHRU_EVAL_MAX_CONCURRENCY", &value)?;
        }

        let log_level =
            read_env("DRIVETHRU_LOGGING_LEVEL").or_else(|| read_env("DRIVETHRU_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DRIVETHRU_LOGGING_FORMAT").or_else(|| read_env("DRIVETHRU_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(menu_path) = overrides.menu_path {
            self.agent.menu_path = menu_path;
        }
        if let Some(dataset_path) = overrides.dataset_path {
            self.eval.dataset_path = dataset_path;
        }
        if let Some(max_concurrency) = overrides.eval_max_concurrency {
            self.eval.max_concurrency = max_concurrency;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_retry(&self.retry)?;
        validate_agent(&self.agent)?;
        validate_eval(&self.eval)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("drivethru.toml"), PathBuf::from("config/drivethru.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.provider.requires_api_key() {
        let missing = llm
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(format!(
                "llm.api_key is required for the {} provider (set DRIVETHRU_LLM_API_KEY)",
                llm.provider.as_str()
            )));
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 || retry.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if retry.initial_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "retry.initial_interval_ms must be greater than zero".to_string(),
        ));
    }

    if retry.max_interval_ms < retry.initial_interval_ms {
        return Err(ConfigError::Validation(
            "retry.max_interval_ms must not be smaller than retry.initial_interval_ms".to_string(),
        ));
    }

    if !retry.backoff_factor.is_finite() || retry.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(
            "retry.backoff_factor must be at least 1.0".to_string(),
        ));
    }

    if !(0.0..1.0).contains(&retry.jitter_ratio) {
        return Err(ConfigError::Validation(
            "retry.jitter_ratio must be in range 0.0..1.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.menu_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("agent.menu_path must not be empty".to_string()));
    }

    if agent.max_steps_per_turn == 0 {
        return Err(ConfigError::Validation(
            "agent.max_steps_per_turn must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_eval(eval: &EvalConfig) -> Result<(), ConfigError> {
    if eval.dataset_name.trim().is_empty() {
        return Err(ConfigError::Validation("eval.dataset_name must not be empty".to_string()));
    }

    if eval.max_concurrency == 0 || eval.max_concurrency > 64 {
        return Err(ConfigError::Validation(
            "eval.max_concurrency must be in range 1..=64".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    retry: Option<RetryPatch>,
    agent: Option<AgentPatch>,
    eval: Option<EvalPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_attempts: Option<u32>,
    initial_interval_ms: Option<u64>,
    backoff_factor: Option<f64>,
    max_interval_ms: Option<u64>,
    jitter_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    menu_path: Option<PathBuf>,
    prompt_template_path: Option<PathBuf>,
    max_steps_per_turn: Option<u32>,
    max_reprompts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EvalPatch {
    dataset_name: Option<String>,
    dataset_path: Option<PathBuf>,
    max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
