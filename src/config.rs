use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub db: Db,
    pub settlement: Settlement,
    pub llm: Llm,
    pub evaluation: Evaluation,
    pub lifecycle: Lifecycle,
    pub sweeper: Sweeper,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Db {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settlement {
    pub base_url: String,
    pub destination_address: String,
    pub min_confirmations: u32,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Llm {
    pub api_key: String,
    pub model: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Evaluation {
    pub pass_threshold: u8,
    pub timeout_seconds: u64,
    pub judge_temperature: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Lifecycle {
    pub min_price_usdc: String,
    pub fee_rate: String,
    pub default_max_worker_attempts: u32,
    pub default_max_submissions: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Sweeper {
    pub poll_interval_ms: u64,
    pub max_batch: u32,
}

/// Load settings from `config/default.toml`, `config/<env>.toml`, and env overrides.
pub fn load() -> Result<Settings, config::ConfigError> {
    let env_name = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    config::Config::builder()
        .add_source(config::File::with_name("config/default"))
        .add_source(config::File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(config::Environment::with_prefix("BOUNTYRUN").separator("__"))
        .build()?
        .try_deserialize()
}
