use clap::Parser;
use leadflow_ai::{ExtractorSettings, DEFAULT_ENDPOINT, DEFAULT_MODEL};
use leadflow_storage::{BackendKind, FailurePolicy, StoreOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: String,
    pub debug: bool,
    pub log_dir: String,
    pub store: StoreOptions,
    pub extractor: ExtractorSettings,
}

#[derive(Parser, Debug)]
#[command(name = "leadflow-server", about = "LeadFlow lead tracking HTTP API")]
pub struct Args {
    #[arg(long, env = "LEADFLOW_ADDR", default_value = "127.0.0.1:8787")]
    pub addr: String,
    #[arg(long, env = "LEADFLOW_DB", default_value = "leadflow.db")]
    pub db: PathBuf,
    #[arg(long, env = "LEADFLOW_BACKEND", default_value = "sqlite")]
    pub backend: BackendKind,
    #[arg(long, env = "LEADFLOW_FAILURE_POLICY", default_value = "surface")]
    pub failure_policy: FailurePolicy,
    #[arg(long, env = "LEADFLOW_AI_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub ai_endpoint: String,
    #[arg(long, env = "LEADFLOW_AI_MODEL", default_value = DEFAULT_MODEL)]
    pub ai_model: String,
    #[arg(long, env = "LEADFLOW_AI_API_KEY", hide_env_values = true)]
    pub ai_api_key: Option<String>,
    #[arg(long, env = "LEADFLOW_AI_TIMEOUT_SECS", default_value_t = 60)]
    pub ai_timeout_secs: u64,
    #[arg(long, env = "LEADFLOW_LOG_DIR", default_value = "")]
    pub log_dir: String,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

pub fn load_config() -> Config {
    Config::from_args(Args::parse())
}

impl Config {
    pub fn from_args(args: Args) -> Self {
        Self {
            addr: args.addr,
            debug: args.debug || env_true("LEADFLOW_DEBUG"),
            log_dir: args.log_dir,
            store: StoreOptions {
                backend: args.backend,
                path: args.db,
                policy: args.failure_policy,
            },
            extractor: ExtractorSettings {
                endpoint: args.ai_endpoint,
                model: args.ai_model,
                api_key: args.ai_api_key.filter(|key| !key.trim().is_empty()),
                timeout: Duration::from_secs(args.ai_timeout_secs.max(1)),
            },
        }
    }
}

pub fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_store_and_extractor_settings() {
        let args = Args::try_parse_from([
            "leadflow-server",
            "--db",
            "/tmp/leads.db",
            "--backend",
            "memory",
            "--failure-policy",
            "fallback-to-memory",
            "--ai-api-key",
            "  ",
            "--ai-timeout-secs",
            "0",
        ])
        .expect("parse args");
        let config = Config::from_args(args);

        assert_eq!(config.store.backend, BackendKind::Memory);
        assert_eq!(config.store.policy, FailurePolicy::FallbackToMemory);
        assert_eq!(config.store.path, PathBuf::from("/tmp/leads.db"));
        assert_eq!(config.extractor.api_key, None);
        assert_eq!(config.extractor.timeout, Duration::from_secs(1));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Args::try_parse_from(["leadflow-server", "--failure-policy", "retry"]).is_err());
    }
}
