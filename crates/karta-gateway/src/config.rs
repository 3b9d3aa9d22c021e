use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_min_health_factor_bps() -> u64 {
    11_000
}
fn default_decision_deadline_ms() -> u64 {
    700
}
fn default_cache_staleness_secs() -> u64 {
    60
}
fn default_replay_ttl_secs() -> u64 {
    24 * 3600
}
fn default_idempotency_ttl_secs() -> u64 {
    24 * 3600
}
fn default_pending_ttl_secs() -> u64 {
    7 * 24 * 3600
}
fn default_timestamp_window_secs() -> i64 {
    300
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_rate_limit_max_requests() -> usize {
    600
}
fn default_indexer_interval_secs() -> u64 {
    15
}
fn default_oracle_max_staleness_secs() -> i64 {
    30
}
fn default_oracle_max_confidence_bps() -> u16 {
    500
}
fn default_recon_threshold_bps() -> u64 {
    10
}
fn default_recon_window_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Issuer HMAC secret; overridable via KARTA_WEBHOOK_SECRET
    #[serde(default)]
    pub webhook_secret: String,
    /// Bearer token for the internal enrollment route;
    /// overridable via KARTA_INTERNAL_TOKEN
    #[serde(default)]
    pub internal_token: String,

    pub rpc_url: String,
    pub program_id: String,
    pub keypair_path: String,
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_min_health_factor_bps")]
    pub min_health_factor_bps: u64,
    #[serde(default = "default_decision_deadline_ms")]
    pub decision_deadline_ms: u64,
    #[serde(default = "default_cache_staleness_secs")]
    pub cache_staleness_secs: u64,
    #[serde(default = "default_replay_ttl_secs")]
    pub replay_ttl_secs: u64,
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    #[serde(default = "default_timestamp_window_secs")]
    pub timestamp_window_secs: i64,
    #[serde(default)]
    pub blocked_mcc: Vec<String>,
    #[serde(default)]
    pub max_authorization_usd_micro: Option<u64>,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: usize,

    #[serde(default = "default_indexer_interval_secs")]
    pub indexer_interval_secs: u64,
    /// asset id (mint base58) -> Pyth price account
    #[serde(default)]
    pub oracle_feeds: HashMap<String, String>,
    #[serde(default = "default_oracle_max_staleness_secs")]
    pub oracle_max_staleness_secs: i64,
    #[serde(default = "default_oracle_max_confidence_bps")]
    pub oracle_max_confidence_bps: u16,

    #[serde(default)]
    pub issuer_log_url: Option<String>,
    #[serde(default)]
    pub issuer_log_api_key: Option<String>,
    #[serde(default = "default_recon_threshold_bps")]
    pub recon_threshold_bps: u64,
    #[serde(default = "default_recon_window_secs")]
    pub recon_window_secs: u64,
}

impl GatewayConfig {
    /// TOML file (KARTA_CONFIG, default `karta.toml`) with env overrides
    /// for the secrets.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var("KARTA_CONFIG").unwrap_or_else(|_| "karta.toml".to_string());
        let raw = std::fs::read_to_string(Path::new(&path))
            .with_context(|| format!("reading config file {path}"))?;
        let mut config: GatewayConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?;

        if let Ok(secret) = std::env::var("KARTA_WEBHOOK_SECRET") {
            config.webhook_secret = secret;
        }
        if let Ok(token) = std::env::var("KARTA_INTERNAL_TOKEN") {
            config.internal_token = token;
        }
        anyhow::ensure!(
            !config.webhook_secret.is_empty(),
            "webhook_secret is required (config file or KARTA_WEBHOOK_SECRET)"
        );
        anyhow::ensure!(
            !config.internal_token.is_empty(),
            "internal_token is required (config file or KARTA_INTERNAL_TOKEN)"
        );
        Ok(config)
    }
}
