use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::read_keypair_file;
use tracing::info;
use tracing_subscriber::EnvFilter;

use karta_chain::{
    BackoffPolicy, ChainClient, Indexer, IndexerRefresher, IssuerLogClient, PythRpcOracle,
    Reconciler, Submitter,
};
use karta_core::redis_store::RedisStores;
use karta_core::store::{
    CacheStore, CheckpointStore, CommitLog, IdempotencyStore, MemoryCacheStore,
    MemoryCheckpointStore, MemoryCommitLog, MemoryIdempotencyStore, MemoryPendingAuthStore,
    MemoryReplayStore, PendingAuthStore, ReplayStore,
};
use karta_core::{DecisionConfig, DecisionCore, GatedOracle, PositionCache};
use karta_gateway::config::GatewayConfig;
use karta_gateway::ingress::RateLimiter;
use karta_gateway::{build_router, AppState};

struct Stores {
    replay: Arc<dyn ReplayStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    pending: Arc<dyn PendingAuthStore>,
    cache: Arc<dyn CacheStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    commit_log: Arc<dyn CommitLog>,
}

async fn build_stores(config: &GatewayConfig) -> anyhow::Result<Stores> {
    match &config.redis_url {
        Some(url) => {
            info!(%url, "using redis stores");
            let redis = RedisStores::connect(url).await.context("connecting to redis")?;
            Ok(Stores {
                replay: Arc::new(redis.clone()),
                idempotency: Arc::new(redis.clone()),
                pending: Arc::new(redis.clone()),
                cache: Arc::new(redis.clone()),
                checkpoints: Arc::new(redis.clone()),
                commit_log: Arc::new(redis),
            })
        }
        None => {
            info!("using in-memory stores");
            Ok(Stores {
                replay: Arc::new(MemoryReplayStore::new()),
                idempotency: Arc::new(MemoryIdempotencyStore::new()),
                pending: Arc::new(MemoryPendingAuthStore::new()),
                cache: Arc::new(MemoryCacheStore::new()),
                checkpoints: Arc::new(MemoryCheckpointStore::new()),
                commit_log: Arc::new(MemoryCommitLog::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = GatewayConfig::load()?;
    let stores = build_stores(&config).await?;

    let program_id: Pubkey = config
        .program_id
        .parse()
        .context("parsing program_id")?;
    let payer = read_keypair_file(&config.keypair_path)
        .map_err(|e| anyhow::anyhow!("reading keypair {}: {e}", config.keypair_path))?;
    let client = Arc::new(ChainClient::new(&config.rpc_url, payer, program_id));

    let cache = Arc::new(PositionCache::new(
        stores.cache.clone(),
        Duration::from_secs(config.cache_staleness_secs),
    ));

    let mut feeds = HashMap::new();
    for (asset, feed) in &config.oracle_feeds {
        feeds.insert(
            asset.clone(),
            feed.parse::<Pubkey>()
                .with_context(|| format!("parsing oracle feed for {asset}"))?,
        );
    }
    let oracle = Arc::new(GatedOracle::new(
        PythRpcOracle::new(client.rpc(), feeds),
        config.oracle_max_staleness_secs,
        config.oracle_max_confidence_bps,
    ));

    let submitter = Submitter::new(client.clone(), stores.commit_log.clone(), BackoffPolicy::default());
    let indexer = Indexer::new(
        client.clone(),
        oracle,
        cache.clone(),
        stores.checkpoints.clone(),
        Duration::from_secs(config.indexer_interval_secs),
    );
    tokio::spawn(indexer.clone().run());

    if let (Some(url), Some(api_key)) = (&config.issuer_log_url, &config.issuer_log_api_key) {
        let reconciler = Reconciler::new(
            IssuerLogClient::new(url, api_key),
            stores.commit_log.clone(),
            config.recon_threshold_bps,
            Duration::from_secs(config.recon_window_secs),
        );
        tokio::spawn(reconciler.run());
    } else {
        info!("issuer log not configured; reconciliation disabled");
    }

    let decision = Arc::new(DecisionCore::new(
        cache.clone(),
        stores.pending.clone(),
        Arc::new(submitter),
        Arc::new(IndexerRefresher(indexer)),
        DecisionConfig {
            min_health_factor_bps: config.min_health_factor_bps,
            hard_deadline: Duration::from_millis(config.decision_deadline_ms),
            pending_ttl: Duration::from_secs(config.pending_ttl_secs),
            blocked_mcc: config.blocked_mcc.clone(),
            max_authorization_usd_micro: config.max_authorization_usd_micro,
        },
    ));

    let state = Arc::new(AppState {
        secret: config.webhook_secret.clone().into_bytes(),
        timestamp_window_secs: config.timestamp_window_secs,
        replay_ttl: Duration::from_secs(config.replay_ttl_secs),
        idempotency_ttl: Duration::from_secs(config.idempotency_ttl_secs),
        replay: stores.replay,
        idempotency: stores.idempotency,
        decision,
        cache,
        limiter: RateLimiter::new(
            Duration::from_secs(config.rate_limit_window_secs),
            config.rate_limit_max_requests,
        ),
        internal_token: config.internal_token.clone(),
    });

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving")?;
    Ok(())
}
