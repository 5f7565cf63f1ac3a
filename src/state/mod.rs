use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;

use crate::captcha::ChallengeIssuer;
use crate::config::CacheConfig;
use crate::explorer::Explorer;
use crate::explorer::normalize::{BlockSummary, TransactionSummary};
use crate::faucet::Faucet;
use crate::rpc::ChainRpc;

#[derive(Clone)]
pub struct AppState {
    pub explorer: Arc<Explorer>,
    pub faucet: Arc<Faucet>,
    pub challenges: Arc<ChallengeIssuer>,
    pub cache: Arc<ExplorerCache>,
    pub rpc: Arc<dyn ChainRpc>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        explorer: Arc<Explorer>,
        faucet: Arc<Faucet>,
        challenges: Arc<ChallengeIssuer>,
        cache: Arc<ExplorerCache>,
        rpc: Arc<dyn ChainRpc>,
    ) -> Self {
        Self {
            explorer,
            faucet,
            challenges,
            cache,
            rpc,
            start_time: Instant::now(),
        }
    }
}

/// Short-lived copies of blocks and settled transactions, keyed by `#height` or lower-cased
/// hash.
pub struct ExplorerCache {
    pub blocks: Cache<String, Arc<BlockSummary>>,
    pub transactions: Cache<String, Arc<TransactionSummary>>,
}

impl ExplorerCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.blocks_max_capacity >= 100,
            "Block cache capacity threshold"
        );
        assert!(
            config.transactions_max_capacity >= 100,
            "Transaction cache capacity threshold"
        );

        let blocks = Cache::builder()
            .max_capacity(config.blocks_max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        let transactions = Cache::builder()
            .max_capacity(config.transactions_max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            blocks,
            transactions,
        }
    }
}
