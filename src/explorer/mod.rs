//! Search and recent-activity listings backed by the chain node.

pub mod normalize;
pub mod query;
pub mod scanner;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExplorerConfig;
use crate::rpc::{ChainRpc, GatewayError};
use crate::state::ExplorerCache;

use self::normalize::{
    AddressSummary, BlockSummary, TransactionSummary, normalize_address, normalize_block,
    normalize_transaction,
};
use self::query::{SearchQuery, canonical_address};
use self::scanner::{AddressFilter, ChainScanner};

pub const DEFAULT_RECENT_LIMIT: usize = 10;
pub const MAX_RECENT_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("{0}")]
    Validation(String),
    #[error("No results found for {0}")]
    NotFound(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SearchResult {
    Block(BlockSummary),
    Transaction(TransactionSummary),
    Address(AddressSummary),
}

impl SearchResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Block(_) => "block",
            Self::Transaction(_) => "transaction",
            Self::Address(_) => "address",
        }
    }
}

/// Outcome of resolving a 32-byte hash, which may name a block or a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashLookup {
    Block(BlockSummary),
    Transaction(TransactionSummary),
    NotFound,
}

pub struct Explorer {
    rpc: Arc<dyn ChainRpc>,
    cache: Arc<ExplorerCache>,
    config: ExplorerConfig,
}

impl Explorer {
    pub fn new(rpc: Arc<dyn ChainRpc>, cache: Arc<ExplorerCache>, config: ExplorerConfig) -> Self {
        assert!(
            config.recent_transactions_scan_blocks > 0,
            "Recent transaction scan must cover at least one block"
        );
        assert!(
            config.address_scan_blocks >= config.recent_transactions_scan_blocks,
            "Address scans are sparser and need the larger block cap"
        );
        Self { rpc, cache, config }
    }

    /// Clamps a requested listing size into `1..=MAX_RECENT_LIMIT`.
    pub fn clamp_limit(requested: Option<usize>) -> usize {
        requested
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, MAX_RECENT_LIMIT)
    }

    pub async fn search(&self, raw: &str) -> Result<SearchResult, ExplorerError> {
        let query = SearchQuery::classify(raw);
        debug!("Explorer search classified as {query:?}");
        let result = match query {
            SearchQuery::BlockNumber(height) => self
                .block_by_number(height)
                .await?
                .map(SearchResult::Block),
            SearchQuery::Hash32(hash) => match self.resolve_hash(&hash).await? {
                HashLookup::Block(block) => Some(SearchResult::Block(block)),
                HashLookup::Transaction(tx) => Some(SearchResult::Transaction(tx)),
                HashLookup::NotFound => None,
            },
            SearchQuery::Address20(address) => {
                Some(SearchResult::Address(self.address(&address).await?))
            }
            SearchQuery::Invalid => {
                return Err(ExplorerError::Validation(
                    "Invalid search query format. Enter a block number, transaction hash, or address."
                        .to_string(),
                ));
            }
        };
        result.ok_or_else(|| ExplorerError::NotFound(raw.trim().to_string()))
    }

    /// Tries the hash as a block first and falls back to a transaction lookup.
    pub async fn resolve_hash(&self, hash: &str) -> Result<HashLookup, GatewayError> {
        if let Some(block) = self.block_by_hash(hash).await? {
            return Ok(HashLookup::Block(block));
        }
        match self.transaction(hash).await? {
            Some(tx) => Ok(HashLookup::Transaction(tx)),
            None => Ok(HashLookup::NotFound),
        }
    }

    pub async fn recent_blocks(&self, limit: usize) -> Result<Vec<BlockSummary>, GatewayError> {
        let head = self.rpc.block_number().await?;
        let mut blocks = Vec::with_capacity(limit);
        for offset in 0..limit as u64 {
            let Some(height) = head.checked_sub(offset) else {
                break;
            };
            if let Some(block) = self.block_by_number(height).await? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }

    pub async fn recent_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, GatewayError> {
        let head = self.rpc.block_number().await?;
        ChainScanner::new(self.rpc.as_ref(), self.config.recent_transactions_scan_blocks)
            .scan(head, limit, None)
            .await
    }

    pub async fn address_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionSummary>, ExplorerError> {
        let address = canonical_address(address).ok_or_else(|| {
            ExplorerError::Validation("A valid 0x-prefixed 20-byte address is required".to_string())
        })?;
        let head = self.rpc.block_number().await?;
        let filter = AddressFilter::new(&address);
        let transactions = ChainScanner::new(self.rpc.as_ref(), self.config.address_scan_blocks)
            .scan(head, limit, Some(&filter))
            .await?;
        Ok(transactions)
    }

    async fn block_by_number(&self, height: u64) -> Result<Option<BlockSummary>, GatewayError> {
        let key = format!("#{height}");
        if let Some(cached) = self.cache.blocks.get(&key).await {
            return Ok(Some((*cached).clone()));
        }
        let block = normalize_block(&self.rpc.block_by_number(height, false).await?)?;
        if let Some(block) = &block {
            self.remember_block(block).await;
        }
        Ok(block)
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<BlockSummary>, GatewayError> {
        let key = hash.to_ascii_lowercase();
        if let Some(cached) = self.cache.blocks.get(&key).await {
            return Ok(Some((*cached).clone()));
        }
        let block = normalize_block(&self.rpc.block_by_hash(hash, false).await?)?;
        if let Some(block) = &block {
            self.remember_block(block).await;
        }
        Ok(block)
    }

    async fn remember_block(&self, block: &BlockSummary) {
        let shared = Arc::new(block.clone());
        self.cache
            .blocks
            .insert(format!("#{}", block.height), Arc::clone(&shared))
            .await;
        self.cache
            .blocks
            .insert(block.hash.to_ascii_lowercase(), shared)
            .await;
    }

    async fn transaction(&self, hash: &str) -> Result<Option<TransactionSummary>, GatewayError> {
        let key = hash.to_ascii_lowercase();
        if let Some(cached) = self.cache.transactions.get(&key).await {
            return Ok(Some((*cached).clone()));
        }

        let (tx, receipt) = tokio::join!(
            self.rpc.transaction_by_hash(hash),
            self.rpc.transaction_receipt(hash)
        );
        let receipt = receipt
            .inspect_err(|err| warn!("Receipt lookup for {hash} failed, using defaults: {err}"))
            .ok()
            .filter(|receipt| !receipt.is_null());
        let summary = normalize_transaction(&tx?, receipt.as_ref())?;

        // Only settled transactions are cached; pending ones still change status.
        if let (Some(summary), Some(_)) = (&summary, &receipt) {
            self.cache
                .transactions
                .insert(key, Arc::new(summary.clone()))
                .await;
        }
        Ok(summary)
    }

    async fn address(&self, address: &str) -> Result<AddressSummary, GatewayError> {
        let (balance, nonce, code) = tokio::try_join!(
            self.rpc.balance(address),
            self.rpc.transaction_count(address, "latest"),
            self.rpc.code(address)
        )?;
        normalize_address(address, &balance, &nonce, &code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::testing::{FakeNode, block_hash, tx_hash};

    const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
    const BOB: &str = "0xb0b0000000000000000000000000000000000002";

    fn explorer(node: Arc<FakeNode>) -> Explorer {
        let cache = Arc::new(ExplorerCache::new(&CacheConfig::default()));
        Explorer::new(node, cache, ExplorerConfig::default())
    }

    fn seeded_node() -> Arc<FakeNode> {
        let node = Arc::new(FakeNode::new());
        node.push_empty_blocks(0..=122);
        let tx = node.transaction(7, 123, ALICE, Some(BOB), true);
        node.push_block(123, vec![tx]);
        node
    }

    #[tokio::test]
    async fn numeric_query_returns_block_with_decimal_number() {
        let explorer = explorer(seeded_node());
        let result = explorer.search("123").await.unwrap();
        assert_eq!(result.kind(), "block");
        let SearchResult::Block(block) = result else {
            panic!("expected a block");
        };
        assert_eq!(block.number, "123");
        assert_eq!(block.transactions, vec![tx_hash(7)]);
    }

    #[tokio::test]
    async fn invalid_queries_never_reach_the_node() {
        let node = seeded_node();
        let explorer = explorer(Arc::clone(&node));
        let err = explorer.search("hello world").await.unwrap_err();
        assert!(matches!(err, ExplorerError::Validation(_)));
        assert_eq!(node.total_calls(), 0);
    }

    #[tokio::test]
    async fn hash_resolves_to_block_before_transaction() {
        let node = seeded_node();
        let explorer = explorer(Arc::clone(&node));
        let result = explorer.search(&block_hash(123)).await.unwrap();
        assert_eq!(result.kind(), "block");
        assert_eq!(node.calls_to("eth_getTransactionByHash"), 0);
    }

    #[tokio::test]
    async fn hash_falls_back_to_transaction() {
        let node = seeded_node();
        let explorer = explorer(Arc::clone(&node));
        let result = explorer.search(&tx_hash(7)).await.unwrap();
        let SearchResult::Transaction(tx) = result else {
            panic!("expected a transaction");
        };
        assert_eq!(tx.status, "0x1");
        assert_eq!(tx.block_number.as_deref(), Some("123"));
        assert_eq!(node.calls_to("eth_getBlockByHash"), 1);
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found_rather_than_an_error() {
        let explorer = explorer(seeded_node());
        let err = explorer.search(&tx_hash(999)).await.unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound(_)));
    }

    #[tokio::test]
    async fn gateway_failures_are_not_reported_as_missing() {
        let node = seeded_node();
        node.fail("eth_getBlockByHash");
        let explorer = explorer(Arc::clone(&node));
        let err = explorer.search(&tx_hash(7)).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Gateway(_)));
    }

    #[tokio::test]
    async fn transaction_survives_receipt_failure() {
        let node = seeded_node();
        node.fail("eth_getTransactionReceipt");
        let explorer = explorer(Arc::clone(&node));
        let SearchResult::Transaction(tx) = explorer.search(&tx_hash(7)).await.unwrap() else {
            panic!("expected a transaction");
        };
        assert_eq!(tx.gas_used, "0x0");
        assert_eq!(tx.status, "0x0");
    }

    #[tokio::test]
    async fn address_aggregate_fails_as_a_whole() {
        let node = seeded_node();
        node.set_account(ALICE, "0xde0b6b3a7640000", "0x2", "0x");
        let explorer = explorer(Arc::clone(&node));
        let SearchResult::Address(summary) = explorer.search(ALICE).await.unwrap() else {
            panic!("expected an address");
        };
        assert_eq!(summary.balance, "1000000000000000000");
        assert_eq!(summary.nonce, "2");
        assert!(!summary.is_contract);

        node.fail("eth_getCode");
        let err = explorer.search(ALICE).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Gateway(_)));
    }

    #[tokio::test]
    async fn found_blocks_are_served_from_cache() {
        let node = seeded_node();
        let explorer = explorer(Arc::clone(&node));
        explorer.search("123").await.unwrap();
        explorer.search(&block_hash(123)).await.unwrap();
        explorer.search("123").await.unwrap();
        assert_eq!(node.calls_to("eth_getBlockByNumber"), 1);
        assert_eq!(node.calls_to("eth_getBlockByHash"), 0);
    }

    #[tokio::test]
    async fn recent_blocks_stop_at_genesis() {
        let node = Arc::new(FakeNode::new());
        node.push_empty_blocks(0..=2);
        let explorer = explorer(node);
        let blocks = explorer.recent_blocks(10).await.unwrap();
        let numbers: Vec<_> = blocks.iter().map(|block| block.number.as_str()).collect();
        assert_eq!(numbers, vec!["2", "1", "0"]);
    }

    #[tokio::test]
    async fn address_listing_requires_a_valid_address() {
        let node = seeded_node();
        let explorer = explorer(Arc::clone(&node));
        let err = explorer.address_transactions("0x1234", 10).await.unwrap_err();
        assert!(matches!(err, ExplorerError::Validation(_)));
        assert_eq!(node.total_calls(), 0);

        let found = explorer
            .address_transactions(&BOB.to_uppercase().replacen("0X", "0x", 1), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].direction, Some(normalize::Direction::In));
    }

    #[test]
    fn limits_are_clamped() {
        assert_eq!(Explorer::clamp_limit(None), DEFAULT_RECENT_LIMIT);
        assert_eq!(Explorer::clamp_limit(Some(0)), 1);
        assert_eq!(Explorer::clamp_limit(Some(500)), MAX_RECENT_LIMIT);
        assert_eq!(Explorer::clamp_limit(Some(25)), 25);
    }
}
