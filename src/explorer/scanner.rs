use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::explorer::normalize::{Direction, TransactionSummary, normalize_transaction};
use crate::rpc::{ChainRpc, GatewayError, parse_quantity};

/// Restricts a scan to transactions sent from or to one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFilter {
    target: String,
}

impl AddressFilter {
    pub fn new(address: &str) -> Self {
        Self {
            target: address.to_ascii_lowercase(),
        }
    }

    fn direction(&self, tx: &Value) -> Option<Direction> {
        let from = tx.get("from").and_then(Value::as_str);
        let to = tx.get("to").and_then(Value::as_str);
        if from.is_some_and(|from| from.eq_ignore_ascii_case(&self.target)) {
            Some(Direction::Out)
        } else if to.is_some_and(|to| to.eq_ignore_ascii_case(&self.target)) {
            Some(Direction::In)
        } else {
            None
        }
    }
}

/// Walks blocks backward from a height collecting transactions, newest first.
///
/// `max_blocks` caps how many heights are examined, so a scan may return fewer than the
/// requested count. Receipts are fetched only for transactions that pass the filter.
pub struct ChainScanner<'a> {
    rpc: &'a dyn ChainRpc,
    max_blocks: u64,
}

impl<'a> ChainScanner<'a> {
    pub fn new(rpc: &'a dyn ChainRpc, max_blocks: u64) -> Self {
        assert!(max_blocks > 0, "Scan must examine at least one block");
        assert!(max_blocks <= 10_000, "Scan block cap exceeds defensive bound");
        Self { rpc, max_blocks }
    }

    pub async fn scan(
        &self,
        from_height: u64,
        max_count: usize,
        filter: Option<&AddressFilter>,
    ) -> Result<Vec<TransactionSummary>, GatewayError> {
        let mut collected = Vec::with_capacity(max_count.min(64));
        if max_count == 0 {
            return Ok(collected);
        }

        let mut examined = 0;
        let mut height = Some(from_height);
        while let Some(current) = height {
            if examined >= self.max_blocks || collected.len() >= max_count {
                break;
            }
            examined += 1;
            height = current.checked_sub(1);

            let block = self.rpc.block_by_number(current, true).await?;
            if block.is_null() {
                debug!("Block {current} not available; skipping");
                continue;
            }
            let timestamp = block
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_quantity);
            let Some(transactions) = block.get("transactions").and_then(Value::as_array) else {
                continue;
            };

            let remaining = max_count - collected.len();
            let matches: Vec<(&Value, Option<Direction>)> = transactions
                .iter()
                .filter_map(|tx| match filter {
                    Some(filter) => filter.direction(tx).map(|direction| (tx, Some(direction))),
                    None => Some((tx, None)),
                })
                .take(remaining)
                .collect();
            if matches.is_empty() {
                continue;
            }

            let receipts = join_all(matches.iter().map(|(tx, _)| self.receipt_for(tx))).await;
            for ((tx, direction), receipt) in matches.into_iter().zip(receipts) {
                let Some(mut summary) = normalize_transaction(tx, receipt.as_ref())? else {
                    continue;
                };
                summary.timestamp = timestamp;
                summary.direction = direction;
                collected.push(summary);
            }
        }

        debug!(
            "Scan from block {from_height} examined {examined} blocks and found {} transactions",
            collected.len()
        );
        Ok(collected)
    }

    async fn receipt_for(&self, tx: &Value) -> Option<Value> {
        let hash = tx.get("hash").and_then(Value::as_str)?;
        match self.rpc.transaction_receipt(hash).await {
            Ok(receipt) => Some(receipt),
            Err(err) => {
                warn!("Receipt lookup for {hash} failed, using defaults: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNode, tx_hash};

    const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
    const BOB: &str = "0xb0b0000000000000000000000000000000000002";
    const CAROL: &str = "0xca40100000000000000000000000000000000003";

    #[tokio::test]
    async fn unfiltered_scan_is_newest_first_and_stops_at_quota() {
        let node = FakeNode::new();
        node.push_empty_blocks(0..=7);
        let older = node.transaction(1, 8, ALICE, Some(BOB), true);
        node.push_block(8, vec![older]);
        let first = node.transaction(2, 9, BOB, Some(CAROL), true);
        let second = node.transaction(3, 9, CAROL, Some(ALICE), true);
        node.push_block(9, vec![first, second]);

        let scanner = ChainScanner::new(&node, 20);
        let found = scanner.scan(9, 2, None).await.unwrap();
        let hashes: Vec<_> = found.iter().map(|tx| tx.hash.clone()).collect();
        assert_eq!(hashes, vec![tx_hash(2), tx_hash(3)]);
        assert!(found.iter().all(|tx| tx.direction.is_none()));
        assert_eq!(found[0].timestamp, Some(1_700_000_018));
        assert_eq!(node.calls_to("eth_getBlockByNumber"), 1);
        assert_eq!(node.calls_to("eth_getTransactionReceipt"), 2);
    }

    #[tokio::test]
    async fn address_scan_tags_direction_and_skips_foreign_receipts() {
        let node = FakeNode::new();
        let outgoing = node.transaction(1, 1, &ALICE.to_uppercase().replace("0X", "0x"), Some(BOB), true);
        let unrelated = node.transaction(2, 2, BOB, Some(CAROL), true);
        let incoming = node.transaction(3, 2, CAROL, Some(ALICE), true);
        node.push_block(0, Vec::new());
        node.push_block(1, vec![outgoing]);
        node.push_block(2, vec![unrelated, incoming]);

        let scanner = ChainScanner::new(&node, 100);
        let filter = AddressFilter::new(ALICE);
        let found = scanner.scan(2, 10, Some(&filter)).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].hash, tx_hash(3));
        assert_eq!(found[0].direction, Some(Direction::In));
        assert_eq!(found[1].hash, tx_hash(1));
        assert_eq!(found[1].direction, Some(Direction::Out));
        // Only matching transactions cost a receipt lookup.
        assert_eq!(node.calls_to("eth_getTransactionReceipt"), 2);
        // Genesis stops the walk before the cap.
        assert_eq!(node.calls_to("eth_getBlockByNumber"), 3);
    }

    #[tokio::test]
    async fn address_without_activity_yields_empty_list() {
        let node = FakeNode::new();
        for height in 0..150 {
            let tx = node.transaction(height, height, BOB, Some(CAROL), true);
            node.push_block(height, vec![tx]);
        }

        let scanner = ChainScanner::new(&node, 100);
        let found = scanner
            .scan(149, 10, Some(&AddressFilter::new(ALICE)))
            .await
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(node.calls_to("eth_getBlockByNumber"), 100);
        assert_eq!(node.calls_to("eth_getTransactionReceipt"), 0);
    }

    #[tokio::test]
    async fn missing_receipts_fall_back_to_defaults() {
        let node = FakeNode::new();
        let pending = node.transaction(1, 0, ALICE, Some(BOB), false);
        let failing = node.transaction(2, 0, ALICE, None, true);
        node.push_block(0, vec![pending, failing]);
        node.fail("eth_getTransactionReceipt");

        let found = ChainScanner::new(&node, 20).scan(0, 10, None).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|tx| tx.gas_used == "0x0" && tx.status == "0x0"));
        assert!(found[1].to.is_none());
    }

    #[tokio::test]
    async fn block_failures_propagate() {
        let node = FakeNode::new();
        node.push_empty_blocks(0..=3);
        node.fail("eth_getBlockByNumber");

        let result = ChainScanner::new(&node, 20).scan(3, 5, None).await;
        assert!(matches!(result, Err(GatewayError::Transport { .. })));
    }

    #[tokio::test]
    async fn missing_blocks_are_skipped() {
        let node = FakeNode::new();
        let tx = node.transaction(1, 3, ALICE, Some(BOB), true);
        node.push_block(3, vec![tx]);

        let found = ChainScanner::new(&node, 20).scan(5, 5, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(node.calls_to("eth_getBlockByNumber"), 6);
    }
}
