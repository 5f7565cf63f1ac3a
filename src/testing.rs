//! In-process stand-in for the JSON-RPC node used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::rpc::{ChainRpc, GatewayError, parse_quantity};

pub const GAS_PRICE: &str = "0x3b9aca00";
pub const CHAIN_ID: u64 = 50_312;

// Well-known development key; never funded outside local chains.
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

#[derive(Default)]
pub struct FakeNode {
    head: Mutex<u64>,
    blocks: Mutex<BTreeMap<u64, Value>>,
    transactions: Mutex<HashMap<String, Value>>,
    receipts: Mutex<HashMap<String, Value>>,
    accounts: Mutex<HashMap<String, (Value, Value, Value)>>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<String>>,
    raw_transactions: Mutex<Vec<String>>,
}

pub fn block_hash(height: u64) -> String {
    format!("0x{:064x}", 0xb10c_0000_0000_u64 + height)
}

pub fn tx_hash(seed: u64) -> String {
    format!("0x{:064x}", 0x7a00_0000_0000_u64 + seed)
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block holding transactions built by [`FakeNode::transaction`] and moves the head.
    pub fn push_block(&self, height: u64, transactions: Vec<Value>) {
        let parent = height
            .checked_sub(1)
            .map(block_hash)
            .unwrap_or_else(|| format!("0x{}", "0".repeat(64)));
        let block = json!({
            "number": format!("{height:#x}"),
            "hash": block_hash(height),
            "parentHash": parent,
            "timestamp": format!("{:#x}", 1_700_000_000 + height * 2),
            "transactions": transactions,
            "gasUsed": "0x0",
            "gasLimit": "0x1c9c380",
            "miner": "0x0000000000000000000000000000000000000000",
            "difficulty": "0x0",
        });
        self.blocks.lock().unwrap().insert(height, block);
        let mut head = self.head.lock().unwrap();
        *head = (*head).max(height);
    }

    pub fn push_empty_blocks(&self, heights: std::ops::RangeInclusive<u64>) {
        for height in heights {
            self.push_block(height, Vec::new());
        }
    }

    /// Builds and registers a transaction, with a successful receipt when `with_receipt`.
    pub fn transaction(
        &self,
        seed: u64,
        height: u64,
        from: &str,
        to: Option<&str>,
        with_receipt: bool,
    ) -> Value {
        let hash = tx_hash(seed);
        let tx = json!({
            "hash": hash,
            "blockNumber": format!("{height:#x}"),
            "blockHash": block_hash(height),
            "transactionIndex": "0x0",
            "from": from,
            "to": to,
            "value": "0xde0b6b3a7640000",
            "gas": "0x5208",
            "gasPrice": GAS_PRICE,
            "nonce": format!("{seed:#x}"),
            "input": "0x",
        });
        self.transactions
            .lock()
            .unwrap()
            .insert(hash.clone(), tx.clone());
        if with_receipt {
            self.receipts
                .lock()
                .unwrap()
                .insert(hash, json!({ "gasUsed": "0x5208", "status": "0x1" }));
        }
        tx
    }

    pub fn set_account(&self, address: &str, balance: &str, nonce: &str, code: &str) {
        self.accounts.lock().unwrap().insert(
            address.to_ascii_lowercase(),
            (json!(balance), json!(nonce), json!(code)),
        );
    }

    pub fn fail(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.as_str() == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn raw_transactions(&self) -> Vec<String> {
        self.raw_transactions.lock().unwrap().clone()
    }

    fn block_view(block: &Value, full: bool) -> Value {
        if full {
            return block.clone();
        }
        let mut header = block.clone();
        let hashes: Vec<Value> = block["transactions"]
            .as_array()
            .map(|txs| txs.iter().map(|tx| tx["hash"].clone()).collect())
            .unwrap_or_default();
        header["transactions"] = Value::Array(hashes);
        header
    }
}

fn param_str(params: &[Value], index: usize) -> String {
    params
        .get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ChainRpc for FakeNode {
    async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, GatewayError> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.failing.lock().unwrap().contains(method) {
            return Err(GatewayError::Transport {
                method,
                message: "connection refused".to_string(),
            });
        }

        let full = params.get(1).and_then(Value::as_bool).unwrap_or(false);
        let result = match method {
            "eth_blockNumber" => json!(format!("{:#x}", *self.head.lock().unwrap())),
            "eth_getBlockByNumber" => {
                let height = parse_quantity(&param_str(&params, 0)).unwrap_or(u64::MAX);
                self.blocks
                    .lock()
                    .unwrap()
                    .get(&height)
                    .map(|block| Self::block_view(block, full))
                    .unwrap_or(Value::Null)
            }
            "eth_getBlockByHash" => {
                let hash = param_str(&params, 0);
                self.blocks
                    .lock()
                    .unwrap()
                    .values()
                    .find(|block| block["hash"] == json!(hash))
                    .map(|block| Self::block_view(block, full))
                    .unwrap_or(Value::Null)
            }
            "eth_getTransactionByHash" => self
                .transactions
                .lock()
                .unwrap()
                .get(&param_str(&params, 0))
                .cloned()
                .unwrap_or(Value::Null),
            "eth_getTransactionReceipt" => self
                .receipts
                .lock()
                .unwrap()
                .get(&param_str(&params, 0))
                .cloned()
                .unwrap_or(Value::Null),
            "eth_getBalance" | "eth_getTransactionCount" | "eth_getCode" => {
                let accounts = self.accounts.lock().unwrap();
                let account = accounts.get(&param_str(&params, 0).to_ascii_lowercase());
                match (method, account) {
                    ("eth_getBalance", Some((balance, _, _))) => balance.clone(),
                    ("eth_getTransactionCount", Some((_, nonce, _))) => nonce.clone(),
                    ("eth_getCode", Some((_, _, code))) => code.clone(),
                    ("eth_getCode", None) => json!("0x"),
                    _ => json!("0x0"),
                }
            }
            "eth_gasPrice" => json!(GAS_PRICE),
            "eth_chainId" => json!(format!("{CHAIN_ID:#x}")),
            "eth_sendRawTransaction" => {
                let mut sent = self.raw_transactions.lock().unwrap();
                sent.push(param_str(&params, 0));
                json!(tx_hash(0xfa_0000 + sent.len() as u64))
            }
            other => {
                return Err(GatewayError::Node {
                    method,
                    code: -32601,
                    message: format!("the method {other} does not exist"),
                });
            }
        };
        Ok(result)
    }
}
