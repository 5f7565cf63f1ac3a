//! Mapping of raw node JSON into the explorer's stable result shapes.
//!
//! Heights, nonces and indices are decoded to decimal. Wei amounts are decoded through `U256`
//! into full-precision decimal strings. Gas and status fields pass through as the node
//! reported them.

use ethers::types::U256;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::rpc::{GatewayError, parse_quantity};

pub const EMPTY_CODE: &str = "0x";
pub const ZERO_QUANTITY: &str = "0x0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub number: String,
    pub hash: String,
    pub timestamp: u64,
    pub transactions: Vec<String>,
    pub gas_used: String,
    pub gas_limit: String,
    pub parent_hash: String,
    pub miner: String,
    pub difficulty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_difficulty: Option<String>,
    #[serde(skip)]
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub hash: String,
    pub block_number: Option<String>,
    pub block_hash: Option<String>,
    pub transaction_index: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub gas: String,
    pub gas_price: String,
    pub gas_used: String,
    pub status: String,
    pub nonce: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressSummary {
    pub address: String,
    pub balance: String,
    pub nonce: String,
    pub is_contract: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Normalizes an `eth_getBlockBy*` result. Transactions may be hashes or full objects.
pub fn normalize_block(raw: &Value) -> Result<Option<BlockSummary>, GatewayError> {
    let Some(block) = as_object(raw, "block")? else {
        return Ok(None);
    };

    let height = required_quantity(block, "number", "block")?;
    let timestamp = required_quantity(block, "timestamp", "block")?;
    let transactions = match block.get("transactions") {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(hash) => Ok(hash.clone()),
                Value::Object(tx) => required_str(tx, "hash", "block transaction"),
                other => Err(GatewayError::malformed(
                    "block",
                    format!("unexpected transaction entry {other}"),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(GatewayError::malformed(
                "block",
                format!("transactions must be an array, got {other}"),
            ));
        }
    };

    Ok(Some(BlockSummary {
        number: height.to_string(),
        hash: required_str(block, "hash", "block")?,
        timestamp,
        transactions,
        gas_used: opaque(block, "gasUsed", ZERO_QUANTITY),
        gas_limit: opaque(block, "gasLimit", ZERO_QUANTITY),
        parent_hash: required_str(block, "parentHash", "block")?,
        miner: opaque(block, "miner", ""),
        difficulty: opaque(block, "difficulty", ZERO_QUANTITY),
        total_difficulty: optional_str(block, "totalDifficulty"),
        height,
    }))
}

/// Normalizes a transaction object, enriched with its receipt when one is available.
///
/// A missing receipt is expected for very recent transactions and yields `gasUsed = 0x0` and
/// `status = 0x0`.
pub fn normalize_transaction(
    raw: &Value,
    receipt: Option<&Value>,
) -> Result<Option<TransactionSummary>, GatewayError> {
    let Some(tx) = as_object(raw, "transaction")? else {
        return Ok(None);
    };

    let receipt = match receipt {
        Some(value) => as_object(value, "receipt")?,
        None => None,
    };
    let (gas_used, status) = match receipt {
        Some(receipt) => (
            opaque(receipt, "gasUsed", ZERO_QUANTITY),
            opaque(receipt, "status", ZERO_QUANTITY),
        ),
        None => (ZERO_QUANTITY.to_string(), ZERO_QUANTITY.to_string()),
    };

    Ok(Some(TransactionSummary {
        hash: required_str(tx, "hash", "transaction")?,
        block_number: optional_quantity(tx, "blockNumber", "transaction")?
            .map(|height| height.to_string()),
        block_hash: optional_str(tx, "blockHash"),
        transaction_index: optional_quantity(tx, "transactionIndex", "transaction")?
            .map(|index| index.to_string()),
        from: required_str(tx, "from", "transaction")?,
        to: optional_str(tx, "to"),
        value: wei_to_decimal(&required_str(tx, "value", "transaction")?, "transaction")?,
        gas: opaque(tx, "gas", ZERO_QUANTITY),
        gas_price: opaque(tx, "gasPrice", ZERO_QUANTITY),
        gas_used,
        status,
        nonce: required_quantity(tx, "nonce", "transaction")?.to_string(),
        input: opaque(tx, "input", EMPTY_CODE),
        timestamp: None,
        direction: None,
    }))
}

/// Builds an address summary from the `eth_getBalance`, `eth_getTransactionCount` and
/// `eth_getCode` results.
pub fn normalize_address(
    address: &str,
    balance: &Value,
    nonce: &Value,
    code: &Value,
) -> Result<AddressSummary, GatewayError> {
    let balance = balance
        .as_str()
        .ok_or_else(|| GatewayError::malformed("eth_getBalance", format!("got {balance}")))?;
    let nonce = nonce
        .as_str()
        .and_then(parse_quantity)
        .ok_or_else(|| GatewayError::malformed("eth_getTransactionCount", format!("got {nonce}")))?;
    let code = match code {
        Value::String(code) => Some(code.as_str()),
        Value::Null => None,
        other => {
            return Err(GatewayError::malformed(
                "eth_getCode",
                format!("got {other}"),
            ));
        }
    };
    let code = code.filter(|code| !code.is_empty() && *code != EMPTY_CODE);

    Ok(AddressSummary {
        address: address.to_string(),
        balance: wei_to_decimal(balance, "eth_getBalance")?,
        nonce: nonce.to_string(),
        is_contract: code.is_some(),
        code: code.map(str::to_string),
    })
}

/// Converts a hex wei quantity into a decimal string without losing precision.
pub fn wei_to_decimal(raw: &str, context: &'static str) -> Result<String, GatewayError> {
    Ok(parse_wei(raw, context)?.to_string())
}

pub fn parse_wei(raw: &str, context: &'static str) -> Result<U256, GatewayError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .filter(|digits| !digits.is_empty())
        .ok_or_else(|| GatewayError::malformed(context, format!("invalid wei quantity {raw}")))?;
    U256::from_str_radix(digits, 16)
        .map_err(|err| GatewayError::malformed(context, format!("invalid wei quantity {raw}: {err:?}")))
}

fn as_object<'a>(
    raw: &'a Value,
    context: &'static str,
) -> Result<Option<&'a Map<String, Value>>, GatewayError> {
    match raw {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(GatewayError::malformed(
            context,
            format!("expected object, got {other}"),
        )),
    }
}

fn required_str(
    map: &Map<String, Value>,
    key: &str,
    context: &'static str,
) -> Result<String, GatewayError> {
    optional_str(map, key)
        .ok_or_else(|| GatewayError::malformed(context, format!("missing field {key}")))
}

fn optional_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opaque(map: &Map<String, Value>, key: &str, default: &str) -> String {
    optional_str(map, key).unwrap_or_else(|| default.to_string())
}

fn required_quantity(
    map: &Map<String, Value>,
    key: &str,
    context: &'static str,
) -> Result<u64, GatewayError> {
    optional_quantity(map, key, context)?
        .ok_or_else(|| GatewayError::malformed(context, format!("missing field {key}")))
}

fn optional_quantity(
    map: &Map<String, Value>,
    key: &str,
    context: &'static str,
) -> Result<Option<u64>, GatewayError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => parse_quantity(raw).map(Some).ok_or_else(|| {
            GatewayError::malformed(context, format!("field {key} is not a quantity: {raw}"))
        }),
        Some(other) => Err(GatewayError::malformed(
            context,
            format!("field {key} is not a quantity: {other}"),
        )),
    }
}
