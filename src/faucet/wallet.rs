//! Hot wallet that signs and submits the faucet's native-token transfers.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, U256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::explorer::normalize::parse_wei;
use crate::rpc::{ChainRpc, GatewayError, parse_quantity};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid recipient {0}")]
    Recipient(String),
    #[error("failed to sign transfer: {0}")]
    Signing(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[async_trait]
pub trait TransferWallet: Send + Sync {
    /// Lower-cased sender address
    fn address(&self) -> String;

    /// Submits a transfer and returns its hash once the node accepts it.
    async fn send_native(
        &self,
        to: &str,
        amount: U256,
        gas_limit: u64,
    ) -> Result<String, TransferError>;
}

pub struct SigningWallet {
    signer: LocalWallet,
    rpc: Arc<dyn ChainRpc>,
    chain_id: u64,
    /// Next nonce this process will use. Held for the whole read, sign and submit sequence so
    /// concurrent transfers never share a nonce.
    next_nonce: Mutex<Option<U256>>,
}

impl SigningWallet {
    pub fn new(signer: LocalWallet, rpc: Arc<dyn ChainRpc>, chain_id: u64) -> Self {
        assert!(chain_id > 0, "Chain id must be non-zero");
        Self {
            signer: signer.with_chain_id(chain_id),
            rpc,
            chain_id,
            next_nonce: Mutex::new(None),
        }
    }

    pub fn from_key(key: &str, rpc: Arc<dyn ChainRpc>, chain_id: u64) -> Result<Self> {
        let signer = key
            .trim()
            .parse::<LocalWallet>()
            .context("Faucet private key is not a valid secp256k1 key")?;
        Ok(Self::new(signer, rpc, chain_id))
    }

    /// Reads the hex-encoded key from the environment variable `var`.
    pub fn from_env(var: &str, rpc: Arc<dyn ChainRpc>, chain_id: u64) -> Result<Self> {
        let key = std::env::var(var).with_context(|| format!("{var} is not set"))?;
        Self::from_key(&key, rpc, chain_id)
    }

    async fn pending_nonce(&self) -> Result<U256, GatewayError> {
        let sender = self.address();
        let value = self.rpc.transaction_count(&sender, "pending").await?;
        value
            .as_str()
            .and_then(parse_quantity)
            .map(U256::from)
            .ok_or_else(|| {
                GatewayError::malformed("eth_getTransactionCount", format!("got {value}"))
            })
    }

    async fn gas_price(&self) -> Result<U256, GatewayError> {
        let value = self.rpc.gas_price().await?;
        let raw = value
            .as_str()
            .ok_or_else(|| GatewayError::malformed("eth_gasPrice", format!("got {value}")))?;
        parse_wei(raw, "eth_gasPrice")
    }
}

#[async_trait]
impl TransferWallet for SigningWallet {
    fn address(&self) -> String {
        format!("{:?}", self.signer.address())
    }

    async fn send_native(
        &self,
        to: &str,
        amount: U256,
        gas_limit: u64,
    ) -> Result<String, TransferError> {
        let recipient = to
            .parse::<Address>()
            .map_err(|_| TransferError::Recipient(to.to_string()))?;
        let mut next_nonce = self.next_nonce.lock().await;
        let pending = self.pending_nonce().await?;
        // Transfers sent from elsewhere can move the pending count past the local counter.
        let nonce = (*next_nonce).map_or(pending, |local| local.max(pending));
        let gas_price = self.gas_price().await?;

        let request = TransactionRequest::new()
            .from(self.signer.address())
            .to(recipient)
            .value(amount)
            .gas(gas_limit)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id);
        let tx = TypedTransaction::Legacy(request);
        let signature = self
            .signer
            .sign_transaction_sync(&tx)
            .map_err(|err| TransferError::Signing(err.to_string()))?;
        let raw = format!("0x{}", hex::encode(tx.rlp_signed(&signature)));
        debug!("Signed transfer nonce={nonce} gas_price={gas_price}");

        let hash = match self.rpc.send_raw_transaction(&raw).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!("Node rejected transfer with nonce {nonce}; resyncing from pending count");
                *next_nonce = None;
                return Err(err.into());
            }
        };
        *next_nonce = Some(nonce + 1);
        drop(next_nonce);

        info!("Submitted {amount} wei to {to}: {hash}");
        Ok(hash)
    }
}
