//! Testnet faucet: one verified native-token disbursement per address per cooldown window.

pub mod database;
pub mod limiter;
pub mod store;
pub mod wallet;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use ethers::types::U256;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::captcha::{HumanVerifier, VerificationProof};
use crate::config::FaucetConfig;
use crate::explorer::normalize::parse_wei;
use crate::explorer::query::canonical_address;
use crate::rpc::{ChainRpc, GatewayError};

use self::limiter::{Eligibility, RateLimiter};
use self::store::{FaucetRecord, FaucetStore, StoreError};
use self::wallet::{TransferError, TransferWallet};

pub const DEFAULT_HISTORY_LIMIT: u64 = 20;
pub const MAX_HISTORY_LIMIT: u64 = 100;
/// Writes of the cooldown record after a completed transfer
const RECORD_WRITE_ATTEMPTS: u32 = 2;

#[derive(Debug, Error)]
pub enum FaucetError {
    #[error("invalid address: {0}")]
    Validation(String),
    #[error("human verification failed")]
    Verification,
    #[error("address already funded, next eligible at {next_eligible_at}")]
    RateLimited {
        remaining: Duration,
        next_eligible_at: DateTime<Utc>,
    },
    #[error("faucet transfer failed: {0}")]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disbursement {
    pub tx_hash: String,
    pub recipient: String,
    /// Wei, decimal
    pub amount: String,
    pub next_eligible_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityReport {
    pub address: String,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_eligible_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_seconds: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetStatus {
    pub faucet_address: String,
    pub balance: String,
    pub amount: String,
    pub gas_limit: u64,
    pub cooldown_hours: i64,
    pub drips_available: String,
    pub status: &'static str,
}

pub struct Faucet {
    store: Arc<dyn FaucetStore>,
    wallet: Arc<dyn TransferWallet>,
    verifier: Arc<dyn HumanVerifier>,
    rpc: Arc<dyn ChainRpc>,
    limiter: RateLimiter,
    amount: U256,
    gas_limit: u64,
    reservation_ttl: Duration,
    log_retention: Duration,
}

impl Faucet {
    pub fn new(
        store: Arc<dyn FaucetStore>,
        wallet: Arc<dyn TransferWallet>,
        verifier: Arc<dyn HumanVerifier>,
        rpc: Arc<dyn ChainRpc>,
        config: &FaucetConfig,
    ) -> Result<Self> {
        Ok(Self {
            store,
            wallet,
            verifier,
            rpc,
            limiter: RateLimiter::default(),
            amount: config.amount()?,
            gas_limit: config.gas_limit,
            reservation_ttl: config.reservation_ttl(),
            log_retention: config.log_retention(),
        })
    }

    pub fn store(&self) -> &Arc<dyn FaucetStore> {
        &self.store
    }

    pub async fn disburse(
        &self,
        address: &str,
        proof: &VerificationProof,
    ) -> Result<Disbursement, FaucetError> {
        self.disburse_at(address, proof, Utc::now()).await
    }

    async fn disburse_at(
        &self,
        address: &str,
        proof: &VerificationProof,
        now: DateTime<Utc>,
    ) -> Result<Disbursement, FaucetError> {
        let address = canonical_address(address)
            .ok_or_else(|| FaucetError::Validation(address.trim().to_string()))?;

        let last = self.store.get(&address).await?;
        if let Eligibility::Cooling {
            remaining,
            next_eligible_at,
        } = self.limiter.check(last.as_ref(), now)
        {
            debug!("Faucet request for {address} while cooling");
            return Err(FaucetError::RateLimited {
                remaining,
                next_eligible_at,
            });
        }

        if !self.verifier.verify(proof).await {
            return Err(FaucetError::Verification);
        }

        let mut record = FaucetRecord {
            address: address.clone(),
            timestamp: now,
            tx_hash: None,
            amount: self.amount.to_string(),
        };
        if !self.store.put_if_vacant(&record, self.reservation_ttl).await? {
            debug!("Lost reservation race for {address}");
            return Err(FaucetError::RateLimited {
                remaining: self.limiter.window(),
                next_eligible_at: now + self.limiter.window(),
            });
        }

        let tx_hash = match self
            .wallet
            .send_native(&address, self.amount, self.gas_limit)
            .await
        {
            Ok(hash) => hash,
            Err(err) => {
                if let Err(store_err) = self.store.remove(&address).await {
                    warn!("Failed to release reservation for {address}: {store_err}");
                }
                return Err(err.into());
            }
        };

        // The transfer is already on its way; persistence failures must not turn it into an error.
        record.tx_hash = Some(tx_hash.clone());
        self.persist_record(&record).await;
        if let Err(err) = self.store.append_log(&record, self.log_retention).await {
            warn!("Failed to append faucet audit entry for {address}: {err}");
        }

        info!("Faucet sent {} wei to {address}: {tx_hash}", self.amount);
        Ok(Disbursement {
            tx_hash,
            recipient: address,
            amount: self.amount.to_string(),
            next_eligible_at: now + self.limiter.window(),
        })
    }

    /// Replaces the reservation with the full-window record. Without it only the short
    /// reservation TTL would block the address.
    async fn persist_record(&self, record: &FaucetRecord) {
        for attempt in 1..=RECORD_WRITE_ATTEMPTS {
            match self
                .store
                .put_with_expiry(record, self.limiter.window())
                .await
            {
                Ok(()) => return,
                Err(err) => warn!(
                    "Failed to persist faucet record for {} (attempt {attempt}): {err}",
                    record.address
                ),
            }
        }
        error!(
            "Faucet record for {} not persisted; address unblocks when its reservation expires",
            record.address
        );
    }

    pub async fn eligibility(&self, address: &str) -> Result<EligibilityReport, FaucetError> {
        let address = canonical_address(address)
            .ok_or_else(|| FaucetError::Validation(address.trim().to_string()))?;
        let last = self.store.get(&address).await?;
        if last.as_ref().is_some_and(|record| record.tx_hash.is_none()) {
            return Ok(EligibilityReport {
                address,
                eligible: false,
                next_eligible_at: None,
                wait_seconds: None,
                message: "A faucet request for this address is in progress".to_string(),
            });
        }

        let eligibility = self.limiter.check(last.as_ref(), Utc::now());
        let eligible = eligibility.is_eligible();
        let report = match eligibility {
            Eligibility::Eligible => EligibilityReport {
                address,
                eligible,
                next_eligible_at: None,
                wait_seconds: None,
                message: "Address is eligible for faucet funds".to_string(),
            },
            Eligibility::Cooling {
                remaining,
                next_eligible_at,
            } => EligibilityReport {
                address,
                eligible,
                next_eligible_at: Some(next_eligible_at),
                wait_seconds: Some(remaining.num_seconds().max(1)),
                message: format!(
                    "Address was funded recently, try again in {}h {}m",
                    remaining.num_hours(),
                    remaining.num_minutes() % 60
                ),
            },
        };
        Ok(report)
    }

    pub async fn status(&self) -> Result<FaucetStatus, FaucetError> {
        let faucet_address = self.wallet.address();
        let raw = self.rpc.balance(&faucet_address).await?;
        let raw = raw
            .as_str()
            .ok_or_else(|| GatewayError::malformed("eth_getBalance", format!("got {raw}")))?;
        let balance = parse_wei(raw, "eth_getBalance")?;
        let drips = balance / self.amount;
        Ok(FaucetStatus {
            faucet_address,
            balance: balance.to_string(),
            amount: self.amount.to_string(),
            gas_limit: self.gas_limit,
            cooldown_hours: self.limiter.window().num_hours(),
            drips_available: drips.to_string(),
            status: if drips.is_zero() { "depleted" } else { "active" },
        })
    }

    pub async fn history(&self, limit: Option<u64>) -> Result<Vec<FaucetRecord>, FaucetError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.store.recent_log(limit).await?)
    }
}
