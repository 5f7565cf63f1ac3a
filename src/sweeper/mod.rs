//! Background purge of expired faucet records and audit entries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::faucet::store::FaucetStore;

pub struct ExpirySweeper {
    store: Arc<dyn FaucetStore>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn FaucetStore>, interval: Duration) -> Self {
        assert!(
            interval >= Duration::from_millis(10),
            "Sweep interval too short"
        );
        Self { store, interval }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Starting faucet expiry sweeper");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Sweeper shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting sweeper loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.interval) => {
                    self.tick().await;
                }
            }
        }
        Ok(())
    }

    /// Store failures are logged and retried on the next tick.
    async fn tick(&self) -> u64 {
        match self.store.purge_expired().await {
            Ok(0) => 0,
            Ok(purged) => {
                debug!("Purged {purged} expired faucet entries");
                purged
            }
            Err(err) => {
                warn!("Faucet expiry sweep failed: {err}");
                0
            }
        }
    }
}
