//! Broadcast and confirmation
//!
//! ## Key Features
//! - Single broadcast with preflight; a refusal is reported verbatim
//! - Confirmation polling bounded by the checkpoint horizon, not wall time
//! - Transient polling errors are tolerated up to a configured streak

use anyhow::Context;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ConfirmationConfig;
use crate::errors::TransferError;
use crate::network::{ConfirmationStatus, NetworkApi};
use crate::signing::FullySignedTransaction;

/// Result of one successful status + height round
enum PollOutcome {
    Confirmed,
    Failed(String),
    Pending,
    HorizonPassed(u64),
}

/// Submits fully signed transactions and waits for confirmation
#[derive(Clone)]
pub struct Submitter {
    network: Arc<dyn NetworkApi>,
    confirmation: ConfirmationConfig,
}

impl Submitter {
    pub fn new(network: Arc<dyn NetworkApi>, confirmation: ConfirmationConfig) -> Self {
        Self {
            network,
            confirmation,
        }
    }

    /// Broadcast once, then poll until confirmed, failed or past the horizon
    ///
    /// `on_accepted` runs as soon as the network has accepted the
    /// transaction, before confirmation polling starts.
    pub async fn submit<F>(
        &self,
        tx: &FullySignedTransaction,
        on_accepted: F,
    ) -> Result<Signature, TransferError>
    where
        F: FnOnce(&Signature) + Send,
    {
        let signature = self
            .network
            .broadcast(tx.transaction())
            .await
            .map_err(|e| TransferError::BroadcastRejected(e.to_string()))?;
        debug!(signature = %signature, "Broadcast accepted");
        on_accepted(&signature);

        self.await_confirmation(signature, tx.checkpoint().last_valid_block_height)
            .await?;
        Ok(signature)
    }

    /// Poll the signature status at "confirmed" commitment
    ///
    /// `horizon` is the last valid block height of the checkpoint the
    /// transaction was compiled against. When absent it is read from the
    /// network once. A round only counts as successful when both the status
    /// and the block height were read; anything else extends the error
    /// streak.
    pub async fn await_confirmation(
        &self,
        signature: Signature,
        horizon: Option<u64>,
    ) -> Result<(), TransferError> {
        let last_valid_block_height = match horizon {
            Some(height) => height,
            None => self.fallback_horizon(signature).await?,
        };
        let timeout = || TransferError::ConfirmationTimeout {
            signature,
            last_valid_block_height,
        };

        let mut consecutive_errors = 0u32;
        loop {
            match self.poll_once(&signature, last_valid_block_height).await {
                Ok(PollOutcome::Confirmed) => return Ok(()),
                Ok(PollOutcome::Failed(reason)) => {
                    return Err(TransferError::TransactionFailed { signature, reason })
                }
                Ok(PollOutcome::HorizonPassed(height)) => {
                    debug!(
                        signature = %signature,
                        height,
                        last_valid_block_height,
                        "Checkpoint horizon passed"
                    );
                    return Err(timeout());
                }
                Ok(PollOutcome::Pending) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(signature = %signature, error = %e, consecutive_errors, "Confirmation poll failed");
                }
            }

            if consecutive_errors >= self.confirmation.max_consecutive_poll_errors {
                warn!(
                    signature = %signature,
                    last_valid_block_height,
                    "Abandoning confirmation polling before the horizon was observed"
                );
                return Err(timeout());
            }
            tokio::time::sleep(self.confirmation.poll_interval()).await;
        }
    }

    async fn poll_once(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> anyhow::Result<PollOutcome> {
        let status = self
            .network
            .signature_status(signature)
            .await
            .context("signature status query")?;
        match status {
            ConfirmationStatus::Confirmed => Ok(PollOutcome::Confirmed),
            ConfirmationStatus::Failed(reason) => Ok(PollOutcome::Failed(reason)),
            ConfirmationStatus::Pending => {
                let height = self
                    .network
                    .block_height()
                    .await
                    .context("block height query")?;
                if height > last_valid_block_height {
                    Ok(PollOutcome::HorizonPassed(height))
                } else {
                    Ok(PollOutcome::Pending)
                }
            }
        }
    }

    /// Horizon for a checkpoint that came without one
    ///
    /// Submitted but unobservable: without a bound the outcome is unknown,
    /// so polling is not attempted.
    async fn fallback_horizon(&self, signature: Signature) -> Result<u64, TransferError> {
        let unbounded = TransferError::ConfirmationTimeout {
            signature,
            last_valid_block_height: 0,
        };
        match self.network.latest_checkpoint().await {
            Ok(checkpoint) => match checkpoint.last_valid_block_height {
                Some(height) => Ok(height),
                None => {
                    warn!(signature = %signature, "Refetched checkpoint has no horizon");
                    Err(unbounded)
                }
            },
            Err(e) => {
                warn!(signature = %signature, error = %e, "Could not determine checkpoint horizon");
                Err(unbounded)
            }
        }
    }
}
