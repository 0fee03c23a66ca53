//! Network RPC collaborator
//!
//! The pipeline only needs five calls from the network node. They are
//! expressed as the `NetworkApi` trait so the pipeline can run against
//! `SolanaNetwork` (nonblocking `RpcClient`) or an in-memory double.

use async_trait::async_trait;
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_config::RpcSendTransactionConfig};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::time::Duration;
use tracing::debug;

use crate::types::{Address, Checkpoint};

/// Observed state of a submitted signature at "confirmed" commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Unknown to the node or below the confirmed commitment level
    Pending,
    /// Confirmed without error
    Confirmed,
    /// Confirmed with an on-chain execution error
    Failed(String),
}

/// Trait for the network node operations used by the pipeline
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Latest blockhash together with its last valid block height
    async fn latest_checkpoint(&self) -> anyhow::Result<Checkpoint>;

    /// `Ok(false)` only for a confirmed absence; transport and node
    /// failures are errors.
    async fn account_exists(&self, address: &Address) -> anyhow::Result<bool>;

    /// Submit raw transaction bytes with preflight enabled
    async fn broadcast(&self, tx: &VersionedTransaction) -> anyhow::Result<Signature>;

    async fn signature_status(&self, signature: &Signature) -> anyhow::Result<ConfirmationStatus>;

    /// Current block height at "confirmed" commitment
    async fn block_height(&self) -> anyhow::Result<u64>;
}

/// `NetworkApi` backed by a Solana JSON-RPC node
pub struct SolanaNetwork {
    rpc: RpcClient,
    endpoint: String,
}

impl SolanaNetwork {
    pub fn new(rpc_url: &str, timeout: Duration) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(
                rpc_url.to_string(),
                timeout,
                CommitmentConfig::confirmed(),
            ),
            endpoint: rpc_url.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NetworkApi for SolanaNetwork {
    async fn latest_checkpoint(&self) -> anyhow::Result<Checkpoint> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await?;
        debug!(endpoint = %self.endpoint, blockhash = %blockhash, last_valid_block_height, "Fetched checkpoint");
        Ok(Checkpoint::new(blockhash, last_valid_block_height))
    }

    async fn account_exists(&self, address: &Address) -> anyhow::Result<bool> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value.is_some())
    }

    async fn broadcast(&self, tx: &VersionedTransaction) -> anyhow::Result<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self.rpc.send_transaction_with_config(tx, config).await?;
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> anyhow::Result<ConfirmationStatus> {
        let response = self.rpc.get_signature_statuses(&[*signature]).await?;
        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(ConfirmationStatus::Pending),
        };

        if !status.satisfies_commitment(CommitmentConfig::confirmed()) {
            return Ok(ConfirmationStatus::Pending);
        }
        Ok(match status.err {
            Some(err) => ConfirmationStatus::Failed(err.to_string()),
            None => ConfirmationStatus::Confirmed,
        })
    }

    async fn block_height(&self) -> anyhow::Result<u64> {
        let height = self
            .rpc
            .get_block_height_with_commitment(CommitmentConfig::confirmed())
            .await?;
        Ok(height)
    }
}
