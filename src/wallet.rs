//! Wallet capability and session
//!
//! Wallet discovery and connection UX live outside this crate. The
//! pipeline only needs a `WalletSigner`: something that knows its address
//! and can sign a transaction, possibly after waiting on the user.

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Failure reported by a wallet signer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    /// The user declined, or the wallet refused on their behalf
    #[error("signing rejected: {0}")]
    Rejected(String),

    /// The wallet cannot sign this transaction shape
    #[error("signing unsupported: {0}")]
    Unsupported(String),
}

/// External signing capability
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address whose signature the wallet produces
    fn pubkey(&self) -> Pubkey;

    /// Human-readable wallet name for logs
    fn name(&self) -> &str {
        "wallet"
    }

    /// Sign `tx` in the wallet's signer slot. May wait indefinitely on the user.
    async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, WalletError>;
}

/// Place `keypair`'s signature into its required-signer slot
pub fn sign_signer_slot(tx: &mut VersionedTransaction, keypair: &Keypair) -> Result<(), WalletError> {
    let pubkey = keypair.pubkey();
    let required = tx.message.header().num_required_signatures as usize;
    let index = tx
        .message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|key| *key == pubkey)
        .ok_or_else(|| {
            WalletError::Unsupported(format!("{} is not a required signer", pubkey))
        })?;

    if tx.signatures.len() != required {
        return Err(WalletError::Unsupported(format!(
            "transaction has {} signature slots, message requires {}",
            tx.signatures.len(),
            required
        )));
    }

    tx.signatures[index] = keypair.sign_message(&tx.message.serialize());
    Ok(())
}

/// Wallet backed by a local keypair
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
}

impl KeypairWallet {
    /// Create a new wallet from a keypair file (JSON array or raw 64 bytes)
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        use anyhow::Context;

        let keypair_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {}", path))?;

        let raw: Vec<u8> = if keypair_bytes.len() == 64 {
            keypair_bytes
        } else {
            serde_json::from_slice(&keypair_bytes).context("Failed to parse keypair JSON")?
        };
        if raw.len() != 64 {
            anyhow::bail!("Invalid keypair length: expected 64 bytes, got {}", raw.len());
        }
        if raw.iter().all(|&b| b == 0) {
            anyhow::bail!("Invalid keypair: all-zero key rejected");
        }
        let keypair = Keypair::try_from(raw.as_slice()).context("Invalid keypair bytes")?;

        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn name(&self) -> &str {
        "keypair"
    }

    async fn sign_transaction(
        &self,
        mut tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, WalletError> {
        sign_signer_slot(&mut tx, &self.keypair)?;
        Ok(tx)
    }
}

/// Connected-wallet state for one caller
///
/// Passed explicitly to the pipeline, so independent sessions (one per
/// user, one per test) never share a wallet.
#[derive(Default)]
pub struct WalletSession {
    signer: Option<Arc<dyn WalletSigner>>,
}

impl WalletSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session with `signer` already connected
    pub fn connected(signer: Arc<dyn WalletSigner>) -> Self {
        let mut session = Self::new();
        session.connect(signer);
        session
    }

    /// Connect a wallet, replacing any previous one. Returns its address.
    pub fn connect(&mut self, signer: Arc<dyn WalletSigner>) -> Pubkey {
        if let Some(previous) = self.signer.take() {
            info!(wallet = previous.name(), "Disconnecting previous wallet");
        }
        let pubkey = signer.pubkey();
        info!(wallet = signer.name(), pubkey = %pubkey, "Wallet connected");
        self.signer = Some(signer);
        pubkey
    }

    pub fn disconnect(&mut self) {
        if let Some(signer) = self.signer.take() {
            info!(wallet = signer.name(), "Wallet disconnected");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.signer.is_some()
    }

    pub fn pubkey(&self) -> Option<Pubkey> {
        self.signer.as_ref().map(|signer| signer.pubkey())
    }

    /// Sign with the connected wallet
    pub async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, WalletError> {
        match &self.signer {
            Some(signer) => signer.sign_transaction(tx).await,
            None => Err(WalletError::Unsupported("no wallet connected".to_string())),
        }
    }
}
