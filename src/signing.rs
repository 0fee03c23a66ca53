//! Dual-signer coordination
//!
//! The final transaction needs two signatures: the user's (transfer
//! authority and fee source) and the relay's (fee payer). The states are
//! separate types and every transition consumes its input:
//!
//! `FinalTransaction` (unsigned) → `UserSignedTransaction` → `FullySignedTransaction`
//!
//! The message is frozen once the final transaction is compiled. Both
//! transitions check that the signer handed back the exact same message.

use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::sync::Arc;
use tracing::debug;

use crate::errors::TransferError;
use crate::relay::{PaymentQuote, RelayApi, SignTransactionRequest};
use crate::tx_builder::{decode_transaction, encode_transaction, FinalTransaction};
use crate::types::Checkpoint;
use crate::wallet::{WalletError, WalletSession};

/// Final transaction carrying the user's signature
#[derive(Debug, Clone)]
pub struct UserSignedTransaction {
    transaction: VersionedTransaction,
    user: Pubkey,
    checkpoint: Checkpoint,
    payment: PaymentQuote,
}

/// Final transaction carrying every required signature
#[derive(Debug, Clone)]
pub struct FullySignedTransaction {
    transaction: VersionedTransaction,
    checkpoint: Checkpoint,
    payment: PaymentQuote,
}

impl UserSignedTransaction {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }
}

impl FullySignedTransaction {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    /// Checkpoint the transaction was compiled against
    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn payment(&self) -> &PaymentQuote {
        &self.payment
    }

    /// First signature; the network identifies the transaction by it
    pub fn signature(&self) -> Option<&Signature> {
        self.transaction.signatures.first()
    }
}

/// Drives the two signing transitions
#[derive(Clone)]
pub struct DualSigner {
    relay: Arc<dyn RelayApi>,
}

impl DualSigner {
    pub fn new(relay: Arc<dyn RelayApi>) -> Self {
        Self { relay }
    }

    /// Unsigned → UserSigned: ask the connected wallet to sign
    pub async fn sign_as_user(
        &self,
        final_tx: FinalTransaction,
        session: &WalletSession,
    ) -> Result<UserSignedTransaction, TransferError> {
        let user = session
            .pubkey()
            .ok_or_else(|| TransferError::WalletUnsupported("no wallet connected".to_string()))?;
        let (unsigned, checkpoint, payment) = final_tx.into_parts();

        let signed = session
            .sign_transaction(unsigned.clone())
            .await
            .map_err(|e| match e {
                WalletError::Rejected(reason) => TransferError::WalletRejected(reason),
                WalletError::Unsupported(reason) => TransferError::WalletUnsupported(reason),
            })?;

        if signed.message != unsigned.message {
            return Err(TransferError::WalletRejected(
                "wallet returned a different transaction message".to_string(),
            ));
        }
        let user_index = signer_index(&signed, &user).ok_or_else(|| {
            TransferError::WalletUnsupported(format!("{} is not a signer of this transaction", user))
        })?;
        if !signature_verifies(&signed, user_index) {
            return Err(TransferError::WalletRejected(
                "wallet did not produce a valid signature".to_string(),
            ));
        }

        debug!(user = %user, "User signature attached");
        Ok(UserSignedTransaction {
            transaction: signed,
            user,
            checkpoint,
            payment,
        })
    }

    /// UserSigned → FullySigned: have the relay add the fee payer signature
    pub async fn co_sign(
        &self,
        user_signed: UserSignedTransaction,
        fee_payer_key: &str,
    ) -> Result<FullySignedTransaction, TransferError> {
        let request = SignTransactionRequest {
            transaction: encode_transaction(&user_signed.transaction)?,
            signer_key: fee_payer_key.to_string(),
        };
        let encoded = self
            .relay
            .sign_transaction(&request)
            .await
            .map_err(|e| TransferError::relay("co-sign", e))?;
        let transaction = decode_transaction(&encoded)?;

        if transaction.message != user_signed.transaction.message {
            return Err(TransferError::protocol(
                "relay returned a different transaction message",
            ));
        }
        let user_index = signer_index(&transaction, &user_signed.user);
        let user_sig_kept = user_index
            .map(|idx| transaction.signatures.get(idx) == user_signed.transaction.signatures.get(idx))
            .unwrap_or(false);
        if !user_sig_kept {
            return Err(TransferError::protocol("relay dropped the user signature"));
        }
        if !transaction.verify_with_results().iter().all(|ok| *ok) {
            return Err(TransferError::protocol(
                "co-signed transaction has missing or invalid signatures",
            ));
        }

        debug!(fee_payer = %fee_payer_key, "Relay signature attached");
        Ok(FullySignedTransaction {
            transaction,
            checkpoint: user_signed.checkpoint,
            payment: user_signed.payment,
        })
    }
}

/// Position of `key` among the required signers
fn signer_index(tx: &VersionedTransaction, key: &Pubkey) -> Option<usize> {
    let required = tx.message.header().num_required_signatures as usize;
    tx.message
        .static_account_keys()
        .iter()
        .take(required)
        .position(|candidate| candidate == key)
}

fn signature_verifies(tx: &VersionedTransaction, index: usize) -> bool {
    tx.verify_with_results().get(index).copied().unwrap_or(false)
}
