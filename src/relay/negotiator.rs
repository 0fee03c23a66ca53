//! Fee negotiation with the relay
//!
//! Discovery tells us who pays the network fee and which tokens the relay
//! accepts; quoting turns a draft transaction into a payment instruction.
//! Neither operation retries: any relay failure aborts the transfer.

use solana_sdk::{hash::Hash, instruction::Instruction};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::{PaymentInstructionRequest, RelayApi};
use crate::errors::TransferError;
use crate::tx_builder::DraftTransaction;
use crate::types::{parse_address, Address, Checkpoint};

/// What the relay offers for this transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTerms {
    /// Relay fee payer; payer of every compiled transaction
    pub fee_payer: Address,
    /// Key identifier passed back to the relay when co-signing
    pub fee_payer_key: String,
    /// Accepted fee tokens in relay order, never empty
    pub accepted_tokens: Vec<String>,
}

impl RelayTerms {
    /// Fee token used for payment
    ///
    /// Always the first accepted token; there is no caller choice yet.
    pub fn payment_token(&self) -> &str {
        // accepted_tokens is non-empty by construction in `discover`
        self.accepted_tokens.first().map(String::as_str).unwrap_or_default()
    }
}

/// Payment instruction sized for a draft transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentQuote {
    pub instruction: Instruction,
    /// Fee amount in the fee token's smallest unit
    pub amount: u64,
    /// Fee token mint
    pub token: String,
}

/// Discovery and quoting on top of a `RelayApi`
#[derive(Clone)]
pub struct FeeNegotiator {
    relay: Arc<dyn RelayApi>,
}

impl FeeNegotiator {
    pub fn new(relay: Arc<dyn RelayApi>) -> Self {
        Self { relay }
    }

    /// Learn the fee payer and the accepted fee tokens
    pub async fn discover(&self) -> Result<RelayTerms, TransferError> {
        let signer = self
            .relay
            .get_payer_signer()
            .await
            .map_err(|e| TransferError::relay("discover fee payer", e))?;
        let fee_payer = parse_address(&signer.signer_address).map_err(|_| {
            TransferError::protocol(format!(
                "relay fee payer '{}' is not a valid address",
                signer.signer_address
            ))
        })?;

        let accepted_tokens = self
            .relay
            .get_supported_tokens()
            .await
            .map_err(|e| TransferError::relay("discover fee tokens", e))?;
        if accepted_tokens.is_empty() {
            return Err(TransferError::NoAcceptedTokens);
        }

        debug!(
            fee_payer = %fee_payer,
            tokens = accepted_tokens.len(),
            "Discovered relay terms"
        );
        Ok(RelayTerms {
            fee_payer,
            fee_payer_key: signer.signer_address,
            accepted_tokens,
        })
    }

    /// Checkpoint for the draft transaction, as seen by the relay
    pub async fn draft_checkpoint(&self) -> Result<Checkpoint, TransferError> {
        let raw = self
            .relay
            .get_blockhash()
            .await
            .map_err(|e| TransferError::relay("fetch blockhash", e))?;
        let blockhash = Hash::from_str(&raw)
            .map_err(|e| TransferError::protocol(format!("relay blockhash '{}': {}", raw, e)))?;
        Ok(Checkpoint::without_horizon(blockhash))
    }

    /// Ask the relay for a payment instruction covering `draft`
    ///
    /// `draft` must be compiled with the relay's fee payer and the same
    /// compute-budget pair the final transaction will carry.
    pub async fn quote(
        &self,
        draft: &DraftTransaction,
        fee_token: &str,
        source_wallet: &Address,
    ) -> Result<PaymentQuote, TransferError> {
        let request = PaymentInstructionRequest {
            transaction: draft.to_base64()?,
            fee_token: fee_token.to_string(),
            source_wallet: source_wallet.to_string(),
        };

        let response = self
            .relay
            .get_payment_instruction(&request)
            .await
            .map_err(|e| TransferError::relay("quote payment", e))?;
        let instruction = response.payment_instruction.to_instruction()?;

        debug!(
            amount = response.payment_amount,
            token = %fee_token,
            program = %instruction.program_id,
            "Received payment instruction"
        );
        Ok(PaymentQuote {
            instruction,
            amount: response.payment_amount,
            token: response.payment_token.unwrap_or_else(|| fee_token.to_string()),
        })
    }
}
