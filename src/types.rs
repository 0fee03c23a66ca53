//! Common types used throughout the pipeline

use serde::{Deserialize, Serialize};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature};
use std::str::FromStr;

use crate::errors::TransferError;

/// Account identifier on the network (32 opaque bytes, byte-equality)
pub type Address = Pubkey;

/// Parse a base58 address, mapping failure to `InvalidInput`
pub fn parse_address(raw: &str) -> Result<Address, TransferError> {
    Pubkey::from_str(raw.trim())
        .map_err(|e| TransferError::invalid_input(format!("invalid address '{}': {}", raw, e)))
}

/// Asset moved by a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferAsset {
    /// Native currency, amount in lamports
    Native,
    /// SPL token, amount in the mint's smallest unit
    Token {
        /// Token mint
        mint: Pubkey,
        /// Mint decimals (checked on-chain by `transfer_checked`)
        decimals: u8,
    },
}

impl TransferAsset {
    /// SPL Token asset
    pub fn spl_token(mint: Pubkey, decimals: u8) -> Self {
        Self::Token { mint, decimals }
    }
}

/// Raw user intent, validated by the pipeline before any remote call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Connected wallet address (signs the transfer, pays the relay fee)
    pub sender: Address,
    /// Recipient address as typed by the user
    pub recipient: String,
    /// Amount already expressed in the asset's smallest unit
    pub amount: u64,
    /// What is being transferred
    pub asset: TransferAsset,
}

impl TransferRequest {
    pub fn new(sender: Address, recipient: impl Into<String>, amount: u64, asset: TransferAsset) -> Self {
        Self {
            sender,
            recipient: recipient.into(),
            amount,
            asset,
        }
    }

    /// Check the request and resolve the recipient address
    pub fn validate(&self) -> Result<Address, TransferError> {
        if self.amount == 0 {
            return Err(TransferError::invalid_input("amount must be positive"));
        }
        parse_address(&self.recipient)
    }
}

/// Recent network checkpoint (blockhash) plus its validity horizon
///
/// The horizon is unknown when the checkpoint came from the relay, which
/// only reports the blockhash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub blockhash: Hash,
    pub last_valid_block_height: Option<u64>,
}

impl Checkpoint {
    pub fn new(blockhash: Hash, last_valid_block_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_block_height: Some(last_valid_block_height),
        }
    }

    /// Checkpoint without a known horizon
    pub fn without_horizon(blockhash: Hash) -> Self {
        Self {
            blockhash,
            last_valid_block_height: None,
        }
    }
}

/// Successful transfer outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Network-assigned transaction signature
    pub signature: Signature,
    /// Fee paid to the relay, in the fee token's smallest unit
    pub payment_amount: u64,
    /// Fee token mint (as reported by the relay)
    pub payment_token: String,
}

/// Convert a decimal amount string into the asset's smallest unit
///
/// Exact integer arithmetic: "2.5" with 6 decimals is 2_500_000. Excess
/// fractional digits are rejected rather than truncated.
pub fn parse_ui_amount(raw: &str, decimals: u8) -> Result<u64, TransferError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TransferError::invalid_input("amount is empty"));
    }
    if raw.starts_with('-') {
        return Err(TransferError::invalid_input("amount must be positive"));
    }

    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(TransferError::invalid_input(format!("malformed amount '{}'", raw)));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(TransferError::invalid_input(format!("malformed amount '{}'", raw)));
    }
    if frac.len() > decimals as usize {
        return Err(TransferError::invalid_input(format!(
            "amount '{}' has more than {} decimal places",
            raw, decimals
        )));
    }

    let overflow = || TransferError::invalid_input(format!("amount '{}' is too large", raw));
    let scale = 10u64.checked_pow(decimals as u32).ok_or_else(overflow)?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| overflow())?
    };
    let frac_units = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse::<u64>().map_err(|_| overflow())?
    };

    let units = whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(overflow)?;
    if units == 0 {
        return Err(TransferError::invalid_input("amount must be positive"));
    }
    Ok(units)
}
