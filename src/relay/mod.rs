//! Fee relay collaborator
//!
//! The relay pays the network fee and is reimbursed in a secondary token.
//! This module holds:
//! - **instruction**: relay wire format (account roles, payload shapes)
//! - **client**: JSON-RPC client for a Kora-compatible relay
//! - **negotiator**: discovery and fee quoting on top of `RelayApi`

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod client;
pub mod instruction;
pub mod negotiator;

pub use client::KoraClient;
pub use instruction::{AccountRole, RelayAccount, RelayInstruction};
pub use negotiator::{FeeNegotiator, PaymentQuote, RelayTerms};

/// Errors produced by a relay transport
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Connection refused, DNS failure, timeout...
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON-RPC error object returned by the relay
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl RelayError {
    /// Transport-level retryability (never applied to quote or co-sign)
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Transport(_) => true,
            RelayError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            RelayError::JsonRpc { .. } => false,
            RelayError::Decode(_) => false,
        }
    }
}

/// `getPayerSigner` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerSigner {
    /// Fee payer address; also the key identifier for co-signing
    pub signer_address: String,
    /// Account that receives fee payments
    #[serde(default)]
    pub payment_address: Option<String>,
}

/// `getPaymentInstruction` parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstructionRequest {
    /// Base64 serialized draft transaction
    pub transaction: String,
    pub fee_token: String,
    /// Wallet that pays the fee
    pub source_wallet: String,
}

/// `getPaymentInstruction` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstructionResponse {
    pub payment_instruction: RelayInstruction,
    #[serde(deserialize_with = "deserialize_amount")]
    pub payment_amount: u64,
    #[serde(default)]
    pub payment_token: Option<String>,
}

/// `signTransaction` parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTransactionRequest {
    /// Base64 serialized user-signed transaction
    pub transaction: String,
    pub signer_key: String,
}

/// Trait for the relay operations used by the pipeline
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn get_payer_signer(&self) -> Result<PayerSigner, RelayError>;

    /// Accepted fee tokens, in relay preference order
    async fn get_supported_tokens(&self) -> Result<Vec<String>, RelayError>;

    /// Recent blockhash (base58) as seen by the relay
    async fn get_blockhash(&self) -> Result<String, RelayError>;

    async fn get_payment_instruction(
        &self,
        request: &PaymentInstructionRequest,
    ) -> Result<PaymentInstructionResponse, RelayError>;

    /// Returns the base64 fully-signed transaction
    async fn sign_transaction(&self, request: &SignTransactionRequest) -> Result<String, RelayError>;
}

/// Amounts arrive either as JSON numbers or as decimal strings
fn deserialize_amount<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(u64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Number(value) => Ok(value),
        Amount::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid payment amount '{}'", text))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payment_amount_accepts_number_and_string() {
        let base = |amount: serde_json::Value| {
            json!({
                "payment_instruction": {
                    "programAddress": "11111111111111111111111111111111",
                    "accounts": [],
                    "data": []
                },
                "payment_amount": amount,
            })
        };
        let numeric: PaymentInstructionResponse = serde_json::from_value(base(json!(5000))).unwrap();
        let text: PaymentInstructionResponse = serde_json::from_value(base(json!("5000"))).unwrap();
        assert_eq!(numeric.payment_amount, 5000);
        assert_eq!(text.payment_amount, 5000);
        assert!(serde_json::from_value::<PaymentInstructionResponse>(base(json!("-1"))).is_err());
    }

    #[test]
    fn test_relay_error_retryability() {
        assert!(RelayError::Transport("reset".into()).is_retryable());
        assert!(RelayError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(RelayError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!RelayError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!RelayError::JsonRpc { code: -32602, message: "bad".into() }.is_retryable());
    }
}
