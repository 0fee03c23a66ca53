//! Error types for the gasless transfer pipeline
//!
//! Every stage of the pipeline converts collaborator failures into one
//! `TransferError` variant at its boundary. The variants are designed to be:
//! - Distinguishable: the caller can tell relay, wallet, broadcast and
//!   confirmation failures apart without parsing messages
//! - Honest about ambiguity: `ConfirmationTimeout` is never a definite failure
//! - Observable: `category()` gives a static label for logs and metrics

use solana_sdk::signature::Signature;
use thiserror::Error;

/// Comprehensive error type for a single transfer attempt
///
/// No variant implies that anything was rolled back: transfer and fee
/// payment live in one transaction, so the only committed external effect
/// is a confirmed transaction.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Malformed recipient, zero amount or an unusable amount string.
    ///
    /// Always raised before any remote call is made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The relay could not be reached or answered with an error
    ///
    /// `operation` names the relay call (discover, quote, co-sign, ...)
    #[error("Relay unavailable during {operation}: {reason}")]
    RelayUnavailable {
        /// Relay operation that failed
        operation: &'static str,
        /// Detailed reason for the failure
        reason: String,
    },

    /// The relay reported an empty list of accepted fee tokens
    #[error("Relay accepts no fee tokens")]
    NoAcceptedTokens,

    /// The relay answered, but the answer could not be used
    ///
    /// This includes:
    /// - Unparseable addresses or base64 payloads
    /// - A co-signed transaction whose message differs from the one sent
    /// - Missing or invalid signatures after co-signing
    #[error("Relay protocol error: {0}")]
    RelayProtocol(String),

    /// The recipient token account existence check did not produce a
    /// definite answer. Never treated as "absent".
    #[error("Account query failed for {account}: {reason}")]
    AccountQueryFailed {
        /// Account that was queried
        account: String,
        /// Detailed reason for the failure
        reason: String,
    },

    /// The network node could not provide a fresh checkpoint
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Instruction list could not be compiled into a message
    #[error("Transaction compile error: {0}")]
    TransactionCompile(String),

    /// The user (or the wallet on the user's behalf) refused to sign
    #[error("Wallet rejected signing: {0}")]
    WalletRejected(String),

    /// No wallet connected, or the wallet cannot sign this transaction shape
    #[error("Wallet unsupported: {0}")]
    WalletUnsupported(String),

    /// The network refused the transaction at submission (preflight
    /// simulation failure, insufficient balance, ...). Reported verbatim.
    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    /// The transaction landed but execution failed on-chain
    #[error("Transaction {signature} failed: {reason}")]
    TransactionFailed {
        /// Network-assigned signature of the failed transaction
        signature: Signature,
        /// On-chain error
        reason: String,
    },

    /// Accepted by the network but not confirmed. The transaction may
    /// still land.
    ///
    /// Raised when the block height passed the horizon, and also when
    /// polling was abandoned after too many consecutive query failures.
    /// `last_valid_block_height` is the polling bound, not an observed
    /// height; it is 0 when no bound could be determined.
    #[error(
        "Transaction {signature} confirmation unknown (polling bound: block height {last_valid_block_height})"
    )]
    ConfirmationTimeout {
        /// Network-assigned signature of the submitted transaction
        signature: Signature,
        /// Validity horizon used as the polling bound (0 if unknown)
        last_valid_block_height: u64,
    },
}

impl TransferError {
    /// Check whether calling `execute_transfer` again might succeed
    ///
    /// The pipeline never retries on its own; this is a hint for the caller.
    /// `ConfirmationTimeout` is not retryable: resubmitting could pay twice.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Transient failures that may succeed on retry
            Self::RelayUnavailable { .. } => true,
            Self::AccountQueryFailed { .. } => true,
            Self::NetworkUnavailable(_) => true,
            Self::BroadcastRejected(msg) => {
                // Stale blockhash is transient, balance problems are not
                let msg = msg.to_lowercase();
                msg.contains("blockhash not found") || msg.contains("block height exceeded")
            }

            // Non-retryable failures
            Self::InvalidInput(_) => false,
            Self::NoAcceptedTokens => false,
            Self::RelayProtocol(_) => false,
            Self::TransactionCompile(_) => false,
            Self::WalletRejected(_) => false,
            Self::WalletUnsupported(_) => false,
            Self::TransactionFailed { .. } => false,
            Self::ConfirmationTimeout { .. } => false,
        }
    }

    /// True only when the outcome on-chain is unknown
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout { .. })
    }

    /// Signature of the submitted transaction, if submission happened
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::TransactionFailed { signature, .. } => Some(signature),
            Self::ConfirmationTimeout { signature, .. } => Some(signature),
            _ => None,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "input",
            Self::RelayUnavailable { .. } => "relay",
            Self::NoAcceptedTokens => "fee_token",
            Self::RelayProtocol(_) => "relay_protocol",
            Self::AccountQueryFailed { .. } => "account_query",
            Self::NetworkUnavailable(_) => "network",
            Self::TransactionCompile(_) => "compile",
            Self::WalletRejected(_) => "wallet_rejected",
            Self::WalletUnsupported(_) => "wallet_unsupported",
            Self::BroadcastRejected(_) => "broadcast",
            Self::TransactionFailed { .. } => "on_chain",
            Self::ConfirmationTimeout { .. } => "unconfirmed",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransferError {
    /// Create a relay failure for a named operation
    pub fn relay(operation: &'static str, reason: impl ToString) -> Self {
        Self::RelayUnavailable {
            operation,
            reason: reason.to_string(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Create a relay protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::RelayProtocol(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransferError::relay("discover", "connection refused");
        assert_eq!(
            err.to_string(),
            "Relay unavailable during discover: connection refused"
        );

        let err = TransferError::ConfirmationTimeout {
            signature: Signature::default(),
            last_valid_block_height: 42,
        };
        assert!(err.to_string().contains("confirmation unknown"));
        assert!(err.to_string().contains("polling bound: block height 42"));
    }

    #[test]
    fn test_error_retryability() {
        assert!(TransferError::relay("quote", "503").is_retryable());
        assert!(TransferError::NetworkUnavailable("timeout".into()).is_retryable());
        assert!(TransferError::BroadcastRejected("Blockhash not found".into()).is_retryable());

        assert!(!TransferError::BroadcastRejected("insufficient funds".into()).is_retryable());
        assert!(!TransferError::NoAcceptedTokens.is_retryable());
        assert!(!TransferError::WalletRejected("user declined".into()).is_retryable());
        assert!(!TransferError::ConfirmationTimeout {
            signature: Signature::default(),
            last_valid_block_height: 1,
        }
        .is_retryable());
    }

    #[test]
    fn test_only_timeout_is_ambiguous() {
        let timeout = TransferError::ConfirmationTimeout {
            signature: Signature::default(),
            last_valid_block_height: 1,
        };
        assert!(timeout.is_ambiguous());
        assert!(timeout.signature().is_some());

        let rejected = TransferError::BroadcastRejected("simulation failed".into());
        assert!(!rejected.is_ambiguous());
        assert!(rejected.signature().is_none());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(TransferError::NoAcceptedTokens.category(), "fee_token");
        assert_eq!(
            TransferError::WalletUnsupported("no wallet".into()).category(),
            "wallet_unsupported"
        );
        assert_eq!(
            TransferError::BroadcastRejected("x".into()).category(),
            "broadcast"
        );
    }
}
