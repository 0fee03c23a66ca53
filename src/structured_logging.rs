//! Structured logging and transfer context
//!
//! Every transfer attempt gets a correlation id; all events emitted through
//! `TransferLogger` carry it so one attempt can be followed across relay,
//! wallet and network calls.

use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::errors::TransferError;

/// Initialize the logging subsystem
///
/// `RUST_LOG` wins over the verbosity flag. Calling this twice is an error
/// from the subscriber, returned rather than panicking.
pub fn init_logging(verbose: bool, json: bool) -> anyhow::Result<()> {
    let env_filter = if verbose {
        "gasless_transfer=debug,info"
    } else {
        "gasless_transfer=info,warn"
    };

    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_target(true));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(text_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Structured logger for a single transfer attempt
#[derive(Debug, Clone)]
pub struct TransferLogger {
    context_id: String,
}

impl TransferLogger {
    pub fn new() -> Self {
        Self {
            context_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_context_id(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn log_step(&self, step: u8, total: u8, message: &str) {
        tracing::debug!(
            context_id = %self.context_id,
            step = %step,
            total = %total,
            "{}",
            message
        );
    }

    pub fn log_attempt(&self, sender: &str, recipient: &str, amount: u64, asset: &str) {
        tracing::info!(
            context_id = %self.context_id,
            sender = %sender,
            recipient = %recipient,
            amount = %amount,
            asset = %asset,
            "Attempting gasless transfer"
        );
    }

    pub fn log_quote(&self, fee_token: &str, fee_amount: u64, creates_account: bool) {
        tracing::info!(
            context_id = %self.context_id,
            fee_token = %fee_token,
            fee_amount = %fee_amount,
            creates_account = %creates_account,
            "Relay fee quoted"
        );
    }

    pub fn log_submitted(&self, signature: &str) {
        tracing::info!(
            context_id = %self.context_id,
            signature = %signature,
            "Transaction submitted"
        );
    }

    pub fn log_success(&self, signature: &str, elapsed: Duration) {
        tracing::info!(
            context_id = %self.context_id,
            signature = %signature,
            latency_ms = %elapsed.as_millis(),
            "Gasless transfer confirmed"
        );
    }

    pub fn log_failure(&self, error: &TransferError, elapsed: Duration) {
        let signature = error.signature().map(|s| s.to_string());
        if error.is_ambiguous() {
            tracing::warn!(
                context_id = %self.context_id,
                category = %error.category(),
                signature = ?signature,
                latency_ms = %elapsed.as_millis(),
                error = %error,
                "Gasless transfer outcome unknown"
            );
        } else {
            tracing::warn!(
                context_id = %self.context_id,
                category = %error.category(),
                signature = ?signature,
                latency_ms = %elapsed.as_millis(),
                error = %error,
                "Gasless transfer failed"
            );
        }
    }
}

impl Default for TransferLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_ids_are_unique() {
        let a = TransferLogger::new();
        let b = TransferLogger::new();
        assert_ne!(a.context_id(), b.context_id());
        assert!(Uuid::parse_str(a.context_id()).is_ok());
    }

    #[test]
    fn test_explicit_context_id() {
        let logger = TransferLogger::with_context_id("attempt-1");
        assert_eq!(logger.context_id(), "attempt-1");
        // Logging without a subscriber is a no-op
        logger.log_failure(&TransferError::NoAcceptedTokens, Duration::from_millis(3));
    }
}
