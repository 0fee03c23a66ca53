//! Gasless Solana transfers through a fee relay
//!
//! The user signs a transfer plus a token payment to the relay; the relay
//! pays the network fee and co-signs as fee payer. Everything lands in one
//! atomic transaction.
//!
//! ## Key Features
//! - Draft/final two-phase compilation so the relay quotes the exact
//!   instruction shape that executes
//! - Typestate dual signing (`FinalTransaction` → `UserSignedTransaction`
//!   → `FullySignedTransaction`)
//! - Confirmation bounded by the checkpoint horizon, with an explicit
//!   "unconfirmed" outcome distinct from failure
//! - Collaborators behind traits (`RelayApi`, `NetworkApi`, `WalletSigner`)

pub mod config;
pub mod errors;
pub mod network;
pub mod pipeline;
pub mod progress;
pub mod relay;
pub mod signing;
pub mod structured_logging;
pub mod submitter;
pub mod test_utils;
pub mod tx_builder;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod tests {
    // Include test modules
    mod dual_signer_tests;
    mod negotiator_tests;
    mod pipeline_scenario_tests;
    mod submitter_tests;
    mod test_helpers;
}

pub use config::Config;
pub use errors::TransferError;
pub use pipeline::TransferPipeline;
pub use progress::{NoProgress, ProgressEvent, ProgressSink, TransferStep};
pub use types::{parse_ui_amount, Address, TransferAsset, TransferReceipt, TransferRequest};
pub use wallet::{KeypairWallet, WalletSession, WalletSigner};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
