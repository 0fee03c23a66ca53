//! Gasless transfer pipeline
//!
//! Single entry point for a relay-sponsored transfer. The flow is strictly
//! sequential, one remote call at a time:
//!
//! ```text
//! validate → discover → build → draft + quote → final + user sign → co-sign → submit
//! ```
//!
//! Nothing is retried here. Every failure aborts the attempt and is
//! returned as a `TransferError`; transfer and fee payment are a single
//! transaction, so there is never partial state to undo.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::errors::TransferError;
use crate::network::{NetworkApi, SolanaNetwork};
use crate::progress::{ProgressSink, TransferStep};
use crate::relay::{FeeNegotiator, KoraClient, RelayApi};
use crate::signing::DualSigner;
use crate::structured_logging::TransferLogger;
use crate::submitter::Submitter;
use crate::tx_builder::{build_transfer_instructions, sanity_check_ix_order, TransactionAssembler};
use crate::types::{TransferAsset, TransferReceipt, TransferRequest};
use crate::wallet::WalletSession;

/// Orchestrates negotiation, assembly, signing and submission
///
/// Holds no per-transfer state: concurrent `execute_transfer` calls are
/// independent. Callers must serialize transfers per sender if checkpoint
/// races matter to them.
#[derive(Clone)]
pub struct TransferPipeline {
    network: Arc<dyn NetworkApi>,
    negotiator: FeeNegotiator,
    assembler: TransactionAssembler,
    signer: DualSigner,
    submitter: Submitter,
}

impl TransferPipeline {
    pub fn new(config: &Config, network: Arc<dyn NetworkApi>, relay: Arc<dyn RelayApi>) -> Self {
        Self {
            negotiator: FeeNegotiator::new(Arc::clone(&relay)),
            assembler: TransactionAssembler::new(config.compute_budget),
            signer: DualSigner::new(relay),
            submitter: Submitter::new(Arc::clone(&network), config.confirmation),
            network,
        }
    }

    /// Build a pipeline talking to the configured RPC node and relay
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let network = SolanaNetwork::new(&config.network.rpc_url, config.network.timeout());
        let relay = KoraClient::new(
            &config.relay.url,
            config.relay.timeout(),
            config.relay.max_transport_retries,
        )?;
        Ok(Self::new(config, Arc::new(network), Arc::new(relay)))
    }

    /// Execute one gasless transfer
    ///
    /// `session` must have the sender's wallet connected. `progress` is
    /// notified at the start of each step and cannot influence the flow.
    ///
    /// A `ConfirmationTimeout` error means the transaction was accepted by
    /// the network and may still land; do not resubmit blindly.
    pub async fn execute_transfer(
        &self,
        request: &TransferRequest,
        session: &WalletSession,
        progress: &dyn ProgressSink,
    ) -> Result<TransferReceipt, TransferError> {
        let started = Instant::now();
        let logger = TransferLogger::new();
        logger.log_attempt(
            &request.sender.to_string(),
            &request.recipient,
            request.amount,
            asset_label(&request.asset),
        );

        let result = self.run(request, session, progress, &logger).await;

        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(receipt) => {
                logger.log_success(&receipt.signature.to_string(), elapsed);
                "confirmed"
            }
            Err(e) => {
                logger.log_failure(e, elapsed);
                e.category()
            }
        };
        metrics::counter!("gasless_transfers_total", "outcome" => outcome).increment(1);
        metrics::histogram!("gasless_transfer_duration_ms").record(elapsed.as_millis() as f64);

        result
    }

    async fn run(
        &self,
        request: &TransferRequest,
        session: &WalletSession,
        progress: &dyn ProgressSink,
        logger: &TransferLogger,
    ) -> Result<TransferReceipt, TransferError> {
        let step = |s: TransferStep| {
            let event = s.event();
            logger.log_step(event.step, event.total_steps, &event.message);
            progress.report(&event);
        };

        // 1. Local validation, no remote calls
        step(TransferStep::Initialize);
        let recipient = request.validate()?;
        match session.pubkey() {
            None => {
                return Err(TransferError::WalletUnsupported(
                    "no wallet connected".to_string(),
                ))
            }
            Some(connected) if connected != request.sender => {
                return Err(TransferError::invalid_input(format!(
                    "sender {} is not the connected wallet {}",
                    request.sender, connected
                )))
            }
            Some(_) => {}
        }

        // 2. Fee payer and fee token
        step(TransferStep::Discover);
        let terms = self.negotiator.discover().await?;
        let fee_token = terms.payment_token().to_string();

        // 3. User-intent instructions
        step(TransferStep::BuildInstructions);
        let plan = build_transfer_instructions(
            self.network.as_ref(),
            &request.sender,
            &recipient,
            request.amount,
            &request.asset,
        )
        .await?;
        let user_count = plan.instructions.len();

        // 4. Draft against the relay's checkpoint, then quote
        step(TransferStep::EstimateFee);
        let draft_checkpoint = self.negotiator.draft_checkpoint().await?;
        let draft = self.assembler.draft(&terms.fee_payer, draft_checkpoint, &plan)?;
        sanity_check_ix_order(draft.instructions(), user_count, false)?;
        let quote = self
            .negotiator
            .quote(&draft, &fee_token, &request.sender)
            .await?;
        logger.log_quote(&quote.token, quote.amount, plan.creates_recipient_account);

        // 5. Final transaction on a fresh checkpoint, signed by the user
        step(TransferStep::Sign);
        let final_checkpoint = self
            .network
            .latest_checkpoint()
            .await
            .map_err(|e| TransferError::NetworkUnavailable(e.to_string()))?;
        let final_tx = self
            .assembler
            .finalize(&terms.fee_payer, final_checkpoint, &plan, quote)?;
        sanity_check_ix_order(final_tx.instructions(), user_count, true)?;
        let user_signed = self.signer.sign_as_user(final_tx, session).await?;

        // 6. Relay co-sign, broadcast, confirm
        step(TransferStep::Submit);
        let fully_signed = self.signer.co_sign(user_signed, &terms.fee_payer_key).await?;
        let signature = self
            .submitter
            .submit(&fully_signed, |signature| {
                logger.log_submitted(&signature.to_string());
                step(TransferStep::AwaitConfirmation);
            })
            .await?;

        let payment = fully_signed.payment();
        Ok(TransferReceipt {
            signature,
            payment_amount: payment.amount,
            payment_token: payment.token.clone(),
        })
    }
}

fn asset_label(asset: &TransferAsset) -> &'static str {
    match asset {
        TransferAsset::Native => "native",
        TransferAsset::Token { .. } => "token",
    }
}
