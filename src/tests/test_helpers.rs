//! Test Helper Utilities
//!
//! Shared fixtures for the scenario tests:
//! - `Harness`: pipeline wired to in-memory relay, network and wallet
//! - Fast confirmation config (1ms polls)
//! - Decompilation of compiled transactions back into (program, accounts, data)

#[cfg(test)]
pub mod test_helpers {
    use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
    use std::sync::Arc;

    use crate::config::{ComputeBudgetConfig, Config};
    use crate::pipeline::TransferPipeline;
    use crate::relay::PaymentQuote;
    use crate::test_utils::{MockNetwork, MockRelay, MockWallet};
    use crate::tx_builder::{plan_native_transfer, FinalTransaction, TransactionAssembler};
    use crate::types::{Checkpoint, TransferAsset, TransferRequest};
    use crate::wallet::{WalletSession, WalletSigner};

    /// Config with a short poll interval and a small error streak
    pub fn test_config() -> Config {
        let mut config = Config::default();
        config.confirmation.poll_interval_ms = 1;
        config.confirmation.max_consecutive_poll_errors = 3;
        config
    }

    /// Instruction as it appears in a compiled transaction
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct DecodedInstruction {
        pub program_id: Pubkey,
        pub accounts: Vec<Pubkey>,
        pub data: Vec<u8>,
    }

    /// Resolve account indices of every instruction (static keys only)
    pub fn decompile(tx: &VersionedTransaction) -> Vec<DecodedInstruction> {
        let keys = tx.message.static_account_keys();
        tx.message
            .instructions()
            .iter()
            .map(|ix| DecodedInstruction {
                program_id: keys[ix.program_id_index as usize],
                accounts: ix.accounts.iter().map(|i| keys[*i as usize]).collect(),
                data: ix.data.clone(),
            })
            .collect()
    }

    /// Unsigned final transaction: native transfer from `sender` plus the
    /// relay's payment instruction
    pub fn final_transaction(
        relay: &MockRelay,
        sender: &Pubkey,
        checkpoint: Checkpoint,
    ) -> FinalTransaction {
        let mint = Pubkey::new_unique();
        let instruction = relay
            .payment_instruction_for(sender, &mint)
            .expect("Should build payment")
            .to_instruction()
            .expect("Should convert payment");
        let quote = PaymentQuote {
            instruction,
            amount: relay.payment_amount(),
            token: mint.to_string(),
        };
        let plan = plan_native_transfer(sender, &Pubkey::new_unique(), 1_000);

        TransactionAssembler::new(ComputeBudgetConfig::default())
            .finalize(&relay.fee_payer(), checkpoint, &plan, quote)
            .expect("Should compile final transaction")
    }

    /// Pipeline plus handles on every double
    pub struct Harness {
        pub relay: Arc<MockRelay>,
        pub network: Arc<MockNetwork>,
        pub wallet: Arc<MockWallet>,
        pub session: WalletSession,
        pub pipeline: TransferPipeline,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_parts(MockRelay::new(), MockNetwork::new(), MockWallet::new())
        }

        pub fn with_parts(relay: MockRelay, network: MockNetwork, wallet: MockWallet) -> Self {
            let relay = Arc::new(relay);
            let network = Arc::new(network);
            let wallet = Arc::new(wallet);
            let pipeline = TransferPipeline::new(&test_config(), network.clone(), relay.clone());
            let session = WalletSession::connected(wallet.clone());
            Self {
                relay,
                network,
                wallet,
                session,
                pipeline,
            }
        }

        pub fn sender(&self) -> Pubkey {
            self.wallet.pubkey()
        }

        pub fn native_request(&self, recipient: &Pubkey, lamports: u64) -> TransferRequest {
            TransferRequest::new(
                self.sender(),
                recipient.to_string(),
                lamports,
                TransferAsset::Native,
            )
        }

        /// Transfer of a fresh 6-decimal token
        pub fn token_request(&self, recipient: &Pubkey, amount: u64) -> (TransferRequest, Pubkey) {
            let mint = Pubkey::new_unique();
            let request = TransferRequest::new(
                self.sender(),
                recipient.to_string(),
                amount,
                TransferAsset::spl_token(mint, 6),
            );
            (request, mint)
        }
    }
}
