//! Test Utilities Module
//!
//! In-memory doubles for the three collaborators of the pipeline: the
//! relay, the network node and the user's wallet. All of them are
//! deterministic, record what they were asked to do, and can be switched
//! into failure modes.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex as BlockingMutex};
use tokio::sync::Mutex;

use crate::network::{ConfirmationStatus, NetworkApi};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::relay::{
    PayerSigner, PaymentInstructionRequest, PaymentInstructionResponse, RelayApi, RelayError,
    RelayInstruction, SignTransactionRequest,
};
use crate::tx_builder::{decode_transaction, encode_transaction};
use crate::types::{Address, Checkpoint};
use crate::wallet::{sign_signer_slot, WalletError, WalletSigner};

/// Relay methods that can be switched into failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayMethod {
    PayerSigner,
    SupportedTokens,
    Blockhash,
    PaymentInstruction,
    SignTransaction,
}

/// How the mock relay answers a co-sign request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoSignMode {
    /// Sign the fee payer slot and return the transaction
    Sign,
    /// Return the transaction untouched
    SkipSignature,
    /// Sign a different message
    Tamper,
    /// Sign, but blank out every other signature
    DropUserSignature,
}

/// In-memory relay with a real fee payer keypair
///
/// Payment instructions are SPL token transfers from the source wallet's
/// fee-token account to the relay's payment account, so the final
/// transaction needs the source wallet's signature.
#[derive(Clone)]
pub struct MockRelay {
    fee_payer: Arc<Keypair>,
    /// Owner of the accounts receiving fee payments
    pub payment_owner: Pubkey,
    tokens: Arc<Mutex<Vec<String>>>,
    blockhash: Hash,
    payment_amount: u64,
    failing: Arc<Mutex<HashSet<RelayMethod>>>,
    co_sign_mode: Arc<Mutex<CoSignMode>>,
    quote_requests: Arc<Mutex<Vec<PaymentInstructionRequest>>>,
    co_sign_requests: Arc<Mutex<Vec<SignTransactionRequest>>>,
}

impl MockRelay {
    /// Relay accepting one freshly generated fee token
    pub fn new() -> Self {
        Self {
            fee_payer: Arc::new(Keypair::new()),
            payment_owner: Pubkey::new_unique(),
            tokens: Arc::new(Mutex::new(vec![Pubkey::new_unique().to_string()])),
            blockhash: Hash::new_unique(),
            payment_amount: 5_000,
            failing: Arc::new(Mutex::new(HashSet::new())),
            co_sign_mode: Arc::new(Mutex::new(CoSignMode::Sign)),
            quote_requests: Arc::new(Mutex::new(Vec::new())),
            co_sign_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.tokens = Arc::new(Mutex::new(tokens));
        self
    }

    pub fn with_payment_amount(mut self, amount: u64) -> Self {
        self.payment_amount = amount;
        self
    }

    pub fn fee_payer(&self) -> Pubkey {
        self.fee_payer.pubkey()
    }

    pub fn payment_amount(&self) -> u64 {
        self.payment_amount
    }

    pub fn blockhash(&self) -> Hash {
        self.blockhash
    }

    /// First accepted token
    pub async fn fee_token(&self) -> Option<String> {
        self.tokens.lock().await.first().cloned()
    }

    /// Make every call to `method` fail with a transport error
    pub async fn fail(&self, method: RelayMethod) {
        self.failing.lock().await.insert(method);
    }

    pub async fn set_co_sign_mode(&self, mode: CoSignMode) {
        *self.co_sign_mode.lock().await = mode;
    }

    /// Draft transactions received for quoting
    pub async fn drafts(&self) -> Vec<VersionedTransaction> {
        self.quote_requests
            .lock()
            .await
            .iter()
            .filter_map(|req| decode_transaction(&req.transaction).ok())
            .collect()
    }

    pub async fn quote_requests(&self) -> Vec<PaymentInstructionRequest> {
        self.quote_requests.lock().await.clone()
    }

    pub async fn co_sign_requests(&self) -> Vec<SignTransactionRequest> {
        self.co_sign_requests.lock().await.clone()
    }

    /// Payment instruction the relay hands out for `source_wallet`
    pub fn payment_instruction_for(
        &self,
        source_wallet: &Pubkey,
        fee_token: &Pubkey,
    ) -> Result<RelayInstruction, RelayError> {
        let ix = spl_token::instruction::transfer(
            &spl_token::id(),
            &get_associated_token_address(source_wallet, fee_token),
            &get_associated_token_address(&self.payment_owner, fee_token),
            source_wallet,
            &[],
            self.payment_amount,
        )
        .map_err(|e| RelayError::JsonRpc {
            code: -32603,
            message: e.to_string(),
        })?;
        Ok(RelayInstruction::from_instruction(&ix))
    }

    async fn check(&self, method: RelayMethod) -> Result<(), RelayError> {
        if self.failing.lock().await.contains(&method) {
            return Err(RelayError::Transport(format!("{:?} unavailable", method)));
        }
        Ok(())
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(e: impl ToString) -> RelayError {
    RelayError::JsonRpc {
        code: -32602,
        message: e.to_string(),
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn get_payer_signer(&self) -> Result<PayerSigner, RelayError> {
        self.check(RelayMethod::PayerSigner).await?;
        Ok(PayerSigner {
            signer_address: self.fee_payer.pubkey().to_string(),
            payment_address: Some(self.payment_owner.to_string()),
        })
    }

    async fn get_supported_tokens(&self) -> Result<Vec<String>, RelayError> {
        self.check(RelayMethod::SupportedTokens).await?;
        Ok(self.tokens.lock().await.clone())
    }

    async fn get_blockhash(&self) -> Result<String, RelayError> {
        self.check(RelayMethod::Blockhash).await?;
        Ok(self.blockhash.to_string())
    }

    async fn get_payment_instruction(
        &self,
        request: &PaymentInstructionRequest,
    ) -> Result<PaymentInstructionResponse, RelayError> {
        self.check(RelayMethod::PaymentInstruction).await?;
        self.quote_requests.lock().await.push(request.clone());

        decode_transaction(&request.transaction).map_err(decode_error)?;
        let source: Pubkey = request.source_wallet.parse().map_err(decode_error)?;
        let mint: Pubkey = request.fee_token.parse().map_err(decode_error)?;

        Ok(PaymentInstructionResponse {
            payment_instruction: self.payment_instruction_for(&source, &mint)?,
            payment_amount: self.payment_amount,
            payment_token: Some(request.fee_token.clone()),
        })
    }

    async fn sign_transaction(&self, request: &SignTransactionRequest) -> Result<String, RelayError> {
        self.check(RelayMethod::SignTransaction).await?;
        self.co_sign_requests.lock().await.push(request.clone());

        let mut tx = decode_transaction(&request.transaction).map_err(decode_error)?;
        let mode = *self.co_sign_mode.lock().await;
        match mode {
            CoSignMode::Sign => {}
            CoSignMode::SkipSignature => {
                return encode_transaction(&tx).map_err(decode_error);
            }
            CoSignMode::Tamper => change_blockhash(&mut tx),
            CoSignMode::DropUserSignature => {
                for sig in tx.signatures.iter_mut() {
                    *sig = Signature::default();
                }
            }
        }
        sign_signer_slot(&mut tx, &self.fee_payer).map_err(decode_error)?;
        encode_transaction(&tx).map_err(decode_error)
    }
}

/// Replace the recent blockhash, invalidating existing signatures
pub fn change_blockhash(tx: &mut VersionedTransaction) {
    match &mut tx.message {
        VersionedMessage::V0(message) => message.recent_blockhash = Hash::new_unique(),
        VersionedMessage::Legacy(message) => message.recent_blockhash = Hash::new_unique(),
    }
}

/// In-memory network node
#[derive(Clone)]
pub struct MockNetwork {
    checkpoint: Arc<Mutex<Option<Checkpoint>>>,
    existing_accounts: Arc<Mutex<HashSet<Pubkey>>>,
    fail_account_queries: Arc<Mutex<bool>>,
    fail_block_height: Arc<Mutex<bool>>,
    broadcast_error: Arc<Mutex<Option<String>>>,
    statuses: Arc<Mutex<VecDeque<anyhow::Result<ConfirmationStatus>>>>,
    status_polls: Arc<Mutex<usize>>,
    block_height: Arc<Mutex<u64>>,
    /// Added to the block height after every height query
    block_height_step: u64,
    broadcasts: Arc<Mutex<Vec<VersionedTransaction>>>,
    account_queries: Arc<Mutex<Vec<Pubkey>>>,
}

impl MockNetwork {
    /// Healthy node: checkpoint horizon 150 blocks ahead, every signature
    /// confirms on the first poll
    pub fn new() -> Self {
        Self {
            checkpoint: Arc::new(Mutex::new(Some(Checkpoint::new(Hash::new_unique(), 1_150)))),
            existing_accounts: Arc::new(Mutex::new(HashSet::new())),
            fail_account_queries: Arc::new(Mutex::new(false)),
            fail_block_height: Arc::new(Mutex::new(false)),
            broadcast_error: Arc::new(Mutex::new(None)),
            statuses: Arc::new(Mutex::new(VecDeque::new())),
            status_polls: Arc::new(Mutex::new(0)),
            block_height: Arc::new(Mutex::new(1_000)),
            block_height_step: 0,
            broadcasts: Arc::new(Mutex::new(Vec::new())),
            account_queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Block height advances by `step` per query
    pub fn with_block_height_step(mut self, step: u64) -> Self {
        self.block_height_step = step;
        self
    }

    pub async fn set_checkpoint(&self, checkpoint: Option<Checkpoint>) {
        *self.checkpoint.lock().await = checkpoint;
    }

    pub async fn checkpoint(&self) -> Option<Checkpoint> {
        *self.checkpoint.lock().await
    }

    pub async fn add_account(&self, address: Pubkey) {
        self.existing_accounts.lock().await.insert(address);
    }

    pub async fn fail_account_queries(&self) {
        *self.fail_account_queries.lock().await = true;
    }

    /// Every block height query fails as if rate limited
    pub async fn fail_block_height(&self) {
        *self.fail_block_height.lock().await = true;
    }

    pub async fn reject_broadcasts(&self, reason: &str) {
        *self.broadcast_error.lock().await = Some(reason.to_string());
    }

    /// Queue status answers; the last queued answer repeats
    /// (every poll reports `Confirmed` if nothing was ever queued)
    pub async fn push_status(&self, status: anyhow::Result<ConfirmationStatus>) {
        self.statuses.lock().await.push_back(status);
    }

    /// Every poll reports `Pending`
    pub async fn never_confirm(&self) {
        self.push_status(Ok(ConfirmationStatus::Pending)).await;
    }

    /// Number of signature status queries served so far
    pub async fn status_polls(&self) -> usize {
        *self.status_polls.lock().await
    }

    pub async fn broadcasts(&self) -> Vec<VersionedTransaction> {
        self.broadcasts.lock().await.clone()
    }

    pub async fn account_queries(&self) -> Vec<Pubkey> {
        self.account_queries.lock().await.clone()
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkApi for MockNetwork {
    async fn latest_checkpoint(&self) -> anyhow::Result<Checkpoint> {
        self.checkpoint()
            .await
            .ok_or_else(|| anyhow::anyhow!("node is behind"))
    }

    async fn account_exists(&self, address: &Address) -> anyhow::Result<bool> {
        self.account_queries.lock().await.push(*address);
        if *self.fail_account_queries.lock().await {
            anyhow::bail!("connection reset while fetching {}", address);
        }
        Ok(self.existing_accounts.lock().await.contains(address))
    }

    async fn broadcast(&self, tx: &VersionedTransaction) -> anyhow::Result<Signature> {
        if let Some(reason) = self.broadcast_error.lock().await.clone() {
            anyhow::bail!(reason);
        }
        self.broadcasts.lock().await.push(tx.clone());
        tx.signatures
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("transaction has no signatures"))
    }

    async fn signature_status(&self, _signature: &Signature) -> anyhow::Result<ConfirmationStatus> {
        *self.status_polls.lock().await += 1;
        let mut statuses = self.statuses.lock().await;
        match statuses.len() {
            0 => Ok(ConfirmationStatus::Confirmed),
            1 => match statuses.front() {
                Some(Ok(status)) => Ok(status.clone()),
                Some(Err(e)) => Err(anyhow::anyhow!(e.to_string())),
                None => Ok(ConfirmationStatus::Confirmed),
            },
            _ => statuses
                .pop_front()
                .unwrap_or(Ok(ConfirmationStatus::Confirmed)),
        }
    }

    async fn block_height(&self) -> anyhow::Result<u64> {
        if *self.fail_block_height.lock().await {
            anyhow::bail!("HTTP status client error (429 Too Many Requests)");
        }
        let mut height = self.block_height.lock().await;
        let current = *height;
        *height += self.block_height_step;
        Ok(current)
    }
}

/// How the mock wallet answers a signing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletMode {
    Sign,
    Reject,
    Unsupported,
    /// Sign a different message
    Tamper,
}

/// Wallet double backed by a real keypair
pub struct MockWallet {
    keypair: Keypair,
    mode: Mutex<WalletMode>,
    sign_count: Mutex<usize>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self::with_mode(WalletMode::Sign)
    }

    pub fn with_mode(mode: WalletMode) -> Self {
        Self {
            keypair: Keypair::new(),
            mode: Mutex::new(mode),
            sign_count: Mutex::new(0),
        }
    }

    pub async fn set_mode(&self, mode: WalletMode) {
        *self.mode.lock().await = mode;
    }

    pub async fn sign_count(&self) -> usize {
        *self.sign_count.lock().await
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn sign_transaction(
        &self,
        mut tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, WalletError> {
        *self.sign_count.lock().await += 1;
        let mode = *self.mode.lock().await;
        match mode {
            WalletMode::Sign => {}
            WalletMode::Reject => {
                return Err(WalletError::Rejected("User rejected the request.".to_string()))
            }
            WalletMode::Unsupported => {
                return Err(WalletError::Unsupported(
                    "versioned transactions are not supported".to_string(),
                ))
            }
            WalletMode::Tamper => change_blockhash(&mut tx),
        }
        sign_signer_slot(&mut tx, &self.keypair)?;
        Ok(tx)
    }
}

/// Progress sink that keeps every event
#[derive(Debug, Default)]
pub struct ProgressRecorder {
    events: BlockingMutex<Vec<ProgressEvent>>,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<u8> {
        self.events.lock().unwrap().iter().map(|e| e.step).collect()
    }
}

impl ProgressSink for ProgressRecorder {
    fn report(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
