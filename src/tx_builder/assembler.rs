//! Transaction assembly
//!
//! Compiles an instruction plan plus a checkpoint into a v0 transaction
//! with the relay's fee payer as payer. Compilation happens twice per
//! transfer, and the two results are distinct types:
//! - `DraftTransaction`: user instructions only, sent to the relay for a quote
//! - `FinalTransaction`: user instructions followed by the payment instruction
//!
//! The payment instruction depends on the transaction it pays for, so the
//! draft exists only to break that cycle. It is never signed or submitted.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use solana_sdk::{
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

use super::instructions::{compute_budget_instructions, InstructionPlan};
use crate::config::ComputeBudgetConfig;
use crate::errors::TransferError;
use crate::relay::PaymentQuote;
use crate::types::{Address, Checkpoint};

/// Pure compiler from (payer, checkpoint, instructions) to an unsigned transaction
#[derive(Debug, Clone, Copy)]
pub struct TransactionAssembler {
    compute_budget: ComputeBudgetConfig,
}

/// Fee-estimation transaction, never submitted
#[derive(Debug, Clone)]
pub struct DraftTransaction {
    transaction: VersionedTransaction,
    instructions: Vec<Instruction>,
    checkpoint: Checkpoint,
}

/// Transaction that is signed and submitted: transfer and fee payment in one
#[derive(Debug, Clone)]
pub struct FinalTransaction {
    transaction: VersionedTransaction,
    instructions: Vec<Instruction>,
    checkpoint: Checkpoint,
    payment: PaymentQuote,
}

impl TransactionAssembler {
    pub fn new(compute_budget: ComputeBudgetConfig) -> Self {
        Self { compute_budget }
    }

    pub fn compute_budget(&self) -> &ComputeBudgetConfig {
        &self.compute_budget
    }

    /// Compile `instructions` behind the compute-budget pair
    ///
    /// Deterministic: identical inputs give byte-identical output. The
    /// returned transaction carries one default (empty) signature per
    /// required signer.
    pub fn compile(
        &self,
        payer: &Pubkey,
        checkpoint: &Checkpoint,
        instructions: &[Instruction],
    ) -> Result<(VersionedTransaction, Vec<Instruction>), TransferError> {
        let mut framed = Vec::with_capacity(instructions.len() + 2);
        framed.extend(compute_budget_instructions(&self.compute_budget));
        framed.extend_from_slice(instructions);

        let message = MessageV0::try_compile(payer, &framed, &[], checkpoint.blockhash)
            .map_err(|e| TransferError::TransactionCompile(e.to_string()))?;
        let required = message.header.num_required_signatures as usize;

        let transaction = VersionedTransaction {
            signatures: vec![Signature::default(); required],
            message: VersionedMessage::V0(message),
        };
        Ok((transaction, framed))
    }

    /// Compile the fee-estimation transaction
    pub fn draft(
        &self,
        fee_payer: &Address,
        checkpoint: Checkpoint,
        plan: &InstructionPlan,
    ) -> Result<DraftTransaction, TransferError> {
        let (transaction, instructions) = self.compile(fee_payer, &checkpoint, &plan.instructions)?;
        Ok(DraftTransaction {
            transaction,
            instructions,
            checkpoint,
        })
    }

    /// Compile the transaction that will be signed and submitted
    pub fn finalize(
        &self,
        fee_payer: &Address,
        checkpoint: Checkpoint,
        plan: &InstructionPlan,
        payment: PaymentQuote,
    ) -> Result<FinalTransaction, TransferError> {
        let mut user_and_payment = plan.instructions.clone();
        user_and_payment.push(payment.instruction.clone());

        let (transaction, instructions) = self.compile(fee_payer, &checkpoint, &user_and_payment)?;
        Ok(FinalTransaction {
            transaction,
            instructions,
            checkpoint,
            payment,
        })
    }
}

impl DraftTransaction {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    /// Compute-budget pair followed by user-intent instructions
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn to_base64(&self) -> Result<String, TransferError> {
        encode_transaction(&self.transaction)
    }
}

impl FinalTransaction {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.transaction
    }

    /// Compute-budget pair, user-intent instructions, payment instruction
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn payment(&self) -> &PaymentQuote {
        &self.payment
    }

    /// Account that pays the network fee (first static key)
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.transaction.message.static_account_keys().first()
    }

    pub(crate) fn into_parts(self) -> (VersionedTransaction, Checkpoint, PaymentQuote) {
        (self.transaction, self.checkpoint, self.payment)
    }
}

/// Serialize a transaction to the base64 wire form used by the relay
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, TransferError> {
    let bytes = bincode::serialize(tx)
        .map_err(|e| TransferError::TransactionCompile(format!("serialize: {}", e)))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Parse a base64 transaction received from the relay
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, TransferError> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| TransferError::protocol(format!("transaction is not base64: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| TransferError::protocol(format!("transaction does not deserialize: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::instructions::{plan_native_transfer, plan_token_transfer};
    use solana_sdk::{
        compute_budget::ComputeBudgetInstruction, hash::Hash, instruction::AccountMeta,
    };

    fn quote(payer: &Pubkey) -> PaymentQuote {
        PaymentQuote {
            instruction: Instruction::new_with_bytes(
                spl_token::id(),
                &[3, 10, 0, 0, 0, 0, 0, 0, 0],
                vec![
                    AccountMeta::new(Pubkey::new_unique(), false),
                    AccountMeta::new(Pubkey::new_unique(), false),
                    AccountMeta::new_readonly(*payer, true),
                ],
            ),
            amount: 10,
            token: Pubkey::new_unique().to_string(),
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        let assembler = TransactionAssembler::new(ComputeBudgetConfig::default());
        let fee_payer = Pubkey::new_unique();
        let plan = plan_native_transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 5);
        let checkpoint = Checkpoint::without_horizon(Hash::new_unique());

        let a = assembler.draft(&fee_payer, checkpoint, &plan).unwrap();
        let b = assembler.draft(&fee_payer, checkpoint, &plan).unwrap();
        assert_eq!(a.to_base64().unwrap(), b.to_base64().unwrap());
    }

    #[test]
    fn test_fee_payer_is_relay_not_sender() {
        let assembler = TransactionAssembler::new(ComputeBudgetConfig::default());
        let fee_payer = Pubkey::new_unique();
        let sender = Pubkey::new_unique();
        let plan = plan_native_transfer(&sender, &Pubkey::new_unique(), 5);

        let final_tx = assembler
            .finalize(&fee_payer, Checkpoint::new(Hash::new_unique(), 100), &plan, quote(&sender))
            .unwrap();

        assert_eq!(final_tx.fee_payer(), Some(&fee_payer));
        // Fee payer and sender both sign
        assert_eq!(final_tx.transaction().signatures.len(), 2);
        assert!(final_tx
            .transaction()
            .signatures
            .iter()
            .all(|sig| *sig == Signature::default()));
    }

    #[test]
    fn test_draft_and_final_share_framing() {
        let budget = ComputeBudgetConfig {
            unit_price_micro_lamports: 7,
            unit_limit: 300_000,
        };
        let assembler = TransactionAssembler::new(budget);
        let fee_payer = Pubkey::new_unique();
        let sender = Pubkey::new_unique();
        let plan =
            plan_token_transfer(&sender, &Pubkey::new_unique(), 2_500_000, &Pubkey::new_unique(), 6, false)
                .unwrap();

        let draft = assembler
            .draft(&fee_payer, Checkpoint::without_horizon(Hash::new_unique()), &plan)
            .unwrap();
        let payment = quote(&sender);
        let final_tx = assembler
            .finalize(&fee_payer, Checkpoint::new(Hash::new_unique(), 10), &plan, payment.clone())
            .unwrap();

        let final_ixs = final_tx.instructions();
        assert_eq!(draft.instructions(), &final_ixs[..final_ixs.len() - 1]);
        assert_eq!(final_ixs.last(), Some(&payment.instruction));
        assert_eq!(
            draft.instructions()[0],
            ComputeBudgetInstruction::set_compute_unit_price(7)
        );
        assert_eq!(
            draft.instructions()[1],
            ComputeBudgetInstruction::set_compute_unit_limit(300_000)
        );
        assert_ne!(
            draft.transaction().message.recent_blockhash(),
            final_tx.transaction().message.recent_blockhash()
        );
    }

    #[test]
    fn test_encode_decode_preserves_message() {
        let assembler = TransactionAssembler::new(ComputeBudgetConfig::default());
        let plan = plan_native_transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 5);
        let draft = assembler
            .draft(&Pubkey::new_unique(), Checkpoint::without_horizon(Hash::new_unique()), &plan)
            .unwrap();

        let decoded = decode_transaction(&draft.to_base64().unwrap()).unwrap();
        assert_eq!(&decoded, draft.transaction());
        assert!(matches!(
            decode_transaction("not base64!"),
            Err(TransferError::RelayProtocol(_))
        ));
    }
}
