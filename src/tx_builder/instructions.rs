//! Instruction planning and ordering validation
//!
//! This module builds the user-intent instructions for a transfer and the
//! compute-budget framing shared by the draft and final transactions:
//! 1. Compute budget instructions (unit price, unit limit)
//! 2. User-intent instructions (optional account creation, transfer)
//! 3. Relay payment instruction (final transaction only)

use solana_sdk::{
    compute_budget::{self, ComputeBudgetInstruction},
    instruction::Instruction,
    pubkey::Pubkey,
    system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};
use tracing::debug;

use crate::config::ComputeBudgetConfig;
use crate::errors::TransferError;
use crate::network::NetworkApi;
use crate::types::{Address, TransferAsset};

/// Ordered user-intent instructions for one transfer
///
/// Carries no checkpoint and no fee payer: the same plan is compiled into
/// both the draft and the final transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPlan {
    /// The ordered list of user-intent instructions
    pub instructions: Vec<Instruction>,

    /// Whether the first instruction creates the recipient's token account
    pub creates_recipient_account: bool,
}

impl InstructionPlan {
    pub fn new(instructions: Vec<Instruction>, creates_recipient_account: bool) -> Self {
        Self {
            instructions,
            creates_recipient_account,
        }
    }
}

/// Compute-budget pair prepended to every compiled transaction
///
/// Price first, limit second. Draft and final use the same pair so the
/// relay's estimate matches what executes.
pub fn compute_budget_instructions(budget: &ComputeBudgetConfig) -> [Instruction; 2] {
    [
        ComputeBudgetInstruction::set_compute_unit_price(budget.unit_price_micro_lamports),
        ComputeBudgetInstruction::set_compute_unit_limit(budget.unit_limit),
    ]
}

/// Plan a native-currency transfer: exactly one system transfer
pub fn plan_native_transfer(sender: &Address, recipient: &Address, lamports: u64) -> InstructionPlan {
    InstructionPlan::new(
        vec![system_instruction::transfer(sender, recipient, lamports)],
        false,
    )
}

/// Plan an SPL token transfer between associated token accounts
///
/// When `recipient_account_exists` is false, an account-creation
/// instruction funded by the sender is placed first.
pub fn plan_token_transfer(
    sender: &Address,
    recipient: &Address,
    amount: u64,
    mint: &Pubkey,
    decimals: u8,
    recipient_account_exists: bool,
) -> Result<InstructionPlan, TransferError> {
    let source = get_associated_token_address(sender, mint);
    let destination = get_associated_token_address(recipient, mint);

    let mut instructions = Vec::with_capacity(2);
    if !recipient_account_exists {
        instructions.push(create_associated_token_account(
            sender,
            recipient,
            mint,
            &spl_token::id(),
        ));
    }

    let transfer_ix = spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &source,
        mint,
        &destination,
        sender,
        &[],
        amount,
        decimals,
    )
    .map_err(|e| TransferError::invalid_input(format!("token transfer instruction: {}", e)))?;
    instructions.push(transfer_ix);

    Ok(InstructionPlan::new(instructions, !recipient_account_exists))
}

/// Build the user-intent instructions for a transfer
///
/// For token transfers this performs the pipeline's only conditional
/// branch: a lookup of the recipient's associated token account. A failed
/// lookup is `AccountQueryFailed`, never an implicit "create".
pub async fn build_transfer_instructions(
    network: &dyn NetworkApi,
    sender: &Address,
    recipient: &Address,
    amount: u64,
    asset: &TransferAsset,
) -> Result<InstructionPlan, TransferError> {
    match asset {
        TransferAsset::Native => Ok(plan_native_transfer(sender, recipient, amount)),
        TransferAsset::Token { mint, decimals } => {
            let destination = get_associated_token_address(recipient, mint);
            let exists = network.account_exists(&destination).await.map_err(|e| {
                TransferError::AccountQueryFailed {
                    account: destination.to_string(),
                    reason: e.to_string(),
                }
            })?;
            debug!(
                account = %destination,
                exists,
                "Recipient token account lookup"
            );
            plan_token_transfer(sender, recipient, amount, mint, *decimals, exists)
        }
    }
}

/// Validate the layout of a compiled instruction list
///
/// Expected order:
/// 1. `set_compute_unit_price`
/// 2. `set_compute_unit_limit`
/// 3. `user_count` user-intent instructions (none of them compute budget)
/// 4. Exactly one payment instruction when `has_payment`
pub fn sanity_check_ix_order(
    instructions: &[Instruction],
    user_count: usize,
    has_payment: bool,
) -> Result<(), TransferError> {
    let expected = 2 + user_count + usize::from(has_payment);
    if instructions.len() != expected {
        return Err(TransferError::TransactionCompile(format!(
            "expected {} instructions, got {}",
            expected,
            instructions.len()
        )));
    }

    // set_compute_unit_price has discriminator 3, set_compute_unit_limit 2
    let is_budget = |ix: &Instruction, tag: u8| {
        ix.program_id == compute_budget::id() && ix.data.first() == Some(&tag)
    };
    if !is_budget(&instructions[0], 3) || !is_budget(&instructions[1], 2) {
        return Err(TransferError::TransactionCompile(
            "transaction must start with compute unit price then limit".to_string(),
        ));
    }

    if let Some(idx) = instructions[2..]
        .iter()
        .position(|ix| ix.program_id == compute_budget::id())
    {
        return Err(TransferError::TransactionCompile(format!(
            "unexpected compute budget instruction at position {}",
            idx + 2
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{instruction::AccountMeta, system_program};

    #[test]
    fn test_native_plan_is_single_transfer() {
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();

        let plan = plan_native_transfer(&sender, &recipient, 42);

        assert!(!plan.creates_recipient_account);
        assert_eq!(plan.instructions.len(), 1);
        assert_eq!(plan.instructions[0].program_id, system_program::id());
        assert_eq!(plan.instructions[0].accounts[0], AccountMeta::new(sender, true));
        assert_eq!(plan.instructions[0].accounts[1], AccountMeta::new(recipient, false));
    }

    #[test]
    fn test_token_plan_creates_missing_account_first() {
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let plan = plan_token_transfer(&sender, &recipient, 2_500_000, &mint, 6, false)
            .expect("Should plan token transfer");

        assert!(plan.creates_recipient_account);
        assert_eq!(plan.instructions.len(), 2);

        let create = &plan.instructions[0];
        assert_eq!(create.program_id, spl_associated_token_account::id());
        // Funding account is the sender, as signer and writable
        assert_eq!(create.accounts[0], AccountMeta::new(sender, true));
        assert_eq!(
            create.accounts[1].pubkey,
            get_associated_token_address(&recipient, &mint)
        );

        let transfer = &plan.instructions[1];
        assert_eq!(transfer.program_id, spl_token::id());
        assert_eq!(transfer.accounts[3], AccountMeta::new_readonly(sender, true));
    }

    #[test]
    fn test_token_plan_skips_existing_account() {
        let sender = Pubkey::new_unique();
        let recipient = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let plan = plan_token_transfer(&sender, &recipient, 1, &mint, 6, true).unwrap();

        assert!(!plan.creates_recipient_account);
        assert_eq!(plan.instructions.len(), 1);
        assert_eq!(plan.instructions[0].program_id, spl_token::id());
    }

    #[test]
    fn test_compute_budget_order() {
        let budget = ComputeBudgetConfig::default();
        let [price, limit] = compute_budget_instructions(&budget);
        assert_eq!(
            price,
            ComputeBudgetInstruction::set_compute_unit_price(1_000_000)
        );
        assert_eq!(limit, ComputeBudgetInstruction::set_compute_unit_limit(200_000));
    }

    #[test]
    fn test_sanity_check_valid_final_layout() {
        let budget = ComputeBudgetConfig::default();
        let sender = Pubkey::new_unique();
        let mut instructions = compute_budget_instructions(&budget).to_vec();
        instructions.push(system_instruction::transfer(&sender, &Pubkey::new_unique(), 1));
        instructions.push(Instruction::new_with_bytes(
            spl_token::id(),
            &[3],
            vec![AccountMeta::new(sender, true)],
        ));

        assert!(sanity_check_ix_order(&instructions, 1, true).is_ok());
        assert!(sanity_check_ix_order(&instructions[..3], 1, false).is_ok());
    }

    #[test]
    fn test_sanity_check_rejects_missing_budget() {
        let sender = Pubkey::new_unique();
        let instructions = vec![system_instruction::transfer(&sender, &Pubkey::new_unique(), 1)];
        assert!(sanity_check_ix_order(&instructions, 1, false).is_err());
    }

    #[test]
    fn test_sanity_check_rejects_swapped_budget() {
        let budget = ComputeBudgetConfig::default();
        let [price, limit] = compute_budget_instructions(&budget);
        let sender = Pubkey::new_unique();
        let instructions = vec![
            limit,
            price,
            system_instruction::transfer(&sender, &Pubkey::new_unique(), 1),
        ];

        let result = sanity_check_ix_order(&instructions, 1, false);
        if let Err(TransferError::TransactionCompile(msg)) = result {
            assert!(msg.contains("price then limit"));
        } else {
            panic!("Expected TransactionCompile error");
        }
    }
}
