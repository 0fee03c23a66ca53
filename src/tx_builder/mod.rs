//! Transaction builder
//!
//! ## Architecture
//!
//! - **instructions**: user-intent instruction planning (native or token
//!   transfer, optional recipient account creation) and compute-budget framing
//! - **assembler**: compilation into draft and final v0 transactions, plus
//!   the base64 wire encoding shared with the relay
//!
//! ## Instruction layout
//!
//! Every compiled transaction has the same shape:
//! 1. `set_compute_unit_price`
//! 2. `set_compute_unit_limit`
//! 3. User-intent instructions
//! 4. Relay payment instruction (final transaction only)

pub mod assembler;
pub mod instructions;

pub use assembler::{
    decode_transaction, encode_transaction, DraftTransaction, FinalTransaction,
    TransactionAssembler,
};
pub use instructions::{
    build_transfer_instructions, compute_budget_instructions, plan_native_transfer,
    plan_token_transfer, sanity_check_ix_order, InstructionPlan,
};
