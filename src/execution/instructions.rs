// Instruction builders for the programs the jobs talk to.

use crate::error::{AppError, AppResult};
use sha2::{Digest, Sha256};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use spl_token_2022_interface::{
    extension::{transfer_fee::TransferFeeAmount, BaseStateWithExtensions, StateWithExtensions},
    state::Account as TokenAccount,
};

pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::from_str_const("11111111111111111111111111111111");

/// Token program the managed mint lives under
pub fn token_2022_program_id() -> Pubkey {
    spl_token_2022_interface::id()
}

/// Wrapped SOL mint, the swap target
pub fn native_mint() -> Pubkey {
    spl_token::native_mint::id()
}

pub fn set_compute_unit_price(micro_lamports: u64) -> Instruction {
    ComputeBudgetInstruction::set_compute_unit_price(micro_lamports)
}

/// First 8 bytes of `sha256("global:<name>")`
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("global:{}", name).as_bytes());
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&hash[..8]);
    discriminator
}

/// `distribute_by_percentage(total_amount, percentages)` on the payout
/// program. Each recipient receives `total_amount * bps / 10_000` from the
/// funding account; recipients are passed as remaining accounts in the same
/// order as `basis_points`.
pub fn distribute_by_percentage(
    program_id: &Pubkey,
    funding_account: &Pubkey,
    recipients: &[Pubkey],
    total_amount: u64,
    basis_points: &[u32],
) -> AppResult<Instruction> {
    if recipients.len() != basis_points.len() {
        return Err(AppError::InvalidInput(format!(
            "{} recipients but {} percentages",
            recipients.len(),
            basis_points.len()
        )));
    }

    let mut data = anchor_discriminator("distribute_by_percentage").to_vec();
    let args = borsh::to_vec(&(total_amount, basis_points.to_vec()))
        .map_err(|e| AppError::Internal(format!("Failed to encode payout args: {}", e)))?;
    data.extend_from_slice(&args);

    let mut accounts = vec![
        AccountMeta::new(*funding_account, true),
        AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
    ];
    accounts.extend(recipients.iter().map(|r| AccountMeta::new(*r, false)));

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}

pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address_with_program_id(owner, mint, token_program)
}

pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Instruction {
    spl_associated_token_account::instruction::create_associated_token_account_idempotent(
        payer,
        owner,
        mint,
        token_program,
    )
}

/// Token-2022 `WithdrawWithheldTokensFromAccounts`, signed by a single
/// withdraw authority
pub fn withdraw_withheld_tokens_from_accounts(
    mint: &Pubkey,
    destination: &Pubkey,
    authority: &Pubkey,
    sources: &[Pubkey],
) -> AppResult<Instruction> {
    let sources: Vec<&Pubkey> = sources.iter().collect();

    spl_token_2022_interface::extension::transfer_fee::instruction::withdraw_withheld_tokens_from_accounts(
        &spl_token_2022_interface::id(),
        mint,
        destination,
        authority,
        &[],
        &sources,
    )
    .map_err(|e| AppError::InvalidInput(format!("Invalid withdraw instruction: {}", e)))
}

/// Withheld transfer fee recorded in a Token-2022 account's
/// `TransferFeeAmount` extension, if the account carries one.
pub fn withheld_transfer_fee(data: &[u8]) -> Option<u64> {
    let account = StateWithExtensions::<TokenAccount>::unpack(data).ok()?;
    let fee = account.get_extension::<TransferFeeAmount>().ok()?;
    Some(u64::from(fee.withheld_amount))
}

/// Owner and raw balance of a token account
pub fn token_holding(data: &[u8]) -> Option<(Pubkey, u64)> {
    let account = StateWithExtensions::<TokenAccount>::unpack(data).ok()?;
    Some((account.base.owner, account.base.amount))
}
