//! Placeholder unsigned-transaction builder
//!
//! Builds the swap-intent skeleton for snipe mode: compute-budget
//! instructions plus a memo tagging the trigger, with the session owner as
//! fee payer and a fresh blockhash. A production deployment swaps the memo
//! for a venue-specific instruction; nothing downstream depends on which.
//! Tip transactions are real: a native transfer to the given tip account.

use std::str::FromStr;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;

use super::{BuildSwapRequest, BuildTipRequest, SwapAdapter};
use crate::error::{Error, Result};

/// SPL memo program
pub const MEMO_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

fn memo_instruction(memo: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![],
        data: memo.as_bytes().to_vec(),
    }
}

fn parse_key(label: &str, s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| Error::SwapAdapter(format!("Invalid {} {}: {}", label, s, e)))
}

fn parse_blockhash(s: &str) -> Result<Hash> {
    Hash::from_str(s).map_err(|e| Error::SwapAdapter(format!("Invalid blockhash {}: {}", s, e)))
}

/// Assemble an unsigned versioned transaction and encode it base64.
///
/// Signature slots are zero-filled; the browser wallet fills them in.
fn encode_unsigned(
    instructions: &[Instruction],
    payer: &Pubkey,
    blockhash: Hash,
) -> Result<String> {
    let message = Message::new_with_blockhash(instructions, Some(payer), &blockhash);
    let num_signatures = message.header.num_required_signatures as usize;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); num_signatures],
        message: VersionedMessage::Legacy(message),
    };
    let bytes = bincode::serialize(&tx)
        .map_err(|e| Error::Serialization(format!("Failed to serialize unsigned tx: {}", e)))?;
    Ok(BASE64.encode(bytes))
}

/// Placeholder swap builder used by the snipe materializer
#[derive(Debug, Default)]
pub struct PlaceholderSwapAdapter;

impl PlaceholderSwapAdapter {
    pub fn new() -> Self {
        Self
    }

    fn build_intent(&self, req: &BuildSwapRequest) -> Result<String> {
        let owner = parse_key("owner", &req.owner)?;
        let blockhash = parse_blockhash(&req.recent_blockhash)?;

        let mut instructions = Vec::with_capacity(3);
        if let Some(limit) = req.cu_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
        }
        if let Some(price) = req.cu_price_micro_lamports {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(price));
        }
        instructions.push(memo_instruction(&req.memo));

        encode_unsigned(&instructions, &owner, blockhash)
    }
}

#[async_trait]
impl SwapAdapter for PlaceholderSwapAdapter {
    async fn build_unsigned_buy_tx_base64(&self, req: &BuildSwapRequest) -> Result<String> {
        self.build_intent(req)
    }

    async fn build_unsigned_sell_tx_base64(&self, req: &BuildSwapRequest) -> Result<String> {
        self.build_intent(req)
    }

    async fn build_unsigned_tip_tx_base64(&self, req: &BuildTipRequest) -> Result<String> {
        let owner = parse_key("owner", &req.owner)?;
        let tip_account = parse_key("tip account", &req.tip_account)?;
        let blockhash = parse_blockhash(&req.recent_blockhash)?;

        let mut instructions = vec![system_instruction::transfer(
            &owner,
            &tip_account,
            req.tip_lamports,
        )];
        if let Some(memo) = &req.memo {
            instructions.push(memo_instruction(memo));
        }

        encode_unsigned(&instructions, &owner, blockhash)
    }
}
