//! Raw token-account layout parsing
//!
//! Mint accounts share a fixed 82-byte prefix across the classic and
//! extended token programs:
//! - mint_authority: COption<Pubkey> (4-byte tag + 32 bytes) at offset 0
//! - supply: u64 LE at offset 36
//! - decimals: u8 at offset 44
//! - is_initialized: bool at offset 45
//! - freeze_authority: COption<Pubkey> (4-byte tag + 32 bytes) at offset 46
//!
//! Extended-program mints append a TLV suffix after offset 82:
//! `[u16 type][u16 length][length bytes]…`, little-endian.

/// Fixed mint layout size
pub const MINT_LAYOUT_LEN: usize = 82;

/// Extension types that disqualify a mint: transfer fee (1), confidential
/// transfer (4), interest bearing (10), permanent delegate (12), transfer
/// hook (14), confidential transfer fee (16).
pub const BLOCKED_EXTENSION_TYPES: [u16; 6] = [1, 4, 10, 12, 14, 16];

/// Parsed fixed-prefix mint fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintLayout {
    pub mint_authority_present: bool,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority_present: bool,
}

/// Parse the 82-byte mint prefix. Returns None when the buffer is short.
pub fn parse_mint(data: &[u8]) -> Option<MintLayout> {
    if data.len() < MINT_LAYOUT_LEN {
        return None;
    }

    let mint_authority_tag = u32::from_le_bytes(data[0..4].try_into().ok()?);
    let supply = u64::from_le_bytes(data[36..44].try_into().ok()?);
    let decimals = data[44];
    let is_initialized = data[45] != 0;
    let freeze_authority_tag = u32::from_le_bytes(data[46..50].try_into().ok()?);

    Some(MintLayout {
        mint_authority_present: mint_authority_tag != 0,
        supply,
        decimals,
        is_initialized,
        freeze_authority_present: freeze_authority_tag != 0,
    })
}

/// Extract extension types from the TLV suffix after the mint prefix.
/// A truncated or malformed suffix yields the entries parsed so far.
pub fn parse_extension_types(data: &[u8]) -> Vec<u16> {
    let mut types = Vec::new();
    if data.len() <= MINT_LAYOUT_LEN {
        return types;
    }

    let mut offset = MINT_LAYOUT_LEN;
    while offset + 4 <= data.len() {
        let ext_type = u16::from_le_bytes([data[offset], data[offset + 1]]);
        let ext_len = u16::from_le_bytes([data[offset + 2], data[offset + 3]]) as usize;
        offset += 4;
        if offset + ext_len > data.len() {
            break;
        }
        types.push(ext_type);
        offset += ext_len;
    }
    types
}

/// Any blocked extension present?
pub fn has_blocked_extension(types: &[u16]) -> Option<u16> {
    types
        .iter()
        .copied()
        .find(|t| BLOCKED_EXTENSION_TYPES.contains(t))
}

#[cfg(test)]
pub(crate) fn synthesize_mint(
    mint_authority_present: bool,
    supply: u64,
    decimals: u8,
    is_initialized: bool,
    freeze_authority_present: bool,
) -> Vec<u8> {
    let mut data = vec![0u8; MINT_LAYOUT_LEN];
    data[0..4].copy_from_slice(&u32::to_le_bytes(mint_authority_present as u32));
    data[36..44].copy_from_slice(&supply.to_le_bytes());
    data[44] = decimals;
    data[45] = is_initialized as u8;
    data[46..50].copy_from_slice(&u32::to_le_bytes(freeze_authority_present as u32));
    data
}
