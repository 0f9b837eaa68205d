use alloy_primitives::{aliases::U160, U256};

/// Number of low-order bits of a token id reserved for the claim key.
pub const CLAIM_KEY_BITS: usize = 96;

/// Largest claim key representable in a token id.
pub const MAX_CLAIM_KEY: u128 = (1u128 << CLAIM_KEY_BITS) - 1;

/// What a token id refers to once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Fungible option-type token (claim key is zero).
    OptionType,
    /// Non-fungible claim on a specific writing lot.
    Claim,
}

/// Packs an option key and claim key into one ERC-1155 token id.
///
/// The option key occupies the high 160 bits, the claim key the low 96 bits.
/// Claim keys come from a per-type counter, so they never exceed
/// [`MAX_CLAIM_KEY`] in practice.
#[must_use]
pub fn encode(option_key: U160, claim_key: u128) -> U256 {
    debug_assert!(claim_key <= MAX_CLAIM_KEY);
    (U256::from(option_key) << CLAIM_KEY_BITS) | U256::from(claim_key)
}

/// Splits a token id into `(option_key, claim_key)`. Total over all inputs.
#[must_use]
pub fn decode(token_id: U256) -> (U160, u128) {
    let option_key = U160::from(token_id >> CLAIM_KEY_BITS);
    let claim_key = (token_id & U256::from(MAX_CLAIM_KEY)).to::<u128>();
    (option_key, claim_key)
}

/// Classifies a token id by its claim key alone; existence is not checked.
#[must_use]
pub fn classify(token_id: U256) -> TokenKind {
    match decode(token_id).1 {
        0 => TokenKind::OptionType,
        _ => TokenKind::Claim,
    }
}

/// Returns the option-type id a token id belongs to.
#[must_use]
pub fn option_id_of(token_id: U256) -> U256 {
    encode(decode(token_id).0, 0)
}
