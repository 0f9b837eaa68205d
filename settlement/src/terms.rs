use alloy_primitives::{aliases::U160, keccak256, U256};
use alloy_sol_types::{sol, SolType};

/// Seconds in one calendar day; also the bucket width.
pub const DAY: u64 = 86_400;

/// Minimum distance between registration time and expiry.
pub const MIN_NOTICE: u64 = DAY;

/// Minimum length of the exercise window.
pub const MIN_EXERCISE_WINDOW: u64 = DAY;

/// Protocol fee in basis points, charged on collateral in and exercise payment in.
pub const FEE_BPS: u64 = 5;

const BPS_DENOMINATOR: u64 = 10_000;

sol! {
    /// Immutable terms of an option type.
    #[derive(Debug, Copy, PartialEq, Eq)]
    struct OptionTerms {
        address underlyingAsset;
        uint128 underlyingAmount;
        address exerciseAsset;
        uint128 exerciseAmount;
        uint64 exerciseTimestamp;
        uint64 expiryTimestamp;
    }
}

// Implement AbiType for OptionTerms to make it usable in #[public] functions
impl stylus_sdk::abi::AbiType for OptionTerms {
    type SolType = Self;
    const ABI: stylus_sdk::abi::ConstString =
        stylus_sdk::abi::ConstString::new("(address,uint128,address,uint128,uint64,uint64)");
}

/// Stored state of a registered option type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionState {
    pub terms: OptionTerms,
    /// Claim key handed to the next fresh lot.
    pub next_claim_key: u128,
    /// Pseudorandom walk state; starts as the type's own key.
    pub settlement_seed: U256,
}

impl OptionState {
    #[must_use]
    pub fn new(key: U160, terms: OptionTerms) -> Self {
        Self {
            terms,
            next_claim_key: 1,
            settlement_seed: U256::from(key),
        }
    }
}

/// Derives the registry key of an option type from its terms.
///
/// The key is the first 20 bytes of `keccak256(abi.encode(terms))`, so two
/// registrations with identical terms collide on purpose.
#[must_use]
pub fn option_key(terms: &OptionTerms) -> U160 {
    let hash = keccak256(<OptionTerms as SolType>::abi_encode(terms));
    U160::from_be_slice(&hash[..20])
}

/// Calendar day index of a timestamp.
#[must_use]
pub const fn day_of(timestamp: u64) -> u64 {
    timestamp / DAY
}

/// Protocol fee owed on `amount` of an asset, rounded down.
#[must_use]
pub fn fee_on(amount: U256) -> U256 {
    amount.saturating_mul(U256::from(FEE_BPS)) / U256::from(BPS_DENOMINATOR)
}
