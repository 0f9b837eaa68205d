//! Seams between the accounting core and whatever hosts it.
//!
//! The Stylus contract implements every trait over its own storage and ERC-20
//! calls; [`crate::memory::MemoryHost`] implements them in memory for replay
//! and tests.

use alloy_primitives::{aliases::U160, Address, U256};

use crate::error::SettlementError;
use crate::ledger::{Bucket, ClaimIndex, ClaimState};
use crate::terms::{OptionState, OptionTerms};

/// Persisted engine state, addressed by key and arena position.
pub trait Ledger {
    fn option(&self, key: U160) -> Option<OptionState>;
    fn insert_option(&mut self, key: U160, state: OptionState);
    fn set_next_claim_key(&mut self, key: U160, next: u128);
    fn set_settlement_seed(&mut self, key: U160, seed: U256);

    fn bucket_count(&self, key: U160) -> usize;
    fn bucket(&self, key: U160, index: usize) -> Option<Bucket>;
    fn push_bucket(&mut self, key: U160, bucket: Bucket);
    fn set_bucket(&mut self, key: U160, index: usize, bucket: Bucket);

    fn claim(&self, claim_id: U256) -> Option<ClaimState>;
    fn set_claim(&mut self, claim_id: U256, claim: ClaimState);

    fn claim_index_count(&self, claim_id: U256) -> usize;
    fn claim_index(&self, claim_id: U256, position: usize) -> Option<ClaimIndex>;
    fn push_claim_index(&mut self, claim_id: U256, entry: ClaimIndex);
    fn set_claim_index(&mut self, claim_id: U256, position: usize, entry: ClaimIndex);

    fn fee_balance(&self, asset: Address) -> U256;
    fn set_fee_balance(&mut self, asset: Address, amount: U256);
}

/// Fungible balances of option tokens and claim tokens.
pub trait Balances {
    fn balance_of(&self, owner: Address, token_id: U256) -> U256;
    fn mint(&mut self, owner: Address, token_id: U256, amount: U256);
    /// Callers check the balance first; burning more than is held saturates.
    fn burn(&mut self, owner: Address, token_id: U256, amount: U256);
}

/// Moves collateral and exercise assets in and out of the engine.
///
/// Assets are assumed non-rebasing and free of transfer fees.
pub trait Assets {
    fn transfer_in(&mut self, asset: Address, from: Address, amount: U256)
        -> Result<(), SettlementError>;
    fn transfer_out(&mut self, asset: Address, to: Address, amount: U256)
        -> Result<(), SettlementError>;
    fn total_supply(&self, asset: Address) -> Result<U256, SettlementError>;
}

pub trait Clock {
    /// Current unix timestamp in seconds.
    fn now(&self) -> u64;
}

/// Structured record of every state change the engine makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    NewOptionType {
        option_id: U256,
        terms: OptionTerms,
    },
    OptionsWritten {
        option_id: U256,
        writer: Address,
        claim_id: U256,
        amount: u128,
    },
    BucketWrittenInto {
        option_id: U256,
        claim_id: U256,
        bucket_index: usize,
        amount: u128,
    },
    OptionsExercised {
        option_id: U256,
        exerciser: Address,
        amount: u128,
    },
    BucketAssignedExercise {
        option_id: U256,
        bucket_index: usize,
        amount: u128,
    },
    ClaimRedeemed {
        claim_id: U256,
        option_id: U256,
        redeemer: Address,
        exercise_amount: U256,
        underlying_amount: U256,
    },
    FeeAccrued {
        option_id: U256,
        asset: Address,
        payor: Address,
        amount: U256,
    },
}

pub trait Events {
    fn emit(&mut self, event: SettlementEvent);
}

/// Everything an engine operation needs from its environment.
pub trait Host: Ledger + Balances + Assets + Clock + Events {}

impl<T: Ledger + Balances + Assets + Clock + Events> Host for T {}
