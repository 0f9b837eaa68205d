//! Option lifecycle on top of the bucket ledger.
//!
//! Each operation runs its own checks before its first mutation. Asset
//! transfers can still fail after ledger writes (the underlying payout of an
//! exercise, the payouts of a redemption), so hosts must discard every change
//! when an operation returns `Err`: the contract reverts, and
//! [`crate::memory::MemoryHost::atomic`] restores its snapshot.

use alloy_primitives::{Address, U256};

use crate::error::{
    AlreadyRedeemed, AmountCannotBeZero, CallerDoesNotOwnClaim, ClaimTooSoon, DuplicateType,
    ExerciseTooEarly, ExpiredOption, ExpiryTooSoon, IllegalAsset, InsufficientOptions,
    InvalidClaim, InvalidOption, SameAsset, SettlementError, WindowTooShort,
};
use crate::host::{Host, Ledger, SettlementEvent};
use crate::ledger::{self, Bucket, ClaimState, Settlement};
use crate::terms::{fee_on, option_key, OptionState, OptionTerms, MIN_EXERCISE_WINDOW, MIN_NOTICE};
use crate::token_id::{self, TokenKind};

/// Read-only view of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimInfo {
    pub option_id: U256,
    pub amount_written: u128,
    /// Sum of floor-rounded exercised shares across the claim's buckets.
    pub amount_exercised: U256,
    pub redeemed: bool,
}

/// What a token id names, given the current ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    None,
    Option,
    Claim,
}

impl TokenType {
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Option => 1,
            Self::Claim => 2,
        }
    }
}

fn zero_amount() -> SettlementError {
    SettlementError::AmountCannotBeZero(AmountCannotBeZero {})
}

fn checked_product(per_contract: u128, contracts: u128) -> Result<U256, SettlementError> {
    U256::from(per_contract)
        .checked_mul(U256::from(contracts))
        .ok_or_else(SettlementError::overflow)
}

/// Loads the option type named by `token_id`, which must be an option id.
fn option_type<H: Ledger + ?Sized>(
    host: &H,
    token_id: U256,
) -> Result<OptionState, SettlementError> {
    let (key, claim_key) = token_id::decode(token_id);
    let invalid = || SettlementError::InvalidOption(InvalidOption { tokenId: token_id });

    if claim_key != 0 {
        return Err(invalid());
    }
    host.option(key).ok_or_else(invalid)
}

fn accrue_fee<H: Host + ?Sized>(
    host: &mut H,
    option_id: U256,
    asset: Address,
    payor: Address,
    fee: U256,
) {
    if fee.is_zero() {
        return;
    }
    let balance = host.fee_balance(asset);
    host.set_fee_balance(asset, balance.saturating_add(fee));
    host.emit(SettlementEvent::FeeAccrued {
        option_id,
        asset,
        payor,
        amount: fee,
    });
}

/// Registers a new option type and returns its option id.
///
/// # Errors
/// - `DuplicateType` if identical terms were registered before
/// - `ExpiryTooSoon` if expiry is less than [`MIN_NOTICE`] away
/// - `WindowTooShort` if the exercise window is shorter than [`MIN_EXERCISE_WINDOW`]
/// - `SameAsset` if underlying and exercise asset match
/// - `AmountCannotBeZero` if either per-contract amount is zero
/// - `IllegalAsset` if an asset's supply cannot cover one contract
pub fn new_option_type<H: Host + ?Sized>(
    host: &mut H,
    terms: OptionTerms,
) -> Result<U256, SettlementError> {
    let key = option_key(&terms);
    let option_id = token_id::encode(key, 0);

    if host.option(key).is_some() {
        return Err(SettlementError::DuplicateType(DuplicateType {
            optionId: option_id,
        }));
    }

    let now = host.now();
    if terms.expiryTimestamp < now.saturating_add(MIN_NOTICE) {
        return Err(SettlementError::ExpiryTooSoon(ExpiryTooSoon {
            optionId: option_id,
            expiry: terms.expiryTimestamp,
        }));
    }

    if terms.expiryTimestamp < terms.exerciseTimestamp.saturating_add(MIN_EXERCISE_WINDOW) {
        return Err(SettlementError::WindowTooShort(WindowTooShort {
            optionId: option_id,
            exerciseTimestamp: terms.exerciseTimestamp,
            expiry: terms.expiryTimestamp,
        }));
    }

    if terms.underlyingAsset == terms.exerciseAsset {
        return Err(SettlementError::SameAsset(SameAsset {
            asset: terms.underlyingAsset,
        }));
    }

    if terms.underlyingAmount == 0 || terms.exerciseAmount == 0 {
        return Err(zero_amount());
    }

    for (asset, per_contract) in [
        (terms.underlyingAsset, terms.underlyingAmount),
        (terms.exerciseAsset, terms.exerciseAmount),
    ] {
        let supply = host.total_supply(asset)?;
        if supply < U256::from(per_contract) {
            return Err(SettlementError::IllegalAsset(IllegalAsset {
                asset,
                totalSupply: supply,
                perContractAmount: U256::from(per_contract),
            }));
        }
    }

    host.insert_option(key, OptionState::new(key, terms));
    host.emit(SettlementEvent::NewOptionType { option_id, terms });

    Ok(option_id)
}

/// Locks collateral for `amount` contracts and mints them to `writer`.
///
/// Writing against an option id opens a fresh claim; writing against a claim id
/// the writer holds adds to that claim. Returns the claim id.
///
/// # Errors
/// - `AmountCannotBeZero` if `amount` is zero
/// - `InvalidOption` if the option type is unknown
/// - `ExpiredOption` if the option type has expired
/// - `InvalidClaim`, `CallerDoesNotOwnClaim`, `AlreadyRedeemed` for a bad claim id
/// - `AmountOverflow` if totals overflow
/// - `TransferFailed` if collateral cannot be pulled in
pub fn write<H: Host + ?Sized>(
    host: &mut H,
    writer: Address,
    token_id: U256,
    amount: u128,
) -> Result<U256, SettlementError> {
    if amount == 0 {
        return Err(zero_amount());
    }

    let (key, claim_key) = token_id::decode(token_id);
    let option_id = token_id::encode(key, 0);
    let state = host
        .option(key)
        .ok_or(SettlementError::InvalidOption(InvalidOption { tokenId: token_id }))?;

    let now = host.now();
    if now >= state.terms.expiryTimestamp {
        return Err(SettlementError::ExpiredOption(ExpiredOption {
            optionId: option_id,
            expiry: state.terms.expiryTimestamp,
        }));
    }

    let (claim_id, claim) = if claim_key == 0 {
        if state.next_claim_key > token_id::MAX_CLAIM_KEY {
            return Err(SettlementError::overflow());
        }
        let claim_id = token_id::encode(key, state.next_claim_key);
        (
            claim_id,
            ClaimState {
                amount_written: amount,
                redeemed: false,
            },
        )
    } else {
        let mut claim = host
            .claim(token_id)
            .ok_or(SettlementError::InvalidClaim(InvalidClaim { tokenId: token_id }))?;
        if claim.redeemed {
            return Err(SettlementError::AlreadyRedeemed(AlreadyRedeemed {
                claimId: token_id,
            }));
        }
        if host.balance_of(writer, token_id) != U256::from(1) {
            return Err(SettlementError::CallerDoesNotOwnClaim(
                CallerDoesNotOwnClaim { claimId: token_id },
            ));
        }
        claim.amount_written = claim
            .amount_written
            .checked_add(amount)
            .ok_or_else(SettlementError::overflow)?;
        (token_id, claim)
    };

    let plan = ledger::plan_write(host, key, amount, now)?;
    let collateral = checked_product(state.terms.underlyingAmount, amount)?;
    let fee = fee_on(collateral);
    let pull = collateral
        .checked_add(fee)
        .ok_or_else(SettlementError::overflow)?;

    host.transfer_in(state.terms.underlyingAsset, writer, pull)?;

    if claim_key == 0 {
        host.set_next_claim_key(key, state.next_claim_key + 1);
        host.mint(writer, claim_id, U256::from(1));
    }
    host.set_claim(claim_id, claim);

    ledger::apply_write(host, key, &plan);
    ledger::record_contribution(host, claim_id, plan.bucket_index, amount);
    host.mint(writer, option_id, U256::from(amount));

    accrue_fee(host, option_id, state.terms.underlyingAsset, writer, fee);
    host.emit(SettlementEvent::BucketWrittenInto {
        option_id,
        claim_id,
        bucket_index: plan.bucket_index,
        amount,
    });
    host.emit(SettlementEvent::OptionsWritten {
        option_id,
        writer,
        claim_id,
        amount,
    });

    Ok(claim_id)
}

/// Exercises `amount` contracts held by `exerciser`.
///
/// The exerciser pays the exercise asset (plus fee) and receives the
/// underlying. The exercised volume is assigned to buckets by the seeded walk.
///
/// # Errors
/// - `AmountCannotBeZero` if `amount` is zero
/// - `InvalidOption` if `option_id` is not a registered option id
/// - `ExerciseTooEarly` / `ExpiredOption` outside the exercise window
/// - `InsufficientOptions` if the exerciser holds fewer than `amount`
/// - `NoCapacity` if buckets cannot absorb `amount`
/// - `TransferFailed` if payment cannot be pulled in
pub fn exercise<H: Host + ?Sized>(
    host: &mut H,
    exerciser: Address,
    option_id: U256,
    amount: u128,
) -> Result<(), SettlementError> {
    if amount == 0 {
        return Err(zero_amount());
    }

    let state = option_type(host, option_id)?;
    let key = token_id::decode(option_id).0;
    let terms = state.terms;

    let now = host.now();
    if now < terms.exerciseTimestamp {
        return Err(SettlementError::ExerciseTooEarly(ExerciseTooEarly {
            optionId: option_id,
            exerciseTimestamp: terms.exerciseTimestamp,
        }));
    }
    if now >= terms.expiryTimestamp {
        return Err(SettlementError::ExpiredOption(ExpiredOption {
            optionId: option_id,
            expiry: terms.expiryTimestamp,
        }));
    }

    let held = host.balance_of(exerciser, option_id);
    if held < U256::from(amount) {
        return Err(SettlementError::InsufficientOptions(InsufficientOptions {
            optionId: option_id,
            held,
            requested: U256::from(amount),
        }));
    }

    let assignment = ledger::plan_assignment(host, key, state.settlement_seed, amount)?;
    let payment = checked_product(terms.exerciseAmount, amount)?;
    let fee = fee_on(payment);
    let pull = payment
        .checked_add(fee)
        .ok_or_else(SettlementError::overflow)?;
    let delivery = checked_product(terms.underlyingAmount, amount)?;

    host.transfer_in(terms.exerciseAsset, exerciser, pull)?;
    host.burn(exerciser, option_id, U256::from(amount));
    ledger::apply_assignment(host, key, state.settlement_seed, &assignment);
    host.transfer_out(terms.underlyingAsset, exerciser, delivery)?;

    accrue_fee(host, option_id, terms.exerciseAsset, exerciser, fee);
    for step in &assignment.steps {
        host.emit(SettlementEvent::BucketAssignedExercise {
            option_id,
            bucket_index: step.bucket_index,
            amount: step.amount,
        });
    }
    host.emit(SettlementEvent::OptionsExercised {
        option_id,
        exerciser,
        amount,
    });

    Ok(())
}

/// Pays out a claim's share of exercise proceeds and unexercised collateral.
///
/// # Errors
/// - `InvalidClaim` if `claim_id` does not name an existing claim
/// - `CallerDoesNotOwnClaim` if `redeemer` does not hold it
/// - `AlreadyRedeemed` if it was redeemed before
/// - `ClaimTooSoon` before expiry
/// - `TransferFailed` if a payout is rejected
pub fn redeem<H: Host + ?Sized>(
    host: &mut H,
    redeemer: Address,
    claim_id: U256,
) -> Result<Settlement, SettlementError> {
    let invalid = || SettlementError::InvalidClaim(InvalidClaim { tokenId: claim_id });
    let (key, claim_key) = token_id::decode(claim_id);
    if claim_key == 0 {
        return Err(invalid());
    }

    let mut claim = host.claim(claim_id).ok_or_else(invalid)?;
    let state = host.option(key).ok_or_else(invalid)?;
    let option_id = token_id::encode(key, 0);

    if claim.redeemed {
        return Err(SettlementError::AlreadyRedeemed(AlreadyRedeemed {
            claimId: claim_id,
        }));
    }
    if host.balance_of(redeemer, claim_id) != U256::from(1) {
        return Err(SettlementError::CallerDoesNotOwnClaim(
            CallerDoesNotOwnClaim { claimId: claim_id },
        ));
    }
    if host.now() < state.terms.expiryTimestamp {
        return Err(SettlementError::ClaimTooSoon(ClaimTooSoon {
            claimId: claim_id,
            expiry: state.terms.expiryTimestamp,
        }));
    }

    let settlement = ledger::settlement_for(
        host,
        key,
        claim_id,
        state.terms.exerciseAmount,
        state.terms.underlyingAmount,
    )?;

    claim.redeemed = true;
    host.set_claim(claim_id, claim);
    host.burn(redeemer, claim_id, U256::from(1));

    if !settlement.exercise_amount.is_zero() {
        host.transfer_out(state.terms.exerciseAsset, redeemer, settlement.exercise_amount)?;
    }
    if !settlement.underlying_amount.is_zero() {
        host.transfer_out(
            state.terms.underlyingAsset,
            redeemer,
            settlement.underlying_amount,
        )?;
    }

    host.emit(SettlementEvent::ClaimRedeemed {
        claim_id,
        option_id,
        redeemer,
        exercise_amount: settlement.exercise_amount,
        underlying_amount: settlement.underlying_amount,
    });

    Ok(settlement)
}

/// Terms of the option type named by an option id.
///
/// # Errors
/// `InvalidOption` if `option_id` is not a registered option id.
pub fn option<H: Ledger + ?Sized>(host: &H, option_id: U256) -> Result<OptionTerms, SettlementError> {
    option_type(host, option_id).map(|state| state.terms)
}

/// Current accounting of a claim.
///
/// # Errors
/// `InvalidClaim` if `claim_id` does not name an existing claim.
pub fn claim<H: Ledger + ?Sized>(host: &H, claim_id: U256) -> Result<ClaimInfo, SettlementError> {
    let (key, claim_key) = token_id::decode(claim_id);
    let state = (claim_key != 0)
        .then(|| host.claim(claim_id))
        .flatten()
        .ok_or(SettlementError::InvalidClaim(InvalidClaim { tokenId: claim_id }))?;

    let shares = ledger::claim_shares(host, key, claim_id)?;

    Ok(ClaimInfo {
        option_id: token_id::encode(key, 0),
        amount_written: state.amount_written,
        amount_exercised: shares.exercised,
        redeemed: state.redeemed,
    })
}

/// Bucket `index` of the option type named by `option_id`.
///
/// # Errors
/// `InvalidOption` for an unknown option id, `BucketOutOfRange` past the end.
pub fn bucket<H: Ledger + ?Sized>(
    host: &H,
    option_id: U256,
    index: usize,
) -> Result<Bucket, SettlementError> {
    option_type(host, option_id)?;
    ledger::bucket_at(host, token_id::decode(option_id).0, index)
}

/// Classifies a token id against the ledger.
#[must_use]
pub fn token_type<H: Ledger + ?Sized>(host: &H, token_id: U256) -> TokenType {
    let (key, _) = token_id::decode(token_id);
    match token_id::classify(token_id) {
        TokenKind::OptionType if host.option(key).is_some() => TokenType::Option,
        TokenKind::Claim if host.claim(token_id).is_some() => TokenType::Claim,
        _ => TokenType::None,
    }
}
