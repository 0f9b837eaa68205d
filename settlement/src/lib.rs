#![cfg_attr(not(any(test, feature = "export-abi")), no_main)]
#![cfg_attr(not(any(test, feature = "export-abi")), no_std)]
extern crate alloc;

pub mod engine;
pub mod error;
pub mod host;
pub mod ledger;
pub mod memory;
pub mod terms;
pub mod token_id;

use alloc::{vec, vec::Vec};
use alloy_primitives::{aliases::U160, Address, U128, U256, U64};
use alloy_sol_types::sol;
use stylus_sdk::{prelude::*, stylus_core::log};

pub use engine::{ClaimInfo, TokenType};
pub use error::{ErrorKind, SettlementError};
use error::TransferFailed;
use host::{Assets, Balances, Clock, Events, Ledger, SettlementEvent};
use ledger::{Bucket, ClaimIndex, ClaimState};
pub use terms::OptionTerms;
use terms::OptionState;

sol! {
    /// Emitted when a new option type is registered.
    event NewOptionType(
        uint256 indexed optionId,
        address indexed exerciseAsset,
        address indexed underlyingAsset,
        uint128 exerciseAmount,
        uint128 underlyingAmount,
        uint64 exerciseTimestamp,
        uint64 expiryTimestamp
    );

    /// Emitted when contracts are written against a claim.
    event OptionsWritten(
        uint256 indexed optionId,
        address indexed writer,
        uint256 indexed claimId,
        uint128 amount
    );

    /// Emitted when written contracts land in a bucket.
    event BucketWrittenInto(
        uint256 indexed optionId,
        uint256 indexed claimId,
        uint256 indexed bucketIndex,
        uint128 amount
    );

    /// Emitted when a holder exercises contracts.
    event OptionsExercised(uint256 indexed optionId, address indexed exerciser, uint128 amount);

    /// Emitted for every bucket an exercise is assigned to.
    event BucketAssignedExercise(
        uint256 indexed optionId,
        uint256 indexed bucketIndex,
        uint128 amount
    );

    /// Emitted when a claim is redeemed after expiry.
    event ClaimRedeemed(
        uint256 indexed claimId,
        uint256 indexed optionId,
        address indexed redeemer,
        uint256 exerciseAmountRedeemed,
        uint256 underlyingAmountRedeemed
    );

    /// Emitted when a protocol fee is set aside for the fee sweep.
    event FeeAccrued(
        uint256 indexed optionId,
        address indexed asset,
        address indexed payor,
        uint256 amount
    );

    /// ERC-1155 single transfer; mints come from and burns go to the zero address.
    event TransferSingle(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256 id,
        uint256 value
    );
}

sol_interface! {
    interface IERC20 {
        function totalSupply() external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
    }
}

sol_storage! {
    #[entrypoint]
    pub struct OptionSettlementEngine {
        // Option types by option key; unset underlying asset means absent
        mapping(uint160 => OptionRecord) options;

        // Day buckets per option key, append-only
        mapping(uint160 => BucketRecord[]) buckets;

        // Claim records and their bucket contributions, by claim id
        mapping(uint256 => ClaimRecord) claims;
        mapping(uint256 => ClaimIndexRecord[]) claim_indices;

        // ERC-1155 balances: token id => owner => amount
        mapping(uint256 => mapping(address => uint256)) balances;

        // Accrued protocol fees per asset, awaiting an external sweep
        mapping(address => uint256) fee_balances;
    }

    pub struct OptionRecord {
        address underlying_asset;
        uint128 underlying_amount;
        address exercise_asset;
        uint128 exercise_amount;
        uint64 exercise_timestamp;
        uint64 expiry_timestamp;
        uint128 next_claim_key;
        uint256 settlement_seed;
    }

    pub struct BucketRecord {
        uint128 amount_written;
        uint128 amount_exercised;
        uint64 day;
    }

    pub struct ClaimRecord {
        uint128 amount_written;
        bool redeemed;
    }

    pub struct ClaimIndexRecord {
        uint64 bucket_index;
        uint128 amount_written;
    }
}

impl Ledger for OptionSettlementEngine {
    fn option(&self, key: U160) -> Option<OptionState> {
        let record = self.options.getter(key);
        let underlying_asset = record.underlying_asset.get();
        if underlying_asset.is_zero() {
            return None;
        }

        Some(OptionState {
            terms: OptionTerms {
                underlyingAsset: underlying_asset,
                underlyingAmount: record.underlying_amount.get().to::<u128>(),
                exerciseAsset: record.exercise_asset.get(),
                exerciseAmount: record.exercise_amount.get().to::<u128>(),
                exerciseTimestamp: record.exercise_timestamp.get().to::<u64>(),
                expiryTimestamp: record.expiry_timestamp.get().to::<u64>(),
            },
            next_claim_key: record.next_claim_key.get().to::<u128>(),
            settlement_seed: record.settlement_seed.get(),
        })
    }

    fn insert_option(&mut self, key: U160, state: OptionState) {
        let mut record = self.options.setter(key);
        record.underlying_asset.set(state.terms.underlyingAsset);
        record
            .underlying_amount
            .set(U128::from(state.terms.underlyingAmount));
        record.exercise_asset.set(state.terms.exerciseAsset);
        record
            .exercise_amount
            .set(U128::from(state.terms.exerciseAmount));
        record
            .exercise_timestamp
            .set(U64::from(state.terms.exerciseTimestamp));
        record
            .expiry_timestamp
            .set(U64::from(state.terms.expiryTimestamp));
        record.next_claim_key.set(U128::from(state.next_claim_key));
        record.settlement_seed.set(state.settlement_seed);
    }

    fn set_next_claim_key(&mut self, key: U160, next: u128) {
        self.options
            .setter(key)
            .next_claim_key
            .set(U128::from(next));
    }

    fn set_settlement_seed(&mut self, key: U160, seed: U256) {
        self.options.setter(key).settlement_seed.set(seed);
    }

    fn bucket_count(&self, key: U160) -> usize {
        self.buckets.getter(key).len()
    }

    fn bucket(&self, key: U160, index: usize) -> Option<Bucket> {
        let buckets = self.buckets.getter(key);
        let record = buckets.getter(index)?;
        Some(Bucket {
            amount_written: record.amount_written.get().to::<u128>(),
            amount_exercised: record.amount_exercised.get().to::<u128>(),
            day: record.day.get().to::<u64>(),
        })
    }

    fn push_bucket(&mut self, key: U160, bucket: Bucket) {
        let mut buckets = self.buckets.setter(key);
        let mut record = buckets.grow();
        record.amount_written.set(U128::from(bucket.amount_written));
        record
            .amount_exercised
            .set(U128::from(bucket.amount_exercised));
        record.day.set(U64::from(bucket.day));
    }

    fn set_bucket(&mut self, key: U160, index: usize, bucket: Bucket) {
        let mut buckets = self.buckets.setter(key);
        if let Some(mut record) = buckets.setter(index) {
            record.amount_written.set(U128::from(bucket.amount_written));
            record
                .amount_exercised
                .set(U128::from(bucket.amount_exercised));
            record.day.set(U64::from(bucket.day));
        }
    }

    fn claim(&self, claim_id: U256) -> Option<ClaimState> {
        let record = self.claims.getter(claim_id);
        let amount_written = record.amount_written.get().to::<u128>();
        // Claims are only created with a non-zero amount.
        if amount_written == 0 {
            return None;
        }
        Some(ClaimState {
            amount_written,
            redeemed: record.redeemed.get(),
        })
    }

    fn set_claim(&mut self, claim_id: U256, claim: ClaimState) {
        let mut record = self.claims.setter(claim_id);
        record.amount_written.set(U128::from(claim.amount_written));
        record.redeemed.set(claim.redeemed);
    }

    fn claim_index_count(&self, claim_id: U256) -> usize {
        self.claim_indices.getter(claim_id).len()
    }

    fn claim_index(&self, claim_id: U256, position: usize) -> Option<ClaimIndex> {
        let entries = self.claim_indices.getter(claim_id);
        let record = entries.getter(position)?;
        Some(ClaimIndex {
            bucket_index: usize::try_from(record.bucket_index.get().to::<u64>()).ok()?,
            amount_written: record.amount_written.get().to::<u128>(),
        })
    }

    fn push_claim_index(&mut self, claim_id: U256, entry: ClaimIndex) {
        let mut entries = self.claim_indices.setter(claim_id);
        let mut record = entries.grow();
        record.bucket_index.set(U64::from(entry.bucket_index));
        record.amount_written.set(U128::from(entry.amount_written));
    }

    fn set_claim_index(&mut self, claim_id: U256, position: usize, entry: ClaimIndex) {
        let mut entries = self.claim_indices.setter(claim_id);
        if let Some(mut record) = entries.setter(position) {
            record.bucket_index.set(U64::from(entry.bucket_index));
            record.amount_written.set(U128::from(entry.amount_written));
        }
    }

    fn fee_balance(&self, asset: Address) -> U256 {
        self.fee_balances.get(asset)
    }

    fn set_fee_balance(&mut self, asset: Address, amount: U256) {
        self.fee_balances.insert(asset, amount);
    }
}

impl Balances for OptionSettlementEngine {
    fn balance_of(&self, owner: Address, token_id: U256) -> U256 {
        self.balances.getter(token_id).get(owner)
    }

    fn mint(&mut self, owner: Address, token_id: U256, amount: U256) {
        {
            let mut holders = self.balances.setter(token_id);
            let balance = holders.get(owner);
            holders.insert(owner, balance + amount);
        }
        log(
            self.vm(),
            TransferSingle {
                operator: self.vm().msg_sender(),
                from: Address::ZERO,
                to: owner,
                id: token_id,
                value: amount,
            },
        );
    }

    fn burn(&mut self, owner: Address, token_id: U256, amount: U256) {
        {
            let mut holders = self.balances.setter(token_id);
            let balance = holders.get(owner);
            holders.insert(owner, balance.saturating_sub(amount));
        }
        log(
            self.vm(),
            TransferSingle {
                operator: self.vm().msg_sender(),
                from: owner,
                to: Address::ZERO,
                id: token_id,
                value: amount,
            },
        );
    }
}

impl Assets for OptionSettlementEngine {
    fn transfer_in(
        &mut self,
        asset: Address,
        from: Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        let to = self.vm().contract_address();
        let token = IERC20::new(asset);

        match token.transfer_from(&mut *self, from, to, amount) {
            Ok(true) => Ok(()),
            _ => Err(SettlementError::TransferFailed(TransferFailed {
                asset,
                from,
                to,
                amount,
            })),
        }
    }

    fn transfer_out(
        &mut self,
        asset: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        let from = self.vm().contract_address();
        let token = IERC20::new(asset);

        match token.transfer(&mut *self, to, amount) {
            Ok(true) => Ok(()),
            _ => Err(SettlementError::TransferFailed(TransferFailed {
                asset,
                from,
                to,
                amount,
            })),
        }
    }

    fn total_supply(&self, asset: Address) -> Result<U256, SettlementError> {
        // An address without a token contract reports no supply.
        Ok(IERC20::new(asset)
            .total_supply(self)
            .unwrap_or(U256::ZERO))
    }
}

impl Clock for OptionSettlementEngine {
    fn now(&self) -> u64 {
        self.vm().block_timestamp()
    }
}

impl Events for OptionSettlementEngine {
    fn emit(&mut self, event: SettlementEvent) {
        let vm = self.vm();
        match event {
            SettlementEvent::NewOptionType { option_id, terms } => log(
                vm,
                NewOptionType {
                    optionId: option_id,
                    exerciseAsset: terms.exerciseAsset,
                    underlyingAsset: terms.underlyingAsset,
                    exerciseAmount: terms.exerciseAmount,
                    underlyingAmount: terms.underlyingAmount,
                    exerciseTimestamp: terms.exerciseTimestamp,
                    expiryTimestamp: terms.expiryTimestamp,
                },
            ),
            SettlementEvent::OptionsWritten {
                option_id,
                writer,
                claim_id,
                amount,
            } => log(
                vm,
                OptionsWritten {
                    optionId: option_id,
                    writer,
                    claimId: claim_id,
                    amount,
                },
            ),
            SettlementEvent::BucketWrittenInto {
                option_id,
                claim_id,
                bucket_index,
                amount,
            } => log(
                vm,
                BucketWrittenInto {
                    optionId: option_id,
                    claimId: claim_id,
                    bucketIndex: U256::from(bucket_index),
                    amount,
                },
            ),
            SettlementEvent::OptionsExercised {
                option_id,
                exerciser,
                amount,
            } => log(
                vm,
                OptionsExercised {
                    optionId: option_id,
                    exerciser,
                    amount,
                },
            ),
            SettlementEvent::BucketAssignedExercise {
                option_id,
                bucket_index,
                amount,
            } => log(
                vm,
                BucketAssignedExercise {
                    optionId: option_id,
                    bucketIndex: U256::from(bucket_index),
                    amount,
                },
            ),
            SettlementEvent::ClaimRedeemed {
                claim_id,
                option_id,
                redeemer,
                exercise_amount,
                underlying_amount,
            } => log(
                vm,
                ClaimRedeemed {
                    claimId: claim_id,
                    optionId: option_id,
                    redeemer,
                    exerciseAmountRedeemed: exercise_amount,
                    underlyingAmountRedeemed: underlying_amount,
                },
            ),
            SettlementEvent::FeeAccrued {
                option_id,
                asset,
                payor,
                amount,
            } => log(
                vm,
                FeeAccrued {
                    optionId: option_id,
                    asset,
                    payor,
                    amount,
                },
            ),
        }
    }
}

#[public]
impl OptionSettlementEngine {
    /// Registers an option type and returns its option id.
    ///
    /// The option id is the first 20 bytes of `keccak256(abi.encode(terms))`
    /// shifted into the high bits of a token id; identical terms always map to
    /// the same id, so registering them twice fails.
    ///
    /// # Errors
    /// - `DuplicateType`, `ExpiryTooSoon`, `WindowTooShort`, `SameAsset`,
    ///   `AmountCannotBeZero`, `IllegalAsset`
    pub fn new_option_type(&mut self, terms: OptionTerms) -> Result<U256, SettlementError> {
        engine::new_option_type(self, terms)
    }

    /// Writes `amount` contracts, locking `underlyingAmount * amount` plus fee.
    ///
    /// Pass an option id to open a new claim or a claim id you hold to add to
    /// it. Mints `amount` option tokens to the caller and returns the claim id.
    ///
    /// # Errors
    /// - `AmountCannotBeZero`, `InvalidOption`, `ExpiredOption`, `InvalidClaim`,
    ///   `CallerDoesNotOwnClaim`, `AlreadyRedeemed`, `AmountOverflow`, `TransferFailed`
    pub fn write(&mut self, token_id: U256, amount: u128) -> Result<U256, SettlementError> {
        let writer = self.vm().msg_sender();
        engine::write(self, writer, token_id, amount)
    }

    /// Exercises `amount` of the caller's option tokens.
    ///
    /// Pulls `exerciseAmount * amount` plus fee and sends `underlyingAmount * amount`.
    ///
    /// # Errors
    /// - `AmountCannotBeZero`, `InvalidOption`, `ExerciseTooEarly`, `ExpiredOption`,
    ///   `InsufficientOptions`, `NoCapacity`, `TransferFailed`
    pub fn exercise(&mut self, option_id: U256, amount: u128) -> Result<(), SettlementError> {
        let exerciser = self.vm().msg_sender();
        engine::exercise(self, exerciser, option_id, amount)
    }

    /// Redeems a claim after expiry.
    ///
    /// # Returns
    /// `(exercise_amount, underlying_amount)` paid to the caller
    ///
    /// # Errors
    /// - `InvalidClaim`, `CallerDoesNotOwnClaim`, `AlreadyRedeemed`, `ClaimTooSoon`,
    ///   `TransferFailed`
    pub fn redeem(&mut self, claim_id: U256) -> Result<(U256, U256), SettlementError> {
        let redeemer = self.vm().msg_sender();
        let settlement = engine::redeem(self, redeemer, claim_id)?;
        Ok((settlement.exercise_amount, settlement.underlying_amount))
    }

    /// Returns the terms of an option type.
    ///
    /// # Returns
    /// `(underlying_asset, underlying_amount, exercise_asset, exercise_amount,
    /// exercise_timestamp, expiry_timestamp)`
    pub fn option_terms(
        &self,
        option_id: U256,
    ) -> Result<(Address, u128, Address, u128, u64, u64), SettlementError> {
        let terms = engine::option(self, option_id)?;
        Ok((
            terms.underlyingAsset,
            terms.underlyingAmount,
            terms.exerciseAsset,
            terms.exerciseAmount,
            terms.exerciseTimestamp,
            terms.expiryTimestamp,
        ))
    }

    /// Returns `(option_id, amount_written, amount_exercised, redeemed)` for a claim.
    pub fn claim_info(&self, claim_id: U256) -> Result<(U256, u128, U256, bool), SettlementError> {
        let info = engine::claim(self, claim_id)?;
        Ok((
            info.option_id,
            info.amount_written,
            info.amount_exercised,
            info.redeemed,
        ))
    }

    /// Returns `(amount_written, amount_exercised, day)` of a bucket.
    pub fn bucket_info(
        &self,
        option_id: U256,
        index: U256,
    ) -> Result<(u128, u128, u64), SettlementError> {
        let index = usize::try_from(index).unwrap_or(usize::MAX);
        let bucket = engine::bucket(self, option_id, index)?;
        Ok((bucket.amount_written, bucket.amount_exercised, bucket.day))
    }

    /// Returns the number of buckets an option type has.
    pub fn buckets_len(&self, option_id: U256) -> Result<U256, SettlementError> {
        engine::option(self, option_id)?;
        Ok(U256::from(Ledger::bucket_count(self, token_id::decode(option_id).0)))
    }

    /// Returns `0` for unknown ids, `1` for option ids and `2` for claim ids.
    #[must_use]
    pub fn token_type(&self, token_id: U256) -> u8 {
        engine::token_type(self, token_id).to_u8()
    }

    /// ERC-1155 balance of `account` for token `id`.
    #[must_use]
    pub fn balance_of(&self, account: Address, id: U256) -> U256 {
        self.balances.getter(id).get(account)
    }

    /// Fees accrued in `asset` and not yet swept.
    #[must_use]
    pub fn accrued_fees(&self, asset: Address) -> U256 {
        self.fee_balances.get(asset)
    }
}
