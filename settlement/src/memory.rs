//! In-memory host for deterministic replay of settlement event sequences.

use alloc::{collections::BTreeMap, vec::Vec};
use alloy_primitives::{aliases::U160, Address, U256};

use crate::engine;
use crate::error::{SettlementError, TransferFailed};
use crate::host::{Assets, Balances, Clock, Events, Ledger, SettlementEvent};
use crate::ledger::{Bucket, ClaimIndex, ClaimState, Settlement};
use crate::terms::{OptionState, OptionTerms};

/// ERC-20 style balances for every asset the engine touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryAssets {
    balances: BTreeMap<(Address, Address), U256>,
    supplies: BTreeMap<Address, U256>,
}

impl MemoryAssets {
    pub fn mint(&mut self, asset: Address, to: Address, amount: U256) {
        let balance = self.balance_of(asset, to);
        self.balances.insert((asset, to), balance + amount);
        let supply = self.supplies.get(&asset).copied().unwrap_or(U256::ZERO);
        self.supplies.insert(asset, supply + amount);
    }

    #[must_use]
    pub fn balance_of(&self, asset: Address, account: Address) -> U256 {
        self.balances
            .get(&(asset, account))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    #[must_use]
    pub fn total_supply(&self, asset: Address) -> U256 {
        self.supplies.get(&asset).copied().unwrap_or(U256::ZERO)
    }

    pub fn transfer(
        &mut self,
        asset: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        let sender_balance = self.balance_of(asset, from);

        if sender_balance < amount {
            return Err(SettlementError::TransferFailed(TransferFailed {
                asset,
                from,
                to,
                amount,
            }));
        }

        self.balances.insert((asset, from), sender_balance - amount);
        let recipient_balance = self.balance_of(asset, to);
        self.balances.insert((asset, to), recipient_balance + amount);
        Ok(())
    }
}

/// Engine state plus every collaborator, held in memory.
///
/// Operations run through [`MemoryHost::atomic`], which restores the previous
/// state when an operation fails, the way a reverted transaction would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryHost {
    address: Address,
    now: u64,
    options: BTreeMap<U160, OptionState>,
    buckets: BTreeMap<U160, Vec<Bucket>>,
    claims: BTreeMap<U256, ClaimState>,
    claim_indices: BTreeMap<U256, Vec<ClaimIndex>>,
    fee_balances: BTreeMap<Address, U256>,
    tokens: BTreeMap<(U256, Address), U256>,
    events: Vec<SettlementEvent>,
    pub assets: MemoryAssets,
}

impl MemoryHost {
    /// Creates an empty engine holding assets at `address`, with the clock at `now`.
    #[must_use]
    pub fn new(address: Address, now: u64) -> Self {
        Self {
            address,
            now,
            options: BTreeMap::new(),
            buckets: BTreeMap::new(),
            claims: BTreeMap::new(),
            claim_indices: BTreeMap::new(),
            fee_balances: BTreeMap::new(),
            tokens: BTreeMap::new(),
            events: Vec::new(),
            assets: MemoryAssets::default(),
        }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    pub fn set_now(&mut self, now: u64) {
        debug_assert!(now >= self.now, "clock must not run backwards");
        self.now = now;
    }

    pub fn advance(&mut self, seconds: u64) {
        self.now = self.now.saturating_add(seconds);
    }

    #[must_use]
    pub fn events(&self) -> &[SettlementEvent] {
        &self.events
    }

    /// Runs `op`, rolling every change back if it fails.
    ///
    /// Costs one clone of the ledger and asset state per call. The event
    /// journal is append-only, so it is truncated instead of copied.
    pub fn atomic<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, SettlementError>,
    ) -> Result<T, SettlementError> {
        let journal = core::mem::take(&mut self.events);
        let mark = journal.len();
        let snapshot = self.clone();
        self.events = journal;

        let result = op(self);
        if result.is_err() {
            let mut journal = core::mem::take(&mut self.events);
            journal.truncate(mark);
            *self = snapshot;
            self.events = journal;
        }
        result
    }

    pub fn new_option_type(&mut self, terms: OptionTerms) -> Result<U256, SettlementError> {
        self.atomic(|host| engine::new_option_type(host, terms))
    }

    pub fn write(
        &mut self,
        writer: Address,
        token_id: U256,
        amount: u128,
    ) -> Result<U256, SettlementError> {
        self.atomic(|host| engine::write(host, writer, token_id, amount))
    }

    pub fn exercise(
        &mut self,
        exerciser: Address,
        option_id: U256,
        amount: u128,
    ) -> Result<(), SettlementError> {
        self.atomic(|host| engine::exercise(host, exerciser, option_id, amount))
    }

    pub fn redeem(
        &mut self,
        redeemer: Address,
        claim_id: U256,
    ) -> Result<Settlement, SettlementError> {
        self.atomic(|host| engine::redeem(host, redeemer, claim_id))
    }
}

impl Ledger for MemoryHost {
    fn option(&self, key: U160) -> Option<OptionState> {
        self.options.get(&key).copied()
    }

    fn insert_option(&mut self, key: U160, state: OptionState) {
        self.options.insert(key, state);
    }

    fn set_next_claim_key(&mut self, key: U160, next: u128) {
        if let Some(state) = self.options.get_mut(&key) {
            state.next_claim_key = next;
        }
    }

    fn set_settlement_seed(&mut self, key: U160, seed: U256) {
        if let Some(state) = self.options.get_mut(&key) {
            state.settlement_seed = seed;
        }
    }

    fn bucket_count(&self, key: U160) -> usize {
        self.buckets.get(&key).map_or(0, Vec::len)
    }

    fn bucket(&self, key: U160, index: usize) -> Option<Bucket> {
        self.buckets.get(&key)?.get(index).copied()
    }

    fn push_bucket(&mut self, key: U160, bucket: Bucket) {
        self.buckets.entry(key).or_default().push(bucket);
    }

    fn set_bucket(&mut self, key: U160, index: usize, bucket: Bucket) {
        if let Some(slot) = self.buckets.get_mut(&key).and_then(|b| b.get_mut(index)) {
            *slot = bucket;
        }
    }

    fn claim(&self, claim_id: U256) -> Option<ClaimState> {
        self.claims.get(&claim_id).copied()
    }

    fn set_claim(&mut self, claim_id: U256, claim: ClaimState) {
        self.claims.insert(claim_id, claim);
    }

    fn claim_index_count(&self, claim_id: U256) -> usize {
        self.claim_indices.get(&claim_id).map_or(0, Vec::len)
    }

    fn claim_index(&self, claim_id: U256, position: usize) -> Option<ClaimIndex> {
        self.claim_indices.get(&claim_id)?.get(position).copied()
    }

    fn push_claim_index(&mut self, claim_id: U256, entry: ClaimIndex) {
        self.claim_indices.entry(claim_id).or_default().push(entry);
    }

    fn set_claim_index(&mut self, claim_id: U256, position: usize, entry: ClaimIndex) {
        if let Some(slot) = self
            .claim_indices
            .get_mut(&claim_id)
            .and_then(|entries| entries.get_mut(position))
        {
            *slot = entry;
        }
    }

    fn fee_balance(&self, asset: Address) -> U256 {
        self.fee_balances.get(&asset).copied().unwrap_or(U256::ZERO)
    }

    fn set_fee_balance(&mut self, asset: Address, amount: U256) {
        self.fee_balances.insert(asset, amount);
    }
}

impl Balances for MemoryHost {
    fn balance_of(&self, owner: Address, token_id: U256) -> U256 {
        self.tokens
            .get(&(token_id, owner))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn mint(&mut self, owner: Address, token_id: U256, amount: U256) {
        let balance = self.balance_of(owner, token_id);
        self.tokens.insert((token_id, owner), balance + amount);
    }

    fn burn(&mut self, owner: Address, token_id: U256, amount: U256) {
        let balance = self.balance_of(owner, token_id);
        self.tokens
            .insert((token_id, owner), balance.saturating_sub(amount));
    }
}

impl Assets for MemoryHost {
    fn transfer_in(
        &mut self,
        asset: Address,
        from: Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        let engine = self.address;
        self.assets.transfer(asset, from, engine, amount)
    }

    fn transfer_out(
        &mut self,
        asset: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        let engine = self.address;
        self.assets.transfer(asset, engine, to, amount)
    }

    fn total_supply(&self, asset: Address) -> Result<U256, SettlementError> {
        Ok(self.assets.total_supply(asset))
    }
}

impl Clock for MemoryHost {
    fn now(&self) -> u64 {
        self.now
    }
}

impl Events for MemoryHost {
    fn emit(&mut self, event: SettlementEvent) {
        self.events.push(event);
    }
}
