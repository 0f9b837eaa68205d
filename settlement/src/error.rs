use alloy_sol_types::sol;
use stylus_sdk::prelude::*;

sol! {
    /// Errors that can occur in the settlement engine.
    #[derive(Debug)]
    error AmountCannotBeZero();
    #[derive(Debug)]
    error AmountOverflow();
    #[derive(Debug)]
    error SameAsset(address asset);
    #[derive(Debug)]
    error IllegalAsset(address asset, uint256 totalSupply, uint256 perContractAmount);
    #[derive(Debug)]
    error DuplicateType(uint256 optionId);
    #[derive(Debug)]
    error ExpiryTooSoon(uint256 optionId, uint64 expiry);
    #[derive(Debug)]
    error WindowTooShort(uint256 optionId, uint64 exerciseTimestamp, uint64 expiry);
    #[derive(Debug)]
    error InvalidOption(uint256 tokenId);
    #[derive(Debug)]
    error InvalidClaim(uint256 tokenId);
    #[derive(Debug)]
    error BucketOutOfRange(uint256 optionId, uint256 index);
    #[derive(Debug)]
    error CallerDoesNotOwnClaim(uint256 claimId);
    #[derive(Debug)]
    error AlreadyRedeemed(uint256 claimId);
    #[derive(Debug)]
    error InsufficientOptions(uint256 optionId, uint256 held, uint256 requested);
    #[derive(Debug)]
    error ExerciseTooEarly(uint256 optionId, uint64 exerciseTimestamp);
    #[derive(Debug)]
    error ExpiredOption(uint256 optionId, uint64 expiry);
    #[derive(Debug)]
    error ClaimTooSoon(uint256 claimId, uint64 expiry);
    #[derive(Debug)]
    error NoCapacity(uint256 optionId, uint256 requested, uint256 available);
    #[derive(Debug)]
    error TransferFailed(address asset, address from, address to, uint256 amount);
}

#[derive(SolidityError, Debug)]
pub enum SettlementError {
    /// Written, exercised or per-contract amount is zero.
    AmountCannotBeZero(AmountCannotBeZero),
    /// Checked arithmetic on amounts overflowed.
    AmountOverflow(AmountOverflow),
    /// Underlying and exercise asset are the same address.
    SameAsset(SameAsset),
    /// Asset supply can never cover the per-contract amount.
    IllegalAsset(IllegalAsset),
    /// An option type with identical terms already exists.
    DuplicateType(DuplicateType),
    /// Expiry is less than the minimum notice away.
    ExpiryTooSoon(ExpiryTooSoon),
    /// Exercise window is shorter than the minimum.
    WindowTooShort(WindowTooShort),
    /// Token id does not name a registered option type.
    InvalidOption(InvalidOption),
    /// Token id does not name an existing claim.
    InvalidClaim(InvalidClaim),
    /// Bucket index past the end of the option type's buckets.
    BucketOutOfRange(BucketOutOfRange),
    /// Caller does not hold the claim token.
    CallerDoesNotOwnClaim(CallerDoesNotOwnClaim),
    /// Claim was already redeemed.
    AlreadyRedeemed(AlreadyRedeemed),
    /// Caller holds fewer option tokens than requested.
    InsufficientOptions(InsufficientOptions),
    /// Exercise window has not opened yet.
    ExerciseTooEarly(ExerciseTooEarly),
    /// Option type has expired.
    ExpiredOption(ExpiredOption),
    /// Claim cannot be redeemed before expiry.
    ClaimTooSoon(ClaimTooSoon),
    /// Not enough unexercised contracts to absorb an exercise.
    NoCapacity(NoCapacity),
    /// An asset rejected a transfer.
    TransferFailed(TransferFailed),
}

/// Coarse classification of [`SettlementError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input.
    Validation,
    /// Ledger state forbids the operation.
    State,
    /// Operation attempted outside its time window.
    Temporal,
    /// Exercise volume exceeds unexercised capacity.
    Capacity,
    /// An asset collaborator rejected a transfer.
    Transfer,
}

impl SettlementError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AmountCannotBeZero(_)
            | Self::AmountOverflow(_)
            | Self::SameAsset(_)
            | Self::IllegalAsset(_)
            | Self::BucketOutOfRange(_) => ErrorKind::Validation,
            Self::DuplicateType(_)
            | Self::InvalidOption(_)
            | Self::InvalidClaim(_)
            | Self::CallerDoesNotOwnClaim(_)
            | Self::AlreadyRedeemed(_)
            | Self::InsufficientOptions(_) => ErrorKind::State,
            Self::ExpiryTooSoon(_)
            | Self::WindowTooShort(_)
            | Self::ExerciseTooEarly(_)
            | Self::ExpiredOption(_)
            | Self::ClaimTooSoon(_) => ErrorKind::Temporal,
            Self::NoCapacity(_) => ErrorKind::Capacity,
            Self::TransferFailed(_) => ErrorKind::Transfer,
        }
    }

    pub(crate) const fn overflow() -> Self {
        Self::AmountOverflow(AmountOverflow {})
    }
}
