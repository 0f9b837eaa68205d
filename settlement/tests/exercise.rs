
use alloy_primitives::{Address, U256};
use motsu::prelude::*;
use option_settlement::{OptionSettlementEngine, OptionTerms, SettlementError};
use test_erc20::TestERC20;

const EXPIRY: u64 = 2_000_000_000;

/// Registers a WETH/USDC option, writes `amount` contracts as `writer` and
/// returns `(option_id, claim_id)`.
fn written(
    contract: &Contract<OptionSettlementEngine>,
    weth: &Contract<TestERC20>,
    usdc: &Contract<TestERC20>,
    writer: Address,
    amount: u128,
) -> (U256, U256) {
    let engine = contract.address();
    let funds = U256::from(1_000_000);
    weth.sender(writer).mint(writer, funds);
    weth.sender(writer).approve(engine, funds);
    usdc.sender(writer).mint(writer, funds);
    usdc.sender(writer).approve(engine, funds);

    let option_id = contract
        .sender(writer)
        .new_option_type(OptionTerms {
            underlyingAsset: weth.address(),
            underlyingAmount: 1_000,
            exerciseAsset: usdc.address(),
            exerciseAmount: 500,
            exerciseTimestamp: 0,
            expiryTimestamp: EXPIRY,
        })
        .unwrap();
    let claim_id = contract.sender(writer).write(option_id, amount).unwrap();
    (option_id, claim_id)
}

#[motsu::test]
fn writer_exercises_own_options(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let engine = contract.address();
    let (option_id, claim_id) = written(&contract, &weth, &usdc, writer, 10);

    contract.sender(writer).exercise(option_id, 4).unwrap();

    assert_eq!(
        contract.sender(writer).balance_of(writer, option_id),
        U256::from(6)
    );
    // Paid 4 * 500 plus fee, received 4 * 1_000.
    assert_eq!(usdc.sender(writer).balance_of(engine), U256::from(2_001));
    assert_eq!(weth.sender(writer).balance_of(engine), U256::from(6_005));
    assert_eq!(
        contract.sender(writer).accrued_fees(usdc.address()),
        U256::from(1)
    );

    let (written, exercised, _) = contract
        .sender(writer)
        .bucket_info(option_id, U256::ZERO)
        .unwrap();
    assert_eq!((written, exercised), (10, 4));

    let (_, _, claim_exercised, redeemed) = contract.sender(writer).claim_info(claim_id).unwrap();
    assert_eq!(claim_exercised, U256::from(4));
    assert!(!redeemed);
}

#[motsu::test]
fn exercise_everything_then_nothing_left(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let (option_id, _) = written(&contract, &weth, &usdc, writer, 3);

    contract.sender(writer).exercise(option_id, 3).unwrap();
    let result = contract.sender(writer).exercise(option_id, 1);

    assert!(matches!(
        result,
        Err(SettlementError::InsufficientOptions(_))
    ));
}

#[motsu::test]
fn exercise_more_than_held_fails(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let (option_id, _) = written(&contract, &weth, &usdc, writer, 10);

    let result = contract.sender(writer).exercise(option_id, 11);

    match result {
        Err(SettlementError::InsufficientOptions(err)) => {
            assert_eq!(err.held, U256::from(10));
            assert_eq!(err.requested, U256::from(11));
        }
        other => panic!("expected InsufficientOptions, got {other:?}"),
    }
}

#[motsu::test]
fn exercise_by_non_holder_fails(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let stranger = Address::from([0xCC; 20]);
    let (option_id, _) = written(&contract, &weth, &usdc, writer, 10);

    let result = contract.sender(stranger).exercise(option_id, 1);

    assert!(matches!(
        result,
        Err(SettlementError::InsufficientOptions(_))
    ));
}

#[motsu::test]
fn exercise_with_claim_id_fails(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let (_, claim_id) = written(&contract, &weth, &usdc, writer, 10);

    let result = contract.sender(writer).exercise(claim_id, 1);

    assert!(matches!(result, Err(SettlementError::InvalidOption(_))));
}

#[motsu::test]
fn redeem_before_expiry_fails(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let (_, claim_id) = written(&contract, &weth, &usdc, writer, 10);

    let result = contract.sender(writer).redeem(claim_id);

    match result {
        Err(SettlementError::ClaimTooSoon(err)) => {
            assert_eq!(err.claimId, claim_id);
            assert_eq!(err.expiry, EXPIRY);
        }
        other => panic!("expected ClaimTooSoon, got {other:?}"),
    }
}

#[motsu::test]
fn redeem_foreign_claim_fails(
    contract: Contract<OptionSettlementEngine>,
    weth: Contract<TestERC20>,
    usdc: Contract<TestERC20>,
) {
    let writer = Address::from([0xAA; 20]);
    let stranger = Address::from([0xCC; 20]);
    let (_, claim_id) = written(&contract, &weth, &usdc, writer, 10);

    let result = contract.sender(stranger).redeem(claim_id);

    assert!(matches!(
        result,
        Err(SettlementError::CallerDoesNotOwnClaim(_))
    ));
}
