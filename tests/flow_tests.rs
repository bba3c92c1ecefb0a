//! End-to-end deposit, withdraw and rebalance flows.

mod support;

use alloy_primitives::U256;
use leverkit::adapter::SimulatedRouter;
use leverkit::error::{Error, OrchestratorError, VaultError};
use leverkit::orchestrator::Phase;
use leverkit::testkit::Fixture;

use support::{deposit_payload, leveraged_deposit, redeem_all, SLIPPAGE};

#[test]
fn round_trip_returns_collateral_less_costs() {
    let fx = Fixture::new();
    let alice = fx.user_with_collateral("alice", 1);

    let deposit = leveraged_deposit(&fx, alice, fx.collateral(1));
    assert_eq!(deposit.shares, fx.collateral_milli(990));
    assert_eq!(fx.vault.current_leverage_bps().unwrap(), 30_000);

    let withdraw = redeem_all(&fx, alice);

    // 2.97 collateral less 1981.782 debt worth at 1000.
    let out = U256::from(988_218_000_000_000_000u64);
    assert_eq!(withdraw.collateral_out, out);
    assert_eq!(fx.collateral_balance(alice), out);
    assert_eq!(fx.debt_balance(alice), deposit.debt_refund);
    assert_eq!(fx.vault.total_supply(), U256::ZERO);
    assert!(fx.vault.position().unwrap().is_empty());

    for flow in [fx.deposit_flow.address(), fx.withdraw_flow.address()] {
        assert_eq!(fx.collateral_balance(flow), U256::ZERO);
        assert_eq!(fx.debt_balance(flow), U256::ZERO);
    }
    assert_eq!(fx.deposit_flow.phase(), Phase::Idle);
    assert_eq!(fx.withdraw_flow.phase(), Phase::Idle);
}

#[test]
fn second_depositor_does_not_dilute_the_first() {
    let fx = Fixture::new();
    let alice = fx.user_with_collateral("alice", 2);
    let bob = fx.user_with_collateral("bob", 1);

    leveraged_deposit(&fx, alice, fx.collateral(2));
    let alice_value = fx.vault.convert_to_assets(fx.vault.balance_of(alice)).unwrap();
    leveraged_deposit(&fx, bob, fx.collateral(1));

    assert!(fx.vault.convert_to_assets(fx.vault.balance_of(alice)).unwrap() >= alice_value);
    assert!(fx.vault.current_leverage_bps().unwrap().abs_diff(30_000) <= 1);
    assert_eq!(
        fx.vault.total_supply(),
        fx.vault.balance_of(alice) + fx.vault.balance_of(bob)
    );
}

#[test]
fn shares_go_to_a_separate_receiver() {
    let fx = Fixture::new();
    let alice = fx.user_with_collateral("alice", 1);
    let carol = fx.account("carol");
    fx.approve_collateral(alice, fx.deposit_flow.address(), fx.collateral(1));
    let q = fx.deposit_flow.quote(fx.collateral(1), SLIPPAGE, &fx.vault).unwrap();

    let receipt = fx
        .deposit_flow
        .deposit(
            alice,
            fx.collateral(1),
            carol,
            U256::ZERO,
            SLIPPAGE,
            deposit_payload(&fx, q.swap_output),
            &fx.vault,
        )
        .unwrap();

    assert_eq!(fx.vault.balance_of(carol), receipt.shares);
    assert_eq!(fx.vault.balance_of(alice), U256::ZERO);
    assert_eq!(fx.debt_balance(carol), receipt.debt_refund);
}

#[test]
fn redeem_is_blocked_until_the_vault_is_rebalanced() {
    let fx = Fixture::new();
    let alice = fx.user_with_collateral("alice", 1);
    leveraged_deposit(&fx, alice, fx.collateral(1));
    fx.set_collateral_price(850);
    assert!(fx.vault.is_too_imbalanced().unwrap());

    let shares = fx.vault.balance_of(alice);
    fx.approve_shares(alice, fx.withdraw_flow.address(), shares);
    let err = fx
        .withdraw_flow
        .redeem(
            alice,
            shares,
            alice,
            alice,
            SLIPPAGE,
            U256::ZERO,
            Default::default(),
            &fx.vault,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Vault(VaultError::TooImbalanced { .. })));

    let keeper = fx.account("keeper");
    let q = fx.decrease_flow.quote(SLIPPAGE, &fx.vault).unwrap();
    let payload = SimulatedRouter::order(
        q.swap_input_token,
        q.swap_output_token,
        q.swap_output,
        fx.decrease_flow.address(),
    );
    fx.decrease_flow
        .decrease_leverage(keeper, keeper, U256::ZERO, SLIPPAGE, payload, &fx.vault)
        .unwrap();
    assert!(!fx.vault.is_too_imbalanced().unwrap());

    let receipt = redeem_all(&fx, alice);
    assert!(!receipt.collateral_out.is_zero());
    assert_eq!(fx.vault.total_supply(), U256::ZERO);
}

#[test]
fn rising_price_is_rebalanced_upward() {
    let fx = Fixture::new();
    let alice = fx.user_with_collateral("alice", 2);
    leveraged_deposit(&fx, alice, fx.collateral(2));
    fx.set_collateral_price(1_300);
    let before = fx.vault.current_leverage_bps().unwrap();
    assert!(before < 25_000);

    let keeper = fx.account("keeper");
    let q = fx.increase_flow.quote(SLIPPAGE, &fx.vault).unwrap();
    let payload = SimulatedRouter::order(
        q.swap_input_token,
        q.swap_output_token,
        q.swap_output,
        fx.increase_flow.address(),
    );
    let receipt = fx
        .increase_flow
        .increase_leverage(keeper, keeper, U256::ZERO, SLIPPAGE, payload, &fx.vault)
        .unwrap();

    assert_eq!(receipt.leverage_before, before);
    assert!(receipt.leverage_after.abs_diff(30_000) <= 100);
    assert_eq!(fx.debt_balance(keeper), receipt.reward);
    assert!(matches!(
        fx.increase_flow.quote(SLIPPAGE, &fx.vault).unwrap_err(),
        Error::Orchestrator(OrchestratorError::LeverageWithinBounds { .. })
    ));
}
