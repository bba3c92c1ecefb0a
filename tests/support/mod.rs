#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, U256};
use leverkit::adapter::SimulatedRouter;
use leverkit::orchestrator::{DepositReceipt, WithdrawReceipt};
use leverkit::testkit::Fixture;

pub const SLIPPAGE: u32 = 100;

/// Router order buying debt for collateral, delivered to the withdraw flow.
pub fn withdraw_payload(fx: &Fixture, amount: U256) -> Bytes {
    SimulatedRouter::order(
        fx.collateral_token(),
        fx.debt_token(),
        amount,
        fx.withdraw_flow.address(),
    )
}

/// Router order buying collateral for debt, delivered to the deposit flow.
pub fn deposit_payload(fx: &Fixture, amount: U256) -> Bytes {
    SimulatedRouter::order(
        fx.debt_token(),
        fx.collateral_token(),
        amount,
        fx.deposit_flow.address(),
    )
}

/// Leveraged deposit of `assets` collateral already held by `user`.
pub fn leveraged_deposit(fx: &Fixture, user: Address, assets: U256) -> DepositReceipt {
    leveraged_deposit_with_slippage(fx, user, assets, SLIPPAGE)
}

pub fn leveraged_deposit_with_slippage(
    fx: &Fixture,
    user: Address,
    assets: U256,
    slippage_bps: u32,
) -> DepositReceipt {
    fx.approve_collateral(user, fx.deposit_flow.address(), assets);
    let quote = fx.deposit_flow.quote(assets, slippage_bps, &fx.vault).unwrap();
    fx.deposit_flow
        .deposit(
            user,
            assets,
            user,
            quote.expected_shares,
            slippage_bps,
            deposit_payload(fx, quote.swap_output),
            &fx.vault,
        )
        .unwrap()
}

/// Redeem all of `user`'s shares through the withdraw flow.
pub fn redeem_all(fx: &Fixture, user: Address) -> WithdrawReceipt {
    redeem_all_with_slippage(fx, user, SLIPPAGE)
}

pub fn redeem_all_with_slippage(fx: &Fixture, user: Address, slippage_bps: u32) -> WithdrawReceipt {
    let shares = fx.vault.balance_of(user);
    fx.approve_shares(user, fx.withdraw_flow.address(), shares);
    let quote = fx.withdraw_flow.quote(shares, slippage_bps, &fx.vault).unwrap();
    fx.withdraw_flow
        .redeem(
            user,
            shares,
            user,
            user,
            slippage_bps,
            quote.expected_collateral_out,
            withdraw_payload(fx, quote.swap_output),
            &fx.vault,
        )
        .unwrap()
}
