use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};

use super::LeverageVault;
use crate::domain::math;
use crate::error::{Result, VaultError};

impl LeverageVault {
    /// Deposit `assets` of leveraged collateral from `caller` and mint shares
    /// to `receiver`.
    ///
    /// The vault supplies `assets`, borrows the debt that keeps leverage where
    /// it is (target for an empty vault) and sends that debt to `caller`.
    /// Shares are priced on the net value added.
    ///
    /// # Errors
    ///
    /// - [`VaultError::ZeroAmount`] / [`VaultError::DepositTooSmall`] for dust.
    /// - [`VaultError::TooImbalanced`] while leverage is out of bounds.
    /// - [`VaultError::ZeroShares`] if the deposit rounds to nothing.
    /// - [`VaultError::LeverageOutOfBounds`] if leverage ends up outside bounds.
    pub fn deposit(&self, caller: Address, assets: U256, receiver: Address) -> Result<U256> {
        let _entry = self.guard.enter("vault.deposit")?;

        self.ledger.transact(|| {
            if assets.is_zero() {
                return Err(VaultError::ZeroAmount { what: "assets" }.into());
            }
            if assets < self.config.min_deposit_assets {
                return Err(VaultError::DepositTooSmall {
                    assets,
                    minimum: self.config.min_deposit_assets,
                }
                .into());
            }
            self.ensure_balanced()?;

            let leverage = self.deposit_leverage_bps()?;
            let unleveraged = math::unleveraged_assets(assets, leverage)?;
            let shares = self.convert_to_shares(unleveraged)?;
            if shares.is_zero() {
                return Err(VaultError::ZeroShares.into());
            }
            let borrow = self.borrow_amount_keeping_leverage(assets, leverage)?;
            debug!(%assets, %unleveraged, %borrow, leverage, "Sizing deposit");

            let collateral = self.collateral.address;
            let pool = self.pool.address();
            self.ledger
                .transfer_from(collateral, self.address, caller, self.address, assets)?;
            self.ledger.approve(collateral, self.address, pool, assets)?;
            self.pool
                .supply(self.address, collateral, assets, self.address)?;

            if !borrow.is_zero() {
                self.pool
                    .borrow(self.address, self.debt.address, borrow, self.address)?;
                self.ledger
                    .transfer(self.debt.address, self.address, caller, borrow)?;
            }
            self.ledger.mint(self.address, receiver, shares)?;

            let after = self.check_leverage_within_bounds()?;
            info!(
                vault = %self.address,
                %caller,
                %receiver,
                %assets,
                %borrow,
                %shares,
                leverage = after,
                "Deposit"
            );
            Ok(shares)
        })
    }

    /// Burn `shares` of `owner`, repay their slice of debt out of `caller`'s
    /// funds and withdraw their slice of collateral to `receiver`.
    ///
    /// `caller` must hold and have approved the vault for the debt slice
    /// (see [`Self::preview_redeem_split`]). Returns the collateral withdrawn.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InsufficientShares`] when `owner` holds too few shares.
    /// - A token allowance error when `caller != owner` lacks share allowance.
    /// - [`VaultError::InsufficientRepayFunds`] when the debt slice is not
    ///   available to pull from `caller`.
    /// - [`VaultError::TooImbalanced`] while leverage is out of bounds.
    pub fn redeem(
        &self,
        caller: Address,
        shares: U256,
        receiver: Address,
        owner: Address,
    ) -> Result<U256> {
        let _entry = self.guard.enter("vault.redeem")?;

        self.ledger.transact(|| {
            if shares.is_zero() {
                return Err(VaultError::ZeroAmount { what: "shares" }.into());
            }
            self.ensure_balanced()?;

            let balance = self.balance_of(owner);
            if balance < shares {
                return Err(VaultError::InsufficientShares {
                    owner,
                    balance,
                    requested: shares,
                }
                .into());
            }
            if caller != owner {
                self.ledger
                    .spend_allowance(self.address, owner, caller, shares)?;
            }

            let split = self.preview_redeem_split(shares)?;
            self.ledger.burn(self.address, owner, shares)?;

            if !split.debt.is_zero() {
                let debt = self.debt.address;
                let available = self
                    .ledger
                    .balance_of(debt, caller)
                    .min(self.ledger.allowance(debt, caller, self.address));
                if available < split.debt {
                    warn!(%caller, %available, required = %split.debt, "Redeem repayment not supplied");
                    return Err(VaultError::InsufficientRepayFunds {
                        available,
                        required: split.debt,
                    }
                    .into());
                }
                let pool = self.pool.address();
                self.ledger
                    .transfer_from(debt, self.address, caller, self.address, split.debt)?;
                self.ledger.approve(debt, self.address, pool, split.debt)?;
                self.pool
                    .repay(self.address, debt, split.debt, self.address)?;
            }
            if !split.collateral.is_zero() {
                self.pool.withdraw(
                    self.address,
                    self.collateral.address,
                    split.collateral,
                    receiver,
                )?;
            }

            info!(
                vault = %self.address,
                %caller,
                %owner,
                %receiver,
                %shares,
                collateral = %split.collateral,
                debt = %split.debt,
                "Redeem"
            );
            Ok(split.collateral)
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use crate::error::{Error, TokenError, VaultError};
    use crate::testkit::Fixture;

    #[test]
    fn first_deposit_borrows_to_target() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 300);
        let shares = fx.vault.deposit(user, fx.collateral(300), user).unwrap();

        // 300 leveraged at 3x = 100 unleveraged.
        assert_eq!(shares, fx.collateral(100));
        assert_eq!(fx.vault.current_leverage_bps().unwrap(), 30_000);
        // 200 collateral worth of debt at 1000 per unit.
        assert_eq!(fx.debt_balance(user), fx.debt(200_000));
    }

    #[test]
    fn deposit_below_minimum_is_rejected() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 1);
        let err = fx.vault.deposit(user, U256::from(1u8), user).unwrap_err();
        assert!(matches!(err, Error::Vault(VaultError::DepositTooSmall { .. })));
    }

    #[test]
    fn redeem_without_repayment_funds_reverts() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 300);
        let shares = fx.vault.deposit(user, fx.collateral(300), user).unwrap();
        // The borrowed debt was never approved back to the vault.
        let err = fx.vault.redeem(user, shares, user, user).unwrap_err();
        assert!(matches!(
            err,
            Error::Vault(VaultError::InsufficientRepayFunds { .. })
        ));
        assert_eq!(fx.vault.balance_of(user), shares);
    }

    #[test]
    fn full_redeem_unwinds_the_position() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 300);
        let shares = fx.vault.deposit(user, fx.collateral(300), user).unwrap();
        fx.approve_debt(user, fx.vault.address(), U256::MAX);

        let withdrawn = fx.vault.redeem(user, shares, user, user).unwrap();
        assert_eq!(withdrawn, fx.collateral(300));
        assert!(fx.vault.position().unwrap().is_empty());
        assert_eq!(fx.vault.total_supply(), U256::ZERO);
        assert_eq!(fx.debt_balance(user), U256::ZERO);
    }

    #[test]
    fn redeem_for_another_owner_spends_allowance() {
        let fx = Fixture::new();
        let owner = fx.user_with_collateral("owner", 300);
        let operator = fx.ledger.new_address("operator");
        let shares = fx.vault.deposit(owner, fx.collateral(300), owner).unwrap();
        fx.ledger
            .transfer(fx.debt_token(), owner, operator, fx.debt(200_000))
            .unwrap();
        fx.approve_debt(operator, fx.vault.address(), U256::MAX);

        let err = fx.vault.redeem(operator, shares, operator, owner).unwrap_err();
        assert!(matches!(
            err,
            Error::Token(TokenError::InsufficientAllowance { .. })
        ));

        fx.ledger
            .approve(fx.vault.address(), owner, operator, shares)
            .unwrap();
        fx.vault.redeem(operator, shares, operator, owner).unwrap();
        assert_eq!(fx.collateral_balance(operator), fx.collateral(300));
        assert_eq!(fx.ledger.allowance(fx.vault.address(), owner, operator), U256::ZERO);
    }

    #[test]
    fn partial_redeem_keeps_leverage() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 300);
        let shares = fx.vault.deposit(user, fx.collateral(300), user).unwrap();
        fx.approve_debt(user, fx.vault.address(), U256::MAX);

        fx.vault.redeem(user, shares / U256::from(3u8), user, user).unwrap();
        let leverage = fx.vault.current_leverage_bps().unwrap();
        assert!((29_990..=30_010).contains(&leverage), "leverage {leverage}");
    }

    #[test]
    fn imbalanced_vault_closes_deposits_and_redemptions() {
        let fx = Fixture::new();
        let user = fx.user_with_collateral("alice", 600);
        let shares = fx.vault.deposit(user, fx.collateral(300), user).unwrap();
        // Collateral price drop pushes leverage above the upper bound.
        fx.set_collateral_price(850);
        assert!(fx.vault.is_too_imbalanced().unwrap());
        assert_eq!(fx.vault.max_deposit(user).unwrap(), U256::ZERO);
        assert_eq!(fx.vault.max_redeem(user).unwrap(), U256::ZERO);

        let err = fx.vault.deposit(user, fx.collateral(300), user).unwrap_err();
        assert!(matches!(err, Error::Vault(VaultError::TooImbalanced { .. })));
        fx.approve_debt(user, fx.vault.address(), U256::MAX);
        let err = fx.vault.redeem(user, shares, user, user).unwrap_err();
        assert!(matches!(err, Error::Vault(VaultError::TooImbalanced { .. })));
    }
}
