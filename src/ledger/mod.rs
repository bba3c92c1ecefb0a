//! In-memory token ledger with call-frame rollback.
//!
//! The ledger is the single source of mutable on-chain state: every token
//! balance, allowance and supply, including the vault's share token and the
//! lending pool's supply/debt receipt tokens. [`Ledger::transact`] snapshots the
//! whole state before running a closure and restores it when the closure
//! returns an error, so nested calls behave like EVM call frames: a revert
//! anywhere unwinds everything done inside that frame.

mod guard;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloy_primitives::{keccak256, Address, U256};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::TokenInfo;
use crate::error::{Result, TokenError};

pub use guard::{EntryGuard, ReentrancyGuard};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    tokens: HashMap<Address, TokenInfo>,
    balances: HashMap<(Address, Address), U256>,
    supplies: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
}

impl LedgerState {
    fn ensure_token(&self, token: Address) -> Result<()> {
        if self.tokens.contains_key(&token) {
            Ok(())
        } else {
            Err(TokenError::UnknownToken { token }.into())
        }
    }

    fn balance(&self, token: Address, account: Address) -> U256 {
        self.balances
            .get(&(token, account))
            .copied()
            .unwrap_or_default()
    }

    fn debit(&mut self, token: Address, account: Address, amount: U256) -> Result<()> {
        let balance = self.balance(token, account);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                token,
                account,
                balance,
                needed: amount,
            }
            .into());
        }
        self.balances.insert((token, account), balance - amount);
        Ok(())
    }

    fn credit(&mut self, token: Address, account: Address, amount: U256) {
        let entry = self.balances.entry((token, account)).or_default();
        // Bounded by total supply, which is overflow-checked on mint.
        *entry = entry.saturating_add(amount);
    }
}

/// Shared token ledger.
#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
    nonce: AtomicU64,
    depth: AtomicUsize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a fresh, unique address. Addresses are never reused, even when
    /// the frame that allocated one reverts.
    pub fn new_address(&self, label: &str) -> Address {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let hash = keccak256(format!("{label}:{nonce}").as_bytes());
        Address::from_slice(&hash[12..])
    }

    /// Register token metadata at a fresh address.
    pub fn create_token(&self, symbol: &str, decimals: u8) -> Result<Address> {
        let address = self.new_address(symbol);
        self.register_token(TokenInfo::new(address, symbol, decimals))?;
        Ok(address)
    }

    /// Register token metadata at a known address (e.g. a vault's share token).
    pub fn register_token(&self, info: TokenInfo) -> Result<()> {
        let mut state = self.state.lock();
        if state.tokens.contains_key(&info.address) {
            return Err(TokenError::AlreadyRegistered {
                token: info.address,
            }
            .into());
        }
        debug!(token = %info.address, symbol = %info.symbol, decimals = info.decimals, "Registered token");
        state.tokens.insert(info.address, info);
        Ok(())
    }

    pub fn token(&self, token: Address) -> Result<TokenInfo> {
        self.state
            .lock()
            .tokens
            .get(&token)
            .cloned()
            .ok_or_else(|| TokenError::UnknownToken { token }.into())
    }

    pub fn balance_of(&self, token: Address, account: Address) -> U256 {
        self.state.lock().balance(token, account)
    }

    pub fn total_supply(&self, token: Address) -> U256 {
        self.state
            .lock()
            .supplies
            .get(&token)
            .copied()
            .unwrap_or_default()
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn mint(&self, token: Address, to: Address, amount: U256) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_token(token)?;
        let supply = state.supplies.get(&token).copied().unwrap_or_default();
        let supply = supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { token, amount })?;
        state.supplies.insert(token, supply);
        state.credit(token, to, amount);
        trace!(%token, %to, %amount, "mint");
        Ok(())
    }

    pub fn burn(&self, token: Address, from: Address, amount: U256) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_token(token)?;
        state.debit(token, from, amount)?;
        let supply = state.supplies.get(&token).copied().unwrap_or_default();
        state.supplies.insert(token, supply.saturating_sub(amount));
        trace!(%token, %from, %amount, "burn");
        Ok(())
    }

    /// Move `amount` of `token` out of `from`'s own balance.
    pub fn transfer(&self, token: Address, from: Address, to: Address, amount: U256) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_token(token)?;
        state.debit(token, from, amount)?;
        state.credit(token, to, amount);
        trace!(%token, %from, %to, %amount, "transfer");
        Ok(())
    }

    /// Set `spender`'s allowance over `owner`'s `token` to exactly `amount`.
    pub fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_token(token)?;
        if amount.is_zero() {
            state.allowances.remove(&(token, owner, spender));
        } else {
            state.allowances.insert((token, owner, spender), amount);
        }
        trace!(%token, %owner, %spender, %amount, "approve");
        Ok(())
    }

    /// Consume `amount` of `spender`'s allowance over `owner`. `U256::MAX`
    /// allowances are never decremented.
    pub fn spend_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) -> Result<()> {
        let mut state = self.state.lock();
        Self::spend_allowance_locked(&mut state, token, owner, spender, amount)
    }

    fn spend_allowance_locked(
        state: &mut LedgerState,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        let key = (token, owner, spender);
        let allowance = state.allowances.get(&key).copied().unwrap_or_default();
        if allowance == U256::MAX {
            return Ok(());
        }
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                token,
                owner,
                spender,
                allowance,
                needed: amount,
            }
            .into());
        }
        let remaining = allowance - amount;
        if remaining.is_zero() {
            state.allowances.remove(&key);
        } else {
            state.allowances.insert(key, remaining);
        }
        Ok(())
    }

    /// Move `amount` from `from` to `to` on the authority of `spender`'s allowance.
    pub fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_token(token)?;
        if spender != from {
            Self::spend_allowance_locked(&mut state, token, from, spender, amount)?;
        }
        state.debit(token, from, amount)?;
        state.credit(token, to, amount);
        trace!(%token, %spender, %from, %to, %amount, "transfer_from");
        Ok(())
    }

    /// Run `f` as one call frame: on `Err`, every ledger mutation made inside
    /// the frame (including nested frames) is discarded.
    pub fn transact<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let snapshot = self.state.lock().clone();
        let depth = self.depth.fetch_add(1, Ordering::Relaxed);
        let outcome = f();
        self.depth.fetch_sub(1, Ordering::Relaxed);

        if let Err(err) = &outcome {
            *self.state.lock() = snapshot;
            debug!(depth, error = %err, "Reverted call frame");
        }
        outcome
    }

    /// Current call-frame nesting depth; zero outside any transaction.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}
