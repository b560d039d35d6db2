//! Copy-on-write account and delegate state.
//!
//! Both states are persistent maps, so `track()` is an O(1) clone. A tracked
//! copy is mutated freely during execution and either dropped or handed back
//! to [`Ledger::commit_block`](crate::Ledger::commit_block), which refuses it
//! if the chain moved past the height it was tracked at.

use im::OrdMap;
use kestrel_types::{Account, Address, Delegate, TransactionError};

/// Balances and nonces, as of `base_height`.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    base_height: u64,
    accounts: OrdMap<Address, Account>,
}

impl AccountState {
    pub fn new(base_height: u64) -> Self {
        Self {
            base_height,
            accounts: OrdMap::new(),
        }
    }

    /// Height of the block this snapshot reflects.
    pub fn base_height(&self) -> u64 {
        self.base_height
    }

    pub(crate) fn advance_to(&mut self, height: u64) {
        self.base_height = height;
    }

    /// Independent copy for speculative execution.
    pub fn track(&self) -> Self {
        self.clone()
    }

    pub fn account(&self, address: &Address) -> Account {
        self.accounts.get(address).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, address: &Address, amount: u64) -> Result<(), TransactionError> {
        let mut account = self.account(address);
        account.available = account
            .available
            .checked_add(amount)
            .ok_or(TransactionError::Overflow)?;
        self.accounts.insert(*address, account);
        Ok(())
    }

    pub fn debit(&mut self, address: &Address, amount: u64) -> Result<(), TransactionError> {
        let mut account = self.account(address);
        account.available = account
            .available
            .checked_sub(amount)
            .ok_or(TransactionError::InsufficientAvailable)?;
        self.accounts.insert(*address, account);
        Ok(())
    }

    /// Move `amount` from available to locked.
    pub fn lock(&mut self, address: &Address, amount: u64) -> Result<(), TransactionError> {
        let mut account = self.account(address);
        account.available = account
            .available
            .checked_sub(amount)
            .ok_or(TransactionError::InsufficientAvailable)?;
        account.locked = account
            .locked
            .checked_add(amount)
            .ok_or(TransactionError::Overflow)?;
        self.accounts.insert(*address, account);
        Ok(())
    }

    /// Move `amount` from locked back to available.
    pub fn unlock(&mut self, address: &Address, amount: u64) -> Result<(), TransactionError> {
        let mut account = self.account(address);
        account.locked = account
            .locked
            .checked_sub(amount)
            .ok_or(TransactionError::InsufficientLocked)?;
        account.available = account
            .available
            .checked_add(amount)
            .ok_or(TransactionError::Overflow)?;
        self.accounts.insert(*address, account);
        Ok(())
    }

    pub fn increase_nonce(&mut self, address: &Address) {
        let mut account = self.account(address);
        account.nonce += 1;
        self.accounts.insert(*address, account);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Registered delegates and the votes cast for them, as of `base_height`.
#[derive(Debug, Clone, Default)]
pub struct DelegateState {
    base_height: u64,
    delegates: OrdMap<Address, Delegate>,
    names: OrdMap<Vec<u8>, Address>,
    /// (voter, delegate) -> amount
    votes: OrdMap<(Address, Address), u64>,
}

impl DelegateState {
    pub fn new(base_height: u64) -> Self {
        Self {
            base_height,
            ..Self::default()
        }
    }

    pub fn base_height(&self) -> u64 {
        self.base_height
    }

    pub(crate) fn advance_to(&mut self, height: u64) {
        self.base_height = height;
    }

    pub fn track(&self) -> Self {
        self.clone()
    }

    pub fn get(&self, address: &Address) -> Option<&Delegate> {
        self.delegates.get(address)
    }

    /// Register `address` under `name`. Fails if either is already taken.
    pub fn register(
        &mut self,
        address: Address,
        name: Vec<u8>,
        height: u64,
    ) -> Result<(), TransactionError> {
        if self.delegates.contains_key(&address) || self.names.contains_key(&name) {
            return Err(TransactionError::AlreadyDelegate);
        }
        self.names.insert(name.clone(), address);
        self.delegates
            .insert(address, Delegate::new(address, name, height));
        Ok(())
    }

    pub fn vote(
        &mut self,
        voter: Address,
        delegate: Address,
        amount: u64,
    ) -> Result<(), TransactionError> {
        let mut record = self
            .delegates
            .get(&delegate)
            .cloned()
            .ok_or(TransactionError::NotDelegate)?;
        record.votes = record
            .votes
            .checked_add(amount)
            .ok_or(TransactionError::Overflow)?;
        let cast = self.vote_of(&voter, &delegate) + amount;
        self.votes.insert((voter, delegate), cast);
        self.delegates.insert(delegate, record);
        Ok(())
    }

    pub fn unvote(
        &mut self,
        voter: Address,
        delegate: Address,
        amount: u64,
    ) -> Result<(), TransactionError> {
        let mut record = self
            .delegates
            .get(&delegate)
            .cloned()
            .ok_or(TransactionError::NotDelegate)?;
        let cast = self
            .vote_of(&voter, &delegate)
            .checked_sub(amount)
            .ok_or(TransactionError::InsufficientLocked)?;
        record.votes = record.votes.saturating_sub(amount);
        if cast == 0 {
            self.votes.remove(&(voter, delegate));
        } else {
            self.votes.insert((voter, delegate), cast);
        }
        self.delegates.insert(delegate, record);
        Ok(())
    }

    /// Amount `voter` has cast for `delegate`.
    pub fn vote_of(&self, voter: &Address, delegate: &Address) -> u64 {
        self.votes.get(&(*voter, *delegate)).copied().unwrap_or(0)
    }

    /// All delegates, most votes first; ties broken by address.
    pub fn ranked(&self) -> Vec<Delegate> {
        let mut delegates: Vec<Delegate> = self.delegates.values().cloned().collect();
        delegates.sort_by(|a, b| b.votes.cmp(&a.votes).then(a.address.cmp(&b.address)));
        delegates
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    #[test]
    fn test_tracked_copy_is_independent() {
        let mut base = AccountState::new(3);
        base.credit(&addr(1), 100).unwrap();

        let mut tracked = base.track();
        tracked.debit(&addr(1), 40).unwrap();

        assert_eq!(base.account(&addr(1)).available, 100);
        assert_eq!(tracked.account(&addr(1)).available, 60);
        assert_eq!(tracked.base_height(), 3);
    }

    #[test]
    fn test_debit_and_lock_checks_balance() {
        let mut state = AccountState::new(0);
        state.credit(&addr(1), 10).unwrap();

        assert_eq!(
            state.debit(&addr(1), 11),
            Err(TransactionError::InsufficientAvailable)
        );
        state.lock(&addr(1), 4).unwrap();
        assert_eq!(state.account(&addr(1)).locked, 4);
        assert_eq!(
            state.unlock(&addr(1), 5),
            Err(TransactionError::InsufficientLocked)
        );
        state.unlock(&addr(1), 4).unwrap();
        assert_eq!(state.account(&addr(1)).available, 10);
    }

    #[test]
    fn test_register_rejects_taken_name_or_address() {
        let mut state = DelegateState::new(0);
        state.register(addr(1), b"alice".to_vec(), 1).unwrap();

        assert_eq!(
            state.register(addr(1), b"bob".to_vec(), 2),
            Err(TransactionError::AlreadyDelegate)
        );
        assert_eq!(
            state.register(addr(2), b"alice".to_vec(), 2),
            Err(TransactionError::AlreadyDelegate)
        );
    }

    #[test]
    fn test_ranking_by_votes_then_address() {
        let mut state = DelegateState::new(0);
        state.register(addr(3), b"carol".to_vec(), 0).unwrap();
        state.register(addr(1), b"alice".to_vec(), 0).unwrap();
        state.register(addr(2), b"bob".to_vec(), 0).unwrap();
        state.vote(addr(9), addr(2), 50).unwrap();

        let order: Vec<Address> = state.ranked().iter().map(|d| d.address).collect();
        assert_eq!(order, vec![addr(2), addr(1), addr(3)]);

        state.unvote(addr(9), addr(2), 50).unwrap();
        assert_eq!(state.vote_of(&addr(9), &addr(2)), 0);
        assert_eq!(
            state.unvote(addr(9), addr(2), 1),
            Err(TransactionError::InsufficientLocked)
        );
    }
}
