//! Transaction execution.

use crate::{AccountState, ChainConfig, DelegateState};
use kestrel_types::{
    Delegate, Transaction, TransactionError, TransactionResult, TransactionType,
};
use tracing::trace;

/// Deterministic state transition over tracked snapshots.
///
/// Implementations must not touch anything but the two states passed in, so
/// that every node executing the same transactions on the same snapshots
/// produces identical results.
pub trait TransactionExecutor: Send + Sync {
    /// Execute `transactions` in order for the block at `height`.
    fn execute(
        &self,
        transactions: &[Transaction],
        accounts: &mut AccountState,
        delegates: &mut DelegateState,
        height: u64,
    ) -> Vec<TransactionResult>;
}

/// Reference executor for transfers and delegate voting.
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    min_fee: u64,
    delegate_burn_amount: u64,
}

impl TransferExecutor {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            min_fee: config.min_transaction_fee,
            delegate_burn_amount: config.delegate_burn_amount,
        }
    }

    fn apply(
        &self,
        tx: &Transaction,
        accounts: &mut AccountState,
        delegates: &mut DelegateState,
        height: u64,
    ) -> Result<(), TransactionError> {
        let from = tx.from();
        if tx.nonce != accounts.account(&from).nonce {
            return Err(TransactionError::InvalidNonce);
        }
        if tx.fee < self.min_fee {
            return Err(TransactionError::FeeTooLow);
        }

        match tx.kind {
            TransactionType::Transfer => {
                let total = tx.value.checked_add(tx.fee).ok_or(TransactionError::Overflow)?;
                accounts.debit(&from, total)?;
                accounts.credit(&tx.to, tx.value)?;
            }
            TransactionType::Delegate => {
                if !Delegate::is_valid_name(&tx.data) || tx.value != self.delegate_burn_amount {
                    return Err(TransactionError::InvalidDelegateName);
                }
                let total = tx.value.checked_add(tx.fee).ok_or(TransactionError::Overflow)?;
                accounts.debit(&from, total)?;
                delegates.register(from, tx.data.clone(), height)?;
            }
            TransactionType::Vote => {
                accounts.debit(&from, tx.fee)?;
                accounts.lock(&from, tx.value)?;
                delegates.vote(from, tx.to, tx.value)?;
            }
            TransactionType::Unvote => {
                delegates.unvote(from, tx.to, tx.value)?;
                accounts.unlock(&from, tx.value)?;
                accounts.debit(&from, tx.fee)?;
            }
        }

        accounts.increase_nonce(&from);
        Ok(())
    }
}

impl TransactionExecutor for TransferExecutor {
    fn execute(
        &self,
        transactions: &[Transaction],
        accounts: &mut AccountState,
        delegates: &mut DelegateState,
        height: u64,
    ) -> Vec<TransactionResult> {
        transactions
            .iter()
            .map(|tx| {
                // Failed transactions must leave no partial effects.
                let (accounts_before, delegates_before) = (accounts.track(), delegates.track());
                match self.apply(tx, accounts, delegates, height) {
                    Ok(()) => TransactionResult::success(),
                    Err(error) => {
                        trace!(tx = ?tx.hash, %error, "Transaction failed");
                        *accounts = accounts_before;
                        *delegates = delegates_before;
                        TransactionResult::failure(error)
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::{Address, KeyPair};

    const FEE: u64 = 10;

    fn config() -> ChainConfig {
        ChainConfig::default()
            .with_min_transaction_fee(FEE)
            .with_delegate_burn_amount(1_000)
    }

    fn tx(key: &KeyPair, kind: TransactionType, to: Address, value: u64, nonce: u64) -> Transaction {
        tx_with_data(key, kind, to, value, nonce, Vec::new())
    }

    fn tx_with_data(
        key: &KeyPair,
        kind: TransactionType,
        to: Address,
        value: u64,
        nonce: u64,
        data: Vec<u8>,
    ) -> Transaction {
        Transaction::new(key, kind, to, value, FEE, nonce, 1, data)
    }

    fn funded(key: &KeyPair, amount: u64) -> (AccountState, DelegateState) {
        let mut accounts = AccountState::new(0);
        accounts.credit(&key.address(), amount).unwrap();
        (accounts, DelegateState::new(0))
    }

    #[test]
    fn test_transfer_moves_value_and_fee() {
        let alice = KeyPair::from_seed(&[1u8; 32]);
        let bob = Address([2u8; 20]);
        let (mut accounts, mut delegates) = funded(&alice, 1_000);

        let results = TransferExecutor::new(&config()).execute(
            &[tx(&alice, TransactionType::Transfer, bob, 100, 0)],
            &mut accounts,
            &mut delegates,
            1,
        );

        assert_eq!(results, vec![TransactionResult::success()]);
        assert_eq!(accounts.account(&alice.address()).available, 890);
        assert_eq!(accounts.account(&alice.address()).nonce, 1);
        assert_eq!(accounts.account(&bob).available, 100);
    }

    #[test]
    fn test_failed_transaction_leaves_state_untouched() {
        let alice = KeyPair::from_seed(&[1u8; 32]);
        let bob = Address([2u8; 20]);
        let (mut accounts, mut delegates) = funded(&alice, 50);

        let results = TransferExecutor::new(&config()).execute(
            &[
                tx(&alice, TransactionType::Transfer, bob, 100, 0),
                tx(&alice, TransactionType::Transfer, bob, 10, 1),
            ],
            &mut accounts,
            &mut delegates,
            1,
        );

        assert_eq!(
            results,
            vec![
                TransactionResult::failure(TransactionError::InsufficientAvailable),
                TransactionResult::failure(TransactionError::InvalidNonce),
            ]
        );
        assert_eq!(accounts.account(&alice.address()).available, 50);
        assert_eq!(accounts.account(&alice.address()).nonce, 0);
        assert_eq!(accounts.account(&bob).available, 0);
    }

    #[test]
    fn test_delegate_vote_unvote() {
        let alice = KeyPair::from_seed(&[1u8; 32]);
        let (mut accounts, mut delegates) = funded(&alice, 5_000);
        let executor = TransferExecutor::new(&config());

        let results = executor.execute(
            &[
                tx_with_data(
                    &alice,
                    TransactionType::Delegate,
                    Address::default(),
                    1_000,
                    0,
                    b"alice".to_vec(),
                ),
                tx(&alice, TransactionType::Vote, alice.address(), 500, 1),
                tx(&alice, TransactionType::Unvote, alice.address(), 200, 2),
            ],
            &mut accounts,
            &mut delegates,
            7,
        );

        assert!(results.iter().all(|r| r.success), "{results:?}");
        let delegate = delegates.get(&alice.address()).unwrap();
        assert_eq!(delegate.registered_at, 7);
        assert_eq!(delegate.votes, 300);

        let account = accounts.account(&alice.address());
        assert_eq!(account.locked, 300);
        assert_eq!(account.available, 5_000 - 1_000 - 500 + 200 - 3 * FEE);
    }

    #[test]
    fn test_vote_for_unknown_delegate_fails() {
        let alice = KeyPair::from_seed(&[1u8; 32]);
        let (mut accounts, mut delegates) = funded(&alice, 5_000);

        let results = TransferExecutor::new(&config()).execute(
            &[tx(&alice, TransactionType::Vote, Address([7u8; 20]), 10, 0)],
            &mut accounts,
            &mut delegates,
            1,
        );

        assert_eq!(
            results,
            vec![TransactionResult::failure(TransactionError::NotDelegate)]
        );
        assert_eq!(accounts.account(&alice.address()).locked, 0);
    }

    #[test]
    fn test_fee_below_minimum_fails() {
        let alice = KeyPair::from_seed(&[1u8; 32]);
        let (mut accounts, mut delegates) = funded(&alice, 5_000);
        let cheap = Transaction::new(
            &alice,
            TransactionType::Transfer,
            Address([2u8; 20]),
            1,
            FEE - 1,
            0,
            1,
            Vec::new(),
        );

        let results =
            TransferExecutor::new(&config()).execute(&[cheap], &mut accounts, &mut delegates, 1);
        assert_eq!(
            results,
            vec![TransactionResult::failure(TransactionError::FeeTooLow)]
        );
    }
}
