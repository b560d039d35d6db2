//! In-memory ledger.

use crate::{AccountState, ChainConfig, DelegateState, Ledger, LedgerError};
use kestrel_types::{primary_for, Address, Block, Hash, ValidatorStats};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Initial chain state.
#[derive(Debug, Clone, Default)]
pub struct Genesis {
    /// Genesis block timestamp (Unix milliseconds).
    pub timestamp: u64,
    /// Initial balances.
    pub premine: Vec<(Address, u64)>,
    /// Delegates registered at height 0; the initial validators are drawn
    /// from them.
    pub delegates: Vec<(Address, Vec<u8>)>,
}

impl Genesis {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    pub fn with_premine(mut self, address: Address, amount: u64) -> Self {
        self.premine.push((address, amount));
        self
    }

    pub fn with_delegate(mut self, address: Address, name: impl Into<Vec<u8>>) -> Self {
        self.delegates.push((address, name.into()));
        self
    }
}

struct Chain {
    blocks: Vec<Arc<Block>>,
    by_hash: HashMap<Hash, u64>,
    transactions: HashSet<Hash>,
    accounts: AccountState,
    delegates: DelegateState,
    validators: Vec<Address>,
    stats: HashMap<Address, ValidatorStats>,
}

impl Chain {
    fn head(&self) -> u64 {
        (self.blocks.len() as u64).saturating_sub(1)
    }

    /// Top delegates by votes, capped at `max_validators`, sorted by address.
    fn recompute_validators(&mut self, max_validators: usize) {
        let mut validators: Vec<Address> = self
            .delegates
            .ranked()
            .into_iter()
            .take(max_validators)
            .map(|d| d.address)
            .collect();
        validators.sort();
        self.validators = validators;
    }

    fn record_stats(&mut self, block: &Block) {
        let coinbase = block.header.coinbase;
        self.stats.entry(coinbase).or_default().blocks_forged += 1;

        if let Some(primary) = primary_for(&self.validators, block.number(), 0) {
            let stats = self.stats.entry(primary).or_default();
            if primary == coinbase {
                stats.turns_hit += 1;
            } else {
                stats.turns_missed += 1;
            }
        }
    }
}

/// A [`Ledger`] kept entirely in memory behind one `RwLock`.
pub struct MemoryLedger {
    config: ChainConfig,
    chain: RwLock<Chain>,
}

impl MemoryLedger {
    pub fn new(config: ChainConfig, genesis: Genesis) -> Self {
        let block = Block::genesis(genesis.timestamp);

        let mut accounts = AccountState::new(0);
        for (address, amount) in &genesis.premine {
            if accounts.credit(address, *amount).is_err() {
                warn!(%address, "Genesis premine overflows, skipping");
            }
        }
        let mut delegates = DelegateState::new(0);
        for (address, name) in &genesis.delegates {
            if delegates.register(*address, name.clone(), 0).is_err() {
                debug!(%address, "Skipping duplicate genesis delegate");
            }
        }

        let mut chain = Chain {
            by_hash: HashMap::from([(block.hash(), 0)]),
            blocks: vec![Arc::new(block)],
            transactions: HashSet::new(),
            accounts,
            delegates,
            validators: Vec::new(),
            stats: HashMap::new(),
        };
        chain.recompute_validators(config.max_validators);

        info!(
            validators = chain.validators.len(),
            accounts = genesis.premine.len(),
            "Ledger initialised from genesis"
        );

        Self {
            config,
            chain: RwLock::new(chain),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

impl Ledger for MemoryLedger {
    fn latest_block(&self) -> Arc<Block> {
        let chain = self.chain.read();
        Arc::clone(&chain.blocks[chain.blocks.len() - 1])
    }

    fn latest_height(&self) -> u64 {
        self.chain.read().head()
    }

    fn get_block(&self, height: u64) -> Option<Arc<Block>> {
        let chain = self.chain.read();
        usize::try_from(height)
            .ok()
            .and_then(|h| chain.blocks.get(h))
            .cloned()
    }

    fn get_block_by_hash(&self, hash: &Hash) -> Option<Arc<Block>> {
        let chain = self.chain.read();
        chain
            .by_hash
            .get(hash)
            .and_then(|h| chain.blocks.get(*h as usize))
            .cloned()
    }

    fn has_transaction(&self, hash: &Hash) -> bool {
        self.chain.read().transactions.contains(hash)
    }

    fn validators(&self) -> Vec<Address> {
        self.chain.read().validators.clone()
    }

    fn validator_stats(&self, address: &Address) -> ValidatorStats {
        self.chain
            .read()
            .stats
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    fn account_state(&self) -> AccountState {
        self.chain.read().accounts.track()
    }

    fn delegate_state(&self) -> DelegateState {
        self.chain.read().delegates.track()
    }

    fn commit_block(
        &self,
        block: Block,
        mut accounts: AccountState,
        mut delegates: DelegateState,
    ) -> Result<(), LedgerError> {
        let mut chain = self.chain.write();
        let head = chain.head();
        let number = block.number();

        if number != head + 1 {
            return Err(LedgerError::NonContiguous { number, head });
        }
        for tracked in [accounts.base_height(), delegates.base_height()] {
            if tracked != head {
                return Err(LedgerError::StaleSnapshot { tracked, head });
            }
        }

        accounts.advance_to(number);
        delegates.advance_to(number);
        chain.accounts = accounts;
        chain.delegates = delegates;

        chain.record_stats(&block);
        for tx in &block.transactions {
            chain.transactions.insert(tx.hash);
        }
        chain.by_hash.insert(block.hash(), number);
        chain.blocks.push(Arc::new(block));

        if number % self.config.validator_update_interval == 0 {
            chain.recompute_validators(self.config.max_validators);
            info!(
                height = number,
                validators = chain.validators.len(),
                "Validator set updated"
            );
        }

        debug!(height = number, "Block appended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_types::{BlockHeader, Signature};

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn genesis() -> Genesis {
        Genesis::new(0)
            .with_premine(addr(1), 1_000)
            .with_delegate(addr(3), "carol")
            .with_delegate(addr(1), "alice")
            .with_delegate(addr(2), "bob")
    }

    fn child(ledger: &MemoryLedger, coinbase: Address, view: u32) -> Block {
        let parent = ledger.latest_block();
        let header = BlockHeader {
            number: parent.number() + 1,
            coinbase,
            parent_hash: parent.hash(),
            timestamp: parent.header.timestamp + 1,
            transactions_root: Hash::ZERO,
            results_root: Hash::ZERO,
            state_root: Hash::ZERO,
            data: Vec::new(),
        };
        Block::new(header, Vec::new(), Vec::new()).with_votes(view, vec![Signature::zero()])
    }

    fn commit(ledger: &MemoryLedger, block: Block) -> Result<(), LedgerError> {
        ledger.commit_block(block, ledger.account_state(), ledger.delegate_state())
    }

    #[test]
    fn test_genesis_state() {
        let ledger = MemoryLedger::new(ChainConfig::default(), genesis());

        assert_eq!(ledger.latest_height(), 0);
        assert_eq!(ledger.validators(), vec![addr(1), addr(2), addr(3)]);
        assert_eq!(ledger.account_state().account(&addr(1)).available, 1_000);
        let genesis_hash = ledger.latest_block().hash();
        assert_eq!(ledger.get_block_by_hash(&genesis_hash).unwrap().number(), 0);
    }

    #[test]
    fn test_append_is_sequential() {
        let ledger = MemoryLedger::new(ChainConfig::default(), genesis());
        let block = child(&ledger, addr(2), 0);
        commit(&ledger, block.clone()).unwrap();
        assert_eq!(ledger.latest_height(), 1);

        // Same height again.
        assert_eq!(
            commit(&ledger, block),
            Err(LedgerError::NonContiguous { number: 1, head: 1 })
        );

        // Gap.
        let mut gap = child(&ledger, addr(2), 0);
        gap.header.number = 3;
        assert_eq!(
            commit(&ledger, gap),
            Err(LedgerError::NonContiguous { number: 3, head: 1 })
        );
    }

    #[test]
    fn test_stale_snapshot_is_refused() {
        let ledger = MemoryLedger::new(ChainConfig::default(), genesis());
        let stale_accounts = ledger.account_state();
        let stale_delegates = ledger.delegate_state();
        commit(&ledger, child(&ledger, addr(1), 0)).unwrap();

        let result = ledger.commit_block(child(&ledger, addr(1), 0), stale_accounts, stale_delegates);
        assert_eq!(
            result,
            Err(LedgerError::StaleSnapshot { tracked: 0, head: 1 })
        );
        assert_eq!(ledger.latest_height(), 1);
    }

    #[test]
    fn test_validator_stats() {
        let ledger = MemoryLedger::new(ChainConfig::default(), genesis());
        // Height 1, view-0 primary is validators[1] = addr(2).
        commit(&ledger, child(&ledger, addr(2), 0)).unwrap();
        // Height 2, view-0 primary is addr(3), but addr(1) forged it.
        commit(&ledger, child(&ledger, addr(1), 1)).unwrap();

        assert_eq!(
            ledger.validator_stats(&addr(2)),
            ValidatorStats {
                blocks_forged: 1,
                turns_hit: 1,
                turns_missed: 0
            }
        );
        assert_eq!(ledger.validator_stats(&addr(3)).turns_missed, 1);
        assert_eq!(ledger.validator_stats(&addr(1)).blocks_forged, 1);
    }

    #[test]
    fn test_validator_set_follows_votes_at_interval() {
        let config = ChainConfig::default()
            .with_validator_update_interval(2)
            .with_max_validators(2);
        let ledger = MemoryLedger::new(config, genesis());
        assert_eq!(ledger.validators(), vec![addr(1), addr(2)]);

        let mut delegates = ledger.delegate_state();
        delegates.vote(addr(9), addr(3), 10).unwrap();
        ledger
            .commit_block(child(&ledger, addr(1), 0), ledger.account_state(), delegates)
            .unwrap();
        // Not yet at the interval.
        assert_eq!(ledger.validators(), vec![addr(1), addr(2)]);

        commit(&ledger, child(&ledger, addr(1), 0)).unwrap();
        assert_eq!(ledger.validators(), vec![addr(1), addr(3)]);
    }
}
