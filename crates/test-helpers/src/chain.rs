//! Keys, ledgers and blocks.

use kestrel_engine::{BlockImporter, ChainConfig, Genesis, MemoryLedger, TransferExecutor};
use kestrel_types::{
    Address, Block, Hash, KeyPair, Signature, Transaction, TransactionType, Vote, VoteType,
};
use std::sync::Arc;

/// Premined balance of every validator key.
pub const TEST_BALANCE: u64 = 1_000_000;

/// `n` deterministic keys, sorted by address.
pub fn validator_keys(n: usize) -> Vec<KeyPair> {
    let mut keys: Vec<KeyPair> = (0..n)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
            KeyPair::from_seed(&seed)
        })
        .collect();
    keys.sort_by_key(|k| k.address());
    keys
}

/// Small reward and fees so balances are easy to reason about.
pub fn test_chain_config() -> ChainConfig {
    ChainConfig::default()
        .with_block_reward(100)
        .with_min_transaction_fee(1)
        .with_delegate_burn_amount(1_000)
}

/// Ledger whose genesis registers every key as a delegate (and therefore a
/// validator) with [`TEST_BALANCE`].
pub fn genesis_ledger(keys: &[KeyPair]) -> Arc<MemoryLedger> {
    let genesis = keys
        .iter()
        .enumerate()
        .fold(Genesis::new(0), |genesis, (i, key)| {
            genesis
                .with_premine(key.address(), TEST_BALANCE)
                .with_delegate(key.address(), format!("validator_{i}"))
        });
    Arc::new(MemoryLedger::new(test_chain_config(), genesis))
}

pub fn importer(ledger: Arc<MemoryLedger>) -> BlockImporter {
    let config = test_chain_config();
    BlockImporter::new(ledger, Arc::new(TransferExecutor::new(&config)), config)
}

/// Signed transfer paying the minimum test fee.
pub fn transfer(key: &KeyPair, to: Address, value: u64, nonce: u64) -> Transaction {
    Transaction::new(
        key,
        TransactionType::Transfer,
        to,
        value,
        1,
        nonce,
        1,
        Vec::new(),
    )
}

/// PRE_COMMIT approval signatures over `hash` from every key.
pub fn commit_signatures(keys: &[KeyPair], height: u64, view: u32, hash: Hash) -> Vec<Signature> {
    keys.iter()
        .map(|k| Vote::approve(k, VoteType::Precommit, height, view, hash).signature)
        .collect()
}

/// A valid next block on top of `ledger`'s head, forged by `coinbase` and
/// signed by every key in `signers`.
pub fn build_next_block(
    ledger: &Arc<MemoryLedger>,
    coinbase: &KeyPair,
    signers: &[KeyPair],
    transactions: Vec<Transaction>,
    view: u32,
) -> Block {
    let importer = importer(Arc::clone(ledger));
    let (header, included) = importer.build_block(coinbase.address(), transactions, Vec::new());
    let block = importer
        .validate_proposal(&header, &included)
        .expect("built block must validate");
    let votes = commit_signatures(signers, block.number(), view, block.hash());
    block.with_votes(view, votes)
}

/// Append `n` empty blocks signed by all `keys`, returning them.
pub fn extend_chain(ledger: &Arc<MemoryLedger>, keys: &[KeyPair], n: usize) -> Vec<Block> {
    let importer = importer(Arc::clone(ledger));
    (0..n)
        .map(|i| {
            let block = build_next_block(ledger, &keys[i % keys.len()], keys, Vec::new(), 0);
            importer
                .import_block(block.clone())
                .expect("fixture block must import");
            block
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_engine::Ledger;

    #[test]
    fn test_keys_are_sorted_validators() {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        let addresses: Vec<Address> = keys.iter().map(KeyPair::address).collect();
        assert_eq!(ledger.validators(), addresses);
    }

    #[test]
    fn test_extend_chain() {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        let blocks = extend_chain(&ledger, &keys, 3);
        assert_eq!(ledger.latest_height(), 3);
        assert_eq!(ledger.latest_block().hash(), blocks[2].hash());
    }
}
