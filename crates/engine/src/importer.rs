//! Block validation and application shared by consensus and synchronization.

use crate::{
    AccountState, BlockError, ChainConfig, DelegateState, ImportError, Ledger, LedgerError,
    TransactionExecutor,
};
use kestrel_types::signing::vote_message;
use kestrel_types::{
    now_millis, quorum_threshold, results_root, transactions_root, Address, Block, BlockHeader,
    Transaction, TransactionResult, VoteType,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A block whose transactions have been executed against tracked snapshots of
/// the current head, ready to be committed.
#[derive(Debug, Clone)]
pub struct ExecutedBlock {
    pub block: Block,
    accounts: AccountState,
    delegates: DelegateState,
}

/// Validates blocks against the ledger head and appends them.
pub struct BlockImporter {
    ledger: Arc<dyn Ledger>,
    executor: Arc<dyn TransactionExecutor>,
    config: ChainConfig,
}

impl BlockImporter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        executor: Arc<dyn TransactionExecutor>,
        config: ChainConfig,
    ) -> Self {
        Self {
            ledger,
            executor,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Proposal building
    // ═══════════════════════════════════════════════════════════════════════

    /// Build the header and transaction list for a new block on top of the
    /// head.
    ///
    /// Candidates that are malformed, already in the chain, repeated, over the
    /// size budget, or that fail to execute are left out, so every included
    /// transaction succeeds.
    pub fn build_block(
        &self,
        coinbase: Address,
        candidates: Vec<Transaction>,
        data: Vec<u8>,
    ) -> (BlockHeader, Vec<Transaction>) {
        let parent = self.ledger.latest_block();
        let number = parent.number() + 1;
        let mut accounts = self.ledger.account_state();
        let mut delegates = self.ledger.delegate_state();

        let mut seen = HashSet::new();
        let mut size = 0usize;
        let mut included = Vec::new();
        let mut results = Vec::new();

        for tx in candidates {
            if !tx.validate(self.config.max_transaction_data_bytes)
                || self.ledger.has_transaction(&tx.hash)
                || !seen.insert(tx.hash)
            {
                continue;
            }
            if size + tx.size() > self.config.max_block_transactions_bytes {
                break;
            }
            let result = self
                .executor
                .execute(std::slice::from_ref(&tx), &mut accounts, &mut delegates, number)
                .into_iter()
                .next();
            match result {
                Some(result) if result.success => {
                    size += tx.size();
                    included.push(tx);
                    results.push(result);
                }
                _ => trace!(tx = ?tx.hash, "Dropping failing transaction from proposal"),
            }
        }

        let header = BlockHeader {
            number,
            coinbase,
            parent_hash: parent.hash(),
            timestamp: now_millis().max(parent.header.timestamp + 1),
            transactions_root: transactions_root(&included),
            results_root: results_root(&results),
            state_root: kestrel_types::Hash::ZERO,
            data,
        };
        debug!(height = number, txs = included.len(), "Built block");
        (header, included)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════════════════

    /// Header continuity and transaction checks, then execution against
    /// tracked snapshots of the head.
    fn execute_body(
        &self,
        header: &BlockHeader,
        transactions: &[Transaction],
    ) -> Result<(Vec<TransactionResult>, AccountState, DelegateState), BlockError> {
        let parent = self.ledger.latest_block();

        if !header.validate(self.config.max_header_data_bytes) {
            return Err(BlockError::InvalidHeader);
        }
        if header.number != parent.number() + 1 {
            return Err(BlockError::NotNextBlock {
                number: header.number,
                head: parent.number(),
            });
        }
        if !header.extends(&parent.header) {
            return Err(BlockError::InvalidHeader);
        }
        if header.timestamp > now_millis().saturating_add(self.config.max_block_time_drift_ms) {
            return Err(BlockError::TimestampInFuture {
                timestamp: header.timestamp,
            });
        }
        if header.transactions_root != transactions_root(transactions) {
            return Err(BlockError::TransactionsRootMismatch);
        }

        let size: usize = transactions.iter().map(Transaction::size).sum();
        if size > self.config.max_block_transactions_bytes {
            return Err(BlockError::TooLarge {
                size,
                limit: self.config.max_block_transactions_bytes,
            });
        }

        let mut seen = HashSet::with_capacity(transactions.len());
        for tx in transactions {
            if !tx.validate(self.config.max_transaction_data_bytes) {
                return Err(BlockError::InvalidTransaction(tx.hash));
            }
            if !seen.insert(tx.hash) || self.ledger.has_transaction(&tx.hash) {
                return Err(BlockError::DuplicateTransaction(tx.hash));
            }
        }

        let mut accounts = self.ledger.account_state();
        let mut delegates = self.ledger.delegate_state();
        let results = self
            .executor
            .execute(transactions, &mut accounts, &mut delegates, header.number);

        if header.results_root != results_root(&results) {
            return Err(BlockError::ResultsRootMismatch);
        }
        Ok((results, accounts, delegates))
    }

    /// Validate a proposed header and transactions, returning the block
    /// (without commit evidence) with its execution results.
    pub fn validate_proposal(
        &self,
        header: &BlockHeader,
        transactions: &[Transaction],
    ) -> Result<Block, BlockError> {
        let (results, _, _) = self.execute_body(header, transactions)?;
        Ok(Block::new(header.clone(), transactions.to_vec(), results))
    }

    /// Validate a complete block, including its commit signatures.
    pub fn validate_block(&self, block: &Block) -> Result<ExecutedBlock, BlockError> {
        let (results, accounts, delegates) =
            self.execute_body(&block.header, &block.transactions)?;
        if results != block.results {
            return Err(BlockError::ResultsMismatch);
        }
        self.validate_votes(block)?;
        Ok(ExecutedBlock {
            block: block.clone(),
            accounts,
            delegates,
        })
    }

    /// Check that at least a quorum of current validators signed the
    /// PRE_COMMIT approval of this block.
    pub fn validate_votes(&self, block: &Block) -> Result<(), BlockError> {
        let validators = self.ledger.validators();
        let quorum = quorum_threshold(validators.len());
        let message = vote_message(
            VoteType::Precommit,
            block.number(),
            block.view,
            true,
            &block.hash(),
        );

        let mut signers = HashSet::with_capacity(block.votes.len());
        for signature in &block.votes {
            let signer = signature.address();
            if !validators.contains(&signer) || !signature.verify(&message) {
                return Err(BlockError::InvalidVote(signer.to_string()));
            }
            if !signers.insert(signer) {
                return Err(BlockError::DuplicateVote(signer.to_string()));
            }
        }

        if signers.len() < quorum {
            return Err(BlockError::InsufficientVotes {
                valid: signers.len(),
                quorum,
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Application
    // ═══════════════════════════════════════════════════════════════════════

    /// Credit the block reward and fees to the coinbase, then commit.
    pub fn apply_block(&self, executed: ExecutedBlock) -> Result<(), LedgerError> {
        let ExecutedBlock {
            block,
            mut accounts,
            delegates,
        } = executed;

        let fees = block
            .transactions
            .iter()
            .fold(0u64, |acc, tx| acc.saturating_add(tx.fee));
        let reward = self.config.block_reward.saturating_add(fees);
        if let Err(error) = accounts.credit(&block.header.coinbase, reward) {
            warn!(height = block.number(), %error, "Coinbase reward not credited");
        }

        self.ledger.commit_block(block, accounts, delegates)
    }

    /// Validate and append a block received from a peer.
    pub fn import_block(&self, block: Block) -> Result<(), ImportError> {
        let executed = self.validate_block(&block)?;
        self.apply_block(executed)?;
        Ok(())
    }

    /// Append a block agreed by this node's consensus round.
    ///
    /// The commit evidence was assembled from verified votes, so only the
    /// body is re-executed against the current head.
    pub fn finalize_block(&self, block: Block) -> Result<(), ImportError> {
        let (results, accounts, delegates) =
            self.execute_body(&block.header, &block.transactions)?;
        if results != block.results {
            return Err(BlockError::ResultsMismatch.into());
        }
        self.apply_block(ExecutedBlock {
            block,
            accounts,
            delegates,
        })?;
        Ok(())
    }
}
