use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LedgerConfig;
use crate::consensus::mempool::{PoolError, TransactionPool};
use crate::core::address::{Address, AddressKind};
use crate::core::block::{signature_shares, Block, MiningError, SignatureShare, GENESIS_PREVIOUS_HASH};
use crate::core::transaction::{Amount, SignatureType, Transaction};
use crate::core::validation::{check_structure, TransactionError, TransactionValidator};
use crate::crypto::SchemeRegistry;
use crate::storage::{LedgerStorage, StorageError};

/// Derived balances may go negative: debits are not checked against funds here
pub type Balance = i128;

/// First broken block found while walking the chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    #[error("block {index}: stored hash does not match its contents")]
    HashMismatch { index: u64 },
    #[error("block {index}: previous hash does not match its predecessor")]
    BrokenLink { index: u64 },
    #[error("block at position {position} claims index {index}")]
    IndexGap { position: u64, index: u64 },
    #[error("block 0 is not the genesis block")]
    ForeignGenesis,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("Transaction {0} already recorded")]
    DuplicateTransaction(String),
    #[error("Mempool full: {0} transactions")]
    MempoolFull(usize),
    #[error("Persistence failure: {0}")]
    Storage(#[from] StorageError),
    #[error("Chain integrity violation: {0}")]
    ChainIntegrity(#[from] IntegrityViolation),
    #[error("Mining aborted: {0}")]
    MiningAborted(#[from] MiningError),
    #[error("Mining task failed: {0}")]
    MiningTask(String),
}

impl From<PoolError> for LedgerError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Invalid(e) => LedgerError::InvalidTransaction(e),
            PoolError::Duplicate(hash) => LedgerError::DuplicateTransaction(hash),
            PoolError::Full(n) => LedgerError::MempoolFull(n),
        }
    }
}

/// Returned by a successful mine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningReceipt {
    pub block_index: u64,
    pub hash: String,
    pub transaction_count: usize,
    pub attempts_required: u64,
    pub miner: Address,
    pub reward: Amount,
    pub elapsed_ms: u64,
}

/// A transaction located on chain or in the mempool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub confirmed: bool,
    pub block_index: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStatus {
    pub chain_length: usize,
    pub head_index: u64,
    pub head_hash: String,
    pub head_timestamp: i64,
    pub pending_transactions: usize,
    /// Pending transactions taken by the block currently being mined
    pub in_flight_transactions: usize,
    pub difficulty: u32,
    pub mining_reward: Amount,
    pub is_valid: bool,
}

/// Value currently held by one address family (positive balances only)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindValue {
    pub kind: AddressKind,
    pub funded_addresses: usize,
    pub value: Balance,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSecurityMetrics {
    /// Signed (non-system) transactions, confirmed and pending
    pub total_transactions: usize,
    pub signature_shares: Vec<SignatureShare>,
    pub value_by_kind: Vec<KindValue>,
    pub total_value: Balance,
    /// Share of value sitting in classical (quantum-vulnerable) addresses
    pub classical_value_percent: f64,
    pub post_quantum_value_percent: f64,
}

/// Check the genesis block, then walk the chain from block 1 checking stored
/// hashes, links and positions.
pub fn verify_chain(chain: &[Block]) -> Result<(), IntegrityViolation> {
    if let Some(genesis) = chain.first() {
        if !genesis.has_consistent_hash() {
            return Err(IntegrityViolation::HashMismatch { index: 0 });
        }
        // Genesis is deterministic; a rehashed replacement is still foreign
        if *genesis != Block::genesis() {
            return Err(IntegrityViolation::ForeignGenesis);
        }
    }

    for (position, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let position = position as u64 + 1;

        if current.index != position {
            return Err(IntegrityViolation::IndexGap {
                position,
                index: current.index,
            });
        }
        if !current.has_consistent_hash() {
            return Err(IntegrityViolation::HashMismatch { index: current.index });
        }
        if current.previous_hash != previous.hash {
            return Err(IntegrityViolation::BrokenLink { index: current.index });
        }
    }
    Ok(())
}

fn find_confirmed<'a>(chain: &'a [Block], tx_hash: &str) -> Option<(u64, &'a Transaction)> {
    chain.iter().find_map(|block| {
        block
            .transactions
            .iter()
            .find(|tx| tx.tx_hash == tx_hash)
            .map(|tx| (block.index, tx))
    })
}

fn apply_to_balance(balance: &mut Balance, tx: &Transaction, address: &Address) {
    if &tx.from == address {
        *balance -= Balance::from(tx.amount);
    }
    if &tx.to == address {
        *balance += Balance::from(tx.amount);
    }
}

fn percent(part: Balance, whole: Balance) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Single-writer ledger: the canonical chain, its mempool and their persistence.
///
/// Lock order is chain before mempool. Only one block is mined at a time; the
/// chain and mempool locks are not held during the nonce search.
pub struct Ledger {
    chain: RwLock<Vec<Block>>,
    mempool: Mutex<TransactionPool>,
    mining: Mutex<()>,
    storage: LedgerStorage,
    config: LedgerConfig,
}

impl Ledger {
    /// Open the ledger with the default signing capabilities
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::open(config, SchemeRegistry::with_defaults())
    }

    /// Load the persisted chain and mempool, or bootstrap a genesis chain.
    ///
    /// A missing chain always bootstraps. A malformed, empty or invalid chain is
    /// replaced by a fresh genesis chain when `recovery.reset_on_corruption` is
    /// set, and is a hard error otherwise.
    pub fn open(config: LedgerConfig, registry: SchemeRegistry) -> Result<Self, LedgerError> {
        let storage = LedgerStorage::new(&config.storage.data_dir)?;
        let reset = config.recovery.reset_on_corruption;

        let loaded = match storage.load_chain() {
            Ok(chain) => match verify_chain(&chain) {
                Ok(()) => Some(chain),
                Err(violation) if reset => {
                    tracing::warn!("Discarding persisted chain ({}); resetting to genesis", violation);
                    None
                }
                Err(violation) => {
                    tracing::error!("Persisted chain failed validation: {}", violation);
                    return Err(violation.into());
                }
            },
            Err(StorageError::NotFound(path)) => {
                tracing::info!("No chain at {}; creating new ledger with genesis block", path.display());
                None
            }
            Err(e) if reset => {
                tracing::warn!("Unreadable persisted chain ({}); resetting to genesis", e);
                None
            }
            Err(e) => return Err(e.into()),
        };

        let chain = match loaded {
            Some(chain) => {
                tracing::info!("Loaded existing chain with {} blocks", chain.len());
                chain
            }
            None => {
                let chain = vec![Self::create_genesis_block()];
                storage.save_chain(&chain)?;
                chain
            }
        };

        let pending = match storage.load_mempool() {
            Ok(txs) => txs,
            Err(e) if reset => {
                tracing::warn!("Unreadable persisted mempool ({}); starting empty", e);
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut pool = TransactionPool::new(TransactionValidator::new(registry), config.mempool.max_pending);
        let loaded_count = pending.len();
        for tx in pending {
            if tx.is_system() {
                tracing::warn!("Dropping pending transaction {}: system transactions are not poolable", tx.tx_hash);
                continue;
            }
            if find_confirmed(&chain, &tx.tx_hash).is_some() {
                tracing::warn!("Dropping pending transaction {}: already confirmed", tx.tx_hash);
                continue;
            }
            let hash = tx.tx_hash.clone();
            if let Err(e) = pool.submit(tx) {
                tracing::warn!("Dropping pending transaction {}: {}", hash, e);
            }
        }
        if pool.len() != loaded_count {
            storage.save_mempool(&pool.transactions())?;
        }

        Ok(Self {
            chain: RwLock::new(chain),
            mempool: Mutex::new(pool),
            mining: Mutex::new(()),
            storage,
            config,
        })
    }

    /// Index 0, a single GENESIS -> GENESIS transaction of 0, previous hash "0".
    pub fn create_genesis_block() -> Block {
        Block::genesis()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn storage(&self) -> &LedgerStorage {
        &self.storage
    }

    /// Validate then enqueue a transaction, persisting the mempool.
    ///
    /// Genesis and reward transactions are built by the ledger itself and are
    /// never accepted from callers.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<(), LedgerError> {
        if transaction.is_system() {
            return Err(TransactionError::SystemTransactionSubmitted.into());
        }

        let chain = self.chain.read();
        if find_confirmed(&chain, &transaction.tx_hash).is_some() {
            return Err(LedgerError::DuplicateTransaction(transaction.tx_hash));
        }

        let mut pool = self.mempool.lock();
        let hash = transaction.tx_hash.clone();
        pool.submit(transaction)?;

        if let Err(e) = self.storage.save_mempool(&pool.transactions()) {
            pool.remove(&hash);
            return Err(e.into());
        }
        tracing::info!("Transaction {} added to mempool", hash);
        Ok(())
    }

    /// Mine pending transactions plus a reward for `miner` into a new block.
    ///
    /// Honors `mining.timeout_secs`; otherwise runs until a hash is found.
    pub fn mine_block(&self, miner: &Address) -> Result<MiningReceipt, LedgerError> {
        self.mine_block_cancellable(miner, &CancellationToken::new())
    }

    /// Like [`Ledger::mine_block`], abandoning the search when `cancel` fires.
    /// An aborted mine leaves chain and mempool exactly as they were.
    pub fn mine_block_cancellable(
        &self,
        miner: &Address,
        cancel: &CancellationToken,
    ) -> Result<MiningReceipt, LedgerError> {
        let _mining = self.mining.lock();
        let started = Instant::now();

        let reward_amount = self.config.consensus.mining_reward;
        let reward = Transaction::mining_reward(miner.clone(), reward_amount);
        check_structure(&reward)?;

        let mut transactions = self.mempool.lock().drain_for_block();
        let drained: Vec<String> = transactions.iter().map(|tx| tx.tx_hash.clone()).collect();
        transactions.push(reward);

        let (index, previous_hash) = self.next_link();
        let mut block = Block::new(index, Utc::now().timestamp_millis(), transactions, previous_hash);

        let difficulty = self.config.consensus.difficulty;
        let deadline = self.config.mining_timeout().map(|t| started + t);
        let outcome = match block.mine_cancellable(difficulty, cancel, deadline, self.config.mining.check_interval) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.mempool.lock().release(&drained);
                return Err(e.into());
            }
        };

        // COMMIT: chain first (durability), then mempool
        let mut chain = self.chain.write();
        chain.push(block.clone());
        if let Err(e) = self.storage.save_chain(&chain) {
            chain.pop();
            self.mempool.lock().release(&drained);
            return Err(e.into());
        }

        // The block is durable from here on; a stale mempool.json only holds
        // confirmed transactions, which are pruned on the next open
        let mut pool = self.mempool.lock();
        pool.confirm(&drained);
        if let Err(e) = self.storage.save_mempool(&pool.transactions()) {
            tracing::warn!("Block {} committed but mempool save failed: {}", block.index, e);
        }
        drop(pool);
        drop(chain);

        let receipt = MiningReceipt {
            block_index: block.index,
            hash: outcome.hash,
            transaction_count: block.transactions.len(),
            attempts_required: outcome.attempts_required,
            miner: miner.clone(),
            reward: reward_amount,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Block {} appended: {} txs, reward {} to {}",
            receipt.block_index,
            receipt.transaction_count,
            receipt.reward,
            receipt.miner
        );
        Ok(receipt)
    }

    /// Run [`Ledger::mine_block_cancellable`] on the blocking pool.
    pub fn spawn_mining(
        self: &Arc<Self>,
        miner: Address,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<MiningReceipt, LedgerError>> {
        let ledger = Arc::clone(self);
        tokio::task::spawn_blocking(move || ledger.mine_block_cancellable(&miner, &cancel))
    }

    fn next_link(&self) -> (u64, String) {
        match self.chain.read().last() {
            Some(head) => (head.index + 1, head.hash.clone()),
            None => (0, GENESIS_PREVIOUS_HASH.to_string()),
        }
    }

    /// Chain integrity: hashes match contents and every block links to its predecessor
    pub fn is_valid(&self) -> bool {
        match verify_chain(&self.chain.read()) {
            Ok(()) => true,
            Err(violation) => {
                tracing::error!("Chain invalid: {}", violation);
                false
            }
        }
    }

    /// Sum of credits minus debits over every confirmed and pending transaction
    pub fn get_address_balance(&self, address: &Address) -> Balance {
        let chain = self.chain.read();
        let pool = self.mempool.lock();

        let mut balance: Balance = 0;
        for tx in chain.iter().flat_map(|b| &b.transactions).chain(pool.iter()) {
            apply_to_balance(&mut balance, tx, address);
        }
        balance
    }

    /// Confirmed and pending transactions touching `address`, newest first
    pub fn get_transaction_history(&self, address: &Address) -> Vec<TransactionRecord> {
        let chain = self.chain.read();
        let pool = self.mempool.lock();

        let mut history: Vec<TransactionRecord> = chain
            .iter()
            .flat_map(|block| block.transactions.iter().map(move |tx| (block.index, tx)))
            .filter(|(_, tx)| tx.involves(address))
            .map(|(index, tx)| TransactionRecord {
                transaction: tx.clone(),
                confirmed: true,
                block_index: Some(index),
            })
            .collect();

        history.extend(pool.iter().filter(|tx| tx.involves(address)).map(|tx| TransactionRecord {
            transaction: tx.clone(),
            confirmed: false,
            block_index: None,
        }));

        history.sort_by(|a, b| b.transaction.timestamp.cmp(&a.transaction.timestamp));
        history
    }

    /// Mempool copy first, then the first block containing the hash
    pub fn get_transaction_by_hash(&self, tx_hash: &str) -> Option<TransactionRecord> {
        let chain = self.chain.read();
        if let Some(tx) = self.mempool.lock().get(tx_hash) {
            return Some(TransactionRecord {
                transaction: tx.clone(),
                confirmed: false,
                block_index: None,
            });
        }

        find_confirmed(&chain, tx_hash).map(|(index, tx)| TransactionRecord {
            transaction: tx.clone(),
            confirmed: true,
            block_index: Some(index),
        })
    }

    pub fn get_block_by_index(&self, index: u64) -> Option<Block> {
        let chain = self.chain.read();
        usize::try_from(index).ok().and_then(|i| chain.get(i)).cloned()
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Option<Block> {
        self.chain.read().iter().find(|b| b.hash == hash).cloned()
    }

    pub fn get_latest_block(&self) -> Option<Block> {
        self.chain.read().last().cloned()
    }

    /// Snapshot of the whole chain
    pub fn chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.mempool.lock().transactions()
    }

    /// Signature-type counts over signed transactions, and how much value sits
    /// in classical versus post-quantum addresses
    pub fn security_metrics(&self) -> LedgerSecurityMetrics {
        let chain = self.chain.read();
        let pool = self.mempool.lock();
        let all = || chain.iter().flat_map(|b| &b.transactions).chain(pool.iter());

        let signed_types = [SignatureType::Classical, SignatureType::Falcon, SignatureType::Dilithium];
        let (total_transactions, signature_shares) = signature_shares(all(), &signed_types);

        // Running balances may dip below zero; only final positive balances count
        let mut balances: HashMap<&Address, Balance> = HashMap::new();
        for tx in all() {
            *balances.entry(&tx.from).or_default() -= Balance::from(tx.amount);
            *balances.entry(&tx.to).or_default() += Balance::from(tx.amount);
        }

        let mut value_by_kind: Vec<KindValue> = AddressKind::ALL
            .into_iter()
            .map(|kind| KindValue {
                kind,
                funded_addresses: 0,
                value: 0,
                percentage: 0.0,
            })
            .collect();
        for (address, balance) in balances {
            if let (Some(kind), true) = (address.kind(), balance > 0) {
                if let Some(entry) = value_by_kind.iter_mut().find(|v| v.kind == kind) {
                    entry.funded_addresses += 1;
                    entry.value += balance;
                }
            }
        }

        let total_value: Balance = value_by_kind.iter().map(|v| v.value).sum();
        for entry in &mut value_by_kind {
            entry.percentage = percent(entry.value, total_value);
        }
        let classical_value: Balance = value_by_kind
            .iter()
            .filter(|v| !v.kind.is_post_quantum())
            .map(|v| v.value)
            .sum();

        LedgerSecurityMetrics {
            total_transactions,
            signature_shares,
            value_by_kind,
            total_value,
            classical_value_percent: percent(classical_value, total_value),
            post_quantum_value_percent: percent(total_value - classical_value, total_value),
        }
    }

    pub fn get_status(&self) -> LedgerStatus {
        let is_valid = self.is_valid();
        let chain = self.chain.read();
        let (pending_transactions, in_flight_transactions) = {
            let pool = self.mempool.lock();
            (pool.len(), pool.in_flight_len())
        };

        let (head_index, head_hash, head_timestamp) = match chain.last() {
            Some(head) => (head.index, head.hash.clone(), head.timestamp),
            None => (0, String::new(), 0),
        };

        LedgerStatus {
            chain_length: chain.len(),
            head_index,
            head_hash,
            head_timestamp,
            pending_transactions,
            in_flight_transactions,
            difficulty: self.config.consensus.difficulty,
            mining_reward: self.config.consensus.mining_reward,
            is_valid,
        }
    }
}
