use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::core::transaction::Transaction;
use crate::core::validation::{TransactionError, TransactionValidator};

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid transaction: {0}")]
    Invalid(#[from] TransactionError),
    #[error("Transaction {0} already pending")]
    Duplicate(String),
    #[error("Mempool full: {0} transactions")]
    Full(usize),
}

/// Pending transactions keyed by `tx_hash`, kept in submission order.
///
/// Transactions handed to a block under construction are marked in flight; they
/// stay visible (balances, lookups) until the block commits, and anything
/// submitted meanwhile is untouched by the commit.
#[derive(Clone, Debug)]
pub struct TransactionPool {
    // Transactions indexed by hash
    transactions: HashMap<String, Transaction>,
    // Submission order
    order: Vec<String>,
    // Drained into a block that has not committed yet
    in_flight: HashSet<String>,
    validator: TransactionValidator,
    max_pending: usize,
}

impl TransactionPool {
    pub fn new(validator: TransactionValidator, max_pending: usize) -> Self {
        Self {
            transactions: HashMap::new(),
            order: Vec::new(),
            in_flight: HashSet::new(),
            validator,
            max_pending,
        }
    }

    /// Validate and enqueue a transaction
    pub fn submit(&mut self, tx: Transaction) -> Result<(), PoolError> {
        self.validator.validate(&tx)?;

        if self.transactions.contains_key(&tx.tx_hash) {
            return Err(PoolError::Duplicate(tx.tx_hash));
        }
        if self.transactions.len() >= self.max_pending {
            return Err(PoolError::Full(self.transactions.len()));
        }

        tracing::debug!("Transaction {} accepted into mempool", tx.tx_hash);
        self.order.push(tx.tx_hash.clone());
        self.transactions.insert(tx.tx_hash.clone(), tx);
        Ok(())
    }

    /// Hand every pending transaction not already in flight to a new block,
    /// in submission order, and mark them in flight.
    pub fn drain_for_block(&mut self) -> Vec<Transaction> {
        let mut drained = Vec::new();
        for hash in &self.order {
            if self.in_flight.insert(hash.clone()) {
                if let Some(tx) = self.transactions.get(hash) {
                    drained.push(tx.clone());
                }
            }
        }
        drained
    }

    /// The block carrying these transactions committed: drop exactly them.
    pub fn confirm(&mut self, hashes: &[String]) {
        let mined: HashSet<&String> = hashes.iter().collect();
        self.order.retain(|h| !mined.contains(h));
        for hash in hashes {
            self.transactions.remove(hash);
            self.in_flight.remove(hash);
        }
    }

    /// The block carrying these transactions was abandoned: make them eligible again.
    pub fn release(&mut self, hashes: &[String]) {
        for hash in hashes {
            self.in_flight.remove(hash);
        }
    }

    /// Remove a transaction from mempool
    pub fn remove(&mut self, tx_hash: &str) -> Option<Transaction> {
        let tx = self.transactions.remove(tx_hash)?;
        self.order.retain(|h| h != tx_hash);
        self.in_flight.remove(tx_hash);
        Some(tx)
    }

    pub fn get(&self, tx_hash: &str) -> Option<&Transaction> {
        self.transactions.get(tx_hash)
    }

    /// Check if transaction exists
    pub fn contains(&self, tx_hash: &str) -> bool {
        self.transactions.contains_key(tx_hash)
    }

    pub fn is_in_flight(&self, tx_hash: &str) -> bool {
        self.in_flight.contains(tx_hash)
    }

    /// Transactions held by a block still being mined
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Pending transactions in submission order
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.order.iter().filter_map(|h| self.transactions.get(h))
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.iter().cloned().collect()
    }

    /// Get transaction count
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if mempool is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Clear all transactions
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.order.clear();
        self.in_flight.clear();
    }
}
