use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::convert::Infallible;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::transaction::{SignatureType, Transaction};

/// Fixed timestamp so every fresh ledger shares one genesis hash
pub const GENESIS_TIMESTAMP_MS: i64 = 1_735_689_600_000; // 2025-01-01 00:00:00 UTC
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
    #[error("Mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },
}

/// Result of a successful proof-of-work search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningOutcome {
    pub hash: String,
    pub nonce: u64,
    pub attempts_required: u64,
}

/// Share of a block's (or ledger's) transactions signed by one capability
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureShare {
    pub signature_type: SignatureType,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSecurityMetrics {
    pub total_transactions: usize,
    pub shares: Vec<SignatureShare>,
}

impl BlockSecurityMetrics {
    pub fn share(&self, signature_type: SignatureType) -> Option<&SignatureShare> {
        self.shares.iter().find(|s| s.signature_type == signature_type)
    }
}

/// Count transactions per signature type. Every type is reported, zeros included.
pub(crate) fn signature_shares<'a>(
    transactions: impl Iterator<Item = &'a Transaction>,
    types: &[SignatureType],
) -> (usize, Vec<SignatureShare>) {
    let mut counts = vec![0usize; types.len()];
    let mut total = 0usize;
    for tx in transactions {
        if let Some(slot) = types.iter().position(|t| *t == tx.signature_type) {
            counts[slot] += 1;
            total += 1;
        }
    }

    let shares = types
        .iter()
        .zip(counts)
        .map(|(signature_type, count)| SignatureShare {
            signature_type: *signature_type,
            count,
            percentage: if total == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total as f64
            },
        })
        .collect();
    (total, shares)
}

/// Block structure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Create a new block (unmined). The hash is computed immediately.
    pub fn new(index: u64, timestamp: i64, transactions: Vec<Transaction>, previous_hash: String) -> Self {
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Create the genesis block (first block in chain). Hashed, never mined.
    pub fn genesis() -> Self {
        Self::new(
            0,
            GENESIS_TIMESTAMP_MS,
            vec![Transaction::genesis(GENESIS_TIMESTAMP_MS)],
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Hasher primed with everything except the nonce
    ///
    /// Layout (integers LITTLE-ENDIAN, byte fields length-prefixed):
    /// index | timestamp | tx count | per tx: every field incl. signature and tx_hash | previous_hash
    fn hash_prefix(&self) -> Sha3_256 {
        let mut hasher = Sha3_256::new();
        hasher.update(self.index.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update((self.transactions.len() as u64).to_le_bytes());

        for tx in &self.transactions {
            hasher.update(tx.timestamp.to_le_bytes());
            update_field(&mut hasher, tx.from.to_string().as_bytes());
            update_field(&mut hasher, tx.to.to_string().as_bytes());
            hasher.update(tx.amount.to_le_bytes());
            hasher.update(tx.nonce.to_le_bytes());
            update_field(&mut hasher, tx.signature_type.as_str().as_bytes());
            update_field(&mut hasher, &tx.public_key);
            update_field(&mut hasher, &tx.signature);
            update_field(&mut hasher, tx.tx_hash.as_bytes());
        }

        update_field(&mut hasher, self.previous_hash.as_bytes());
        hasher
    }

    fn finish_hash(prefix: &Sha3_256, nonce: u64) -> String {
        let mut hasher = prefix.clone();
        hasher.update(nonce.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Calculate block hash using SHA3-256 over all fields including the nonce
    pub fn compute_hash(&self) -> String {
        Self::finish_hash(&self.hash_prefix(), self.nonce)
    }

    /// Check if block hash meets difficulty target
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        hash_meets_difficulty(&self.hash, difficulty)
    }

    /// Mine the block by finding a valid nonce, starting from 0.
    ///
    /// Runs until a hash with `difficulty` leading zero hex digits is found.
    pub fn mine(&mut self, difficulty: u32) -> MiningOutcome {
        match self.search::<Infallible, _>(difficulty, u64::MAX, |_| None) {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }

    /// Same search as [`Block::mine`], polling `cancel` and `deadline` every
    /// `check_interval` attempts. On abort the block is left as it was.
    pub fn mine_cancellable(
        &mut self,
        difficulty: u32,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        check_interval: u64,
    ) -> Result<MiningOutcome, MiningError> {
        let (saved_nonce, saved_hash) = (self.nonce, self.hash.clone());

        let result = self.search(difficulty, check_interval.max(1), |attempts| {
            if cancel.is_cancelled() {
                Some(MiningError::Cancelled { attempts })
            } else if deadline.is_some_and(|d| Instant::now() >= d) {
                Some(MiningError::DeadlineExceeded { attempts })
            } else {
                None
            }
        });

        if let Err(err) = &result {
            tracing::warn!("Mining of block {} aborted: {}", self.index, err);
            self.nonce = saved_nonce;
            self.hash = saved_hash;
        }
        result
    }

    fn search<E, F>(&mut self, difficulty: u32, check_interval: u64, mut abort: F) -> Result<MiningOutcome, E>
    where
        F: FnMut(u64) -> Option<E>,
    {
        tracing::debug!("Mining block {} with difficulty {}", self.index, difficulty);
        let start = Instant::now();
        let prefix = self.hash_prefix();

        self.nonce = 0;
        self.hash = Self::finish_hash(&prefix, self.nonce);

        while !hash_meets_difficulty(&self.hash, difficulty) {
            if self.nonce % check_interval == 0 {
                if let Some(err) = abort(self.nonce) {
                    return Err(err);
                }
            }
            self.nonce += 1;
            self.hash = Self::finish_hash(&prefix, self.nonce);
        }

        let elapsed = start.elapsed().as_secs_f64();
        tracing::info!(
            "Block {} mined! Nonce: {}, Time: {:.2}s, Hashrate: {:.0} H/s",
            self.index,
            self.nonce,
            elapsed,
            (self.nonce + 1) as f64 / elapsed.max(f64::EPSILON)
        );

        Ok(MiningOutcome {
            hash: self.hash.clone(),
            nonce: self.nonce,
            attempts_required: self.nonce,
        })
    }

    /// Stored hash agrees with the current field values
    pub fn has_consistent_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Partition transactions by signature type
    pub fn security_metrics(&self) -> BlockSecurityMetrics {
        let (total_transactions, shares) = signature_shares(self.transactions.iter(), &SignatureType::ALL);
        BlockSecurityMetrics {
            total_transactions,
            shares,
        }
    }
}

fn update_field(hasher: &mut Sha3_256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

pub fn hash_meets_difficulty(hash: &str, difficulty: u32) -> bool {
    hash.bytes().take_while(|b| *b == b'0').count() >= difficulty as usize
}
