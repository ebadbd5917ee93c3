use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::core::address::{Address, AddressKind};
use crate::crypto::{SignatureError, SignatureScheme};

pub use crate::crypto::SignatureType;

/// Amounts are whole tokens
pub type Amount = u64;

/// Transaction with an attached signature from one of the registered capabilities.
///
/// `tx_hash` is computed once at creation from every other field except
/// `signature` (the signature signs the hash) and is the transaction's identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub timestamp: i64,           // Unix time, milliseconds
    pub from: Address,
    pub to: Address,
    pub amount: Amount,
    pub nonce: u64,               // Random de-duplication token
    pub signature_type: SignatureType,
    #[serde(default)]
    pub public_key: Vec<u8>,
    #[serde(default)]
    pub signature: Vec<u8>,
    pub tx_hash: String,
}

impl Transaction {
    /// Build, hash and sign a transfer from the account controlled by `public_key`.
    pub fn new_signed(
        scheme: &dyn SignatureScheme,
        public_key: &[u8],
        secret_key: &[u8],
        to: Address,
        amount: Amount,
    ) -> Result<Self, SignatureError> {
        let signature_type = scheme.signature_type();
        let kind = AddressKind::for_signature_type(signature_type)
            .ok_or(SignatureError::UnsupportedScheme(signature_type))?;

        let mut tx = Self::unsigned(
            Utc::now().timestamp_millis(),
            Address::from_public_key(kind, public_key),
            to,
            amount,
            rand::random(),
            signature_type,
            public_key.to_vec(),
        );
        tx.signature = scheme.sign(tx.signing_message(), secret_key)?;
        Ok(tx)
    }

    /// Assemble a transaction and fix its hash. The signature is left empty.
    pub fn unsigned(
        timestamp: i64,
        from: Address,
        to: Address,
        amount: Amount,
        nonce: u64,
        signature_type: SignatureType,
        public_key: Vec<u8>,
    ) -> Self {
        let mut tx = Self {
            timestamp,
            from,
            to,
            amount,
            nonce,
            signature_type,
            public_key,
            signature: Vec::new(),
            tx_hash: String::new(),
        };
        tx.tx_hash = tx.compute_hash();
        tx
    }

    /// The single transaction carried by the genesis block.
    pub fn genesis(timestamp: i64) -> Self {
        Self::unsigned(
            timestamp,
            Address::Genesis,
            Address::Genesis,
            0,
            0,
            SignatureType::System,
            Vec::new(),
        )
    }

    /// Reward credited to a miner for one block.
    pub fn mining_reward(miner: Address, amount: Amount) -> Self {
        Self::unsigned(
            Utc::now().timestamp_millis(),
            Address::MiningReward,
            miner,
            amount,
            rand::random(),
            SignatureType::System,
            Vec::new(),
        )
    }

    /// Content hash over every field except the signature and the hash itself
    ///
    /// - All integers are LITTLE-ENDIAN
    /// - Addresses are hashed in their rendered string form
    /// - Public key included (binds the signature to one key)
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha3_256::new();

        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.from.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.to.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.amount.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update([self.signature_type.wire_tag()]);
        hasher.update(&self.public_key);

        hex::encode(hasher.finalize())
    }

    /// Bytes handed to the signing capability.
    pub fn signing_message(&self) -> &[u8] {
        self.tx_hash.as_bytes()
    }

    pub fn is_genesis(&self) -> bool {
        self.from == Address::Genesis
    }

    pub fn is_mining_reward(&self) -> bool {
        self.from == Address::MiningReward
    }

    /// Genesis or reward: system-issued value, never signed
    pub fn is_system(&self) -> bool {
        self.signature_type == SignatureType::System
    }

    pub fn involves(&self, address: &Address) -> bool {
        &self.from == address || &self.to == address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EcdsaScheme, FalconScheme};

    fn account(kind: AddressKind, seed: &[u8]) -> Address {
        Address::from_public_key(kind, seed)
    }

    #[test]
    fn test_transaction_hash() {
        let tx = Transaction::unsigned(
            1_700_000_000_000,
            account(AddressKind::Falcon, b"a"),
            account(AddressKind::Falcon, b"b"),
            10,
            7,
            SignatureType::Falcon,
            vec![1, 2, 3],
        );
        assert_eq!(tx.tx_hash.len(), 64); // SHA3-256 hex
        assert_eq!(tx.tx_hash, tx.compute_hash());
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base = Transaction::unsigned(
            1,
            account(AddressKind::Classical, b"a"),
            account(AddressKind::Classical, b"b"),
            10,
            7,
            SignatureType::Classical,
            vec![9],
        );

        let mut changed = base.clone();
        changed.amount = 11;
        assert_ne!(changed.compute_hash(), base.tx_hash);

        let mut changed = base.clone();
        changed.nonce = 8;
        assert_ne!(changed.compute_hash(), base.tx_hash);

        let mut changed = base.clone();
        changed.to = account(AddressKind::Classical, b"c");
        assert_ne!(changed.compute_hash(), base.tx_hash);

        let mut changed = base.clone();
        changed.signature_type = SignatureType::Falcon;
        assert_ne!(changed.compute_hash(), base.tx_hash);

        // Signature is attached after hashing
        let mut changed = base.clone();
        changed.signature = vec![1, 2, 3];
        assert_eq!(changed.compute_hash(), base.tx_hash);
    }

    #[test]
    fn test_system_transactions() {
        let genesis = Transaction::genesis(0);
        assert!(genesis.is_genesis());
        assert!(genesis.is_system());
        assert_eq!(genesis.amount, 0);

        let miner = account(AddressKind::Falcon, b"miner");
        let reward = Transaction::mining_reward(miner.clone(), 100);
        assert!(reward.is_mining_reward());
        assert!(reward.is_system());
        assert_eq!(reward.to, miner);
        assert!(reward.involves(&miner));
    }

    #[test]
    fn test_new_signed_binds_sender_to_key() {
        let keys = FalconScheme.generate_keypair();
        let to = account(AddressKind::Classical, b"bob");
        let tx = Transaction::new_signed(&FalconScheme, &keys.public_key, keys.secret_key(), to.clone(), 25).unwrap();

        assert_eq!(tx.from, Address::from_public_key(AddressKind::Falcon, &keys.public_key));
        assert_eq!(tx.signature_type, SignatureType::Falcon);
        assert!(FalconScheme.verify(tx.signing_message(), &tx.signature, &tx.public_key));
    }

    #[test]
    fn test_json_layout() {
        let scheme = EcdsaScheme::new();
        let keys = scheme.generate_keypair();
        let tx = Transaction::new_signed(&scheme, &keys.public_key, keys.secret_key(), Address::Genesis, 1).unwrap();

        let value = serde_json::to_value(&tx).unwrap();
        assert!(value.get("txHash").is_some());
        assert!(value.get("signatureType").is_some());
        assert_eq!(value["signatureType"], "classical");

        let back: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, tx);
    }
}
