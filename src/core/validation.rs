use thiserror::Error;

use crate::core::address::{Address, AddressError, AddressKind};
use crate::core::transaction::{SignatureType, Transaction};
use crate::crypto::{SchemeRegistry, SignatureError};

/// Reasons a transaction is refused at the mempool boundary.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Malformed address: {0}")]
    Address(#[from] AddressError),
    #[error("System transactions must be GENESIS -> GENESIS or MINING_REWARD -> account")]
    InvalidSystemTransaction,
    #[error("Genesis and mining reward transactions are created by the ledger, not submitted")]
    SystemTransactionSubmitted,
    #[error("Sentinel address {0} used by a signed transaction")]
    SentinelInSignedTransaction(Address),
    #[error("Signature type {signature_type} cannot spend from {kind:?} address")]
    AddressKindMismatch { signature_type: SignatureType, kind: AddressKind },
    #[error("Transaction hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },
    #[error("Sender address does not match the attached public key")]
    SenderKeyMismatch,
    #[error("Missing signature or public key")]
    MissingSignature,
    #[error("Signature verification failed")]
    InvalidSignature,
    #[error(transparent)]
    Scheme(#[from] SignatureError),
}

/// Stateless transaction check against the registered signing capabilities.
///
/// Shape rules apply to every transaction. Genesis and reward transactions are
/// accepted once their shape passes; every other transaction must carry a
/// signature over its `tx_hash` from the key that derives its sender address.
#[derive(Clone, Debug)]
pub struct TransactionValidator {
    registry: SchemeRegistry,
}

impl TransactionValidator {
    pub fn new(registry: SchemeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    pub fn validate(&self, tx: &Transaction) -> Result<(), TransactionError> {
        check_structure(tx)?;
        if tx.is_system() {
            return Ok(());
        }
        self.check_signature(tx)
    }

    fn check_signature(&self, tx: &Transaction) -> Result<(), TransactionError> {
        if tx.signature.is_empty() || tx.public_key.is_empty() {
            return Err(TransactionError::MissingSignature);
        }

        // check_structure guarantees an account sender of the matching kind
        let kind = tx.from.kind().ok_or(TransactionError::InvalidSystemTransaction)?;
        if Address::from_public_key(kind, &tx.public_key) != tx.from {
            return Err(TransactionError::SenderKeyMismatch);
        }

        let scheme = self.registry.get(tx.signature_type)?;
        if !scheme.verify(tx.signing_message(), &tx.signature, &tx.public_key) {
            return Err(TransactionError::InvalidSignature);
        }
        Ok(())
    }
}

/// Shape-only rules: well-formed addresses, sentinels only on system
/// transactions, sender kind matching the signature type, intact `tx_hash`.
pub fn check_structure(tx: &Transaction) -> Result<(), TransactionError> {
    tx.from.validate()?;
    tx.to.validate()?;

    if tx.is_system() {
        let well_formed = match (&tx.from, &tx.to) {
            (Address::Genesis, Address::Genesis) => true,
            (Address::MiningReward, Address::Account { .. }) => true,
            _ => false,
        };
        if !well_formed {
            return Err(TransactionError::InvalidSystemTransaction);
        }
    } else {
        for address in [&tx.from, &tx.to] {
            if address.is_system() {
                return Err(TransactionError::SentinelInSignedTransaction(address.clone()));
            }
        }
        if let Some(kind) = tx.from.kind() {
            if kind.signature_type() != tx.signature_type {
                return Err(TransactionError::AddressKindMismatch {
                    signature_type: tx.signature_type,
                    kind,
                });
            }
        }
    }

    let computed = tx.compute_hash();
    if computed != tx.tx_hash {
        return Err(TransactionError::HashMismatch {
            stored: tx.tx_hash.clone(),
            computed,
        });
    }
    Ok(())
}
