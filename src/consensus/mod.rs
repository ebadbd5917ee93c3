pub mod blockchain;
pub mod mempool;

pub use blockchain::{
    verify_chain, Balance, IntegrityViolation, KindValue, Ledger, LedgerError, LedgerSecurityMetrics, LedgerStatus,
    MiningReceipt, TransactionRecord,
};
pub use mempool::{PoolError, TransactionPool};
