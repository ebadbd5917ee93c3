// Library exports for QLEDGER
pub mod config;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod storage;

pub use config::LedgerConfig;
pub use consensus::{Ledger, LedgerError};
