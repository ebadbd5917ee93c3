pub mod address;
pub mod transaction;
pub mod validation;
pub mod block;

pub use address::{Address, AddressError, AddressKind};
pub use block::{Block, BlockSecurityMetrics, MiningError, MiningOutcome, SignatureShare};
pub use transaction::{Amount, SignatureType, Transaction};
pub use validation::{check_structure, TransactionError, TransactionValidator};
