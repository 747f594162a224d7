//! Transaction lifecycle: records, validation, confirmation and the log

pub mod confirm;
pub mod log;
pub mod manager;
pub mod types;
pub mod validation;

pub use confirm::{Confirmation, ConfirmationPolicy, ConfirmationTracker};
pub use log::{TransactionLog, DEFAULT_CAPACITY};
pub use manager::{ManagerConfig, TransactionManager};
pub use types::{Operation, Transaction, TxId, TxKind, TxStatus};
pub use validation::ValidationError;
