//! Error handling for the ledger
//!
//! Every fallible operation in the crate returns [`Result`]. Bad input (addresses,
//! amounts) becomes a typed error instead of aborting the process.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Checksum mismatch or malformed Base58 payload
    InvalidAddress(String),
    /// Amount is zero, negative, not finite or too large to represent
    InvalidAmount(String),
    /// Unspent value below the requested amount (both in base units)
    InsufficientFunds { required: u64, available: u64 },
    /// Referenced transaction, block or chain is absent
    NotFound(String),
    /// Storage read/write or (de)serialization failure
    Persistence(String),
    /// The nonce space was exhausted before a valid seal was found
    SealingExhausted,
    /// Key generation, signing or clock errors
    Crypto(String),
    /// Transaction validation errors
    Transaction(String),
    /// Wallet operation errors
    Wallet(String),
    /// Block validation errors
    InvalidBlock(String),
    /// Configuration errors
    Config(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::InvalidAmount(msg) => write!(f, "Invalid amount: {msg}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::NotFound(msg) => write!(f, "Not found: {msg}"),
            LedgerError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            LedgerError::SealingExhausted => {
                write!(f, "Proof-of-work exhausted the nonce space without a seal")
            }
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Transaction(msg) => write!(f, "Transaction error: {msg}"),
            LedgerError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<LedgerError>> for LedgerError {
    fn from(err: sled::transaction::TransactionError<LedgerError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => e.into(),
        }
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Persistence(err.to_string())
    }
}
