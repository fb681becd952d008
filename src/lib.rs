//! # Sealed Ledger
//!
//! An embedded single-node ledger: a hash-linked chain of proof-of-work sealed blocks,
//! UTXO accounting and P-256 wallets with Base58Check addresses.
//!
//! ## Layout
//! - `core/`: blocks, transactions and signing, the persisted chain, sealing
//! - `wallet/`: key pairs, the address codec and the persisted wallet set
//! - `storage/`: the sled database and the UTXO queries over the chain
//! - `ledger`: create wallet, list addresses, balance and transfer for upstream callers
//! - `config/`, `cli/`, `utils/`, `error/`: settings, arguments, helpers and errors
//!
//! One sled database holds both blocks and wallets. Appends are serialised by a lock
//! per chain handle; reads pin the tip they start from. There is no consensus,
//! networking, fee market or reorganisation: proof-of-work only seals blocks against
//! tampering.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod test_utils;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, ProofOfWork, TXInput, TXOutput, Transaction,
};
pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use storage::{open_database, open_temporary_database, UTXOSet};
pub use wallet::{
    convert_address, decode_address, hash_pub_key, validate_address, Wallet, Wallets,
};
