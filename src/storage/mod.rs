//! Data storage and persistence
//!
//! The sled database shared by blocks and wallets, and the UTXO queries that derive
//! spendable outputs and balances from the stored chain.

pub mod database;
pub mod utxo_set;

pub use database::{
    open_database, open_temporary_database, BLOCKS_TREE, BLOCK_IDS_TREE, WALLETS_TREE,
};
pub use utxo_set::{SpendableOutputs, UTXOSet};
