//! Core ledger functionality
//!
//! Blocks, transactions, the persisted chain and proof-of-work sealing.

pub mod block;
pub mod blockchain;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, BlockRow, GENESIS_PRE_BLOCK_HASH};
pub use blockchain::{Blockchain, BlockchainIterator};
pub use monetary::{coins_to_units, units_to_coins, BLOCK_REWARD, UNITS_PER_COIN};
pub use proof_of_work::{ProofOfWork, TARGET_BITS};
pub use transaction::{PrevTransactions, TXInput, TXOutput, Transaction};
