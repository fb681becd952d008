//! Fixtures shared by unit tests

use crate::core::{Blockchain, Transaction};
use crate::storage::{open_temporary_database, UTXOSet};
use crate::wallet::{hash_pub_key, Wallets};
use sled::Db;

/// A chain on a temporary database whose genesis pays `genesis_address`, plus a second
/// local wallet to receive transfers.
pub struct TestChain {
    pub db: Db,
    pub blockchain: Blockchain,
    pub wallets: Wallets,
    pub genesis_address: String,
    pub recipient_address: String,
}

pub fn create_test_blockchain() -> TestChain {
    let db = open_temporary_database().unwrap();
    let mut wallets = Wallets::open(&db).unwrap();
    let genesis_address = wallets.create_wallet().unwrap();
    let recipient_address = wallets.create_wallet().unwrap();
    let blockchain = Blockchain::open(&db, &genesis_address).unwrap();

    TestChain {
        db,
        blockchain,
        wallets,
        genesis_address,
        recipient_address,
    }
}

/// A signed transfer of `amount` base units from the genesis wallet to the recipient,
/// built from the sender's current unspent outputs but not yet mined.
pub fn transfer_tx(chain: &TestChain, amount: u64) -> Transaction {
    let sender = chain.wallets.get_wallet(&chain.genesis_address).unwrap();
    let utxo_set = UTXOSet::new(chain.blockchain.clone());
    let (accumulated, outputs) = utxo_set
        .find_spendable_outputs(&hash_pub_key(sender.get_public_key()), amount)
        .unwrap();

    let mut tx = Transaction::new_utxo_transaction(
        sender.get_public_key(),
        &chain.recipient_address,
        amount,
        accumulated,
        &outputs,
    )
    .unwrap();
    chain
        .blockchain
        .sign_transaction(&mut tx, sender.get_pkcs8())
        .unwrap();
    tx
}
