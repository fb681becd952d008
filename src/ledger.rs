//! The ledger's public face: the four operations upstream services call.
//!
//! `Ledger` owns the chain and the wallet set of one database. Amounts cross this
//! boundary in coins (`f64`) and are kept in base units inside.

use crate::core::{coins_to_units, units_to_coins, Block, Blockchain, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::wallet::{hash_pub_key, validate_address, Wallets};
use log::info;
use sled::Db;
use std::sync::{Mutex, PoisonError};

pub struct Ledger {
    blockchain: Blockchain,
    wallets: Mutex<Wallets>,
    // held from output selection to append so concurrent transfers never pick the same outputs
    transfer_lock: Mutex<()>,
}

impl Ledger {
    /// Opens the ledger in `db`, creating a genesis block paying `genesis_address` if
    /// the chain is empty.
    pub fn open(db: &Db, genesis_address: &str) -> Result<Ledger> {
        if !validate_address(genesis_address) {
            return Err(LedgerError::InvalidAddress(genesis_address.to_string()));
        }
        let blockchain = Blockchain::open(db, genesis_address)?;
        Self::with_blockchain(db, blockchain)
    }

    /// Opens the ledger in `db`, which must already hold a chain.
    pub fn load(db: &Db) -> Result<Ledger> {
        let blockchain = Blockchain::load(db)?;
        Self::with_blockchain(db, blockchain)
    }

    fn with_blockchain(db: &Db, blockchain: Blockchain) -> Result<Ledger> {
        Ok(Ledger {
            blockchain,
            wallets: Mutex::new(Wallets::open(db)?),
            transfer_lock: Mutex::new(()),
        })
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn create_wallet(&self) -> Result<String> {
        self.wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .create_wallet()
    }

    pub fn list_addresses(&self) -> Result<Vec<String>> {
        Ok(self
            .wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_addresses())
    }

    /// Balance of `address` in coins.
    pub fn get_balance(&self, address: &str) -> Result<f64> {
        let units = UTXOSet::new(self.blockchain.clone()).get_balance(address)?;
        Ok(units_to_coins(units))
    }

    /// Moves `amount` coins from `from` (which must be a local wallet) to `to` and
    /// returns the block recording it. On error nothing is written.
    pub fn transfer(&self, from: &str, to: &str, amount: f64) -> Result<Block> {
        if !validate_address(from) {
            return Err(LedgerError::InvalidAddress(from.to_string()));
        }
        if !validate_address(to) {
            return Err(LedgerError::InvalidAddress(to.to_string()));
        }
        let amount_units = coins_to_units(amount)?;

        let wallet = self
            .wallets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_wallet(from)
            .cloned()
            .ok_or_else(|| LedgerError::Wallet(format!("No local wallet for {from}")))?;

        let _guard = self
            .transfer_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let utxo_set = UTXOSet::new(self.blockchain.clone());
        let (accumulated, valid_outputs) = utxo_set
            .find_spendable_outputs(&hash_pub_key(wallet.get_public_key()), amount_units)?;
        if accumulated < amount_units {
            return Err(LedgerError::InsufficientFunds {
                required: amount_units,
                available: accumulated,
            });
        }

        let mut tx = Transaction::new_utxo_transaction(
            wallet.get_public_key(),
            to,
            amount_units,
            accumulated,
            &valid_outputs,
        )?;
        self.blockchain.sign_transaction(&mut tx, wallet.get_pkcs8())?;
        let block = self.blockchain.mine_block(&[tx])?;

        info!("Transferred {amount} from {from} to {to} in block {}", block.get_hash());
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_temporary_database;

    fn funded_ledger() -> (Db, Ledger, String, String) {
        let db = open_temporary_database().unwrap();
        let mut wallets = Wallets::open(&db).unwrap();
        let sender = wallets.create_wallet().unwrap();
        drop(wallets);

        let ledger = Ledger::open(&db, &sender).unwrap();
        let recipient = ledger.create_wallet().unwrap();
        (db, ledger, sender, recipient)
    }

    #[test]
    fn test_transfer_scenario() {
        let (_db, ledger, a, b) = funded_ledger();
        assert_eq!(ledger.get_balance(&a).unwrap(), 1000.0);

        let block = ledger.transfer(&a, &b, 150.0).unwrap();

        assert_eq!(ledger.get_balance(&a).unwrap(), 850.0);
        assert_eq!(ledger.get_balance(&b).unwrap(), 150.0);
        assert_eq!(ledger.blockchain().block_count(), 2);
        assert_eq!(block.get_transactions().len(), 1);
        let outputs = block.get_transactions()[0].get_vout();
        assert_eq!(outputs.len(), 2);
        assert_eq!(units_to_coins(outputs[0].get_value()), 150.0);
        assert_eq!(units_to_coins(outputs[1].get_value()), 850.0);
    }

    #[test]
    fn test_insufficient_funds_writes_nothing() {
        let (_db, ledger, a, b) = funded_ledger();
        let tip = ledger.blockchain().get_tip_hash();

        let err = ledger.transfer(&a, &b, 1000.5).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.blockchain().get_tip_hash(), tip);
        assert_eq!(ledger.blockchain().block_count(), 1);
    }

    #[test]
    fn test_invalid_inputs_are_typed_errors() {
        let (_db, ledger, a, b) = funded_ledger();

        assert!(matches!(
            ledger.transfer("nope", &b, 1.0),
            Err(LedgerError::InvalidAddress(_))
        ));
        assert!(matches!(
            ledger.transfer(&a, "nope", 1.0),
            Err(LedgerError::InvalidAddress(_))
        ));
        assert!(matches!(
            ledger.transfer(&a, &b, -3.0),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.transfer(&a, &b, f64::NAN),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            ledger.get_balance("nope"),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_transfer_from_foreign_address_needs_wallet() {
        let (_db, ledger, _a, b) = funded_ledger();
        let foreign = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
        assert!(matches!(
            ledger.transfer(foreign, &b, 1.0),
            Err(LedgerError::Wallet(_))
        ));
    }

    #[test]
    fn test_open_rejects_invalid_genesis_address() {
        let db = open_temporary_database().unwrap();
        assert!(matches!(
            Ledger::open(&db, "bad"),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_list_addresses() {
        let (_db, ledger, a, b) = funded_ledger();
        let addresses = ledger.list_addresses().unwrap();
        assert_eq!(addresses.len(), 2);
        assert!(addresses.contains(&a));
        assert!(addresses.contains(&b));
    }
}
