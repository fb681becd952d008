use crate::error::{LedgerError, Result};
use crate::storage::WALLETS_TREE;
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::{debug, info};
use sled::{Db, Tree};
use std::collections::HashMap;

pub const WALLET_SET_KEY: &str = "wallet_set";

/// The local wallet set, persisted as a single blob in the `wallets` tree.
///
/// The whole map is read when the set is opened and rewritten after every mutation,
/// so a crash loses at most the wallet being created. `Wallets` does no locking of its
/// own; callers that share it across threads wrap it in a `Mutex` (see `Ledger`).
pub struct Wallets {
    tree: Tree,
    wallets: HashMap<String, Wallet>,
}

impl Wallets {
    pub fn open(db: &Db) -> Result<Wallets> {
        let tree = db.open_tree(WALLETS_TREE)?;
        let wallets = match tree.get(WALLET_SET_KEY)? {
            Some(bytes) => deserialize::<HashMap<String, Wallet>>(bytes.as_ref())?,
            None => HashMap::new(),
        };
        debug!("Loaded {} wallets", wallets.len());
        Ok(Wallets { tree, wallets })
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        if self.wallets.contains_key(&address) {
            return Err(LedgerError::Wallet(format!(
                "Address collision for {address}"
            )));
        }
        self.wallets.insert(address.clone(), wallet);

        if let Err(e) = self.save() {
            self.wallets.remove(&address);
            return Err(e);
        }
        info!("Created wallet {address}");
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    fn save(&self) -> Result<()> {
        let bytes = serialize(&self.wallets)?;
        self.tree.insert(WALLET_SET_KEY, bytes)?;
        self.tree.flush()?;
        Ok(())
    }
}
