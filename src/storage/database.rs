// Blocks and wallets share one sled database, so the ledger has a single
// failure and backup model.

use crate::error::{LedgerError, Result};
use log::info;
use sled::Db;
use std::path::Path;

/// Block rows keyed by block hash.
pub const BLOCKS_TREE: &str = "blocks";
/// Big-endian row id -> block hash. The greatest id is the tip.
pub const BLOCK_IDS_TREE: &str = "block_ids";
/// The serialized wallet set.
pub const WALLETS_TREE: &str = "wallets";

pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Db> {
    let path = path.as_ref();
    let db = sled::open(path).map_err(|e| {
        LedgerError::Persistence(format!("Failed to open database at {}: {e}", path.display()))
    })?;
    info!("Opened ledger database at {}", path.display());
    Ok(db)
}

/// An in-memory database that is discarded on drop.
pub fn open_temporary_database() -> Result<Db> {
    sled::Config::new()
        .temporary(true)
        .open()
        .map_err(|e| LedgerError::Persistence(format!("Failed to create temporary database: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        {
            let db = open_database(&path).unwrap();
            db.open_tree(WALLETS_TREE).unwrap().insert("k", "v").unwrap();
            db.flush().unwrap();
        }
        let db = open_database(&path).unwrap();
        let value = db.open_tree(WALLETS_TREE).unwrap().get("k").unwrap();
        assert_eq!(value.as_deref(), Some(b"v".as_slice()));
    }
}
