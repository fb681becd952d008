use crate::core::{ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{current_timestamp, deserialize, from_json, serialize, sha256_digest, to_json};
use log::debug;

/// `pre_block_hash` of the genesis block; iteration stops once it is reached.
pub const GENESIS_PRE_BLOCK_HASH: &str = "0";

/// A sealed block. Created once by mining and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    timestamp: i64,
    pre_block_hash: String,
    hash: String,
    transactions: Vec<Transaction>,
    nonce: i64,
}

/// One row of the `blocks` tree. The transactions column holds a JSON array.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub struct BlockRow {
    pub id: u64,
    pub hash: String,
    pub transactions: String,
    pub previous_hash: String,
    pub timestamp: i64,
    pub nonce: i64,
}

impl Block {
    /// Seals a block on top of `pre_block_hash`. Blocks the calling thread until the
    /// proof-of-work search completes.
    pub fn new_block(pre_block_hash: String, transactions: &[Transaction]) -> Result<Block> {
        if transactions.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: String::new(),
            transactions: transactions.to_vec(),
            nonce: 0,
        };

        let (nonce, hash) = ProofOfWork::new_proof_of_work(&block).run()?;
        block.nonce = nonce;
        block.hash = hash;
        debug!("Sealed block {} at nonce {nonce}", block.hash);
        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction) -> Result<Block> {
        if !coinbase.is_coinbase() {
            return Err(LedgerError::InvalidBlock(
                "Genesis block must hold a coinbase transaction".to_string(),
            ));
        }
        Block::new_block(
            GENESIS_PRE_BLOCK_HASH.to_string(),
            std::slice::from_ref(coinbase),
        )
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &str {
        self.pre_block_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash == GENESIS_PRE_BLOCK_HASH
    }

    /// SHA-256 over the concatenated transaction ids.
    pub fn hash_transactions(&self) -> Vec<u8> {
        let mut txhashs = vec![];
        for transaction in &self.transactions {
            txhashs.extend(transaction.get_id());
        }
        sha256_digest(txhashs.as_slice())
    }

    pub fn to_row(&self, id: u64) -> Result<BlockRow> {
        Ok(BlockRow {
            id,
            hash: self.hash.clone(),
            transactions: to_json(&self.transactions)?,
            previous_hash: self.pre_block_hash.clone(),
            timestamp: self.timestamp,
            nonce: self.nonce,
        })
    }

    pub fn from_row(row: BlockRow) -> Result<Block> {
        Ok(Block {
            timestamp: row.timestamp,
            pre_block_hash: row.previous_hash,
            hash: row.hash,
            transactions: from_json(&row.transactions)?,
            nonce: row.nonce,
        })
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}

impl BlockRow {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<BlockRow> {
        deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    fn coinbase() -> Transaction {
        Transaction::new_coinbase_tx(&Wallet::new().unwrap().get_address(), "block test").unwrap()
    }

    #[test]
    fn test_empty_block_rejected() {
        assert!(matches!(
            Block::new_block("abc".to_string(), &[]),
            Err(LedgerError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_genesis_links_to_sentinel() {
        let block = Block::generate_genesis_block(&coinbase()).unwrap();
        assert!(block.is_genesis());
        assert_eq!(block.get_pre_block_hash(), "0");
        assert_eq!(block.get_transactions().len(), 1);
        assert_eq!(block.get_hash().len(), 64);
    }

    #[test]
    fn test_row_round_trip() {
        let block = Block::new_block("prev".to_string(), &[coinbase()]).unwrap();
        let row = block.to_row(3).unwrap();
        assert_eq!(row.id, 3);
        assert!(row.transactions.starts_with('['));

        let decoded = BlockRow::deserialize(&row.serialize().unwrap()).unwrap();
        assert_eq!(Block::from_row(decoded).unwrap(), block);
    }

    #[test]
    fn test_hash_transactions_depends_on_ids() {
        let a = Block::new_block("p".to_string(), &[coinbase()]).unwrap();
        let b = Block::new_block("p".to_string(), &[coinbase()]).unwrap();
        assert_ne!(a.hash_transactions(), b.hash_transactions());
    }
}
