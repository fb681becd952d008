// The authoritative chain. Blocks live in sled as rows keyed by hash, with a second
// tree mapping an auto-increment id to the hash so the newest row can be found.

use crate::core::block::BlockRow;
use crate::core::transaction::PrevTransactions;
use crate::core::{Block, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{BLOCKS_TREE, BLOCK_IDS_TREE};
use data_encoding::HEXLOWER;
use log::info;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::{Db, Transactional, Tree};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Handle to the persisted chain. Clones share the tip and the append lock.
///
/// Only one `Blockchain` per database should exist in a process: the append lock is
/// per handle family, not per database.
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<String>>,
    append_lock: Arc<Mutex<()>>,
    db: Db,
    blocks: Tree,
    block_ids: Tree,
}

impl Blockchain {
    /// Opens the chain stored in `db`, mining a genesis block that pays
    /// `genesis_address` when the store holds no blocks yet.
    pub fn open(db: &Db, genesis_address: &str) -> Result<Blockchain> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let block_ids = db.open_tree(BLOCK_IDS_TREE)?;

        let tip_hash = match Self::latest_row(&block_ids)? {
            Some((_, hash)) => hash,
            None => {
                info!("Creating genesis block for address: {genesis_address}");
                let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, "genesis")?;
                let block = Block::generate_genesis_block(&coinbase_tx)?;
                Self::persist_block(db, &blocks, &block_ids, &block)?;
                block.get_hash().to_string()
            }
        };

        Ok(Self::from_parts(db, blocks, block_ids, tip_hash))
    }

    /// Opens an existing chain; `NotFound` when the store holds no blocks.
    pub fn load(db: &Db) -> Result<Blockchain> {
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let block_ids = db.open_tree(BLOCK_IDS_TREE)?;
        let (_, tip_hash) = Self::latest_row(&block_ids)?.ok_or_else(|| {
            LedgerError::NotFound("No existing blockchain found. Create one first.".to_string())
        })?;
        Ok(Self::from_parts(db, blocks, block_ids, tip_hash))
    }

    fn from_parts(db: &Db, blocks: Tree, block_ids: Tree, tip_hash: String) -> Blockchain {
        Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            append_lock: Arc::new(Mutex::new(())),
            db: db.clone(),
            blocks,
            block_ids,
        }
    }

    /// The row with the greatest id, as (id, hash).
    fn latest_row(block_ids: &Tree) -> Result<Option<(u64, String)>> {
        let Some((key, value)) = block_ids.last()? else {
            return Ok(None);
        };
        let id_bytes: [u8; 8] = key.as_ref().try_into().map_err(|_| {
            LedgerError::Persistence("Malformed block id key".to_string())
        })?;
        let hash = String::from_utf8(value.to_vec())
            .map_err(|e| LedgerError::Persistence(format!("Invalid tip hash format: {e}")))?;
        Ok(Some((u64::from_be_bytes(id_bytes), hash)))
    }

    /// Writes the row and its id in one sled transaction, then flushes.
    fn persist_block(db: &Db, blocks: &Tree, block_ids: &Tree, block: &Block) -> Result<u64> {
        let id = Self::latest_row(block_ids)?.map_or(1, |(id, _)| id + 1);
        let row_bytes = block.to_row(id)?.serialize()?;
        let hash = block.get_hash();

        (blocks, block_ids).transaction(
            |(tx_blocks, tx_ids)| -> ConflictableTransactionResult<(), LedgerError> {
                if tx_blocks.get(hash)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        LedgerError::InvalidBlock(format!("Block {hash} already stored")),
                    ));
                }
                tx_blocks.insert(hash, row_bytes.as_slice())?;
                tx_ids.insert(id.to_be_bytes().to_vec(), hash)?;
                Ok(())
            },
        )?;
        db.flush()?;
        Ok(id)
    }

    pub fn get_tip_hash(&self) -> String {
        self.tip_hash
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &str) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *tip_hash = String::from(new_tip_hash)
    }

    /// Appends a block holding `transactions` and advances the tip.
    ///
    /// The append lock is held from verification through sealing to the tip update, so
    /// two callers can never seal against the same tip. Nothing is persisted when any
    /// step fails. Coinbase transactions are only minted into genesis and are rejected.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for (i, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                return Err(LedgerError::Transaction(format!(
                    "Coinbase transaction at index {i} outside genesis"
                )));
            }
            if !self.verify_transaction(transaction)? {
                return Err(LedgerError::Transaction(format!(
                    "Invalid transaction at index {i}"
                )));
            }
            self.validate_transaction_inputs(transaction)?;
        }
        Self::check_for_double_spending(transactions)?;

        let block = Block::new_block(self.get_tip_hash(), transactions)?;
        let id = Self::persist_block(&self.db, &self.blocks, &self.block_ids, &block)?;
        self.set_tip_hash(block.get_hash());

        info!(
            "Appended block {} (row {id}) with {} transactions",
            block.get_hash(),
            transactions.len()
        );
        Ok(block)
    }

    /// Seals and stores `transactions` with no checks at all.
    #[cfg(test)]
    pub(crate) fn append_unchecked(&self, transactions: &[Transaction]) -> Result<Block> {
        let block = Block::new_block(self.get_tip_hash(), transactions)?;
        Self::persist_block(&self.db, &self.blocks, &self.block_ids, &block)?;
        self.set_tip_hash(block.get_hash());
        Ok(block)
    }

    /// Walks from the current tip back to genesis. The tip is read once, so a scan is
    /// never affected by blocks appended after the iterator was created.
    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.blocks.clone())
    }

    pub fn get_block(&self, block_hash: &str) -> Result<Option<Block>> {
        fetch_block(&self.blocks, block_hash)
    }

    /// Height of the tip; genesis is height 0.
    pub fn get_best_height(&self) -> Result<u64> {
        let (id, _) = Self::latest_row(&self.block_ids)?
            .ok_or_else(|| LedgerError::NotFound("empty chain".to_string()))?;
        Ok(id - 1)
    }

    pub fn block_count(&self) -> usize {
        self.block_ids.len()
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        for block in self.iterator() {
            let block = block?;
            if let Some(tx) = block.get_transactions().iter().find(|tx| tx.get_id() == txid) {
                return Ok(tx.clone());
            }
        }
        Err(LedgerError::NotFound(format!(
            "transaction {}",
            HEXLOWER.encode(txid)
        )))
    }

    /// The transactions whose outputs `tx` spends, keyed by hex id.
    pub fn find_referenced_transactions(&self, tx: &Transaction) -> Result<PrevTransactions> {
        let mut prev_txs = PrevTransactions::new();
        if tx.is_coinbase() {
            return Ok(prev_txs);
        }
        for vin in tx.get_vin() {
            let txid_hex = vin.get_txid_hex();
            if !prev_txs.contains_key(&txid_hex) {
                let prev_tx = self.find_transaction(vin.get_txid())?;
                prev_txs.insert(txid_hex, prev_tx);
            }
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        let prev_txs = self.find_referenced_transactions(tx)?;
        tx.sign(pkcs8, &prev_txs)
    }

    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        let prev_txs = self.find_referenced_transactions(tx)?;
        tx.verify(&prev_txs)
    }

    pub fn is_output_spent(&self, txid: &[u8], vout: usize) -> Result<bool> {
        for block in self.iterator() {
            let block = block?;
            let spent = block
                .get_transactions()
                .iter()
                .filter(|tx| !tx.is_coinbase())
                .flat_map(|tx| tx.get_vin())
                .any(|input| input.get_txid() == txid && input.get_vout() == vout);
            if spent {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rejects a transaction any of whose inputs is already spent on chain.
    pub fn validate_transaction_inputs(&self, transaction: &Transaction) -> Result<()> {
        if transaction.is_coinbase() {
            return Ok(());
        }
        for input in transaction.get_vin() {
            if self.is_output_spent(input.get_txid(), input.get_vout())? {
                return Err(LedgerError::Transaction(format!(
                    "Input already spent: {}:{}",
                    input.get_txid_hex(),
                    input.get_vout()
                )));
            }
        }
        Ok(())
    }

    fn check_for_double_spending(transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(&[u8], usize)> = HashSet::new();
        for (tx_index, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                if !spent_outputs.insert((input.get_txid(), input.get_vout())) {
                    return Err(LedgerError::Transaction(format!(
                        "Double-spending detected in transaction {tx_index}: output {}:{} already spent in this block",
                        input.get_txid_hex(),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Walks the whole chain checking seals, hash linkage, the genesis shape and every
    /// transaction's signatures. Returns the number of blocks checked.
    pub fn verify_chain(&self) -> Result<usize> {
        let mut expected_hash = self.get_tip_hash();
        let mut count = 0;
        let mut reached_genesis = false;

        for block in self.iterator() {
            let block = block?;
            count += 1;
            if block.get_hash() != expected_hash {
                return Err(LedgerError::InvalidBlock(format!(
                    "Row stored under {expected_hash} claims hash {}",
                    block.get_hash()
                )));
            }
            if !ProofOfWork::validate(&block) {
                return Err(LedgerError::InvalidBlock(format!(
                    "Block {} fails proof-of-work validation",
                    block.get_hash()
                )));
            }
            if block.is_genesis() {
                let txs = block.get_transactions();
                if txs.len() != 1 || !txs[0].is_coinbase() {
                    return Err(LedgerError::InvalidBlock(
                        "Genesis block must hold exactly one coinbase transaction".to_string(),
                    ));
                }
                reached_genesis = true;
            } else if block.get_transactions().iter().any(Transaction::is_coinbase) {
                return Err(LedgerError::InvalidBlock(format!(
                    "Block {} mints a coinbase outside genesis",
                    block.get_hash()
                )));
            }
            for tx in block.get_transactions() {
                if !self.verify_transaction(tx)? {
                    return Err(LedgerError::InvalidBlock(format!(
                        "Block {} holds invalid transaction {}",
                        block.get_hash(),
                        tx.get_id_hex()
                    )));
                }
            }
            expected_hash = block.get_pre_block_hash().to_string();
        }

        if !reached_genesis {
            return Err(LedgerError::InvalidBlock(
                "Chain does not end in a genesis block".to_string(),
            ));
        }
        Ok(count)
    }
}

fn fetch_block(blocks: &Tree, block_hash: &str) -> Result<Option<Block>> {
    match blocks.get(block_hash)? {
        Some(bytes) => Ok(Some(Block::from_row(BlockRow::deserialize(bytes.as_ref())?)?)),
        None => Ok(None),
    }
}

/// Lazily yields blocks from a pinned tip back to genesis, one fetch per step.
///
/// A storage error is yielded once and ends the iteration.
pub struct BlockchainIterator {
    blocks: Tree,
    current_hash: Option<String>,
}

impl BlockchainIterator {
    fn new(tip_hash: String, blocks: Tree) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: Some(tip_hash),
            blocks,
        }
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        let block = match fetch_block(&self.blocks, &hash) {
            Ok(Some(block)) => block,
            Ok(None) => return Some(Err(LedgerError::NotFound(format!("block {hash}")))),
            Err(e) => return Some(Err(e)),
        };
        if !block.is_genesis() {
            self.current_hash = Some(block.get_pre_block_hash().to_string());
        }
        Some(Ok(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TXOutput, BLOCK_REWARD};
    use crate::storage::open_temporary_database;
    use crate::test_utils::{create_test_blockchain, transfer_tx};
    use crate::wallet::{hash_pub_key, Wallet};

    #[test]
    fn test_open_creates_genesis() {
        let fixture = create_test_blockchain();
        let blockchain = &fixture.blockchain;

        assert_eq!(blockchain.block_count(), 1);
        assert_eq!(blockchain.get_best_height().unwrap(), 0);

        let blocks: Vec<Block> = blockchain.iterator().collect::<Result<_>>().unwrap();
        assert_eq!(blocks.len(), 1);
        let genesis = &blocks[0];
        assert_eq!(genesis.get_pre_block_hash(), "0");
        assert_eq!(genesis.get_hash(), blockchain.get_tip_hash());

        let coinbase = &genesis.get_transactions()[0];
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.get_vout()[0].get_value(), BLOCK_REWARD);
        let owner = fixture.wallets.get_wallet(&fixture.genesis_address).unwrap();
        assert!(coinbase.get_vout()[0].is_locked_with_key(&hash_pub_key(owner.get_public_key())));
    }

    #[test]
    fn test_reopen_keeps_tip_and_skips_genesis() {
        let fixture = create_test_blockchain();
        let tip = fixture.blockchain.get_tip_hash();

        let other_address = Wallet::new().unwrap().get_address();
        let reopened = Blockchain::open(&fixture.db, &other_address).unwrap();
        assert_eq!(reopened.get_tip_hash(), tip);
        assert_eq!(reopened.block_count(), 1);
    }

    #[test]
    fn test_load_empty_store_is_not_found() {
        let db = open_temporary_database().unwrap();
        assert!(matches!(
            Blockchain::load(&db),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_mine_block_advances_tip() {
        let fixture = create_test_blockchain();
        let blockchain = &fixture.blockchain;
        let genesis_hash = blockchain.get_tip_hash();

        let tx = transfer_tx(&fixture, 150);
        let block = blockchain.mine_block(&[tx]).unwrap();

        assert_eq!(block.get_pre_block_hash(), genesis_hash);
        assert_eq!(blockchain.get_tip_hash(), block.get_hash());
        assert_eq!(blockchain.get_best_height().unwrap(), 1);
        assert!(ProofOfWork::validate(&block));
        assert_eq!(blockchain.get_block(block.get_hash()).unwrap(), Some(block.clone()));
        assert_eq!(blockchain.get_block("missing").unwrap(), None);

        let hashes: Vec<String> = blockchain
            .iterator()
            .map(|b| b.unwrap().get_hash().to_string())
            .collect();
        assert_eq!(hashes, vec![block.get_hash().to_string(), genesis_hash]);
    }

    #[test]
    fn test_double_spend_rejected_and_nothing_persisted() {
        let fixture = create_test_blockchain();
        let blockchain = &fixture.blockchain;

        let first = transfer_tx(&fixture, 100);
        let second = transfer_tx(&fixture, 200);

        // both spend the genesis output inside one block
        let err = blockchain.mine_block(&[first.clone(), second.clone()]).unwrap_err();
        assert!(matches!(err, LedgerError::Transaction(_)));
        assert_eq!(blockchain.block_count(), 1);

        blockchain.mine_block(&[first]).unwrap();
        let err = blockchain.mine_block(&[second]).unwrap_err();
        assert!(matches!(err, LedgerError::Transaction(msg) if msg.contains("already spent")));
        assert_eq!(blockchain.block_count(), 2);
    }

    #[test]
    fn test_find_transaction() {
        let fixture = create_test_blockchain();
        let blockchain = &fixture.blockchain;
        let tx = transfer_tx(&fixture, 5);
        blockchain.mine_block(&[tx.clone()]).unwrap();

        assert_eq!(blockchain.find_transaction(tx.get_id()).unwrap(), tx);
        assert!(matches!(
            blockchain.find_transaction(&[0xAB; 32]),
            Err(LedgerError::NotFound(_))
        ));
        assert!(blockchain.is_output_spent(tx.get_vin()[0].get_txid(), 0).unwrap());
        assert!(!blockchain.is_output_spent(tx.get_id(), 0).unwrap());
    }

    #[test]
    fn test_verify_chain_and_tamper_detection() {
        let fixture = create_test_blockchain();
        let blockchain = &fixture.blockchain;
        blockchain.mine_block(&[transfer_tx(&fixture, 42)]).unwrap();
        assert_eq!(blockchain.verify_chain().unwrap(), 2);

        let tip = blockchain.get_tip_hash();
        let blocks = fixture.db.open_tree(BLOCKS_TREE).unwrap();
        let mut row = BlockRow::deserialize(&blocks.get(&tip).unwrap().unwrap()).unwrap();
        row.nonce += 1;
        blocks.insert(tip.as_str(), row.serialize().unwrap()).unwrap();

        assert!(matches!(
            blockchain.verify_chain(),
            Err(LedgerError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_mine_block_rejects_coinbase() {
        let fixture = create_test_blockchain();
        let blockchain = &fixture.blockchain;
        let tip = blockchain.get_tip_hash();

        let reward = Transaction::new_coinbase_tx(&fixture.genesis_address, "late").unwrap();
        let mut oversized = reward.clone();
        oversized.vout_mut()[0] = TXOutput::new(u64::MAX - 5, &fixture.genesis_address).unwrap();
        oversized.refresh_id().unwrap();

        for tx in [reward, oversized] {
            assert!(matches!(
                blockchain.mine_block(&[tx]),
                Err(LedgerError::Transaction(_))
            ));
        }
        assert_eq!(blockchain.get_tip_hash(), tip);
        assert_eq!(blockchain.block_count(), 1);
    }

    #[test]
    fn test_verify_chain_rejects_coinbase_after_genesis() {
        let fixture = create_test_blockchain();
        let reward = Transaction::new_coinbase_tx(&fixture.recipient_address, "late").unwrap();
        fixture.blockchain.append_unchecked(&[reward]).unwrap();

        assert!(matches!(
            fixture.blockchain.verify_chain(),
            Err(LedgerError::InvalidBlock(_))
        ));
    }
}
