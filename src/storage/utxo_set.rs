use crate::core::{Blockchain, TXOutput, Transaction};
use crate::error::{LedgerError, Result};
use crate::wallet::decode_address;
use std::collections::HashMap;

/// Output indices grouped by hex transaction id.
pub type SpendableOutputs = HashMap<String, Vec<usize>>;

/// Unspent-output queries answered by replaying the chain.
///
/// Every query walks the whole chain from the tip, so cost grows with history. Each
/// query uses one iterator and therefore one pinned tip: a block appended mid-scan is
/// not seen, and the answer reflects the chain as of the scan's start.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    /// Transactions holding at least one unspent output locked to `pub_key_hash`, each
    /// paired with the indices of those outputs. Newest first.
    fn scan(&self, pub_key_hash: &[u8]) -> Result<Vec<(Transaction, Vec<usize>)>> {
        let mut unspent = vec![];
        let mut spent_txos: HashMap<String, Vec<usize>> = HashMap::new();

        for block in self.blockchain.iterator() {
            let block = block?;
            // reverse so a spend later in a block is recorded before the output it consumes
            for tx in block.get_transactions().iter().rev() {
                let txid_hex = tx.get_id_hex();
                let spent = spent_txos.get(&txid_hex);
                let indices: Vec<usize> = tx
                    .get_vout()
                    .iter()
                    .enumerate()
                    .filter(|(idx, out)| {
                        out.is_locked_with_key(pub_key_hash)
                            && !spent.is_some_and(|outs| outs.contains(idx))
                    })
                    .map(|(idx, _)| idx)
                    .collect();
                if !indices.is_empty() {
                    unspent.push((tx.clone(), indices));
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    if txin.uses_key(pub_key_hash) {
                        spent_txos
                            .entry(txin.get_txid_hex())
                            .or_default()
                            .push(txin.get_vout());
                    }
                }
            }
        }
        Ok(unspent)
    }

    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        Ok(self.scan(pub_key_hash)?.into_iter().map(|(tx, _)| tx).collect())
    }

    /// Greedily collects unspent outputs until they cover `amount`. A shortfall is not
    /// an error here; callers compare the accumulated value against `amount`.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, SpendableOutputs)> {
        let mut unspent_outputs = SpendableOutputs::new();
        let mut accumulated = 0u64;

        'collect: for (tx, indices) in self.scan(pub_key_hash)? {
            for idx in indices {
                if accumulated >= amount {
                    break 'collect;
                }
                accumulated = accumulated.saturating_add(tx.get_vout()[idx].get_value());
                unspent_outputs
                    .entry(tx.get_id_hex())
                    .or_default()
                    .push(idx);
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        Ok(self
            .scan(pub_key_hash)?
            .into_iter()
            .flat_map(|(tx, indices)| {
                indices
                    .into_iter()
                    .map(move |idx| tx.get_vout()[idx].clone())
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    /// Balance in base units; `InvalidAddress` if the address does not validate and
    /// `InvalidBlock` if the stored outputs sum past `u64::MAX`.
    pub fn get_balance(&self, address: &str) -> Result<u64> {
        let pub_key_hash = decode_address(address)?;
        self.find_utxo(&pub_key_hash)?
            .iter()
            .try_fold(0u64, |total, out| total.checked_add(out.get_value()))
            .ok_or_else(|| {
                LedgerError::InvalidBlock(format!("Unspent outputs of {address} overflow"))
            })
    }

    pub fn count_transactions(&self, pub_key_hash: &[u8]) -> Result<usize> {
        Ok(self.scan(pub_key_hash)?.len())
    }
}
