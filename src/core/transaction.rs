// Value moves by UTXO: every transaction consumes earlier outputs through its inputs
// and creates new outputs locked to a public-key hash.

use crate::core::BLOCK_REWARD;
use crate::error::{LedgerError, Result};
use crate::storage::SpendableOutputs;
use crate::utils::{
    ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize, sha256_digest,
};
use crate::wallet::{decode_address, hash_pub_key};
use data_encoding::HEXLOWER;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Transactions referenced by a transaction's inputs, keyed by hex transaction id.
pub type PrevTransactions = HashMap<String, Transaction>;

/// A claim on output `vout` of transaction `txid`.
#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: usize,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_txid_hex(&self) -> String {
        HEXLOWER.encode(self.txid.as_slice())
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    /// True when this input was made by the holder of the key hashing to `pub_key_hash`.
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()) == pub_key_hash
    }
}

/// `value` base units spendable only by the key hashing to `pub_key_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    /// Locks `value` to an address, failing with `InvalidAddress` if it does not validate.
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        let pub_key_hash = decode_address(address)?;
        Ok(TXOutput::new_locked(value, pub_key_hash))
    }

    pub fn new_locked(value: u64, pub_key_hash: Vec<u8>) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash,
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.as_slice() == pub_key_hash
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mints `BLOCK_REWARD` to `to`. The note rides in the input's signature slot so
    /// that two coinbases to the same address still get distinct ids; an empty note is
    /// replaced with a random UUID.
    pub fn new_coinbase_tx(to: &str, note: &str) -> Result<Transaction> {
        let txout = TXOutput::new(BLOCK_REWARD, to)?;
        let note = if note.is_empty() {
            Uuid::new_v4().as_bytes().to_vec()
        } else {
            note.as_bytes().to_vec()
        };
        let tx_input = TXInput {
            signature: note,
            ..Default::default()
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Builds an unsigned transfer of `amount` from the key `from_pub_key` to `to`.
    ///
    /// `valid_outputs` are consumed in full; whatever exceeds `amount` comes back to the
    /// sender as a change output. The caller gets `InsufficientFunds` rather than a
    /// transaction when `accumulated` does not cover `amount`.
    pub fn new_utxo_transaction(
        from_pub_key: &[u8],
        to: &str,
        amount: u64,
        accumulated: u64,
        valid_outputs: &SpendableOutputs,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        let payment = TXOutput::new(amount, to)?;
        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        // HashMap order is random; sort so the same selection always yields the same id
        let mut txids: Vec<&String> = valid_outputs.keys().collect();
        txids.sort();

        let mut inputs = vec![];
        for txid_hex in txids {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                LedgerError::Transaction(format!("Invalid transaction ID {txid_hex}: {e}"))
            })?;
            for &out in &valid_outputs[txid_hex] {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: out,
                    signature: vec![],
                    pub_key: from_pub_key.to_vec(),
                });
            }
        }
        if inputs.is_empty() {
            return Err(LedgerError::Transaction(
                "Transfer must spend at least one output".to_string(),
            ));
        }

        let mut outputs = vec![payment];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new_locked(change, hash_pub_key(from_pub_key)));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Copy with every signature and public key emptied; the base of each signing digest.
    fn trimmed_copy(&self) -> Transaction {
        Transaction {
            id: self.id.clone(),
            vin: self
                .vin
                .iter()
                .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
                .collect(),
            vout: self.vout.clone(),
        }
    }

    /// The digest signed for input `idx`: the trimmed copy with that input's key slot
    /// holding the lock of the output it claims.
    fn signing_digest(
        tx_copy: &mut Transaction,
        idx: usize,
        claimed: &TXOutput,
    ) -> Result<Vec<u8>> {
        tx_copy.vin[idx].pub_key = claimed.pub_key_hash.clone();
        let digest = tx_copy.hash();
        tx_copy.vin[idx].pub_key = vec![];
        digest
    }

    fn claimed_output<'a>(
        input: &TXInput,
        prev_txs: &'a PrevTransactions,
    ) -> Result<Option<&'a TXOutput>> {
        let txid_hex = input.get_txid_hex();
        let prev_tx = prev_txs
            .get(&txid_hex)
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {txid_hex}")))?;
        Ok(prev_tx.vout.get(input.vout))
    }

    /// Signs every input with `pkcs8`. Coinbase transactions are left untouched.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &PrevTransactions) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();
        for idx in 0..self.vin.len() {
            let claimed = Self::claimed_output(&self.vin[idx], prev_txs)?.ok_or_else(|| {
                LedgerError::Transaction(format!(
                    "Input {idx} claims missing output {}",
                    self.vin[idx].vout
                ))
            })?;
            let digest = Self::signing_digest(&mut tx_copy, idx, claimed)?;
            self.vin[idx].signature = ecdsa_p256_sha256_sign_digest(pkcs8, &digest)?;
        }
        Ok(())
    }

    /// Checks that the id matches the content, that every input is signed by the key its
    /// claimed output is locked to, and that inputs and outputs carry the same value.
    ///
    /// A referenced transaction missing from `prev_txs` is an error; every other defect
    /// yields `Ok(false)`.
    pub fn verify(&self, prev_txs: &PrevTransactions) -> Result<bool> {
        if self.id != self.hash()? {
            warn!("Transaction {} does not hash to its id", self.get_id_hex());
            return Ok(false);
        }
        if self.is_coinbase() {
            return Ok(self.verify_coinbase());
        }
        if self.vin.is_empty() || self.vout.is_empty() {
            return Ok(false);
        }

        let mut seen = HashSet::new();
        let mut input_value = 0u64;
        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            if !seen.insert((vin.txid.as_slice(), vin.vout)) {
                warn!("Transaction {} spends an output twice", self.get_id_hex());
                return Ok(false);
            }
            let Some(claimed) = Self::claimed_output(vin, prev_txs)? else {
                warn!("Input {idx} claims an output index that does not exist");
                return Ok(false);
            };
            if !vin.uses_key(claimed.get_pub_key_hash()) {
                warn!("Input {idx} is not made by the owner of the claimed output");
                return Ok(false);
            }
            let digest = Self::signing_digest(&mut tx_copy, idx, claimed)?;
            if !ecdsa_p256_sha256_sign_verify(&vin.pub_key, &vin.signature, &digest) {
                warn!("Input {idx} has an invalid signature");
                return Ok(false);
            }
            input_value = match input_value.checked_add(claimed.get_value()) {
                Some(sum) => sum,
                None => return Ok(false),
            };
        }

        match self.get_output_value() {
            Ok(output_value) if output_value == input_value => Ok(true),
            Ok(output_value) => {
                warn!(
                    "Transaction {} does not balance: inputs={input_value}, outputs={output_value}",
                    self.get_id_hex()
                );
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }

    /// A coinbase mints exactly `BLOCK_REWARD` through a single output.
    fn verify_coinbase(&self) -> bool {
        if self.vin.len() != 1 || self.vout.len() != 1 {
            return false;
        }
        if self.vout[0].value != BLOCK_REWARD {
            warn!(
                "Coinbase {} mints {} units instead of {BLOCK_REWARD}",
                self.get_id_hex(),
                self.vout[0].value
            );
            return false;
        }
        true
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty()
    }

    /// SHA-256 of the canonical encoding with the id and all signatures cleared.
    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self
                .vin
                .iter()
                .map(|input| TXInput {
                    signature: if self.is_coinbase() {
                        input.signature.clone()
                    } else {
                        vec![]
                    },
                    ..input.clone()
                })
                .collect(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&serialize(&tx_copy)?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_hex(&self) -> String {
        HEXLOWER.encode(self.id.as_slice())
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, out| {
            total
                .checked_add(out.get_value())
                .ok_or_else(|| LedgerError::Transaction("Output value overflow".to_string()))
        })
    }

    #[cfg(test)]
    pub(crate) fn vout_mut(&mut self) -> &mut Vec<TXOutput> {
        &mut self.vout
    }

    #[cfg(test)]
    pub(crate) fn refresh_id(&mut self) -> Result<()> {
        self.id = self.hash()?;
        Ok(())
    }
}
