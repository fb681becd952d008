use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Leading zero bits required of a block hash. Low enough that sealing takes
/// milliseconds; the seal is a tamper and spam gate, not a consensus mechanism.
pub const TARGET_BITS: u32 = 12;

const MAX_NONCE: i64 = i64::MAX;

/// Seals and validates blocks:
/// `SHA-256(pre_block_hash ‖ hash_transactions ‖ nonce ‖ difficulty) < 2^(256 − difficulty)`.
pub struct ProofOfWork<'a> {
    block: &'a Block,
    target: BigInt,
    difficulty: u32,
}

impl<'a> ProofOfWork<'a> {
    pub fn new_proof_of_work(block: &'a Block) -> ProofOfWork<'a> {
        Self::with_difficulty(block, TARGET_BITS)
    }

    fn with_difficulty(block: &'a Block, difficulty: u32) -> ProofOfWork<'a> {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty);
        ProofOfWork {
            block,
            target,
            difficulty,
        }
    }

    /// Recomputes the digest at the block's stored nonce. A block passes only if the
    /// digest is below target and equals the stored hash.
    pub fn validate(block: &Block) -> bool {
        let pow = ProofOfWork::new_proof_of_work(block);
        let hash = sha256_digest(pow.prepare_data(block.get_nonce()).as_slice());
        pow.meets_target(&hash) && HEXLOWER.encode(&hash) == block.get_hash()
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < self.target
    }

    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_pre_block_hash().as_bytes());
        data_bytes.extend(self.block.hash_transactions());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes.extend(self.difficulty.to_be_bytes());
        data_bytes
    }

    /// Searches nonces from zero and returns the first one whose digest meets the target,
    /// together with the hex digest.
    pub fn run(&self) -> Result<(i64, String)> {
        self.run_until(MAX_NONCE)
    }

    fn run_until(&self, max_nonce: i64) -> Result<(i64, String)> {
        let mut nonce = 0;
        while nonce < max_nonce {
            let hash = sha256_digest(self.prepare_data(nonce).as_slice());
            if self.meets_target(&hash) {
                return Ok((nonce, HEXLOWER.encode(hash.as_slice())));
            }
            nonce += 1;
        }
        Err(LedgerError::SealingExhausted)
    }
}
