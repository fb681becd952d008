use crate::error::{LedgerError, Result};
use crate::utils::{
    base58_decode, base58_encode, double_sha256_digest, new_key_pair, public_key_from_pkcs8,
    ripemd160_digest, sha256_digest,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
pub const PUB_KEY_HASH_LEN: usize = 20;

/// A P-256 key pair. The PKCS#8 document never leaves the wallet set and is wiped on drop.
#[derive(
    Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode, Zeroize, ZeroizeOnDrop,
)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self) -> String {
        convert_address(hash_pub_key(self.public_key.as_slice()).as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.get_address())
            .finish_non_exhaustive()
    }
}

/// SHA-256 followed by RIPEMD-160.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    ripemd160_digest(sha256_digest(pub_key).as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    double_sha256_digest(payload)[..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Base58Check address for a public-key hash: version + hash + checksum.
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + ADDRESS_CHECK_SUM_LEN);
    payload.push(VERSION);
    payload.extend_from_slice(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum);
    base58_encode(payload.as_slice())
}

/// Splits a decoded payload into (version, hash, checksum), or `None` when it is too
/// short to hold all three.
fn split_payload(payload: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    if payload.len() < ADDRESS_CHECK_SUM_LEN + 2 {
        return None;
    }
    let (body, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    Some((body[0], &body[1..], actual_checksum))
}

pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };
    let Some((version, pub_key_hash, actual_checksum)) = split_payload(&payload) else {
        return false;
    };
    if version != VERSION || pub_key_hash.len() != PUB_KEY_HASH_LEN {
        return false;
    }
    let body = &payload[..payload.len() - ADDRESS_CHECK_SUM_LEN];
    checksum(body).as_slice() == actual_checksum
}

/// Validates an address and returns the public-key hash it encodes.
pub fn decode_address(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }
    let payload = base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}
