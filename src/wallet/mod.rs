//! Wallets and addresses
//!
//! Key generation, public-key hashing and the Base58Check address codec, plus the
//! persisted wallet set.

#[allow(clippy::module_inception)]
pub mod wallet;
pub mod wallets;

pub use wallet::{
    convert_address, decode_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN, PUB_KEY_HASH_LEN,
};
pub use wallets::{Wallets, WALLET_SET_KEY};
