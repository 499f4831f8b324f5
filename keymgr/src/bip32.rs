// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardened-only BIP32 derivation over secp256k1, and xpub serialization.
//!
//! Only hardened child indices (`'`/`h` suffix) are accepted: a device that
//! never needs to hand a parent xpub to a watch-only wallet has no reason to
//! support non-hardened derivation, and skipping it avoids the EC point
//! addition that public derivation requires.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::{Field, PrimeField};
use k256::Scalar;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

pub const HARDENED_BIT: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bip32Error {
    InvalidPath,
    InvalidSeed,
    DerivationFailed,
    SigningFailed,
}

#[derive(Clone)]
pub struct ExtendedKey {
    pub scalar: [u8; 32],
    pub chain_code: [u8; 32],
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let out = mac.finalize().into_bytes();
    let mut buf = [0u8; 64];
    buf.copy_from_slice(&out);
    buf
}

fn add_mod_n(a: &[u8; 32], b: &[u8; 32]) -> Option<[u8; 32]> {
    let sa: Option<Scalar> = Scalar::from_repr((*a).into()).into();
    let sb: Option<Scalar> = Scalar::from_repr((*b).into()).into();
    let sum = sa? + sb?;
    if bool::from(sum.is_zero()) {
        return None;
    }
    Some(sum.to_repr().into())
}

/// Compressed SEC1 public key for `scalar`, or `None` if it is not a valid
/// (nonzero, in-range) private scalar.
pub fn public_key_compressed(scalar: &[u8; 32]) -> Option<[u8; 33]> {
    let s: Scalar = Option::from(Scalar::from_repr((*scalar).into()))?;
    let nz: k256::NonZeroScalar = Option::from(k256::NonZeroScalar::new(s))?;
    let public = k256::PublicKey::from_secret_scalar(&nz);
    let encoded = public.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_bytes());
    Some(out)
}

fn fingerprint_of(pubkey_compressed: &[u8; 33]) -> [u8; 4] {
    let sha = Sha256::digest(pubkey_compressed);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 4];
    out.copy_from_slice(&ripe[..4]);
    out
}

pub fn master_key_from_seed(seed: &[u8]) -> Result<ExtendedKey, Bip32Error> {
    if seed.len() < 16 || seed.len() > 64 {
        return Err(Bip32Error::InvalidSeed);
    }
    let i = hmac_sha512(b"Bitcoin seed", seed);
    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&i[..32]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&i[32..]);
    if public_key_compressed(&scalar).is_none() {
        return Err(Bip32Error::DerivationFailed);
    }
    Ok(ExtendedKey {
        scalar,
        chain_code,
        depth: 0,
        parent_fingerprint: [0; 4],
        child_number: 0,
    })
}

fn derive_hardened_child(
    parent: &ExtendedKey,
    hardened_index: u32,
) -> Result<ExtendedKey, Bip32Error> {
    let mut data = [0u8; 37];
    data[1..33].copy_from_slice(&parent.scalar);
    data[33..37].copy_from_slice(&hardened_index.to_be_bytes());
    let i = hmac_sha512(&parent.chain_code, &data);
    let il: [u8; 32] = i[..32].try_into().unwrap();
    let chain_code: [u8; 32] = i[32..].try_into().unwrap();
    let child_scalar = add_mod_n(&il, &parent.scalar).ok_or(Bip32Error::DerivationFailed)?;
    let parent_pub =
        public_key_compressed(&parent.scalar).ok_or(Bip32Error::DerivationFailed)?;
    Ok(ExtendedKey {
        scalar: child_scalar,
        chain_code,
        depth: parent.depth + 1,
        parent_fingerprint: fingerprint_of(&parent_pub),
        child_number: hardened_index,
    })
}

/// Parses `m/44'/0'/0'/0'` style paths. Every component must be hardened.
pub fn parse_path(path: &str) -> Result<Vec<u32>, Bip32Error> {
    let path = path.strip_prefix("m/").or_else(|| path.strip_prefix("m")).unwrap_or(path);
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split('/')
        .map(|component| {
            let hardened = component.ends_with('\'') || component.ends_with('h');
            if !hardened {
                return Err(Bip32Error::InvalidPath);
            }
            let digits = &component[..component.len() - 1];
            let index: u32 = digits.parse().map_err(|_| Bip32Error::InvalidPath)?;
            if index & HARDENED_BIT != 0 {
                return Err(Bip32Error::InvalidPath);
            }
            Ok(index | HARDENED_BIT)
        })
        .collect()
}

pub fn derive(seed: &[u8], path: &str) -> Result<ExtendedKey, Bip32Error> {
    let indices = parse_path(path)?;
    let mut key = master_key_from_seed(seed)?;
    for index in indices {
        key = derive_hardened_child(&key, index)?;
    }
    Ok(key)
}

/// xpub version bytes for the `network` the descriptor is requested for.
pub fn version_bytes(mainnet: bool) -> [u8; 4] {
    if mainnet {
        [0x04, 0x88, 0xB2, 0x1E]
    } else {
        [0x04, 0x35, 0x87, 0xCF]
    }
}

/// Base58Check-encoded extended public key, per BIP32 §Serialization format.
pub fn serialize_xpub(key: &ExtendedKey, mainnet: bool) -> Result<String, Bip32Error> {
    let pubkey = public_key_compressed(&key.scalar).ok_or(Bip32Error::DerivationFailed)?;
    let mut payload = Vec::with_capacity(78);
    payload.extend_from_slice(&version_bytes(mainnet));
    payload.push(key.depth);
    payload.extend_from_slice(&key.parent_fingerprint);
    payload.extend_from_slice(&key.child_number.to_be_bytes());
    payload.extend_from_slice(&key.chain_code);
    payload.extend_from_slice(&pubkey);
    Ok(bs58::encode(payload).with_check().into_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_key_from_all_zero_seed_has_valid_pubkey() {
        let seed = [0u8; 32];
        let key = master_key_from_seed(&seed).unwrap();
        assert!(public_key_compressed(&key.scalar).is_some());
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = [7u8; 32];
        let a = derive(&seed, "m/44'/0'/0'").unwrap();
        let b = derive(&seed, "m/44'/0'/0'").unwrap();
        assert_eq!(a.scalar, b.scalar);
        assert_eq!(a.chain_code, b.chain_code);
    }

    #[test]
    fn different_paths_derive_different_keys() {
        let seed = [7u8; 32];
        let a = derive(&seed, "m/44'/0'/0'").unwrap();
        let b = derive(&seed, "m/44'/0'/1'").unwrap();
        assert_ne!(a.scalar, b.scalar);
    }

    #[test]
    fn non_hardened_component_rejected() {
        assert_eq!(parse_path("m/44'/0/0'"), Err(Bip32Error::InvalidPath));
    }

    #[test]
    fn xpub_serializes_to_expected_prefix() {
        let seed = [3u8; 32];
        let key = derive(&seed, "m/44'").unwrap();
        let xpub = serialize_xpub(&key, true).unwrap();
        assert!(xpub.starts_with("xpub"));
    }
}
