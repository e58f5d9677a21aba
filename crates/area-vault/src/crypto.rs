// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256-GCM sealing with associated data.
//!
//! Each token is sealed under a fresh random 96-bit nonce, and the associated
//! data binds the ciphertext to the row and field it was written for. A
//! ciphertext copied onto another account fails to open.

use area_core::AreaError;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// A ciphertext (tag appended) and the nonce it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, AreaError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| AreaError::Vault("invalid AES-256-GCM key".to_string()))
}

/// Seal `plaintext`, authenticating `aad` alongside it.
pub fn seal(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Sealed, AreaError> {
    let key = aead_key(key)?;
    let nonce = random_bytes::<NONCE_LEN>()?;
    let mut buf = plaintext.to_vec();
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut buf)
        .map_err(|_| AreaError::Vault("encryption failed".to_string()))?;
    Ok(Sealed {
        ciphertext: buf,
        nonce,
    })
}

/// Open a ciphertext produced by [`seal`] with the same key and `aad`.
pub fn open(key: &[u8; KEY_LEN], aad: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AreaError> {
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| AreaError::Vault(format!("nonce must be {NONCE_LEN} bytes")))?;
    let key = aead_key(key)?;
    let mut buf = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut buf)
        .map_err(|_| AreaError::Vault("decryption failed: wrong key or tampered data".to_string()))?;
    Ok(plaintext.to_vec())
}

/// Fill an array from the system CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], AreaError> {
    let mut out = [0u8; N];
    SystemRandom::new()
        .fill(&mut out)
        .map_err(|_| AreaError::Vault("system random source unavailable".to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn associated_data_binds_ciphertext() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let sealed = seal(&key, b"access:7", b"gho_token").unwrap();

        assert_eq!(
            open(&key, b"access:7", &sealed.nonce, &sealed.ciphertext).unwrap(),
            b"gho_token"
        );
        assert!(open(&key, b"access:8", &sealed.nonce, &sealed.ciphertext).is_err());
    }

    #[test]
    fn wrong_key_and_tampering_are_detected() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let other = random_bytes::<KEY_LEN>().unwrap();
        let mut sealed = seal(&key, b"", b"refresh").unwrap();
        assert!(open(&other, b"", &sealed.nonce, &sealed.ciphertext).is_err());

        sealed.ciphertext[0] ^= 0x80;
        assert!(open(&key, b"", &sealed.nonce, &sealed.ciphertext).is_err());
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let a = seal(&key, b"", b"same").unwrap();
        let b = seal(&key, b"", b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn short_nonce_is_rejected() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let sealed = seal(&key, b"", b"x").unwrap();
        assert!(open(&key, b"", &sealed.nonce[..8], &sealed.ciphertext).is_err());
    }
}
