// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id derivation of the key that wraps the master key.

use area_config::model::VaultConfig;
use area_core::AreaError;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::KEY_LEN;

pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters. Persisted next to the wrapped key so a config
/// change never locks out an existing vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl From<&VaultConfig> for KdfParams {
    fn from(config: &VaultConfig) -> Self {
        Self {
            memory_cost: config.kdf_memory_cost,
            iterations: config.kdf_iterations,
            parallelism: config.kdf_parallelism,
        }
    }
}

/// Derive a wrapping key from `passphrase` and `salt`.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8; SALT_LEN],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, AreaError> {
    let argon_params = argon2::Params::new(
        params.memory_cost,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| AreaError::Vault(format!("invalid Argon2id parameters: {e}")))?;
    let argon = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon
        .hash_password_into(passphrase, salt, key.as_mut())
        .map_err(|e| AreaError::Vault(format!("key derivation failed: {e}")))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHEAP: KdfParams = KdfParams {
        memory_cost: 8192,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn derivation_is_deterministic_per_salt() {
        let a = derive_key(b"hunter2", &[1; SALT_LEN], CHEAP).unwrap();
        let b = derive_key(b"hunter2", &[1; SALT_LEN], CHEAP).unwrap();
        let c = derive_key(b"hunter2", &[2; SALT_LEN], CHEAP).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn rejects_degenerate_parameters() {
        let params = KdfParams {
            memory_cost: 1,
            ..CHEAP
        };
        assert!(derive_key(b"x", &[0; SALT_LEN], params).is_err());
    }
}
