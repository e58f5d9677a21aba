// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The master key that seals every credential row.
//!
//! A random master key is generated once and stored wrapped (AES-256-GCM)
//! under a key derived from the operator passphrase. Only the wrapped form
//! and its KDF inputs ever reach the database.

use area_config::model::VaultConfig;
use area_core::AreaError;
use area_storage::Database;
use area_storage::queries::credentials::{get_vault_meta, put_vault_meta};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::{self, KEY_LEN, Sealed};
use crate::kdf::{self, KdfParams, SALT_LEN};

const META_WRAPPED: &str = "master_key.wrapped";
const META_NONCE: &str = "master_key.nonce";
const META_SALT: &str = "kdf.salt";
const META_PARAMS: &str = "kdf.params";
const WRAP_AAD: &[u8] = b"area-master-key";

/// Unwrapped master key, held only in memory.
pub struct MasterKey {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}

impl MasterKey {
    /// Unlock the stored master key, or create one on first start.
    pub async fn unlock_or_init(
        db: &Database,
        passphrase: &SecretString,
        config: &VaultConfig,
    ) -> Result<Self, AreaError> {
        match get_vault_meta(db, META_WRAPPED).await? {
            Some(wrapped) => Self::unlock(db, passphrase, wrapped).await,
            None => Self::init(db, passphrase, KdfParams::from(config)).await,
        }
    }

    /// A key that is never persisted. For tests and ephemeral deployments.
    pub fn ephemeral() -> Result<Self, AreaError> {
        Ok(Self {
            key: Zeroizing::new(crypto::random_bytes::<KEY_LEN>()?),
        })
    }

    async fn init(db: &Database, passphrase: &SecretString, params: KdfParams) -> Result<Self, AreaError> {
        let key = Zeroizing::new(crypto::random_bytes::<KEY_LEN>()?);
        let salt = crypto::random_bytes::<SALT_LEN>()?;
        let wrapping = kdf::derive_key(passphrase.expose_secret().as_bytes(), &salt, params)?;
        let Sealed { ciphertext, nonce } = crypto::seal(&wrapping, WRAP_AAD, key.as_ref())?;
        let params_json = serde_json::to_vec(&params)
            .map_err(|e| AreaError::Vault(format!("encoding KDF parameters: {e}")))?;

        put_vault_meta(
            db,
            vec![
                (META_WRAPPED.to_string(), ciphertext),
                (META_NONCE.to_string(), nonce.to_vec()),
                (META_SALT.to_string(), salt.to_vec()),
                (META_PARAMS.to_string(), params_json),
            ],
        )
        .await?;
        info!("credential vault initialized");
        Ok(Self { key })
    }

    async fn unlock(db: &Database, passphrase: &SecretString, wrapped: Vec<u8>) -> Result<Self, AreaError> {
        let nonce = required_meta(db, META_NONCE).await?;
        let salt: [u8; SALT_LEN] = required_meta(db, META_SALT)
            .await?
            .try_into()
            .map_err(|_| AreaError::Vault("stored KDF salt is corrupt".to_string()))?;
        let params: KdfParams = serde_json::from_slice(&required_meta(db, META_PARAMS).await?)
            .map_err(|e| AreaError::Vault(format!("stored KDF parameters are corrupt: {e}")))?;

        let wrapping = kdf::derive_key(passphrase.expose_secret().as_bytes(), &salt, params)?;
        let unwrapped = crypto::open(&wrapping, WRAP_AAD, &nonce, &wrapped).map_err(|_| {
            AreaError::Vault("wrong vault passphrase or corrupted vault".to_string())
        })?;
        let unwrapped = Zeroizing::new(unwrapped);
        let key: [u8; KEY_LEN] = unwrapped
            .as_slice()
            .try_into()
            .map_err(|_| AreaError::Vault("stored master key has the wrong length".to_string()))?;

        info!("credential vault unlocked");
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    /// Seal a secret bound to `aad`.
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Sealed, AreaError> {
        crypto::seal(&self.key, aad, plaintext)
    }

    /// Open a secret sealed with [`MasterKey::seal`].
    pub fn open(&self, aad: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, AreaError> {
        crypto::open(&self.key, aad, nonce, ciphertext).map(Zeroizing::new)
    }
}

async fn required_meta(db: &Database, key: &str) -> Result<Vec<u8>, AreaError> {
    get_vault_meta(db, key)
        .await?
        .ok_or_else(|| AreaError::Vault(format!("vault metadata `{key}` is missing")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_config() -> VaultConfig {
        VaultConfig {
            passphrase: None,
            kdf_memory_cost: 8192,
            kdf_iterations: 1,
            kdf_parallelism: 1,
        }
    }

    async fn db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("vault.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn reopening_with_same_passphrase_recovers_key() {
        let (db, _dir) = db().await;
        let passphrase = SecretString::from("correct horse".to_string());

        let first = MasterKey::unlock_or_init(&db, &passphrase, &cheap_config())
            .await
            .unwrap();
        let sealed = first.seal(b"aad", b"payload").unwrap();

        let second = MasterKey::unlock_or_init(&db, &passphrase, &cheap_config())
            .await
            .unwrap();
        let opened = second.open(b"aad", &sealed.nonce, &sealed.ciphertext).unwrap();
        assert_eq!(opened.as_slice(), b"payload");
    }

    #[tokio::test]
    async fn wrong_passphrase_is_rejected() {
        let (db, _dir) = db().await;
        MasterKey::unlock_or_init(&db, &SecretString::from("right".to_string()), &cheap_config())
            .await
            .unwrap();
        let err = MasterKey::unlock_or_init(&db, &SecretString::from("wrong".to_string()), &cheap_config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("passphrase"));
    }

    #[test]
    fn debug_never_prints_key_material() {
        let key = MasterKey::ephemeral().unwrap();
        assert_eq!(format!("{key:?}"), "MasterKey([REDACTED])");
    }
}
