// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential vault for the Area automation broker.
//!
//! OAuth tokens are sealed with AES-256-GCM under a master key that is itself
//! wrapped by an Argon2id-derived passphrase key. [`CredentialVault`] owns the
//! token lifecycle: it hands out valid access tokens, refreshes them through
//! the provider capability trait, and deactivates accounts whose consent was
//! revoked.

pub mod crypto;
pub mod kdf;
pub mod keyring;
pub mod vault;

pub use keyring::MasterKey;
pub use vault::{CredentialVault, RefreshStats, VaultSettings};
