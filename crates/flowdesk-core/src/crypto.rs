// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! At-rest encryption for client credentials.
//!
//! Secrets are sealed with AES-256-GCM under a deployment-wide key and stored
//! as base64(nonce || ciphertext). Only ciphertext ever reaches the database;
//! decrypted values are handed out in [`Zeroizing`] wrappers so the plaintext
//! is wiped when the caller drops it.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Symmetric cipher for sealing and opening credential secrets.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    ///
    /// The key typically comes from the `FLOWDESK_ENCRYPTION_KEY` environment
    /// variable; generate one with `openssl rand -base64 32`.
    pub fn from_base64_key(encoded: &str) -> Result<Self> {
        let key_bytes = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| CoreError::Crypto(format!("key is not valid base64: {}", e)))?,
        );
        if key_bytes.len() != 32 {
            return Err(CoreError::Crypto(format!(
                "key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Seal a plaintext secret. Returns base64(nonce || ciphertext).
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CoreError::Crypto("encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Open a sealed secret produced by [`seal`](Self::seal).
    ///
    /// Fails on malformed input, a wrong key, or any tampering with the
    /// ciphertext (GCM authentication).
    pub fn open(&self, sealed: &str) -> Result<Zeroizing<String>> {
        let raw = BASE64
            .decode(sealed.trim())
            .map_err(|e| CoreError::Crypto(format!("ciphertext is not valid base64: {}", e)))?;
        if raw.len() <= NONCE_LEN {
            return Err(CoreError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CoreError::Crypto("decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| CoreError::Crypto("plaintext is not valid UTF-8".to_string()))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.write_str("CredentialCipher")
    }
}
