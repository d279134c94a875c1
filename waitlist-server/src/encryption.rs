//! Encryption of participant emails at rest.
//!
//! Emails are sealed with AES-256-GCM under the configured store key. Every
//! value gets a fresh random nonce, stored in front of the ciphertext, and is
//! bound to the participant's address as associated data, so a sealed email
//! only opens on the row it was written for.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};

/// Errors sealing or opening an email
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    /// The key isn't 32 base64 encoded bytes
    #[error("encryption key must be 32 base64 encoded bytes")]
    InvalidKey,
    /// No nonce could be drawn
    #[error("failed to seal value")]
    Seal,
    /// Wrong key, wrong address or a corrupted value
    #[error("failed to open sealed value")]
    Open,
}

/// AES-256-GCM cipher for the `email` column
pub struct EmailCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for EmailCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailCipher").finish_non_exhaustive()
    }
}

impl EmailCipher {
    /// Cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self, EncryptionError> {
        let key = UnboundKey::new(&AES_256_GCM, key).map_err(|_| EncryptionError::InvalidKey)?;

        Ok(Self {
            key: LessSafeKey::new(key),
            rng: SystemRandom::new(),
        })
    }

    /// Cipher from a standard base64 encoded key
    pub fn from_base64(encoded: &str) -> Result<Self, EncryptionError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|_| EncryptionError::InvalidKey)?;
        Self::new(&key)
    }

    /// Seal `email` for the participant identified by `address`,
    /// returning base64 of nonce and ciphertext
    pub fn seal(&self, address: &str, email: &str) -> Result<String, EncryptionError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| EncryptionError::Seal)?;

        let mut ciphertext = email.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from(address.as_bytes()),
                &mut ciphertext,
            )
            .map_err(|_| EncryptionError::Seal)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Open a value produced by [`EmailCipher::seal`] for the same `address`
    pub fn open(&self, address: &str, sealed: &str) -> Result<String, EncryptionError> {
        let bytes = STANDARD
            .decode(sealed)
            .map_err(|_| EncryptionError::Open)?;
        if bytes.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(EncryptionError::Open);
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| EncryptionError::Open)?;

        let mut in_out = ciphertext.to_vec();
        let email = self
            .key
            .open_in_place(nonce, Aad::from(address.as_bytes()), &mut in_out)
            .map_err(|_| EncryptionError::Open)?;

        String::from_utf8(email.to_vec()).map_err(|_| EncryptionError::Open)
    }
}
