//! Symmetric encryption of cookie values.
//!
//! Values are sealed with AES-256-GCM under a random 96-bit nonce and encoded
//! as URL-safe base64 of `nonce || ciphertext`, which is safe to place in a
//! cookie without further escaping.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, consts::U12},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::fmt;

/// Nonce size for AES-256-GCM (96 bits).
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits).
pub const KEY_SIZE: usize = 32;

/// GCM authentication tag size.
const TAG_SIZE: usize = 16;

/// Errors from cookie encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The configured key is not exactly [`KEY_SIZE`] bytes.
    InvalidKeyLength { actual: usize },
    /// Sealing the value failed.
    Encryption,
    /// The value is not valid base64 or too short to hold a nonce and tag.
    Malformed,
    /// Authentication failed: wrong key or tampered value.
    Decryption,
    /// The decrypted bytes are not UTF-8.
    InvalidUtf8,
}

impl fmt::Display for CipherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyLength { actual } => write!(
                f,
                "cookie encryption key must be {KEY_SIZE} bytes, got {actual}"
            ),
            Self::Encryption => write!(f, "failed to encrypt cookie value"),
            Self::Malformed => write!(f, "malformed encrypted cookie value"),
            Self::Decryption => write!(f, "failed to decrypt cookie value"),
            Self::InvalidUtf8 => write!(f, "decrypted cookie value is not valid UTF-8"),
        }
    }
}

impl std::error::Error for CipherError {}

/// AES-256-GCM cipher for cookie values.
#[derive(Clone)]
pub struct CookieCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for CookieCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCipher").finish_non_exhaustive()
    }
}

impl CookieCipher {
    /// Creates a cipher from a raw key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless the key is exactly
    /// [`KEY_SIZE`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeyLength { actual: key.len() });
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKeyLength { actual: key.len() })?;
        Ok(Self { cipher })
    }

    /// Encrypts a value under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&Nonce::<U12>::from(nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CipherError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Decrypts a value produced by [`CookieCipher::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<String, CipherError> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| CipherError::Malformed)?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CipherError::Malformed);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let nonce = <[u8; NONCE_SIZE]>::try_from(nonce).map_err(|_| CipherError::Malformed)?;
        let plaintext = self
            .cipher
            .decrypt(&Nonce::<U12>::from(nonce), ciphertext)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
    }
}
