use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::core::error::{Error, ErrorKind, Result};

pub const KEY_SIZE: usize = 16;
pub const IV_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Authenticated encryption for ORAM block payloads: AES-GCM with a 128-bit
/// key and a fresh 12-byte IV per call. Ciphertext layout is
/// `IV ‖ ciphertext ‖ 16-byte tag`. The key is generated inside the trusted
/// region and never exposed.
pub struct CryptoCore {
    cipher: Aes128Gcm,
}

impl std::fmt::Debug for CryptoCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoCore").finish_non_exhaustive()
    }
}

impl CryptoCore {
    /// Generates a fresh random key from the OS entropy source.
    pub fn new() -> Result<Self> {
        let mut key = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| Error::new(ErrorKind::CryptoFailure, format!("rng failure: {}", e)))?;
        CryptoCore::from_key(&key)
    }

    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidParameter,
                format!("key must be {} bytes, got {}", KEY_SIZE, key.len()),
            ));
        }
        Ok(CryptoCore {
            cipher: Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key)),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; IV_SIZE];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| Error::new(ErrorKind::CryptoFailure, format!("rng failure: {}", e)))?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| Error::new(ErrorKind::CryptoFailure, "encryption failed"))?;
        let mut out = Vec::with_capacity(IV_SIZE + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < IV_SIZE + TAG_SIZE {
            return Err(Error::new(
                ErrorKind::CryptoFailure,
                format!("ciphertext too short: {} bytes", data.len()),
            ));
        }
        let (iv, ciphertext) = data.split_at(IV_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| Error::new(ErrorKind::CryptoFailure, "authentication tag mismatch"))
    }
}
