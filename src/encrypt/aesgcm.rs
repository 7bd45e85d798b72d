use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::encrypt::Transformer;
use crate::error::{Error, Result};

const NONCE_SIZE: usize = 12;

/// AES-256-GCM provider. The first key encrypts; every key is tried on
/// decrypt so rotated keys keep old backups readable.
pub struct AesGcmTransformer {
    ciphers: Vec<Aes256Gcm>,
}

impl AesGcmTransformer {
    pub fn new(keys: Vec<Zeroizing<Vec<u8>>>) -> Result<Self> {
        let mut ciphers = Vec::new();
        for key in &keys {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|_| Error::Crypto("aesgcm keys must be 32 bytes".to_string()))?;
            ciphers.push(cipher);
        }
        Ok(Self { ciphers })
    }
}

#[async_trait]
impl Transformer for AesGcmTransformer {
    async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self.ciphers[0]
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::Crypto("aesgcm encryption failed".to_string()))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(Error::Crypto("aesgcm payload too short".to_string()));
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        for cipher in &self.ciphers {
            if let Ok(plaintext) = cipher.decrypt(nonce, Payload { msg: sealed, aad }) {
                return Ok(plaintext);
            }
        }
        Err(Error::Crypto(
            "aesgcm decryption failed: wrong key or mismatched object identity".to_string(),
        ))
    }
}
