use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::Zeroizing;

use crate::encrypt::Transformer;
use crate::error::{Error, Result};

const NONCE_SIZE: usize = 24;

/// Secretbox-style provider: 32-byte key, 24-byte random nonce. Built on
/// XChaCha20-Poly1305 so the object identity AAD is authenticated, which
/// classic NaCl secretbox cannot do.
pub struct SecretboxTransformer {
    ciphers: Vec<XChaCha20Poly1305>,
}

impl SecretboxTransformer {
    pub fn new(keys: Vec<Zeroizing<Vec<u8>>>) -> Result<Self> {
        let mut ciphers = Vec::new();
        for key in &keys {
            let cipher = XChaCha20Poly1305::new_from_slice(key)
                .map_err(|_| Error::Crypto("secretbox keys must be 32 bytes".to_string()))?;
            ciphers.push(cipher);
        }
        Ok(Self { ciphers })
    }
}

#[async_trait]
impl Transformer for SecretboxTransformer {
    async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self.ciphers[0]
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::Crypto("secretbox encryption failed".to_string()))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(Error::Crypto("secretbox payload too short".to_string()));
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        for cipher in &self.ciphers {
            if let Ok(plaintext) = cipher.decrypt(nonce, Payload { msg: sealed, aad }) {
                return Ok(plaintext);
            }
        }
        Err(Error::Crypto(
            "secretbox decryption failed: wrong key or mismatched object identity".to_string(),
        ))
    }
}
