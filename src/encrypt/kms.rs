use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use crate::encrypt::Transformer;
use crate::error::{Error, Result};

const DEK_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// External key management endpoint wrapping and unwrapping data keys.
/// The transport behind it (gRPC or otherwise) is the caller's concern.
#[async_trait]
pub trait KeyService: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Envelope provider: a fresh data key per message, wrapped by the external
/// service; the payload is AES-256-GCM under the data key with the object
/// AAD. Layout: wrapped-key length (u16 BE) || wrapped key || nonce ||
/// ciphertext. Unwrapped data keys are cached up to `cache_size`.
pub struct KmsTransformer {
    service: Arc<dyn KeyService>,
    timeout: Duration,
    cache: Mutex<DekCache>,
}

impl KmsTransformer {
    pub fn new(service: Arc<dyn KeyService>, cache_size: usize, timeout: Duration) -> Self {
        Self {
            service,
            timeout,
            cache: Mutex::new(DekCache::new(cache_size)),
        }
    }

    async fn call<F>(&self, fut: F) -> Result<Vec<u8>>
    where
        F: std::future::Future<Output = Result<Vec<u8>>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| Error::Crypto("kms call timed out".to_string()))?
    }

    fn seal_payload(dek: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(dek)
            .map_err(|_| Error::Crypto("invalid data key".to_string()))?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::Crypto("kms payload encryption failed".to_string()))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open_payload(dek: &[u8], payload: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_SIZE {
            return Err(Error::Crypto("kms payload too short".to_string()));
        }
        let (nonce_bytes, sealed) = payload.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(dek)
            .map_err(|_| Error::Crypto("invalid data key".to_string()))?;
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload { msg: sealed, aad },
            )
            .map_err(|_| {
                Error::Crypto(
                    "kms decryption failed: wrong key or mismatched object identity".to_string(),
                )
            })
    }
}

#[async_trait]
impl Transformer for KmsTransformer {
    async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut dek = Zeroizing::new(vec![0u8; DEK_SIZE]);
        OsRng.fill_bytes(&mut dek);

        let wrapped = self.call(self.service.encrypt(&dek)).await?;
        if wrapped.len() > u16::MAX as usize {
            return Err(Error::Crypto("wrapped data key too large".to_string()));
        }

        let payload = Self::seal_payload(&dek, plaintext, aad)?;

        self.cache
            .lock()
            .unwrap()
            .insert(BASE64.encode(&wrapped), dek);

        let mut out = (wrapped.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(&wrapped);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 2 {
            return Err(Error::Crypto("kms payload too short".to_string()));
        }
        let wrapped_len = u16::from_be_bytes([ciphertext[0], ciphertext[1]]) as usize;
        if ciphertext.len() < 2 + wrapped_len {
            return Err(Error::Crypto("kms payload too short".to_string()));
        }
        let wrapped = &ciphertext[2..2 + wrapped_len];
        let payload = &ciphertext[2 + wrapped_len..];

        let cache_key = BASE64.encode(wrapped);
        let cached = self.cache.lock().unwrap().get(&cache_key);
        let dek = match cached {
            Some(dek) => dek,
            None => {
                let dek = Zeroizing::new(self.call(self.service.decrypt(wrapped)).await?);
                self.cache.lock().unwrap().insert(cache_key, dek.clone());
                dek
            }
        };

        Self::open_payload(&dek, payload, aad)
    }
}

/// FIFO cache of unwrapped data keys, bounded by entry count.
struct DekCache {
    capacity: usize,
    order: VecDeque<String>,
    keys: HashMap<String, Zeroizing<Vec<u8>>>,
}

impl DekCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            keys: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<Zeroizing<Vec<u8>>> {
        self.keys.get(key).cloned()
    }

    fn insert(&mut self, key: String, dek: Zeroizing<Vec<u8>>) {
        if self.capacity == 0 || self.keys.contains_key(&key) {
            return;
        }
        if self.keys.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
        self.order.push_back(key.clone());
        self.keys.insert(key, dek);
    }
}
