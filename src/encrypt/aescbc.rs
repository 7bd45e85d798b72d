use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::encrypt::Transformer;
use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 32;

/// AES-256-CBC provider. CBC itself carries no authentication, so the
/// payload is sealed encrypt-then-MAC: HMAC-SHA256 over aad, iv and
/// ciphertext. Layout: iv || ciphertext || tag.
pub struct AesCbcTransformer {
    keys: Vec<Zeroizing<Vec<u8>>>,
}

impl AesCbcTransformer {
    pub fn new(keys: Vec<Zeroizing<Vec<u8>>>) -> Result<Self> {
        for key in &keys {
            if key.len() != 32 {
                return Err(Error::Crypto("aescbc keys must be 32 bytes".to_string()));
            }
        }
        Ok(Self { keys })
    }

    fn seal_tag(key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|_| Error::Crypto("invalid hmac key".to_string()))?;
        mac.update(aad);
        mac.update(iv);
        mac.update(ciphertext);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn open_with(key: &[u8], payload: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < IV_SIZE + TAG_SIZE {
            return Err(Error::Crypto("aescbc payload too short".to_string()));
        }
        let (rest, tag) = payload.split_at(payload.len() - TAG_SIZE);
        let (iv, ciphertext) = rest.split_at(IV_SIZE);

        let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
            .map_err(|_| Error::Crypto("invalid hmac key".to_string()))?;
        mac.update(aad);
        mac.update(iv);
        mac.update(ciphertext);
        mac.verify_slice(tag)
            .map_err(|_| Error::Crypto("aescbc authentication failed".to_string()))?;

        Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| Error::Crypto("invalid aescbc key".to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Crypto("aescbc padding invalid".to_string()))
    }
}

#[async_trait]
impl Transformer for AesCbcTransformer {
    async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let key = &self.keys[0];
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|_| Error::Crypto("invalid aescbc key".to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let tag = Self::seal_tag(key, aad, &iv, &ciphertext)?;

        let mut out = iv.to_vec();
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        for key in &self.keys {
            if let Ok(plaintext) = Self::open_with(key, ciphertext, aad) {
                return Ok(plaintext);
            }
        }
        Err(Error::Crypto(
            "aescbc decryption failed: wrong key or mismatched object identity".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encrypt::test_key;

    #[tokio::test]
    async fn roundtrip() {
        let t = AesCbcTransformer::new(vec![test_key()]).unwrap();
        let sealed = t.encrypt(b"payload", b"ns#name").await.unwrap();
        assert_eq!(t.decrypt(&sealed, b"ns#name").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn mismatched_aad_fails() {
        let t = AesCbcTransformer::new(vec![test_key()]).unwrap();
        let sealed = t.encrypt(b"payload", b"ns#name").await.unwrap();
        assert!(t.decrypt(&sealed, b"ns#other").await.is_err());
    }

    #[tokio::test]
    async fn tampered_ciphertext_fails_authentication() {
        let t = AesCbcTransformer::new(vec![test_key()]).unwrap();
        let mut sealed = t.encrypt(b"payload", b"aad").await.unwrap();
        sealed[IV_SIZE] ^= 0xff;
        assert!(t.decrypt(&sealed, b"aad").await.is_err());
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(AesCbcTransformer::new(vec![Zeroizing::new(vec![1u8; 24])]).is_err());
    }
}
