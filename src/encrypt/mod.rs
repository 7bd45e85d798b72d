use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

mod aescbc;
mod aesgcm;
mod kms;
mod secretbox;

pub use aescbc::AesCbcTransformer;
pub use aesgcm::AesGcmTransformer;
pub use kms::{KeyService, KmsTransformer};
pub use secretbox::SecretboxTransformer;

/// Authenticated encryption bound to one object's identity via AAD.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
    async fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/// AAD string binding ciphertext to its object, `{namespace}#{name}` for
/// namespaced objects and `{name}` for cluster-scoped ones. Prevents silent
/// relocation of an encrypted blob to a different object.
pub fn object_aad(namespace: Option<&str>, name: &str) -> Vec<u8> {
    match namespace {
        Some(ns) => format!("{ns}#{name}").into_bytes(),
        None => name.as_bytes().to_vec(),
    }
}

/// Declarative encryption configuration, one block per resource set.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct EncryptionConfig {
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ResourceConfig {
    /// Resource selectors, `plural` for the core group or `plural.group`.
    pub resources: Vec<String>,
    pub providers: Vec<ProviderConfig>,
}

/// Exactly one field must be set per provider entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ProviderConfig {
    pub aesgcm: Option<KeysConfig>,
    pub aescbc: Option<KeysConfig>,
    pub secretbox: Option<KeysConfig>,
    pub kms: Option<KmsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct KeysConfig {
    pub keys: Vec<KeyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct KeyConfig {
    pub name: String,
    /// Base64-encoded key material.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct KmsConfig {
    /// Name of the external key management endpoint.
    pub name: String,
    #[serde(default = "default_kms_cache_size")]
    pub cachesize: usize,
    #[serde(default = "default_kms_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_kms_cache_size() -> usize {
    1000
}

fn default_kms_timeout_seconds() -> u64 {
    3
}

/// Ordered provider chain for one resource type. The first provider
/// encrypts; all are tried in declared order on decrypt.
pub struct TransformerChain {
    providers: Vec<Box<dyn Transformer>>,
}

impl std::fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerChain")
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl TransformerChain {
    pub fn new(providers: Vec<Box<dyn Transformer>>) -> Self {
        Self { providers }
    }

    pub async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        match self.providers.first() {
            Some(p) => p.encrypt(plaintext, aad).await,
            None => Err(Error::Crypto("empty provider chain".to_string())),
        }
    }

    pub async fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut last = None;
        for provider in &self.providers {
            match provider.decrypt(ciphertext, aad).await {
                Ok(plaintext) => return Ok(plaintext),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| Error::Crypto("empty provider chain".to_string())))
    }
}

/// Identity key of a configured resource type, (group, plural name).
pub type ResourceKey = (String, String);

/// Mapping from resource type to its provider chain. Resources without an
/// entry fall through as identity, and the map counts those passthroughs so
/// a mis-scoped configuration is diagnosable.
#[derive(Debug)]
pub struct TransformerMap {
    chains: HashMap<ResourceKey, TransformerChain>,
    passthrough: AtomicUsize,
}

impl TransformerMap {
    /// An empty map, everything passes through unencrypted.
    pub fn identity() -> Self {
        Self {
            chains: HashMap::new(),
            passthrough: AtomicUsize::new(0),
        }
    }

    pub fn is_configured(&self, group: &str, resource: &str) -> bool {
        self.chains
            .contains_key(&(group.to_string(), resource.to_string()))
    }

    /// Encrypt with the configured chain, or pass through verbatim while
    /// recording that no provider matched.
    pub async fn encrypt(
        &self,
        group: &str,
        resource: &str,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        match self.chains.get(&(group.to_string(), resource.to_string())) {
            Some(chain) => chain.encrypt(plaintext, aad).await,
            None => {
                self.passthrough.fetch_add(1, Ordering::Relaxed);
                Ok(plaintext.to_vec())
            }
        }
    }

    /// Decrypt with the configured chain, or return the input verbatim.
    pub async fn decrypt(
        &self,
        group: &str,
        resource: &str,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        match self.chains.get(&(group.to_string(), resource.to_string())) {
            Some(chain) => chain.decrypt(ciphertext, aad).await,
            None => {
                self.passthrough.fetch_add(1, Ordering::Relaxed);
                Ok(ciphertext.to_vec())
            }
        }
    }

    /// How many operations fell through without a configured provider.
    pub fn passthrough_count(&self) -> usize {
        self.passthrough.load(Ordering::Relaxed)
    }
}

/// Build the per-resource transformer chains from the declarative
/// configuration. `key_services` supplies the external endpoints kms
/// provider blocks refer to by name.
pub fn build_transformers(
    config: &EncryptionConfig,
    key_services: &HashMap<String, Arc<dyn KeyService>>,
) -> Result<TransformerMap> {
    let mut chains: HashMap<ResourceKey, TransformerChain> = HashMap::new();

    for block in &config.resources {
        if block.providers.is_empty() {
            return Err(Error::Config(
                "encryption resource block without providers".to_string(),
            ));
        }

        for resource in &block.resources {
            let key = parse_resource_key(resource);
            if chains.contains_key(&key) {
                return Err(Error::Config(format!(
                    "resource {resource:?} configured in more than one encryption block"
                )));
            }
            let mut chain = Vec::new();
            for provider in &block.providers {
                chain.push(build_provider(provider, key_services)?);
            }
            chains.insert(key, TransformerChain::new(chain));
        }
    }

    Ok(TransformerMap {
        chains,
        passthrough: AtomicUsize::new(0),
    })
}

/// `secrets` selects the core group, `charts.helm.cattle.io` splits at the
/// first dot into (plural, group).
fn parse_resource_key(resource: &str) -> ResourceKey {
    match resource.split_once('.') {
        Some((plural, group)) => (group.to_string(), plural.to_string()),
        None => (String::new(), resource.to_string()),
    }
}

fn build_provider(
    provider: &ProviderConfig,
    key_services: &HashMap<String, Arc<dyn KeyService>>,
) -> Result<Box<dyn Transformer>> {
    let configured = [
        provider.aesgcm.is_some(),
        provider.aescbc.is_some(),
        provider.secretbox.is_some(),
        provider.kms.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if configured != 1 {
        return Err(Error::Config(
            "encryption provider entry must set exactly one provider kind".to_string(),
        ));
    }

    if let Some(keys) = &provider.aesgcm {
        return Ok(Box::new(AesGcmTransformer::new(decode_keys(keys)?)?));
    }
    if let Some(keys) = &provider.aescbc {
        return Ok(Box::new(AesCbcTransformer::new(decode_keys(keys)?)?));
    }
    if let Some(keys) = &provider.secretbox {
        return Ok(Box::new(SecretboxTransformer::new(decode_keys(keys)?)?));
    }
    if let Some(kms) = &provider.kms {
        let service = key_services.get(&kms.name).cloned().ok_or_else(|| {
            Error::Config(format!("no key service registered for kms {:?}", kms.name))
        })?;
        return Ok(Box::new(KmsTransformer::new(
            service,
            kms.cachesize,
            std::time::Duration::from_secs(kms.timeout_seconds),
        )));
    }
    unreachable!("provider kind checked above")
}

fn decode_keys(keys: &KeysConfig) -> Result<Vec<Zeroizing<Vec<u8>>>> {
    let mut out = Vec::new();
    for key in &keys.keys {
        let material = BASE64.decode(&key.secret).map_err(|e| {
            Error::Config(format!("key {:?} is not valid base64: {e}", key.name))
        })?;
        out.push(Zeroizing::new(material));
    }
    if out.is_empty() {
        return Err(Error::Config("provider without keys".to_string()));
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn test_key() -> Zeroizing<Vec<u8>> {
    Zeroizing::new(vec![7u8; 32])
}
