use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use kube::api::DynamicObject;
use serde_json::Value;

use crate::client::GVResource;
use crate::collect::Collector;
use crate::crd::ResourceSelector;
use crate::encrypt::{object_aad, TransformerMap};
use crate::error::{Error, Result};

/// Server-managed metadata stripped before serialization.
const SERVER_FIELDS: [&str; 6] = [
    "uid",
    "creationTimestamp",
    "deletionTimestamp",
    "selfLink",
    "resourceVersion",
    "deletionGracePeriodSeconds",
];

/// Directory for one resource type, `<plural>.<group>#<version>`.
pub fn resource_dir(res: &GVResource) -> String {
    format!("{}.{}#{}", res.resource, res.group, res.version)
}

/// Relative path of one object below the backup root. This is the contract
/// the pruner and the restore side reproduce exactly:
/// `<plural>.<group>#<version>[/<namespace>]/<name>.json`.
pub fn object_key(res: &GVResource, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{ns}/{name}.json", resource_dir(res)),
        None => format!("{}/{name}.json", resource_dir(res)),
    }
}

/// Serializes gathered objects into the backup root, one file per object,
/// encrypting the types the transformer map covers.
pub struct BackupWriter {
    root: PathBuf,
    transformers: TransformerMap,
}

impl BackupWriter {
    pub fn new(root: impl Into<PathBuf>, transformers: TransformerMap) -> Self {
        Self {
            root: root.into(),
            transformers,
        }
    }

    /// Write every object of one resource type. Returns the relative paths
    /// written, the keys the prune engine later checks against.
    pub async fn write(&self, res: &GVResource, objects: &[DynamicObject]) -> Result<Vec<String>> {
        let mut written = Vec::new();

        for obj in objects {
            let name = obj.metadata.name.clone().unwrap_or_default();
            let namespace = obj.metadata.namespace.clone();

            // Already being deleted with nothing pinning it, not worth
            // capturing.
            let pinned = obj
                .metadata
                .finalizers
                .as_ref()
                .map(|f| !f.is_empty())
                .unwrap_or(false);
            if obj.metadata.deletion_timestamp.is_some() && !pinned {
                log::debug!("Skipping {name}, deletion already in progress");
                continue;
            }

            let mut doc = serde_json::to_value(obj)?;
            strip_server_fields(&mut doc);
            let payload = serde_json::to_vec(&doc)?;

            let aad = object_aad(namespace.as_deref(), &name);
            let out = self
                .transformers
                .encrypt(&res.group, &res.resource, &payload, &aad)
                .await?;
            let bytes = if self.transformers.is_configured(&res.group, &res.resource) {
                // Transformer output is opaque binary, re-marshaled as a
                // JSON string for the on-disk contract.
                serde_json::to_vec(&BASE64.encode(out))?
            } else {
                out
            };

            let key = object_key(res, namespace.as_deref(), &name);
            let path = self.root.join(&key);
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&path, bytes)?;
            written.push(key);
        }

        Ok(written)
    }

    /// Read one object back, decrypting through the provider chain when the
    /// resource type is configured.
    pub async fn read(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value> {
        let key = object_key(res, namespace, name);
        let raw = std::fs::read(self.root.join(&key))?;

        if !self.transformers.is_configured(&res.group, &res.resource) {
            return Ok(serde_json::from_slice(&raw)?);
        }

        let encoded: String = serde_json::from_slice(&raw)?;
        let sealed = BASE64
            .decode(encoded)
            .map_err(|e| Error::Crypto(format!("ciphertext is not valid base64: {e}")))?;
        let aad = object_aad(namespace, name);
        let plain = self
            .transformers
            .decrypt(&res.group, &res.resource, &sealed, &aad)
            .await?;
        Ok(serde_json::from_slice(&plain)?)
    }

    /// How many objects went through without a configured provider, for
    /// diagnosing mis-scoped encryption configurations.
    pub fn passthrough_count(&self) -> usize {
        self.transformers.passthrough_count()
    }
}

/// Gather everything the selectors match and serialize it below the backup
/// root. Returns every relative path written, the set a later restore hands
/// to the prune engine.
pub async fn run_backup(
    collector: &Collector,
    writer: &BackupWriter,
    selectors: &[ResourceSelector],
) -> Result<Vec<String>> {
    let gathered = collector.gather(selectors).await?;

    let mut written = Vec::new();
    for (res, objects) in &gathered.resources {
        written.extend(writer.write(res, objects).await?);
    }

    log::info!("Backup wrote {} objects", written.len());
    if writer.passthrough_count() > 0 {
        log::info!(
            "{} objects had no matching encryption provider",
            writer.passthrough_count()
        );
    }
    Ok(written)
}

fn strip_server_fields(doc: &mut Value) {
    if let Some(meta) = doc.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in SERVER_FIELDS {
            meta.remove(field);
        }
    }
}
