use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::{client::Client, Api};

use crate::crd::SecretKeyRef;
use crate::encrypt::EncryptionConfig;
use crate::error::{Error, Result};

/// Get the raw data of a secret within namespace `ns`.
pub async fn get_secret_data(
    client: Client,
    ns: &str,
    name: &str,
) -> Result<BTreeMap<String, Vec<u8>>> {
    let secrets: Api<Secret> = Api::namespaced(client, ns);
    let secret = secrets.get(name).await?;

    Ok(secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.0))
        .collect())
}

/// Resolve the encryption provider configuration referenced by a backup or
/// restore. The secret key holds the YAML configuration document.
pub async fn load_encryption_config(
    client: Client,
    ns: &str,
    reference: &SecretKeyRef,
) -> Result<EncryptionConfig> {
    let data = get_secret_data(client, ns, &reference.secret_name).await?;
    let payload = data.get(&reference.secret_key).ok_or_else(|| {
        Error::Config(format!(
            "secret {} has no key {}",
            reference.secret_name, reference.secret_key
        ))
    })?;
    Ok(serde_yaml::from_slice(payload)?)
}

/// Resolve S3 credentials from a secret with `accessKey` and `secretKey`
/// entries.
pub async fn load_s3_credentials(client: Client, ns: &str, name: &str) -> Result<(String, String)> {
    let data = get_secret_data(client, ns, name).await?;

    let field = |key: &str| -> Result<String> {
        let raw = data
            .get(key)
            .ok_or_else(|| Error::Config(format!("credential secret {name} has no key {key}")))?;
        String::from_utf8(raw.clone())
            .map_err(|_| Error::Config(format!("credential secret {name} key {key} is not utf-8")))
    };

    Ok((field("accessKey")?, field("secretKey")?))
}
