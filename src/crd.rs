use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One filter rule. Within a selector, fields of the same axis (kind, name,
/// namespace) combine by OR; different axes combine by AND.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    /// Exactly one group/version, e.g. "v1" or "apps/v1".
    pub api_version: String,

    /// Exact plural or singular kind names to include.
    pub kinds: Option<Vec<String>>,

    /// Regex matched against the plural name and the display kind.
    pub kinds_regexp: Option<String>,

    /// Kinds removed from the regex matches. Explicitly listed kinds win.
    pub exclude_kinds: Option<Vec<String>>,

    /// Exact object names to include.
    pub resource_names: Option<Vec<String>>,

    /// Regex matched against object names.
    pub resource_name_regexp: Option<String>,

    /// Regex removing objects after the include passes.
    pub exclude_resource_name_regexp: Option<String>,

    /// Exact namespaces to include (namespaced kinds only).
    pub namespaces: Option<Vec<String>>,

    /// Regex matched against namespaces.
    pub namespace_regexp: Option<String>,

    pub label_selector: Option<LabelSelector>,
}

/// Label selector applied while listing candidates.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: Option<BTreeMap<String, String>>,
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    /// One of In, NotIn, Exists, DoesNotExist.
    pub operator: String,
    pub values: Option<Vec<String>>,
}

impl LabelSelector {
    /// Render as the string form the list API accepts.
    pub fn to_selector_string(&self) -> String {
        let mut parts = Vec::new();

        for (k, v) in self.match_labels.iter().flatten() {
            parts.push(format!("{k}={v}"));
        }

        for req in self.match_expressions.iter().flatten() {
            let values = req.values.clone().unwrap_or_default().join(",");
            match req.operator.as_str() {
                "In" => parts.push(format!("{} in ({values})", req.key)),
                "NotIn" => parts.push(format!("{} notin ({values})", req.key)),
                "Exists" => parts.push(req.key.clone()),
                "DoesNotExist" => parts.push(format!("!{}", req.key)),
                other => {
                    log::warn!("Ignoring unknown label selector operator {other}");
                }
            }
        }

        parts.join(",")
    }
}

/// Reference to a key within a secret.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    pub secret_name: String,
    pub secret_key: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Storage {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    /// Key prefix inside the bucket the archives live under.
    pub folder: Option<String>,
    /// Secret holding accessKey/secretKey, "namespace/name".
    pub credential_secret_name: Option<String>,
    pub credential_secret_namespace: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

/// Where archives are kept. Absence means the local backup root only.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    pub s3: Option<S3Storage>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "kback.io",
    version = "v1",
    kind = "Backup",
    plural = "backups",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    /// Selector rules evaluated in order; results accumulate.
    pub resource_selectors: Vec<ResourceSelector>,

    pub storage_location: Option<StorageLocation>,

    /// Secret holding the encryption provider configuration.
    pub encryption_config_secret: Option<SecretKeyRef>,

    /// Number of most-recent archives to keep after a successful backup.
    pub retention_count: Option<usize>,

    /// Cron expression for recurring backups, consumed by the controller.
    pub schedule: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "kback.io",
    version = "v1",
    kind = "Restore",
    plural = "restores",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSpec {
    /// Archive to restore from, `<backup>-<cluster>-<suffix>.tar.gz`.
    pub backup_filename: String,

    pub storage_location: Option<StorageLocation>,

    pub encryption_config_secret: Option<SecretKeyRef>,

    /// Delete live objects matched by policy but absent from the backup.
    #[serde(default)]
    pub prune: bool,

    /// Grace period between the two prune deletion passes.
    pub delete_timeout_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_deserializes_camel_case() {
        let sel: ResourceSelector = serde_json::from_str(
            r#"{
                "apiVersion": "apps/v1",
                "kindsRegexp": "^deployments$",
                "resourceNames": ["fleet-agent"],
                "namespaceRegexp": "^cattle-"
            }"#,
        )
        .unwrap();
        assert_eq!(sel.api_version, "apps/v1");
        assert_eq!(sel.kinds_regexp.as_deref(), Some("^deployments$"));
        assert_eq!(sel.resource_names.unwrap(), vec!["fleet-agent"]);
        assert!(sel.kinds.is_none());
    }

    #[test]
    fn label_selector_string_forms() {
        let sel = LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "app".to_string(),
                "gitjob".to_string(),
            )])),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["db".to_string(), "cache".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "legacy".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
            ]),
        };
        assert_eq!(
            sel.to_selector_string(),
            "app=gitjob,tier in (db,cache),!legacy"
        );
    }
}
