use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::ApiResource;
use kube::{client::Client, discovery};

use crate::error::{Error, Result};

/// Identity of one resource type for a single gather pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GVResource {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. "deployments".
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
}

impl GVResource {
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.group_version(),
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }

    pub fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// One kind advertised by discovery for a group/version.
#[derive(Debug, Clone)]
pub struct ApiKind {
    /// Plural name; sub-resources contain a `/`.
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ApiKind {
    pub fn has_verb(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v == verb)
    }
}

pub struct ObjectPage {
    pub items: Vec<DynamicObject>,
    pub continue_token: Option<String>,
}

/// Enumerates kinds and their supported verbs for a group/version.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// `Ok(None)` when the group/version is not served at all, which is
    /// expected in heterogeneous clusters and not a transport failure.
    async fn list_kinds(&self, group: &str, version: &str) -> Result<Option<Vec<ApiKind>>>;
}

/// Schemaless access to live objects of arbitrary resource types.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// One page of objects. `namespace: None` lists across all namespaces
    /// for namespaced kinds and is the only form for cluster-scoped ones.
    async fn list(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        continue_token: Option<&str>,
        limit: u32,
    ) -> Result<ObjectPage>;

    async fn get(&self, res: &GVResource, namespace: Option<&str>, name: &str)
        -> Result<DynamicObject>;

    async fn update(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;

    async fn delete(&self, res: &GVResource, namespace: Option<&str>, name: &str) -> Result<()>;
}

/// Maps "not found"/"gone" API responses onto the normalized variant.
fn normalize(e: kube::Error) -> Error {
    if let kube::Error::Api(resp) = &e {
        if resp.code == 404 || resp.code == 410 {
            return Error::NotFound;
        }
    }
    Error::Api(e)
}

pub struct KubeDiscovery {
    client: Client,
}

impl KubeDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiscoveryClient for KubeDiscovery {
    async fn list_kinds(&self, group: &str, version: &str) -> Result<Option<Vec<ApiKind>>> {
        let apigroup = match discovery::group(&self.client, group).await {
            Ok(g) => g,
            Err(e) => {
                return match normalize(e) {
                    Error::NotFound => Ok(None),
                    other => Err(other),
                };
            }
        };

        if !apigroup.versions().any(|v| v == version) {
            return Ok(None);
        }

        let mut kinds = Vec::new();
        for (ar, caps) in apigroup.versioned_resources(version) {
            kinds.push(ApiKind {
                name: ar.plural.clone(),
                kind: ar.kind.clone(),
                namespaced: caps.scope == discovery::Scope::Namespaced,
                verbs: caps.operations.clone(),
            });

            for (sub, sub_caps) in &caps.subresources {
                let name = if sub.plural.contains('/') {
                    sub.plural.clone()
                } else {
                    format!("{}/{}", ar.plural, sub.plural)
                };
                kinds.push(ApiKind {
                    name,
                    kind: sub.kind.clone(),
                    namespaced: caps.scope == discovery::Scope::Namespaced,
                    verbs: sub_caps.operations.clone(),
                });
            }
        }

        Ok(Some(kinds))
    }
}

pub struct KubeObjects {
    client: Client,
}

impl KubeObjects {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, res: &GVResource, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = res.api_resource();
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

#[async_trait]
impl ObjectClient for KubeObjects {
    async fn list(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        continue_token: Option<&str>,
        limit: u32,
    ) -> Result<ObjectPage> {
        let mut params = ListParams::default().limit(limit);
        if let Some(labels) = label_selector {
            params = params.labels(labels);
        }
        if let Some(token) = continue_token {
            params = params.continue_token(token);
        }

        let list = self
            .api(res, namespace)
            .list(&params)
            .await
            .map_err(normalize)?;

        Ok(ObjectPage {
            items: list.items,
            continue_token: list.metadata.continue_.filter(|t| !t.is_empty()),
        })
    }

    async fn get(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.api(res, namespace).get(name).await.map_err(normalize)
    }

    async fn update(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.api(res, namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(normalize)
    }

    async fn delete(&self, res: &GVResource, namespace: Option<&str>, name: &str) -> Result<()> {
        self.api(res, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(normalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_version_forms() {
        let core = GVResource {
            group: String::new(),
            version: "v1".to_string(),
            resource: "secrets".to_string(),
            kind: "Secret".to_string(),
            namespaced: true,
        };
        assert_eq!(core.group_version(), "v1");

        let apps = GVResource {
            group: "apps".to_string(),
            version: "v1".to_string(),
            resource: "deployments".to_string(),
            kind: "Deployment".to_string(),
            namespaced: true,
        };
        assert_eq!(apps.group_version(), "apps/v1");
        assert_eq!(apps.api_resource().api_version, "apps/v1");
    }
}
