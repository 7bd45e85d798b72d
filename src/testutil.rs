//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use kube::core::ErrorResponse;

use crate::client::{ApiKind, DiscoveryClient, GVResource, ObjectClient, ObjectPage};
use crate::error::{Error, Result};
use crate::store::{ObjectStore, StoredObject};

pub fn kind(name: &str, display: &str, namespaced: bool, verbs: &[&str]) -> ApiKind {
    ApiKind {
        name: name.to_string(),
        kind: display.to_string(),
        namespaced,
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
    }
}

pub fn obj(res: &GVResource, namespace: Option<&str>, name: &str) -> DynamicObject {
    let mut o = DynamicObject::new(name, &res.api_resource());
    if let Some(ns) = namespace {
        o = o.within(ns);
    }
    o.data = serde_json::json!({});
    o
}

fn identity(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{name}", namespace.unwrap_or(""))
}

fn server_error(message: &str) -> Error {
    Error::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// Fake cluster: discovery data plus live objects, with injectable delete
/// failures.
#[derive(Default)]
pub struct FakeCluster {
    pub kinds: HashMap<(String, String), Vec<ApiKind>>,
    pub objects: Mutex<HashMap<GVResource, Vec<DynamicObject>>>,
    /// Identity keys (`namespace/name`) whose deletion always fails.
    pub fail_delete: HashSet<String>,
    /// Refuse deletion while an object still carries finalizers.
    pub fail_delete_with_finalizers: bool,
    pub deleted: Mutex<Vec<String>>,
    /// Cap on page size, to exercise continuation tokens.
    pub page_limit: Option<u32>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_kind(&mut self, group: &str, version: &str, kind: ApiKind) {
        self.kinds
            .entry((group.to_string(), version.to_string()))
            .or_default()
            .push(kind);
    }

    pub fn add_object(&mut self, res: &GVResource, obj: DynamicObject) {
        self.objects
            .lock()
            .unwrap()
            .entry(res.clone())
            .or_default()
            .push(obj);
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiscoveryClient for FakeCluster {
    async fn list_kinds(&self, group: &str, version: &str) -> Result<Option<Vec<ApiKind>>> {
        Ok(self
            .kinds
            .get(&(group.to_string(), version.to_string()))
            .cloned())
    }
}

#[async_trait]
impl ObjectClient for FakeCluster {
    async fn list(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        continue_token: Option<&str>,
        limit: u32,
    ) -> Result<ObjectPage> {
        let all = self
            .objects
            .lock()
            .unwrap()
            .get(res)
            .cloned()
            .unwrap_or_default();

        let filtered: Vec<DynamicObject> = all
            .into_iter()
            .filter(|o| match namespace {
                Some(ns) => o.metadata.namespace.as_deref() == Some(ns),
                None => true,
            })
            .filter(|o| matches_labels(o, label_selector))
            .collect();

        let limit = self.page_limit.unwrap_or(limit).max(1) as usize;
        let offset: usize = continue_token
            .map(|t| t.parse().unwrap_or(0))
            .unwrap_or(0);
        let end = (offset + limit).min(filtered.len());
        let items = filtered[offset..end].to_vec();
        let continue_token = if end < filtered.len() {
            Some(end.to_string())
        } else {
            None
        };

        Ok(ObjectPage {
            items,
            continue_token,
        })
    }

    async fn get(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(res)
            .and_then(|objs| {
                objs.iter()
                    .find(|o| {
                        o.metadata.name.as_deref() == Some(name)
                            && o.metadata.namespace.as_deref() == namespace
                    })
                    .cloned()
            })
            .ok_or(Error::NotFound)
    }

    async fn update(
        &self,
        res: &GVResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = obj.metadata.name.as_deref().unwrap_or("");
        let mut objects = self.objects.lock().unwrap();
        let objs = objects.get_mut(res).ok_or(Error::NotFound)?;
        let slot = objs
            .iter_mut()
            .find(|o| {
                o.metadata.name.as_deref() == Some(name)
                    && o.metadata.namespace.as_deref() == namespace
            })
            .ok_or(Error::NotFound)?;
        *slot = obj.clone();
        Ok(obj.clone())
    }

    async fn delete(&self, res: &GVResource, namespace: Option<&str>, name: &str) -> Result<()> {
        let key = identity(namespace, name);
        if self.fail_delete.contains(&key) {
            return Err(server_error(&format!("cannot delete {key}")));
        }

        let mut objects = self.objects.lock().unwrap();
        let objs = objects.get_mut(res).ok_or(Error::NotFound)?;
        let pos = objs
            .iter()
            .position(|o| {
                o.metadata.name.as_deref() == Some(name)
                    && o.metadata.namespace.as_deref() == namespace
            })
            .ok_or(Error::NotFound)?;

        if self.fail_delete_with_finalizers {
            let pinned = objs[pos]
                .metadata
                .finalizers
                .as_ref()
                .map(|f| !f.is_empty())
                .unwrap_or(false);
            if pinned {
                return Err(server_error(&format!("{key} is pinned by finalizers")));
            }
        }

        objs.remove(pos);
        self.deleted.lock().unwrap().push(key);
        Ok(())
    }
}

/// Equality-only label matching, enough for the tests.
fn matches_labels(obj: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else { return true };
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector.split(',').all(|part| match part.split_once('=') {
        Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
        None => true,
    })
}

pub fn cluster_with_secrets(entries: &[(&str, &str)]) -> FakeCluster {
    let res = GVResource {
        group: String::new(),
        version: "v1".to_string(),
        resource: "secrets".to_string(),
        kind: "Secret".to_string(),
        namespaced: true,
    };
    let mut cluster = FakeCluster::new();
    cluster.add_kind("", "v1", kind("secrets", "Secret", true, &["list", "get"]));
    for (ns, name) in entries {
        cluster.add_object(&res, obj(&res, Some(ns), name));
    }
    cluster
}

/// Fake object store with fixed modification times.
#[derive(Default)]
pub struct FakeStore {
    pub objects: Mutex<Vec<StoredObject>>,
    pub fail_delete: HashSet<String>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn with_objects(entries: Vec<(&str, DateTime<Utc>)>) -> Self {
        Self {
            objects: Mutex::new(
                entries
                    .into_iter()
                    .map(|(key, last_modified)| StoredObject {
                        key: key.to_string(),
                        last_modified,
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.key.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| prefix.map(|p| o.key.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn put(&self, key: &str, _data: Vec<u8>) -> Result<()> {
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            last_modified: Utc::now(),
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        Err(Error::Store(format!("no data stored for {key}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_delete.contains(key) {
            return Err(Error::Store(format!("delete {key} failed")));
        }
        self.objects.lock().unwrap().retain(|o| o.key != key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}
