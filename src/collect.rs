use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use kube::api::DynamicObject;
use regex::Regex;

use crate::client::{ApiKind, DiscoveryClient, GVResource, ObjectClient};
use crate::config::EngineConfig;
use crate::crd::ResourceSelector;
use crate::error::{Error, Result};

/// Everything one gather pass produced. Created fresh per invocation and
/// handed to the writer or pruner; never mutated concurrently.
#[derive(Default, Debug)]
pub struct GatherResult {
    pub resources: HashMap<GVResource, Vec<DynamicObject>>,

    /// `<plural>.<group>` entries whose status sub-resource takes a separate
    /// update call on restore.
    pub status_subresources: HashSet<String>,
}

/// Runs the selector rules against the live cluster.
pub struct Collector {
    discovery: Arc<dyn DiscoveryClient>,
    objects: Arc<dyn ObjectClient>,
    page_size: u32,
}

impl Collector {
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        objects: Arc<dyn ObjectClient>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            discovery,
            objects,
            page_size: config.page_size,
        }
    }

    /// Evaluate every selector in order. Results for the same resource type
    /// accumulate across selectors; duplicates are possible when two
    /// selectors match the same object, and that is accepted behavior.
    pub async fn gather(&self, selectors: &[ResourceSelector]) -> Result<GatherResult> {
        // Compile all filters first so a malformed regex aborts the whole
        // gather before any network call.
        let compiled = selectors
            .iter()
            .map(CompiledSelector::compile)
            .collect::<Result<Vec<_>>>()?;

        let mut out = GatherResult::default();
        for sel in &compiled {
            self.gather_one(sel, &mut out).await?;
        }
        Ok(out)
    }

    async fn gather_one(&self, sel: &CompiledSelector, out: &mut GatherResult) -> Result<()> {
        let Some(kinds) = self.discovery.list_kinds(&sel.group, &sel.version).await? else {
            log::info!(
                "Group/version {} not served by this cluster, selector matches nothing",
                sel.group_version()
            );
            return Ok(());
        };

        let matched = sel.match_kinds(&kinds);

        // Sub-resources are never gathered, but a writable status marks its
        // owner as needing a status update call on restore.
        for kind in kinds.iter().filter(|k| k.name.contains('/')) {
            let owner = kind.name.split('/').next().unwrap_or_default();
            if kind.name.ends_with("/status")
                && kind.has_verb("update")
                && matched.iter().any(|m| m.name == owner)
            {
                out.status_subresources.insert(status_key(&sel.group, owner));
            }
        }

        for kind in matched {
            let res = GVResource {
                group: sel.group.clone(),
                version: sel.version.clone(),
                resource: kind.name.clone(),
                kind: kind.kind.clone(),
                namespaced: kind.namespaced,
            };

            let objs = if kind.has_verb("list") {
                self.collect_listable(sel, &res).await?
            } else if kind.has_verb("get") {
                match self.collect_get_only(sel, &res).await? {
                    Some(objs) => objs,
                    None => continue,
                }
            } else {
                log::info!(
                    "Kind {} in {} supports neither list nor get, skipping",
                    kind.name,
                    sel.group_version()
                );
                continue;
            };

            out.resources.entry(res).or_default().extend(objs);
        }

        Ok(())
    }

    /// List with label selector and pagination, then apply name and
    /// namespace filters.
    async fn collect_listable(
        &self,
        sel: &CompiledSelector,
        res: &GVResource,
    ) -> Result<Vec<DynamicObject>> {
        let mut candidates = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self
                .objects
                .list(
                    res,
                    None,
                    sel.label_selector.as_deref(),
                    token.as_deref(),
                    self.page_size,
                )
                .await?;
            candidates.extend(page.items);
            token = page.continue_token;
            if token.is_none() {
                break;
            }
        }

        let mut kept = sel.filter_names(candidates);
        if res.namespaced {
            kept = sel.filter_namespaces(kept);
        }
        Ok(kept)
    }

    /// Degraded path for kinds that advertise get but not list: only exact
    /// resource names (and, if namespaced, exact namespaces) can be
    /// retrieved. Regex filters are unusable here; the kind is skipped with
    /// a log, never an error.
    async fn collect_get_only(
        &self,
        sel: &CompiledSelector,
        res: &GVResource,
    ) -> Result<Option<Vec<DynamicObject>>> {
        if sel.has_regex_filters() {
            log::info!(
                "Kind {} is get-only, regex filters are unusable for it",
                res.resource
            );
        }

        if sel.resource_names.is_empty() {
            log::info!(
                "Skipping get-only kind {} without exact resource names",
                res.resource
            );
            return Ok(None);
        }

        if res.namespaced && sel.namespaces.is_empty() {
            log::info!(
                "Skipping namespaced get-only kind {} without exact namespaces",
                res.resource
            );
            return Ok(None);
        }

        let namespaces: Vec<Option<&str>> = if res.namespaced {
            sel.namespaces.iter().map(|ns| Some(ns.as_str())).collect()
        } else {
            vec![None]
        };

        let mut items = Vec::new();
        for ns in namespaces {
            for name in &sel.resource_names {
                match self.objects.get(res, ns, name).await {
                    Ok(obj) => items.push(obj),
                    Err(Error::NotFound) => {
                        log::debug!("Named object {name} not present, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(Some(items))
    }
}

fn status_key(group: &str, plural: &str) -> String {
    if group.is_empty() {
        plural.to_string()
    } else {
        format!("{plural}.{group}")
    }
}

/// Stable content identity for dedup, `namespace/name`.
fn identity(obj: &DynamicObject) -> String {
    format!(
        "{}/{}",
        obj.metadata.namespace.as_deref().unwrap_or(""),
        obj.metadata.name.as_deref().unwrap_or("")
    )
}

/// One selector with its regexes compiled and its apiVersion split.
struct CompiledSelector {
    group: String,
    version: String,
    kinds: Vec<String>,
    kinds_regex: Option<Regex>,
    kinds_passthrough: bool,
    exclude_kinds: Vec<String>,
    resource_names: Vec<String>,
    name_regex: Option<Regex>,
    name_passthrough: bool,
    exclude_name_regex: Option<Regex>,
    namespaces: Vec<String>,
    namespace_regex: Option<Regex>,
    namespace_passthrough: bool,
    label_selector: Option<String>,
}

impl CompiledSelector {
    fn compile(sel: &ResourceSelector) -> Result<Self> {
        let (group, version) = parse_group_version(&sel.api_version)?;
        let (kinds_regex, kinds_passthrough) = compile_regex(&sel.kinds_regexp)?;
        let (name_regex, name_passthrough) = compile_regex(&sel.resource_name_regexp)?;
        let (exclude_name_regex, _) = compile_regex(&sel.exclude_resource_name_regexp)?;
        let (namespace_regex, namespace_passthrough) = compile_regex(&sel.namespace_regexp)?;

        Ok(Self {
            group,
            version,
            kinds: sel.kinds.clone().unwrap_or_default(),
            kinds_regex,
            kinds_passthrough,
            exclude_kinds: sel.exclude_kinds.clone().unwrap_or_default(),
            resource_names: sel.resource_names.clone().unwrap_or_default(),
            name_regex,
            name_passthrough,
            exclude_name_regex,
            namespaces: sel.namespaces.clone().unwrap_or_default(),
            namespace_regex,
            namespace_passthrough,
            label_selector: sel
                .label_selector
                .as_ref()
                .map(|l| l.to_selector_string())
                .filter(|s| !s.is_empty()),
        })
    }

    fn group_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    fn has_regex_filters(&self) -> bool {
        self.name_regex.is_some()
            || self.name_passthrough
            || self.exclude_name_regex.is_some()
            || self.namespace_regex.is_some()
            || self.namespace_passthrough
    }

    /// Kind axis: regex matches (minus excludes) first, then literally
    /// listed kinds that the regex did not already take.
    fn match_kinds(&self, all: &[ApiKind]) -> Vec<ApiKind> {
        let main: Vec<&ApiKind> = all.iter().filter(|k| !k.name.contains('/')).collect();

        // Implicit wildcard when no kind filter is configured.
        if self.kinds.is_empty() && self.kinds_regex.is_none() && !self.kinds_passthrough {
            return main.into_iter().cloned().collect();
        }

        let mut matched = Vec::new();
        let mut taken: HashSet<String> = HashSet::new();

        if self.kinds_regex.is_some() || self.kinds_passthrough {
            for kind in &main {
                let hit = self.kinds_passthrough
                    || self
                        .kinds_regex
                        .as_ref()
                        .map(|re| re.is_match(&kind.name) || re.is_match(&kind.kind))
                        .unwrap_or(false);
                if hit && !self.kind_excluded(kind) && taken.insert(kind.name.clone()) {
                    matched.push((*kind).clone());
                }
            }
        }

        for kind in &main {
            let listed = self
                .kinds
                .iter()
                .any(|k| k.eq_ignore_ascii_case(&kind.name) || k.eq_ignore_ascii_case(&kind.kind));
            if listed && taken.insert(kind.name.clone()) {
                matched.push((*kind).clone());
            }
        }

        matched
    }

    fn kind_excluded(&self, kind: &ApiKind) -> bool {
        self.exclude_kinds
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&kind.name) || k.eq_ignore_ascii_case(&kind.kind))
    }

    /// Name axis: regex include union exact names, deduplicated by object
    /// identity, then the exclude regex removes matches.
    fn filter_names(&self, candidates: Vec<DynamicObject>) -> Vec<DynamicObject> {
        let unfiltered = self.resource_names.is_empty()
            && self.name_regex.is_none()
            && !self.name_passthrough
            && self.exclude_name_regex.is_none();
        if unfiltered {
            return candidates;
        }

        // Only the exclude regex set means every candidate enters the
        // include set.
        let include_all = self.name_passthrough
            || (self.resource_names.is_empty() && self.name_regex.is_none());

        let mut kept = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for obj in &candidates {
            let name = obj.metadata.name.as_deref().unwrap_or("");
            let hit = include_all
                || self
                    .name_regex
                    .as_ref()
                    .map(|re| re.is_match(name))
                    .unwrap_or(false);
            if hit && seen.insert(identity(obj)) {
                kept.push(obj.clone());
            }
        }

        for obj in &candidates {
            let name = obj.metadata.name.as_deref().unwrap_or("");
            if self.resource_names.iter().any(|n| n == name) && seen.insert(identity(obj)) {
                kept.push(obj.clone());
            }
        }

        if let Some(exclude) = &self.exclude_name_regex {
            kept.retain(|obj| {
                let name = obj.metadata.name.as_deref().unwrap_or("");
                !exclude.is_match(name)
            });
        }

        kept
    }

    /// Namespace axis: exact set union regex; empty config means no
    /// narrowing.
    fn filter_namespaces(&self, mut candidates: Vec<DynamicObject>) -> Vec<DynamicObject> {
        if self.namespaces.is_empty()
            && self.namespace_regex.is_none()
            && !self.namespace_passthrough
        {
            return candidates;
        }

        candidates.retain(|obj| {
            let ns = obj.metadata.namespace.as_deref().unwrap_or("");
            self.namespace_passthrough
                || self.namespaces.iter().any(|n| n == ns)
                || self
                    .namespace_regex
                    .as_ref()
                    .map(|re| re.is_match(ns))
                    .unwrap_or(false)
        });
        candidates
    }
}

fn parse_group_version(api_version: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = api_version.split('/').collect();
    match parts[..] {
        [v] if !v.is_empty() => Ok((String::new(), v.to_string())),
        [g, v] if !g.is_empty() && !v.is_empty() => Ok((g.to_string(), v.to_string())),
        _ => Err(Error::Config(format!(
            "malformed apiVersion {api_version:?}"
        ))),
    }
}

/// The literal regex "." is a passthrough, equivalent to no filter at all.
fn compile_regex(pattern: &Option<String>) -> Result<(Option<Regex>, bool)> {
    match pattern.as_deref() {
        Some(".") => Ok((None, true)),
        Some(p) => Regex::new(p)
            .map(|re| (Some(re), false))
            .map_err(|e| Error::bad_regex(p, e)),
        None => Ok((None, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{cluster_with_secrets, kind, obj, FakeCluster};

    fn selector(json: serde_json::Value) -> ResourceSelector {
        serde_json::from_value(json).unwrap()
    }

    fn collector(cluster: Arc<FakeCluster>) -> Collector {
        Collector::new(cluster.clone(), cluster, &EngineConfig::default())
    }

    fn secrets_res() -> GVResource {
        GVResource {
            group: String::new(),
            version: "v1".to_string(),
            resource: "secrets".to_string(),
            kind: "Secret".to_string(),
            namespaced: true,
        }
    }

    #[tokio::test]
    async fn wildcard_matches_every_kind() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("secrets", "Secret", true, &["list", "get"]));
        cluster.add_kind("", "v1", kind("configmaps", "ConfigMap", true, &["list", "get"]));
        cluster.add_kind("", "v1", kind("nodes", "Node", false, &["list", "get"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({"apiVersion": "v1"}))])
            .await
            .unwrap();
        assert_eq!(result.resources.len(), 3);
    }

    #[tokio::test]
    async fn dot_kind_regex_is_passthrough() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("secrets", "Secret", true, &["list", "get"]));
        cluster.add_kind("", "v1", kind("configmaps", "ConfigMap", true, &["list", "get"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(
                serde_json::json!({"apiVersion": "v1", "kindsRegexp": "."}),
            )])
            .await
            .unwrap();
        assert_eq!(result.resources.len(), 2);
    }

    #[tokio::test]
    async fn exclude_kinds_trims_regex_matches_but_not_explicit_kinds() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("secrets", "Secret", true, &["list", "get"]));
        cluster.add_kind("", "v1", kind("configmaps", "ConfigMap", true, &["list", "get"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kindsRegexp": ".",
                "excludeKinds": ["secrets"]
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources.len(), 1);
        assert!(result.resources.keys().all(|r| r.resource == "configmaps"));

        // Explicitly listed kinds win over the exclude list.
        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kindsRegexp": ".",
                "kinds": ["secrets"],
                "excludeKinds": ["secrets"]
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources.len(), 2);
    }

    #[tokio::test]
    async fn kinds_match_singular_display_kind() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("apps", "v1", kind("deployments", "Deployment", true, &["list"]));
        cluster.add_kind("apps", "v1", kind("statefulsets", "StatefulSet", true, &["list"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "apps/v1",
                "kinds": ["Deployment"]
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources.len(), 1);
        assert!(result.resources.keys().all(|r| r.resource == "deployments"));
    }

    #[tokio::test]
    async fn missing_group_version_is_an_empty_match() {
        let cluster = FakeCluster::new();
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(
                serde_json::json!({"apiVersion": "missing.io/v1"}),
            )])
            .await
            .unwrap();
        assert!(result.resources.is_empty());
    }

    #[tokio::test]
    async fn malformed_regex_aborts_the_gather() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("secrets", "Secret", true, &["list"]));
        let collector = collector(Arc::new(cluster));

        let err = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "resourceNameRegexp": "["
            }))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn malformed_api_version_aborts_the_gather() {
        let collector = collector(Arc::new(FakeCluster::new()));
        let err = collector
            .gather(&[selector(serde_json::json!({"apiVersion": "a/b/c"}))])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn name_regex_unions_with_exact_names() {
        let cluster = cluster_with_secrets(&[
            ("fleet-system", "fleet-agent"),
            ("fleet-system", "gitjob"),
            ("default", "other"),
        ]);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "resourceNameRegexp": "^fleet-",
                "resourceNames": ["gitjob", "test"]
            }))])
            .await
            .unwrap();

        let objs = &result.resources[&secrets_res()];
        let names: Vec<&str> = objs
            .iter()
            .map(|o| o.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["fleet-agent", "gitjob"]);
    }

    #[tokio::test]
    async fn overlapping_name_filters_do_not_duplicate() {
        let cluster = cluster_with_secrets(&[("default", "gitjob")]);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "resourceNameRegexp": "^git",
                "resourceNames": ["gitjob"]
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources[&secrets_res()].len(), 1);
    }

    #[tokio::test]
    async fn exclude_name_regex_removes_matches() {
        let cluster = cluster_with_secrets(&[("default", "keep"), ("default", "drop-me")]);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "excludeResourceNameRegexp": "^drop-"
            }))])
            .await
            .unwrap();

        let objs = &result.resources[&secrets_res()];
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].metadata.name.as_deref(), Some("keep"));
    }

    #[tokio::test]
    async fn dot_name_regex_keeps_every_candidate() {
        let cluster = cluster_with_secrets(&[("default", "a"), ("default", "b")]);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "resourceNameRegexp": "."
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources[&secrets_res()].len(), 2);
    }

    #[tokio::test]
    async fn namespace_filter_unions_exact_and_regex() {
        let cluster = cluster_with_secrets(&[
            ("cattle-system", "a"),
            ("fleet-system", "b"),
            ("default", "c"),
        ]);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "namespaces": ["default"],
                "namespaceRegexp": "-system$"
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources[&secrets_res()].len(), 3);

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "namespaces": ["default"]
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources[&secrets_res()].len(), 1);
    }

    #[tokio::test]
    async fn dot_namespace_regex_keeps_every_candidate() {
        let cluster = cluster_with_secrets(&[("default", "a"), ("kube-system", "b")]);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "namespaceRegexp": "."
            }))])
            .await
            .unwrap();
        assert_eq!(result.resources[&secrets_res()].len(), 2);
    }

    #[tokio::test]
    async fn pagination_walks_every_page() {
        let names: Vec<String> = (0..9).map(|i| format!("secret-{i}")).collect();
        let pairs: Vec<(&str, &str)> = names.iter().map(|n| ("default", n.as_str())).collect();
        let mut cluster = cluster_with_secrets(&pairs);
        cluster.page_limit = Some(2);
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(
                serde_json::json!({"apiVersion": "v1", "kinds": ["secrets"]}),
            )])
            .await
            .unwrap();
        assert_eq!(result.resources[&secrets_res()].len(), 9);
    }

    #[tokio::test]
    async fn label_selector_is_pushed_down_to_the_list_call() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("secrets", "Secret", true, &["list", "get"]));
        let mut labeled = obj(&secrets_res(), Some("default"), "labeled");
        labeled.metadata.labels =
            Some([("app".to_string(), "gitjob".to_string())].into_iter().collect());
        cluster.add_object(&secrets_res(), labeled);
        cluster.add_object(&secrets_res(), obj(&secrets_res(), Some("default"), "plain"));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "kinds": ["secrets"],
                "labelSelector": {"matchLabels": {"app": "gitjob"}}
            }))])
            .await
            .unwrap();

        let objs = &result.resources[&secrets_res()];
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].metadata.name.as_deref(), Some("labeled"));
    }

    #[tokio::test]
    async fn get_only_kind_without_names_is_skipped() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("componentstatuses", "ComponentStatus", false, &["get"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({"apiVersion": "v1"}))])
            .await
            .unwrap();
        assert!(result.resources.is_empty());
    }

    #[tokio::test]
    async fn get_only_kind_retrieves_exact_names() {
        let res = GVResource {
            group: String::new(),
            version: "v1".to_string(),
            resource: "componentstatuses".to_string(),
            kind: "ComponentStatus".to_string(),
            namespaced: false,
        };
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("componentstatuses", "ComponentStatus", false, &["get"]));
        cluster.add_object(&res, obj(&res, None, "etcd-0"));
        cluster.add_object(&res, obj(&res, None, "scheduler"));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({
                "apiVersion": "v1",
                "resourceNames": ["etcd-0", "absent"]
            }))])
            .await
            .unwrap();

        let objs = &result.resources[&res];
        assert_eq!(objs.len(), 1);
        assert_eq!(objs[0].metadata.name.as_deref(), Some("etcd-0"));
    }

    #[tokio::test]
    async fn verbless_kind_is_skipped() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("", "v1", kind("bindings", "Binding", true, &["create"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({"apiVersion": "v1"}))])
            .await
            .unwrap();
        assert!(result.resources.is_empty());
    }

    #[tokio::test]
    async fn selectors_accumulate_without_dedup() {
        let cluster = cluster_with_secrets(&[("default", "gitjob")]);
        let collector = collector(Arc::new(cluster));

        let sel = serde_json::json!({"apiVersion": "v1", "kinds": ["secrets"]});
        let result = collector
            .gather(&[selector(sel.clone()), selector(sel)])
            .await
            .unwrap();
        // Accepted quirk: both selectors matched the same object.
        assert_eq!(result.resources[&secrets_res()].len(), 2);
    }

    #[tokio::test]
    async fn status_subresource_with_update_verb_is_recorded() {
        let mut cluster = FakeCluster::new();
        cluster.add_kind("apps", "v1", kind("deployments", "Deployment", true, &["list", "get"]));
        cluster.add_kind(
            "apps",
            "v1",
            kind("deployments/status", "Deployment", true, &["get", "update"]),
        );
        cluster.add_kind("apps", "v1", kind("deployments/scale", "Scale", true, &["update"]));
        let collector = collector(Arc::new(cluster));

        let result = collector
            .gather(&[selector(serde_json::json!({"apiVersion": "apps/v1"}))])
            .await
            .unwrap();

        // Only the real kind produced a map entry, and its status was noted.
        assert_eq!(result.resources.len(), 1);
        assert!(result.status_subresources.contains("deployments.apps"));
    }
}
