use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::backup::object_key;
use crate::client::{GVResource, ObjectClient};
use crate::collect::Collector;
use crate::config::EngineConfig;
use crate::crd::ResourceSelector;
use crate::error::{Error, Result};

/// One live object marked for deletion.
#[derive(Debug, Clone)]
pub struct PruneResourceInfo {
    pub name: String,
    pub namespace: Option<String>,
    pub resource: GVResource,
}

/// Deletes live objects that are selected by policy but absent from the
/// restored snapshot. Two passes: a plain delete first, then after a grace
/// period a second delete that strips finalizers, so finalizer controllers
/// elsewhere get a fair chance to react in between.
pub struct Pruner {
    collector: Collector,
    objects: Arc<dyn ObjectClient>,
    workers: usize,
}

impl Pruner {
    pub fn new(collector: Collector, objects: Arc<dyn ObjectClient>, config: &EngineConfig) -> Self {
        Self {
            collector,
            objects,
            workers: config.worker_count.max(1),
        }
    }

    /// `restored` holds the relative paths the restore actually wrote, keyed
    /// exactly like the backup writer's layout. The grace period is an
    /// explicit argument so callers can test both passes without wall-clock
    /// waits.
    pub async fn prune(
        &self,
        selectors: &[ResourceSelector],
        restored: &HashSet<String>,
        grace: Duration,
    ) -> Result<()> {
        let gathered = self.collector.gather(selectors).await?;

        let mut marked = Vec::new();
        for (res, objs) in &gathered.resources {
            for obj in objs {
                let name = obj.metadata.name.clone().unwrap_or_default();
                let namespace = obj.metadata.namespace.clone();
                let key = object_key(res, namespace.as_deref(), &name);
                if !restored.contains(&key) {
                    marked.push(PruneResourceInfo {
                        name,
                        namespace,
                        resource: res.clone(),
                    });
                }
            }
        }

        if marked.is_empty() {
            return Ok(());
        }
        log::info!(
            "Pruning {} objects not present in the restored backup",
            marked.len()
        );

        // First pass leaves finalizers alone; failures here are expected for
        // finalizer-bearing objects and only logged.
        for e in &self.delete_all(&marked, false).await {
            log::warn!("First prune pass: {e}");
        }

        tokio::time::sleep(grace).await;

        let errors = self.delete_all(&marked, true).await;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }

    /// One deletion pass. The queue is fully built before the workers start
    /// draining it, and every worker is joined before the pass returns.
    async fn delete_all(&self, marked: &[PruneResourceInfo], strip_finalizers: bool) -> Vec<Error> {
        stream::iter(marked)
            .map(|info| self.delete_one(info, strip_finalizers))
            .buffer_unordered(self.workers)
            .filter_map(|outcome| async move { outcome.err() })
            .collect()
            .await
    }

    async fn delete_one(&self, info: &PruneResourceInfo, strip_finalizers: bool) -> Result<()> {
        let ns = info.namespace.as_deref();

        if strip_finalizers {
            match self.objects.get(&info.resource, ns, &info.name).await {
                Ok(mut obj) => {
                    let pinned = obj
                        .metadata
                        .finalizers
                        .as_ref()
                        .map(|f| !f.is_empty())
                        .unwrap_or(false);
                    if pinned {
                        obj.metadata.finalizers = None;
                        match self.objects.update(&info.resource, ns, &obj).await {
                            Ok(_) => {}
                            Err(Error::NotFound) => return Ok(()),
                            Err(e) => return Err(e),
                        }
                    }
                }
                // Already gone, which is the outcome we wanted.
                Err(Error::NotFound) => return Ok(()),
                Err(e) => return Err(e),
            }
        }

        match self.objects.delete(&info.resource, ns, &info.name).await {
            Ok(()) | Err(Error::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
