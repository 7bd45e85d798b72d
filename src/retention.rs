use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// (filename, creation time) pair, recomputed on every retention pass and
/// used purely for ordering.
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub filename: String,
    pub created: DateTime<Utc>,
}

/// Entries past the newest `retention_count`, stable-sorted descending by
/// creation time so ties resolve consistently.
fn beyond_retention(mut infos: Vec<BackupInfo>, retention_count: usize) -> Vec<BackupInfo> {
    infos.sort_by(|a, b| b.created.cmp(&a.created));
    if infos.len() <= retention_count {
        return Vec::new();
    }
    infos.split_off(retention_count)
}

/// Archives of one backup follow `<name>-<cluster>-<suffix>.tar.gz`.
fn archive_pattern(backup_name: &str, cluster_id: &str) -> Result<Regex> {
    let pattern = format!(
        "^{}-{}.*\\.tar\\.gz$",
        regex::escape(backup_name),
        regex::escape(cluster_id)
    );
    Regex::new(&pattern).map_err(|e| Error::bad_regex(&pattern, e))
}

/// Delete all but the newest `retention_count` archives below `dir`.
/// Returns how many were removed; the first deletion failure propagates
/// immediately.
pub fn enforce_local(
    dir: &Path,
    backup_name: &str,
    cluster_id: &str,
    retention_count: usize,
) -> Result<usize> {
    let pattern = format!("{}/{backup_name}-{cluster_id}*.tar.gz", dir.display());
    let mut infos = Vec::new();

    let entries = glob::glob(&pattern)
        .map_err(|e| Error::Config(format!("bad glob pattern {pattern:?}: {e}")))?;
    for entry in entries {
        let path = entry.map_err(|e| Error::Io(e.into_error()))?;
        let modified = std::fs::metadata(&path)?.modified()?;
        infos.push(BackupInfo {
            filename: path.to_string_lossy().into_owned(),
            created: DateTime::<Utc>::from(modified),
        });
    }

    let expired = beyond_retention(infos, retention_count);
    for info in &expired {
        log::info!("Retention: deleting local archive {}", info.filename);
        std::fs::remove_file(&info.filename)?;
    }
    Ok(expired.len())
}

/// Which storage holds the archives.
pub enum RetentionTarget<'a> {
    Local(&'a Path),
    Remote {
        store: &'a dyn ObjectStore,
        folder: Option<&'a str>,
    },
}

/// Entry point invoked after a successful backup. Absent storage
/// configuration is a no-op, not an error.
pub async fn enforce(
    target: Option<RetentionTarget<'_>>,
    backup_name: &str,
    cluster_id: &str,
    retention_count: usize,
) -> Result<usize> {
    match target {
        None => Ok(0),
        Some(RetentionTarget::Local(dir)) => {
            enforce_local(dir, backup_name, cluster_id, retention_count)
        }
        Some(RetentionTarget::Remote { store, folder }) => {
            enforce_remote(store, folder, backup_name, cluster_id, retention_count).await
        }
    }
}

/// Same algorithm over a remote bucket: prefix scan, optional path folder
/// stripped before pattern matching.
pub async fn enforce_remote(
    store: &dyn ObjectStore,
    folder: Option<&str>,
    backup_name: &str,
    cluster_id: &str,
    retention_count: usize,
) -> Result<usize> {
    let pattern = archive_pattern(backup_name, cluster_id)?;

    let mut infos = Vec::new();
    for object in store.list(folder).await? {
        let name = match folder {
            Some(f) => object
                .key
                .strip_prefix(f)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(&object.key),
            None => object.key.as_str(),
        };
        if pattern.is_match(name) {
            infos.push(BackupInfo {
                filename: object.key.clone(),
                created: object.last_modified,
            });
        }
    }

    let expired = beyond_retention(infos, retention_count);
    for info in &expired {
        log::info!("Retention: deleting archive {}", info.filename);
        store.delete(&info.filename).await?;
    }
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ts, FakeStore};

    fn info(name: &str, secs: i64) -> BackupInfo {
        BackupInfo {
            filename: name.to_string(),
            created: ts(secs),
        }
    }

    #[test]
    fn keeps_the_newest_k_and_expires_the_rest() {
        let infos = vec![
            info("old", 100),
            info("newest", 400),
            info("older", 200),
            info("newer", 300),
        ];
        let expired = beyond_retention(infos, 2);
        let names: Vec<&str> = expired.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names, vec!["older", "old"]);
    }

    #[test]
    fn retention_at_least_count_deletes_nothing() {
        let infos = vec![info("a", 1), info("b", 2)];
        assert!(beyond_retention(infos.clone(), 2).is_empty());
        assert!(beyond_retention(infos, 5).is_empty());
    }

    #[test]
    fn retention_zero_expires_everything() {
        let infos = vec![info("a", 1), info("b", 2)];
        assert_eq!(beyond_retention(infos, 0).len(), 2);
    }

    #[tokio::test]
    async fn remote_deletes_exactly_the_oldest_beyond_retention() {
        let store = FakeStore::with_objects(vec![
            ("nightly-c1-0001.tar.gz", ts(100)),
            ("nightly-c1-0002.tar.gz", ts(200)),
            ("nightly-c1-0003.tar.gz", ts(300)),
            ("nightly-c1-0004.tar.gz", ts(400)),
            // Different backup name and different cluster stay untouched.
            ("weekly-c1-0001.tar.gz", ts(50)),
            ("nightly-c2-0001.tar.gz", ts(60)),
        ]);

        let deleted = enforce_remote(&store, None, "nightly", "c1", 2).await.unwrap();
        assert_eq!(deleted, 2);

        let mut kept = store.keys();
        kept.sort();
        assert_eq!(
            kept,
            vec![
                "nightly-c1-0003.tar.gz",
                "nightly-c1-0004.tar.gz",
                "nightly-c2-0001.tar.gz",
                "weekly-c1-0001.tar.gz",
            ]
        );
    }

    #[tokio::test]
    async fn remote_strips_the_folder_prefix_before_matching() {
        let store = FakeStore::with_objects(vec![
            ("archives/nightly-c1-0001.tar.gz", ts(100)),
            ("archives/nightly-c1-0002.tar.gz", ts(200)),
        ]);

        let deleted = enforce_remote(&store, Some("archives"), "nightly", "c1", 1)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.keys(), vec!["archives/nightly-c1-0002.tar.gz"]);
    }

    #[tokio::test]
    async fn remote_delete_failure_propagates_immediately() {
        let mut store = FakeStore::with_objects(vec![
            ("nightly-c1-0001.tar.gz", ts(100)),
            ("nightly-c1-0002.tar.gz", ts(200)),
            ("nightly-c1-0003.tar.gz", ts(300)),
        ]);
        store
            .fail_delete
            .insert("nightly-c1-0002.tar.gz".to_string());

        let err = enforce_remote(&store, None, "nightly", "c1", 1).await;
        assert!(err.is_err());
    }

    #[test]
    fn local_respects_the_name_pattern() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "nightly-c1-0001.tar.gz",
            "nightly-c1-0002.tar.gz",
            "nightly-c1-0003.tar.gz",
            "weekly-c1-0001.tar.gz",
            "nightly-c1-0004.txt",
        ] {
            std::fs::write(dir.path().join(name), b"archive").unwrap();
        }

        let deleted = enforce_local(dir.path(), "nightly", "c1", 1).unwrap();
        assert_eq!(deleted, 2);

        // The other backup's archive and the non-archive file survive.
        assert!(dir.path().join("weekly-c1-0001.tar.gz").is_file());
        assert!(dir.path().join("nightly-c1-0004.txt").is_file());
        let remaining = glob::glob(&format!("{}/nightly-c1-*.tar.gz", dir.path().display()))
            .unwrap()
            .count();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn no_storage_configuration_is_a_noop() {
        assert_eq!(enforce(None, "nightly", "c1", 2).await.unwrap(), 0);
    }

    #[test]
    fn local_with_retention_above_count_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nightly-c1-0001.tar.gz"), b"archive").unwrap();

        let deleted = enforce_local(dir.path(), "nightly", "c1", 3).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.path().join("nightly-c1-0001.tar.gz").is_file());
    }
}
