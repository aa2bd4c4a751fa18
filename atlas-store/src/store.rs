use atlas_common::StoreSettings;
use atlas_geo::EnrichedRecord;
use serde_json::{Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Country key → raw JSON value as found on disk.
pub type Archive = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("failed to read archive {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize archive: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write archive {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create archive directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("archive write task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("archive write lock unavailable: {0}")]
    Lock(#[from] tokio::sync::AcquireError),
}

/// Handle on the archive file. Cheap to clone; clones share one write lock.
#[derive(Debug, Clone)]
pub struct OpportunityStore {
    path: PathBuf,
    write_limit: Arc<Semaphore>,
}

impl OpportunityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_limit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(settings.path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records` under `country` (lower-cased) and return how many
    /// records the key holds afterwards.
    ///
    /// An absent key is created, an existing array is extended, and any
    /// other value under the key is replaced. A corrupt archive file is
    /// treated as empty and overwritten.
    pub async fn append(
        &self,
        country: &str,
        records: Vec<EnrichedRecord>,
    ) -> Result<usize, AppendError> {
        let key = country.to_lowercase();
        let permit = self.write_limit.acquire().await?;
        let path = self.path.clone();
        let batch = records.len();
        let total =
            tokio::task::spawn_blocking(move || merge_and_write(&path, &key, &records)).await??;
        drop(permit);
        info!(
            path = %self.path.display(),
            country = %country.to_lowercase(),
            appended = batch,
            total,
            "store.append.written"
        );
        Ok(total)
    }

    /// The whole archive. Absent file → empty; corrupt file → empty with a warning.
    pub fn load(&self) -> Result<Archive, AppendError> {
        read_archive(&self.path)
    }

    /// Records stored under `country` (lower-cased), skipping entries that
    /// are not well-formed records.
    pub fn records(&self, country: &str) -> Result<Vec<EnrichedRecord>, AppendError> {
        let archive = self.load()?;
        let Some(Value::Array(entries)) = archive.get(&country.to_lowercase()) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect())
    }
}

fn read_archive(path: &Path) -> Result<Archive, AppendError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(source) => {
            return Err(AppendError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            warn!(path = %path.display(), "store.archive.not_an_object");
            Ok(Map::new())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "store.archive.corrupt");
            Ok(Map::new())
        }
    }
}

fn merge_and_write(
    path: &Path,
    key: &str,
    records: &[EnrichedRecord],
) -> Result<usize, AppendError> {
    let mut archive = read_archive(path)?;
    let incoming = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;

    let total = match archive.get_mut(key) {
        Some(Value::Array(existing)) => {
            existing.extend(incoming);
            existing.len()
        }
        Some(other) => {
            warn!(%key, "store.append.replaced_non_array");
            let n = incoming.len();
            *other = Value::Array(incoming);
            n
        }
        None => {
            let n = incoming.len();
            archive.insert(key.to_string(), Value::Array(incoming));
            n
        }
    };

    let body = serde_json::to_vec_pretty(&archive)?;
    write_atomically(path, &body)?;
    Ok(total)
}

/// Temp file in the target's directory, fsync, then rename over the target.
/// The temp file is removed on every error path when it drops.
fn write_atomically(path: &Path, body: &[u8]) -> Result<(), AppendError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| AppendError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let write_err = |source: io::Error| AppendError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(body).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    debug!(tmp = %tmp.path().display(), "store.append.tmp_synced");
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(lat: f64, link: &str) -> EnrichedRecord {
        serde_json::from_value(json!({
            "latlon": [lat, 10.0],
            "country": "japan",
            "link": link,
            "name": null
        }))
        .unwrap()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn appends_are_additive_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("opportunities.json");

        let a = record(1.0, "https://x/a");
        let b = record(2.0, "https://x/b");
        OpportunityStore::new(&path).append("japan", vec![a.clone()]).await.unwrap();
        // A fresh handle stands in for a process restart.
        let total = OpportunityStore::new(&path)
            .append("japan", vec![b.clone()])
            .await
            .unwrap();

        assert_eq!(total, 2);
        assert_eq!(OpportunityStore::new(&path).records("japan").unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn corrupt_archive_is_replaced_by_new_batch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("opportunities.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = OpportunityStore::new(&path);
        store.append("Japan", vec![record(1.0, "https://x/a")]).await.unwrap();

        let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let obj = on_disk.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["japan"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_array_entry_is_replaced_and_other_keys_survive() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("opportunities.json");
        std::fs::write(&path, r#"{"japan": "oops", "kenya": [{"latlon": [1, 2]}]}"#).unwrap();

        let store = OpportunityStore::new(&path);
        let total = store.append("JAPAN", vec![record(3.0, "https://x/c")]).await.unwrap();

        assert_eq!(total, 1);
        let archive = store.load().unwrap();
        assert_eq!(archive["kenya"], json!([{"latlon": [1, 2]}]));
        assert_eq!(archive["japan"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_parent_directory_is_created_and_no_temp_files_remain() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/data/opportunities.json");

        OpportunityStore::new(&path)
            .append("peru", vec![record(1.0, "https://x/a")])
            .await
            .unwrap();

        assert_eq!(dir_entries(&tmp.path().join("nested/data")), vec!["opportunities.json"]);
    }

    #[tokio::test]
    async fn unreadable_archive_reports_read_error_without_leftovers() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be cannot be read as an archive.
        let path = tmp.path().join("opportunities.json");
        std::fs::create_dir(&path).unwrap();

        let err = OpportunityStore::new(&path)
            .append("peru", vec![record(1.0, "https://x/a")])
            .await
            .unwrap_err();

        assert!(matches!(err, AppendError::Read { .. }), "{err}");
        assert_eq!(dir_entries(tmp.path()), vec!["opportunities.json"]);
    }

    #[test]
    fn failed_write_leaves_no_temp_file_behind() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("opportunities.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        let err = write_atomically(&target, b"{}").unwrap_err();

        assert!(matches!(err, AppendError::Write { .. }), "{err}");
        assert_eq!(dir_entries(tmp.path()), vec!["opportunities.json"]);
    }

    #[tokio::test]
    async fn concurrent_appends_through_clones_are_not_lost() {
        let tmp = TempDir::new().unwrap();
        let store = OpportunityStore::new(tmp.path().join("opportunities.json"));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append("chile", vec![record(i as f64, &format!("https://x/{i}"))])
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.records("chile").unwrap().len(), 8);
    }

    #[test]
    fn reads_tolerate_absent_and_malformed_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("opportunities.json");
        let store = OpportunityStore::new(&path);
        assert!(store.load().unwrap().is_empty());
        assert!(store.records("japan").unwrap().is_empty());

        std::fs::write(
            &path,
            r#"{"japan": [{"latlon": [1, 2], "country": "japan", "link": null, "name": null}, {"latlon": "bad"}, 7]}"#,
        )
        .unwrap();
        let records = store.records("Japan").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].geo.latlon(), [1.0, 2.0]);

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
