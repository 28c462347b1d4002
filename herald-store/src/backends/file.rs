use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use async_trait::async_trait;
use dashmap::DashMap;
use herald_common::{
    DeliveryEvent, EmailJob, EmailTemplate, JobId, JobStatus, TemplateId, TrackingRecord,
    internal,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{fs, sync::Mutex};

use super::memory::MemoryStore;
use crate::{
    SerializationError, StoreError,
    rows::{self, apply_status},
    store::{JobStore, TemplateStore, TrackingStore},
};

const JOBS_DIR: &str = "jobs";
const TEMPLATES_DIR: &str = "templates";
const TRACKING_DIR: &str = "tracking";
const TRACKING_EXT: &str = ".trk";

/// File-backed store
///
/// Each row is a bincode file named after its ULID:
/// - `jobs/{job_id}.job`
/// - `templates/{template_id}.tpl`
/// - `tracking/{job_id}.trk`
///
/// All rows are loaded into a [`MemoryStore`] index by [`FileStore::init`];
/// reads are served from the index and writes go to disk first, then the
/// index, so a failed write leaves both unchanged.
///
/// # Atomicity
/// Files are written to `.tmp_{name}` and renamed into place. Deletes rename
/// to `{name}.deleted` before removing, and `init` clears leftovers of both.
/// Writes to one job row (including its tracking record) are serialized by a
/// per-row lock; template writes share one lock to keep names unique.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    index: MemoryStore,
    row_locks: Arc<DashMap<JobId, Arc<Mutex<()>>>>,
    template_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Create a store rooted at `path`
    ///
    /// Nothing touches the filesystem until [`FileStore::init`].
    ///
    /// # Errors
    /// If the path is relative, contains `..` or points into a system directory.
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        Self::validate_path(&path)?;
        Ok(Self::unchecked(path))
    }

    fn unchecked(path: PathBuf) -> Self {
        Self {
            path,
            index: MemoryStore::new(),
            row_locks: Arc::default(),
            template_lock: Arc::default(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn validate_path(path: &Path) -> crate::Result<()> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(StoreError::Validation(format!(
                "Store path cannot contain '..' components: {}",
                path.display()
            )));
        }

        if !path.is_absolute() {
            return Err(StoreError::Validation(format!(
                "Store path must be absolute: {}",
                path.display()
            )));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        if let Some(prefix) = sensitive_prefixes.iter().find(|p| path.starts_with(p)) {
            return Err(StoreError::Validation(format!(
                "Store path cannot be in system directory {prefix}: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Create the directory layout, clear crash leftovers and load every row
    ///
    /// This runs at startup; failing here keeps the worker pool from starting.
    ///
    /// # Errors
    /// If the directories cannot be created or read.
    pub fn init(&mut self) -> crate::Result<()> {
        internal!("Initialising file store at {}", self.path.display());

        if self.path.try_exists()? && !self.path.is_dir() {
            return Err(StoreError::Validation(format!(
                "Expected {} to be a directory",
                self.path.display()
            )));
        }

        for dir in [JOBS_DIR, TEMPLATES_DIR, TRACKING_DIR] {
            let dir = self.path.join(dir);
            std::fs::create_dir_all(&dir)?;
            Self::cleanup_leftovers(&dir)?;
        }

        self.index = MemoryStore::new();

        for job in Self::load_dir::<EmailJob>(&self.path.join(JOBS_DIR), |name| {
            JobId::from_filename(name).is_some()
        })? {
            self.index.jobs.insert(job.id, job);
        }

        for template in Self::load_dir::<EmailTemplate>(&self.path.join(TEMPLATES_DIR), |name| {
            TemplateId::from_filename(name).is_some()
        })? {
            self.index.claim_name(&template.name, template.id)?;
            self.index.templates.insert(template.id, template);
        }

        for record in Self::load_dir::<TrackingRecord>(&self.path.join(TRACKING_DIR), |name| {
            tracking_id_from_filename(name).is_some()
        })? {
            self.index.tracking.insert(record.job_id, record);
        }

        internal!(
            level = INFO,
            "Loaded {} jobs, {} templates and {} tracking records from {}",
            self.index.jobs.len(),
            self.index.templates.len(),
            self.index.tracking.len(),
            self.path.display()
        );

        Ok(())
    }

    /// Remove `.tmp_` and `.deleted` files left behind by a crash
    fn cleanup_leftovers(dir: &Path) -> crate::Result<()> {
        let mut cleaned = 0;

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if name.starts_with(".tmp_") || name.ends_with(".deleted") {
                std::fs::remove_file(entry.path())?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} orphaned files from {}",
                dir.display()
            );
        }

        Ok(())
    }

    fn load_dir<T: DeserializeOwned>(
        dir: &Path,
        accept: impl Fn(&str) -> bool,
    ) -> crate::Result<Vec<T>> {
        let mut rows = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if !accept(&name) {
                continue;
            }

            let bytes = std::fs::read(entry.path())?;
            match bincode::serde::decode_from_slice::<T, _>(&bytes, bincode::config::standard()) {
                Ok((row, _)) => rows.push(row),
                Err(e) => tracing::warn!(
                    file = %entry.path().display(),
                    error = %e,
                    "Skipping unreadable row"
                ),
            }
        }

        Ok(rows)
    }

    fn row_lock(&self, id: JobId) -> Arc<Mutex<()>> {
        self.row_locks.entry(id).or_default().clone()
    }

    async fn persist<T: Serialize + Sync>(
        &self,
        dir: &str,
        filename: &str,
        value: &T,
    ) -> crate::Result<()> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(SerializationError::from)?;

        let dir = self.path.join(dir);
        let temp_path = dir.join(format!(".tmp_{filename}"));
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, dir.join(filename)).await?;

        Ok(())
    }

    /// Two-phase delete; a missing file counts as deleted
    async fn remove(&self, dir: &str, filename: &str) -> crate::Result<()> {
        let dir = self.path.join(dir);
        let path = dir.join(filename);
        let deleted = dir.join(format!("{filename}.deleted"));

        match fs::rename(&path, &deleted).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        fs::remove_file(&deleted).await?;
        Ok(())
    }

    async fn write_job(&self, job: &EmailJob) -> crate::Result<()> {
        self.persist(JOBS_DIR, &job.id.filename(), job).await?;
        self.index.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn write_tracking(&self, record: &TrackingRecord) -> crate::Result<()> {
        self.persist(TRACKING_DIR, &tracking_filename(&record.job_id), record)
            .await?;
        self.index.tracking.insert(record.job_id, record.clone());
        Ok(())
    }

    async fn write_template(&self, template: &EmailTemplate) -> crate::Result<()> {
        self.persist(TEMPLATES_DIR, &template.id.filename(), template)
            .await?;
        self.index.templates.insert(template.id, template.clone());
        Ok(())
    }
}

fn tracking_filename(id: &JobId) -> String {
    format!("{id}{TRACKING_EXT}")
}

fn tracking_id_from_filename(name: &str) -> Option<JobId> {
    JobId::from_filename(&format!("{}.job", name.strip_suffix(TRACKING_EXT)?))
}

#[async_trait]
impl JobStore for FileStore {
    #[tracing::instrument(level = "debug", skip_all, fields(job_id = %job.id))]
    async fn create_job(&self, job: &EmailJob) -> crate::Result<JobId> {
        self.index.check_capacity()?;

        let lock = self.row_lock(job.id);
        let _guard = lock.lock().await;

        if self.index.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists {
                kind: "job",
                key: job.id.to_string(),
            });
        }

        self.write_job(job).await?;
        Ok(job.id)
    }

    async fn get_job(&self, id: &JobId) -> crate::Result<EmailJob> {
        self.index.get_job(id).await
    }

    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
        at: Option<SystemTime>,
    ) -> crate::Result<()> {
        let lock = self.row_lock(*id);
        let _guard = lock.lock().await;

        let mut job = self.index.get_job(id).await?;
        apply_status(&mut job, status, error_message, at);
        self.write_job(&job).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(job_id = %job.id, %expected))]
    async fn update_job_if(&self, job: &EmailJob, expected: JobStatus) -> crate::Result<bool> {
        let lock = self.row_lock(job.id);
        let _guard = lock.lock().await;

        if self.index.get_job(&job.id).await?.status != expected {
            return Ok(false);
        }

        self.write_job(job).await?;
        Ok(true)
    }

    async fn list_pending(&self, limit: usize) -> crate::Result<Vec<EmailJob>> {
        self.index.list_pending(limit).await
    }

    async fn list_failed(&self, limit: usize) -> crate::Result<Vec<EmailJob>> {
        self.index.list_failed(limit).await
    }

    async fn list_by_status(&self, status: JobStatus) -> crate::Result<Vec<EmailJob>> {
        self.index.list_by_status(status).await
    }

    async fn list_created_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> crate::Result<Vec<EmailJob>> {
        self.index.list_created_between(from, to).await
    }

    async fn increment_retry(&self, id: &JobId) -> crate::Result<u32> {
        let lock = self.row_lock(*id);
        let _guard = lock.lock().await;

        let mut job = self.index.get_job(id).await?;
        job.attempts = job.attempts.saturating_add(1);
        job.updated_at = SystemTime::now();
        self.write_job(&job).await?;
        Ok(job.attempts)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn cleanup_older_than(&self, cutoff: SystemTime) -> crate::Result<u64> {
        let mut deleted = 0;

        for id in self.index.expired_ids(cutoff) {
            let lock = self.row_lock(id);
            let _guard = lock.lock().await;

            let still_expired = self
                .index
                .jobs
                .get(&id)
                .is_some_and(|job| rows::is_expired(&job, cutoff));
            if !still_expired {
                continue;
            }

            self.remove(TRACKING_DIR, &tracking_filename(&id)).await?;
            self.remove(JOBS_DIR, &id.filename()).await?;
            self.index.tracking.remove(&id);
            self.index.jobs.remove(&id);
            deleted += 1;
        }

        self.row_locks
            .retain(|id, _| self.index.jobs.contains_key(id));

        Ok(deleted)
    }

    async fn ping(&self) -> crate::Result<()> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::Unavailable(format!(
                "{} is not a directory",
                self.path.display()
            ))),
            Err(e) => Err(StoreError::Unavailable(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl TemplateStore for FileStore {
    async fn create_template(&self, template: &EmailTemplate) -> crate::Result<TemplateId> {
        let _guard = self.template_lock.lock().await;

        if self.index.templates.contains_key(&template.id) {
            return Err(StoreError::AlreadyExists {
                kind: "template",
                key: template.id.to_string(),
            });
        }

        self.index.claim_name(&template.name, template.id)?;
        if let Err(e) = self.write_template(template).await {
            self.index.release_name(&template.name, template.id);
            return Err(e);
        }

        Ok(template.id)
    }

    async fn get_template(&self, name: &str) -> crate::Result<EmailTemplate> {
        self.index.get_template(name).await
    }

    async fn get_template_by_id(&self, id: &TemplateId) -> crate::Result<EmailTemplate> {
        self.index.get_template_by_id(id).await
    }

    async fn update_template(&self, template: &EmailTemplate) -> crate::Result<()> {
        let _guard = self.template_lock.lock().await;

        let previous = self.index.get_template_by_id(&template.id).await?;
        let renamed = previous.name != template.name;

        if renamed {
            self.index.claim_name(&template.name, template.id)?;
        }

        if let Err(e) = self.write_template(template).await {
            if renamed {
                self.index.release_name(&template.name, template.id);
            }
            return Err(e);
        }

        if renamed {
            self.index.release_name(&previous.name, template.id);
        }

        Ok(())
    }

    async fn delete_template(&self, id: &TemplateId) -> crate::Result<()> {
        let _guard = self.template_lock.lock().await;

        let template = self.index.get_template_by_id(id).await?;
        self.remove(TEMPLATES_DIR, &id.filename()).await?;
        self.index.templates.remove(id);
        self.index.release_name(&template.name, *id);
        Ok(())
    }

    async fn list_templates(&self) -> crate::Result<Vec<EmailTemplate>> {
        self.index.list_templates().await
    }
}

#[async_trait]
impl TrackingStore for FileStore {
    async fn put_tracking(&self, record: &TrackingRecord) -> crate::Result<()> {
        let lock = self.row_lock(record.job_id);
        let _guard = lock.lock().await;

        if !self.index.jobs.contains_key(&record.job_id) {
            return Err(StoreError::job_not_found(record.job_id));
        }

        self.write_tracking(record).await
    }

    async fn apply_tracking_event(
        &self,
        job_id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> crate::Result<TrackingRecord> {
        let lock = self.row_lock(*job_id);
        let _guard = lock.lock().await;

        let mut record = self.index.get_tracking(job_id).await?;
        record.apply(event, at, detail);
        self.write_tracking(&record).await?;
        Ok(record)
    }

    async fn get_tracking(&self, job_id: &JobId) -> crate::Result<TrackingRecord> {
        self.index.get_tracking(job_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_paths() {
        assert!(FileStore::new("relative/path").is_err());
        assert!(FileStore::new("/var/lib/../etc/herald").is_err());
        assert!(FileStore::new("/etc/herald").is_err());
        assert!(FileStore::new("/var/lib/herald").is_ok());
    }

    #[test]
    fn tracking_filenames_round_trip() {
        let id = JobId::generate();
        assert_eq!(tracking_id_from_filename(&tracking_filename(&id)), Some(id));
        assert_eq!(tracking_id_from_filename(&id.filename()), None);
    }
}
