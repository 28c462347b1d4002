use std::{sync::Arc, time::SystemTime};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use herald_common::{
    DeliveryEvent, EmailJob, EmailTemplate, JobId, JobStatus, TemplateId, TrackingRecord,
};

use crate::{
    StoreError,
    rows::{self, apply_status},
    store::{JobStore, TemplateStore, TrackingStore},
};

/// In-memory store
///
/// Rows live in `DashMap`s, so every per-row operation (including the
/// compare-and-update used to claim jobs) runs under that row's shard lock
/// and no global lock serializes unrelated jobs.
///
/// Nothing survives a restart. Intended for tests, development and
/// deployments that only send untracked mail.
///
/// # Capacity Management
/// An optional job capacity makes `create_job` fail once reached instead of
/// growing without bound.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub(crate) jobs: Arc<DashMap<JobId, EmailJob>>,
    pub(crate) templates: Arc<DashMap<TemplateId, EmailTemplate>>,
    pub(crate) template_names: Arc<DashMap<String, TemplateId>>,
    pub(crate) tracking: Arc<DashMap<JobId, TrackingRecord>>,
    /// Maximum number of jobs to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store holding at most `capacity` jobs
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Number of stored jobs
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub(crate) fn check_capacity(&self) -> crate::Result<()> {
        match self.capacity {
            Some(cap) if self.jobs.len() >= cap => Err(StoreError::Internal(format!(
                "Memory store capacity exceeded: {}/{cap} jobs",
                self.jobs.len()
            ))),
            _ => Ok(()),
        }
    }

    fn collect_jobs(&self, keep: impl Fn(&EmailJob) -> bool) -> Vec<EmailJob> {
        self.jobs
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Ids of rows the retention sweep may delete
    pub(crate) fn expired_ids(&self, cutoff: SystemTime) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|entry| rows::is_expired(entry.value(), cutoff))
            .map(|entry| *entry.key())
            .collect()
    }

    /// Reserve `name` for template `id`
    pub(crate) fn claim_name(&self, name: &str, id: TemplateId) -> crate::Result<()> {
        match self.template_names.entry(name.to_string()) {
            Entry::Occupied(existing) if *existing.get() != id => Err(StoreError::AlreadyExists {
                kind: "template",
                key: name.to_string(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    pub(crate) fn release_name(&self, name: &str, id: TemplateId) {
        self.template_names.remove_if(name, |_, owner| *owner == id);
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &EmailJob) -> crate::Result<JobId> {
        self.check_capacity()?;

        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                kind: "job",
                key: job.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(job.id)
            }
        }
    }

    async fn get_job(&self, id: &JobId) -> crate::Result<EmailJob> {
        self.jobs
            .get(id)
            .map(|job| job.clone())
            .ok_or_else(|| StoreError::job_not_found(id))
    }

    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
        at: Option<SystemTime>,
    ) -> crate::Result<()> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::job_not_found(id))?;
        apply_status(&mut job, status, error_message, at);
        Ok(())
    }

    async fn update_job_if(&self, job: &EmailJob, expected: JobStatus) -> crate::Result<bool> {
        let mut stored = self
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::job_not_found(job.id))?;

        if stored.status != expected {
            return Ok(false);
        }

        *stored = job.clone();
        Ok(true)
    }

    async fn list_pending(&self, limit: usize) -> crate::Result<Vec<EmailJob>> {
        let mut pending = self.collect_jobs(|job| job.status == JobStatus::Pending);
        pending.sort_by(rows::by_priority_then_age);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_failed(&self, limit: usize) -> crate::Result<Vec<EmailJob>> {
        let mut failed = self.collect_jobs(|job| job.status == JobStatus::Failed);
        failed.sort_by(rows::by_age);
        failed.truncate(limit);
        Ok(failed)
    }

    async fn list_by_status(&self, status: JobStatus) -> crate::Result<Vec<EmailJob>> {
        let mut jobs = self.collect_jobs(|job| job.status == status);
        jobs.sort_by(rows::by_age);
        Ok(jobs)
    }

    async fn list_created_between(
        &self,
        from: SystemTime,
        to: SystemTime,
    ) -> crate::Result<Vec<EmailJob>> {
        let mut jobs = self.collect_jobs(|job| job.created_at >= from && job.created_at < to);
        jobs.sort_by(rows::by_age);
        Ok(jobs)
    }

    async fn increment_retry(&self, id: &JobId) -> crate::Result<u32> {
        let mut job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::job_not_found(id))?;
        job.attempts = job.attempts.saturating_add(1);
        job.updated_at = SystemTime::now();
        Ok(job.attempts)
    }

    async fn cleanup_older_than(&self, cutoff: SystemTime) -> crate::Result<u64> {
        let mut deleted = 0;

        for id in self.expired_ids(cutoff) {
            if self
                .jobs
                .remove_if(&id, |_, job| rows::is_expired(job, cutoff))
                .is_some()
            {
                self.tracking.remove(&id);
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    async fn ping(&self) -> crate::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn create_template(&self, template: &EmailTemplate) -> crate::Result<TemplateId> {
        if self.templates.contains_key(&template.id) {
            return Err(StoreError::AlreadyExists {
                kind: "template",
                key: template.id.to_string(),
            });
        }

        self.claim_name(&template.name, template.id)?;
        self.templates.insert(template.id, template.clone());
        Ok(template.id)
    }

    async fn get_template(&self, name: &str) -> crate::Result<EmailTemplate> {
        let id = self
            .template_names
            .get(name)
            .map(|id| *id)
            .ok_or_else(|| StoreError::template_not_found(name))?;
        self.get_template_by_id(&id).await
    }

    async fn get_template_by_id(&self, id: &TemplateId) -> crate::Result<EmailTemplate> {
        self.templates
            .get(id)
            .map(|template| template.clone())
            .ok_or_else(|| StoreError::template_not_found(id))
    }

    async fn update_template(&self, template: &EmailTemplate) -> crate::Result<()> {
        let previous = self.get_template_by_id(&template.id).await?;

        if previous.name != template.name {
            self.claim_name(&template.name, template.id)?;
            self.release_name(&previous.name, template.id);
        }

        self.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn delete_template(&self, id: &TemplateId) -> crate::Result<()> {
        let (_, template) = self
            .templates
            .remove(id)
            .ok_or_else(|| StoreError::template_not_found(id))?;
        self.release_name(&template.name, *id);
        Ok(())
    }

    async fn list_templates(&self) -> crate::Result<Vec<EmailTemplate>> {
        let mut templates: Vec<_> = self
            .templates
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn put_tracking(&self, record: &TrackingRecord) -> crate::Result<()> {
        if !self.jobs.contains_key(&record.job_id) {
            return Err(StoreError::job_not_found(record.job_id));
        }

        self.tracking.insert(record.job_id, record.clone());
        Ok(())
    }

    async fn apply_tracking_event(
        &self,
        job_id: &JobId,
        event: DeliveryEvent,
        at: SystemTime,
        detail: Option<String>,
    ) -> crate::Result<TrackingRecord> {
        let mut record = self
            .tracking
            .get_mut(job_id)
            .ok_or_else(|| StoreError::tracking_not_found(job_id))?;
        record.apply(event, at, detail);
        Ok(record.clone())
    }

    async fn get_tracking(&self, job_id: &JobId) -> crate::Result<TrackingRecord> {
        self.tracking
            .get(job_id)
            .map(|record| record.clone())
            .ok_or_else(|| StoreError::tracking_not_found(job_id))
    }
}
