//! Priority and scheduled job queue

pub mod retry;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::SystemTime,
};

use herald_common::{EmailJob, JobId};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Position in the immediate space: priority rank, then age, then insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ImmediateKey {
    rank: u8,
    created_at: SystemTime,
    seq: u64,
}

/// Position in the scheduled space: due instant, then insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduledKey {
    due: SystemTime,
    seq: u64,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Immediate(ImmediateKey),
    Scheduled(ScheduledKey),
}

#[derive(Debug, Default)]
struct QueueState {
    immediate: BTreeMap<ImmediateKey, EmailJob>,
    scheduled: BTreeMap<ScheduledKey, EmailJob>,
    slots: HashMap<JobId, Slot>,
    seq: u64,
}

impl QueueState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn push_immediate(&mut self, job: EmailJob) {
        let key = ImmediateKey {
            rank: job.priority.rank(),
            created_at: job.created_at,
            seq: self.next_seq(),
        };
        self.slots.insert(job.id, Slot::Immediate(key));
        self.immediate.insert(key, job);
    }

    fn push_scheduled(&mut self, job: EmailJob, due: SystemTime) {
        let key = ScheduledKey {
            due,
            seq: self.next_seq(),
        };
        self.slots.insert(job.id, Slot::Scheduled(key));
        self.scheduled.insert(key, job);
    }
}

/// Hands out the next job to run
///
/// Two spaces share one lock: the immediate space, ordered urgent first and
/// oldest first within a priority, and the scheduled space, keyed by the
/// instant a job becomes eligible. A job id is held at most once across both,
/// and promotion moves entries under the lock, so concurrent pollers can never
/// promote the same job twice.
#[derive(Debug, Clone, Default)]
pub struct JobQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl JobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job, scheduled if its `scheduled_at` lies in the future
    ///
    /// Returns `false` if the job is already queued.
    pub fn enqueue(&self, job: EmailJob) -> bool {
        self.enqueue_at(job, SystemTime::now())
    }

    /// [`JobQueue::enqueue`] with an explicit notion of now
    pub fn enqueue_at(&self, job: EmailJob, now: SystemTime) -> bool {
        let mut state = self.state.lock();
        if state.slots.contains_key(&job.id) {
            return false;
        }

        match job.scheduled_at {
            Some(due) if due > now => state.push_scheduled(job, due),
            _ => state.push_immediate(job),
        }
        drop(state);

        self.notify.notify_one();
        true
    }

    /// Hold a job back until `due`, whatever its own `scheduled_at` says
    ///
    /// Returns `false` if the job is already queued.
    pub fn defer(&self, job: EmailJob, due: SystemTime) -> bool {
        let mut state = self.state.lock();
        if state.slots.contains_key(&job.id) {
            return false;
        }
        state.push_scheduled(job, due);
        drop(state);

        self.notify.notify_one();
        true
    }

    /// Pop the highest priority, oldest immediate job
    ///
    /// `None` means there is no work right now; callers poll again later.
    pub fn dequeue(&self) -> Option<EmailJob> {
        let mut state = self.state.lock();
        let (_, job) = state.immediate.pop_first()?;
        state.slots.remove(&job.id);
        Some(job)
    }

    /// Move every scheduled job due at or before `now` into the immediate space
    ///
    /// Returns the number of jobs promoted. Calling it again for the same
    /// instant promotes nothing.
    pub fn promote_due(&self, now: SystemTime) -> usize {
        let mut state = self.state.lock();
        let mut promoted = 0;

        while state
            .scheduled
            .first_key_value()
            .is_some_and(|(key, _)| key.due <= now)
        {
            if let Some((_, job)) = state.scheduled.pop_first() {
                state.push_immediate(job);
                promoted += 1;
            }
        }

        promoted
    }

    /// Promote due jobs, then dequeue
    pub fn poll(&self, now: SystemTime) -> Option<EmailJob> {
        self.promote_due(now);
        self.dequeue()
    }

    /// Take a job out of whichever space holds it
    pub fn remove(&self, id: &JobId) -> Option<EmailJob> {
        let mut state = self.state.lock();
        match state.slots.remove(id)? {
            Slot::Immediate(key) => state.immediate.remove(&key),
            Slot::Scheduled(key) => state.scheduled.remove(&key),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &JobId) -> bool {
        self.state.lock().slots.contains_key(id)
    }

    /// A clone of a queued job
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<EmailJob> {
        let state = self.state.lock();
        match state.slots.get(id)? {
            Slot::Immediate(key) => state.immediate.get(key).cloned(),
            Slot::Scheduled(key) => state.scheduled.get(key).cloned(),
        }
    }

    /// Jobs eligible to run now
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().immediate.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    /// Jobs waiting for their scheduled instant
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.state.lock().scheduled.len()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Earliest instant a scheduled job becomes due
    #[must_use]
    pub fn next_due(&self) -> Option<SystemTime> {
        self.state
            .lock()
            .scheduled
            .first_key_value()
            .map(|(key, _)| key.due)
    }

    /// Wait until something is enqueued
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use herald_common::{JobContent, JobKind, Priority};
    use pretty_assertions::assert_eq;

    use super::*;

    fn job(priority: Priority, created_at: SystemTime) -> EmailJob {
        let mut job = EmailJob::new(
            JobKind::General,
            vec!["a@example.com".to_string()],
            JobContent::template("welcome"),
        );
        job.priority = priority;
        job.created_at = created_at;
        job
    }

    #[test]
    fn dequeues_by_priority() {
        let queue = JobQueue::new();
        let now = SystemTime::now();

        for priority in [Priority::Low, Priority::Normal, Priority::High, Priority::Urgent] {
            queue.enqueue_at(job(priority, now), now);
        }

        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue())
            .map(|job| job.priority)
            .collect();
        assert_eq!(
            order,
            vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
        );
    }

    #[test]
    fn fifo_within_a_priority() {
        let queue = JobQueue::new();
        let t1 = SystemTime::now();
        let t2 = t1 + Duration::from_millis(5);

        let later = job(Priority::Normal, t2);
        let earlier = job(Priority::Normal, t1);
        queue.enqueue_at(later.clone(), t2);
        queue.enqueue_at(earlier.clone(), t2);

        assert_eq!(queue.dequeue().unwrap().id, earlier.id);
        assert_eq!(queue.dequeue().unwrap().id, later.id);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn insertion_order_breaks_exact_ties() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        let first = job(Priority::Normal, now);
        let second = job(Priority::Normal, now);

        queue.enqueue_at(first.clone(), now);
        queue.enqueue_at(second.clone(), now);

        assert_eq!(queue.dequeue().unwrap().id, first.id);
        assert_eq!(queue.dequeue().unwrap().id, second.id);
    }

    #[test]
    fn scheduled_jobs_wait_for_their_instant() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        let mut scheduled = job(Priority::Urgent, now);
        scheduled.scheduled_at = Some(now + Duration::from_secs(2));

        queue.enqueue_at(scheduled.clone(), now);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.scheduled_len(), 1);
        assert_eq!(queue.next_due(), scheduled.scheduled_at);

        assert!(queue.poll(now + Duration::from_secs(1)).is_none());
        assert_eq!(
            queue.poll(now + Duration::from_secs(2)).unwrap().id,
            scheduled.id
        );
    }

    #[test]
    fn past_schedule_is_immediate() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        let mut overdue = job(Priority::Normal, now);
        overdue.scheduled_at = Some(now - Duration::from_secs(60));

        queue.enqueue_at(overdue, now);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.scheduled_len(), 0);
    }

    #[test]
    fn promotion_is_idempotent() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        let mut scheduled = job(Priority::Normal, now);
        scheduled.scheduled_at = Some(now + Duration::from_secs(1));
        queue.enqueue_at(scheduled, now);

        let due = now + Duration::from_secs(1);
        assert_eq!(queue.promote_due(due), 1);
        assert_eq!(queue.promote_due(due), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.total(), 1);
    }

    #[test]
    fn promoted_jobs_keep_priority_order() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        let waiting = job(Priority::Normal, now);
        queue.enqueue_at(waiting.clone(), now);

        let mut urgent = job(Priority::Urgent, now + Duration::from_millis(1));
        urgent.scheduled_at = Some(now + Duration::from_secs(1));
        queue.enqueue_at(urgent.clone(), now);

        let later = now + Duration::from_secs(1);
        assert_eq!(queue.poll(later).unwrap().id, urgent.id);
        assert_eq!(queue.poll(later).unwrap().id, waiting.id);
    }

    #[test]
    fn duplicates_and_removal() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        let queued = job(Priority::Normal, now);

        assert!(queue.enqueue_at(queued.clone(), now));
        assert!(!queue.enqueue_at(queued.clone(), now));
        assert!(!queue.defer(queued.clone(), now + Duration::from_secs(5)));
        assert!(queue.contains(&queued.id));

        assert_eq!(queue.remove(&queued.id).unwrap().id, queued.id);
        assert!(queue.remove(&queued.id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_promotion_moves_each_job_once() {
        let queue = JobQueue::new();
        let now = SystemTime::now();
        for i in 0..100 {
            let mut scheduled = job(Priority::Normal, now);
            scheduled.scheduled_at = Some(now + Duration::from_millis(i));
            queue.enqueue_at(scheduled, now);
        }

        let due = now + Duration::from_secs(1);
        let promoted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| queue.promote_due(due)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(promoted, 100);
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.scheduled_len(), 0);
    }

    #[tokio::test]
    async fn enqueue_wakes_a_waiter() {
        let queue = JobQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait().await })
        };

        tokio::task::yield_now().await;
        queue.enqueue(job(Priority::Normal, SystemTime::now()));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
