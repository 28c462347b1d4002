//! Shared fixtures: scripted providers and a fast-ticking processor

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use herald_common::{EmailTemplate, Signal};
use herald_delivery::{
    EmailProvider, JobProcessor, JobService, ProviderChain, ProviderError, RenderedEmail,
};
use herald_store::TestStore;
use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};

pub const WAIT: Duration = Duration::from_secs(5);

/// Provider whose outcomes are decided up front
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    failures_left: AtomicU32,
    delay: Duration,
    calls: AtomicU32,
    subjects: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn build(name: &str, failures: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures_left: AtomicU32::new(failures),
            delay,
            calls: AtomicU32::new(0),
            subjects: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding(name: &str) -> Arc<Self> {
        Self::build(name, 0, Duration::ZERO)
    }

    pub fn always_failing(name: &str) -> Arc<Self> {
        Self::build(name, u32::MAX, Duration::ZERO)
    }

    /// Fails the first `failures` sends, then succeeds
    pub fn failing_first(name: &str, failures: u32) -> Arc<Self> {
        Self::build(name, failures, Duration::ZERO)
    }

    /// Succeeds, but only after `delay`
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Self::build(name, 0, delay)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Subjects of every email handed to this provider, in call order
    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().clone()
    }
}

#[async_trait]
impl EmailProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn try_send(&self, email: &RenderedEmail) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.subjects.lock().push(email.subject.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                (left > 0).then(|| if left == u32::MAX { left } else { left - 1 })
            })
            .is_ok();

        if failing {
            Err(ProviderError::Transport(format!(
                "{} scripted failure on call {call}",
                self.name
            )))
        } else {
            Ok(format!("<{call}@{}.test>", self.name))
        }
    }
}

/// A processor with millisecond backoff and polling
pub fn processor(store: &TestStore, providers: Vec<Arc<dyn EmailProvider>>) -> Arc<JobProcessor> {
    let mut processor = JobProcessor::default();
    processor.workers = 2;
    processor.poll_interval_ms = 10;
    processor.poll_jitter_ms = 0;
    processor.process_timeout_ms = 2_000;
    processor.retry.base_delay_ms = 10;
    processor.retry.max_delay_ms = 100;
    processor.retry.jitter_factor = 0.0;
    processor.init(Arc::new(store.clone()), ProviderChain::new(providers));
    Arc::new(processor)
}

/// Same as [`processor`], with a tweak applied before the processor is shared
pub fn processor_with(
    store: &TestStore,
    providers: Vec<Arc<dyn EmailProvider>>,
    tweak: impl FnOnce(&mut JobProcessor),
) -> Arc<JobProcessor> {
    let mut processor = Arc::into_inner(processor(store, providers)).expect("sole owner");
    tweak(&mut processor);
    Arc::new(processor)
}

pub struct Running {
    shutdown: broadcast::Sender<Signal>,
    handle: JoinHandle<()>,
}

impl Running {
    pub async fn stop(self) {
        self.shutdown.send(Signal::Shutdown).unwrap();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("processor stops")
            .unwrap();
    }
}

pub fn start(processor: &Arc<JobProcessor>) -> Running {
    let (shutdown, rx) = broadcast::channel(1);
    let processor = Arc::clone(processor);
    let handle = tokio::spawn(async move {
        processor.serve(rx).await.expect("processor runs");
    });
    Running { shutdown, handle }
}

pub async fn install_welcome(processor: &JobProcessor) {
    processor
        .create_template(
            EmailTemplate::new("welcome", "Welcome {{name}}")
                .with_html("<p>Hello {{name}}</p>")
                .with_text("Hello {{name}}")
                .with_variables(["name"]),
        )
        .await
        .unwrap();
}
