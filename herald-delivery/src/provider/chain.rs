use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use herald_common::ProviderHealth;
use parking_lot::RwLock;
use tracing::warn;

use super::{EmailProvider, ProviderConfig, ProviderError};
use crate::{error::TemporaryError, message::RenderedEmail};

/// A successful hand-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub provider: String,
    pub message_id: String,
}

#[derive(Debug)]
struct Entry {
    provider: Arc<dyn EmailProvider>,
    healthy: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl Entry {
    fn record(&self, outcome: Result<(), &ProviderError>) {
        match outcome {
            Ok(()) => {
                self.healthy.store(true, Ordering::Relaxed);
                *self.last_error.write() = None;
            }
            Err(e) => {
                self.healthy.store(false, Ordering::Relaxed);
                *self.last_error.write() = Some(e.to_string());
            }
        }
    }
}

/// Fixed-order failover across providers
///
/// Providers are tried strictly in order; the first success wins. Each
/// provider's health reflects the outcome of its most recent send.
#[derive(Debug, Clone, Default)]
pub struct ProviderChain {
    entries: Arc<Vec<Entry>>,
}

impl ProviderChain {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn EmailProvider>>) -> Self {
        let entries = providers
            .into_iter()
            .map(|provider| Entry {
                provider,
                healthy: AtomicBool::new(true),
                last_error: RwLock::new(None),
            })
            .collect();

        Self {
            entries: Arc::new(entries),
        }
    }

    /// Build every configured provider, in order
    ///
    /// # Errors
    /// The first provider that cannot be built.
    pub fn from_config(configs: &[ProviderConfig]) -> Result<Self, ProviderError> {
        let providers = configs
            .iter()
            .map(ProviderConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(providers))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.provider.name()).collect()
    }

    /// Try each provider in order until one accepts the email
    ///
    /// Individual failures are logged, not returned.
    ///
    /// # Errors
    /// `AllProvidersFailed` carrying the last provider's error, or
    /// `NoProviders` for an empty chain.
    pub async fn send(&self, email: &RenderedEmail) -> Result<Sent, TemporaryError> {
        let mut last: Option<(String, ProviderError)> = None;

        for entry in self.entries.iter() {
            let name = entry.provider.name();
            let started = Instant::now();
            let result = entry.provider.try_send(email).await;

            if let Some(metrics) = herald_metrics::metrics() {
                metrics.providers.record_send(
                    name,
                    result.is_ok(),
                    started.elapsed().as_secs_f64(),
                );
            }

            match result {
                Ok(message_id) => {
                    entry.record(Ok(()));
                    return Ok(Sent {
                        provider: name.to_string(),
                        message_id,
                    });
                }
                Err(e) => {
                    warn!(
                        job_id = %email.job_id,
                        provider = name,
                        error = %e,
                        "Provider failed, trying the next one"
                    );
                    entry.record(Err(&e));
                    last = Some((name.to_string(), e));
                }
            }
        }

        match last {
            Some((provider, source)) => Err(TemporaryError::AllProvidersFailed {
                attempted: self.entries.len(),
                provider,
                source,
            }),
            None => Err(TemporaryError::NoProviders),
        }
    }

    /// Health of every provider, in chain order
    #[must_use]
    pub fn health(&self) -> Vec<ProviderHealth> {
        self.entries
            .iter()
            .map(|e| ProviderHealth {
                name: e.provider.name().to_string(),
                healthy: e.healthy.load(Ordering::Relaxed),
                last_error: e.last_error.read().clone(),
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use herald_common::JobId;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{message::Sender, provider::LogProvider};

    #[derive(Debug, Default)]
    struct Broken {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmailProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn try_send(&self, _: &RenderedEmail) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Transport("connection refused".to_string()))
        }
    }

    fn email() -> RenderedEmail {
        RenderedEmail {
            job_id: JobId::generate(),
            from: Sender::default(),
            to: vec!["a@example.com".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: "Hi".to_string(),
            html: None,
            text: Some("Hello".to_string()),
        }
    }

    #[tokio::test]
    async fn fails_over_in_order() {
        let broken = Arc::new(Broken::default());
        let chain = ProviderChain::new(vec![
            broken.clone(),
            Arc::new(LogProvider::new("backup")),
        ]);

        let sent = chain.send(&email()).await.unwrap();
        assert_eq!(sent.provider, "backup");
        assert!(sent.message_id.starts_with('<'));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);

        let health = chain.health();
        assert_eq!(health[0].name, "broken");
        assert!(!health[0].healthy);
        assert_eq!(
            health[0].last_error.as_deref(),
            Some("Transport error: connection refused")
        );
        assert!(health[1].healthy);
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let broken = Arc::new(Broken::default());
        let chain = ProviderChain::new(vec![Arc::new(LogProvider::default()), broken.clone()]);

        assert_eq!(chain.send(&email()).await.unwrap().provider, "log");
        assert_eq!(broken.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_failing_names_the_last_provider() {
        let chain = ProviderChain::new(vec![
            Arc::new(Broken::default()),
            Arc::new(Broken::default()),
        ]);

        let err = chain.send(&email()).await.unwrap_err();
        assert!(matches!(
            err,
            TemporaryError::AllProvidersFailed { attempted: 2, ref provider, .. } if provider == "broken"
        ));
    }

    #[tokio::test]
    async fn empty_chain() {
        let chain = ProviderChain::default();
        assert!(chain.is_empty());
        assert!(matches!(
            chain.send(&email()).await,
            Err(TemporaryError::NoProviders)
        ));
    }

    #[test]
    fn builds_from_config() {
        let chain = ProviderChain::from_config(&[ProviderConfig::Log]).unwrap();
        assert_eq!(chain.names(), vec!["log"]);
        assert_eq!(chain.len(), 1);
    }
}
