use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use herald_common::{Signal, audit, internal, logging};
use herald_delivery::{JobProcessor, JobService, ProviderChain, render};
use herald_health::{HealthChecker, HealthServer};
use tokio::sync::broadcast;

use crate::config::{Herald, TemplateSeed};

/// How often the health checker is handed a fresh report
const HEALTH_REFRESH: Duration = Duration::from_secs(5);

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Install templates named in the config that the store does not know yet
///
/// Existing templates are left alone so edits made through the job service
/// survive restarts.
///
/// # Errors
/// If a seed is invalid or the store cannot be written.
pub async fn seed_templates(jobs: &dyn JobService, seeds: &[TemplateSeed]) -> anyhow::Result<usize> {
    let mut installed = 0;

    for seed in seeds {
        match jobs.get_template(&seed.name).await {
            Ok(_) => {
                tracing::debug!(template = %seed.name, "Template already present, not seeding");
            }
            Err(e) if e.is_not_found() => {
                jobs.create_template(seed.into()).await?;
                internal!("Seeded template {}", seed.name);
                installed += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(installed)
}

/// Push the processor's view of itself into the health checker until shutdown
async fn refresh_health(
    processor: Arc<JobProcessor>,
    checker: Arc<HealthChecker>,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let mut interval = tokio::time::interval(HEALTH_REFRESH);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                checker.update(processor.health_check().await);
                checker.set_processor_ready(!processor.is_stopping());
            }
            _ = shutdown.recv() => {
                checker.set_processor_ready(false);
                break;
            }
        }
    }
}

impl Herald {
    /// Validate the configuration without starting anything
    ///
    /// Builds every provider and checks every seed template, so a `--check`
    /// run catches what startup would.
    ///
    /// # Errors
    /// Describes the first problem found.
    pub fn check(&self) -> anyhow::Result<()> {
        let chain = ProviderChain::from_config(&self.providers)?;
        if chain.is_empty() {
            tracing::warn!("No providers configured, every delivery attempt will fail");
        }

        for seed in &self.templates {
            let template = herald_common::EmailTemplate::from(seed);
            template.validate()?;
            render::check_template(&template).map_err(|(field, e)| {
                anyhow::anyhow!("Template {} has an invalid {field}: {e}", seed.name)
            })?;
        }

        Ok(())
    }

    /// Run the engine, and everything it controls, until shutdown
    ///
    /// # Errors
    ///
    /// This function will return an error if the store, the providers or the
    /// health server fail to initialise, or the worker pool cannot start.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        audit::init(self.audit.clone());
        herald_metrics::init_metrics(&self.metrics)?;

        internal!("Controller running");

        let store = self.store.open()?;
        let chain = ProviderChain::from_config(&self.providers)?;

        let mut processor = self.processor;
        if let Some(sender) = self.sender {
            processor.sender = sender;
        }
        processor.init(store, chain);
        let processor = Arc::new(processor);

        let seeded = seed_templates(processor.as_ref(), &self.templates).await?;
        internal!("Seeded {} of {} configured templates", seeded, self.templates.len());

        let checker = Arc::new(HealthChecker::new(self.health.max_queue_size));
        if self.health.enabled {
            let server = HealthServer::new(&self.health, Arc::clone(&checker)).await?;
            let shutdown = SHUTDOWN_BROADCAST.subscribe();
            tokio::spawn(async move {
                if let Err(e) = server.serve(shutdown).await {
                    tracing::error!(error = %e, "Health server failed");
                }
            });
        }

        tokio::spawn(refresh_health(
            Arc::clone(&processor),
            checker,
            SHUTDOWN_BROADCAST.subscribe(),
        ));

        let ret = tokio::select! {
            r = processor.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!("Shutting down...");

        ret
    }
}
