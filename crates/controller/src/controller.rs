//! Trigger delivery: watch streams feeding the reconciler
//!
//! Each trigger mode turns a kube-runtime watch into a stream of
//! [`TriggeringEvent`]s. Deliveries run with bounded concurrency and stop
//! taking new triggers once shutdown is signalled.

use disruption_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    trigger::{blocked_event_field_selector, ExpiryTracker, NodeClaim},
    Reconciler, TriggeringEvent,
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use k8s_openapi::api::core::v1::Event;
use kube::{
    runtime::{watcher, WatchStreamExt},
    Api, Client,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::TriggerMode;

/// How triggers are handed to the reconciler
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub concurrency: usize,
    pub lookup_retry_attempts: u32,
    pub lookup_retry_backoff: Duration,
}

/// Resolves once shutdown is signalled or the sender is gone
pub async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Watch stream for the configured trigger mode
pub fn trigger_stream(
    client: Client,
    mode: TriggerMode,
    health: HealthRegistry,
) -> BoxStream<'static, TriggeringEvent> {
    match mode {
        TriggerMode::Expiry => {
            let api: Api<NodeClaim> = Api::all(client);
            let mut tracker = ExpiryTracker::new();
            watch_events(watcher(api, watcher::Config::default()), health)
                .flat_map(move |event| stream::iter(tracker.observe(event)))
                .boxed()
        }
        TriggerMode::Blocked => {
            let api: Api<Event> = Api::all(client);
            let config = watcher::Config::default().fields(&blocked_event_field_selector());
            watch_events(watcher(api, config), health)
                .flat_map(|event| stream::iter(blocked_triggers(event)))
                .boxed()
        }
    }
}

/// Apply backoff to a raw watch, logging errors and tracking watcher health
fn watch_events<K, S>(
    events: S,
    health: HealthRegistry,
) -> impl Stream<Item = watcher::Event<K>> + Send
where
    K: Send + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    events.default_backoff().filter_map(move |event| {
        let health = health.clone();
        async move {
            match event {
                Ok(event) => {
                    health.set_healthy(components::WATCHER).await;
                    Some(event)
                }
                Err(e) => {
                    warn!(error = %e, "Watch stream error, backing off");
                    health
                        .set_degraded(components::WATCHER, e.to_string())
                        .await;
                    None
                }
            }
        }
    })
}

/// Every DisruptionBlocked event delivered by the watch is a trigger
pub fn blocked_triggers(event: watcher::Event<Event>) -> Vec<TriggeringEvent> {
    match event {
        watcher::Event::Applied(event) => TriggeringEvent::from_event(&event).into_iter().collect(),
        watcher::Event::Restarted(events) => {
            events.iter().filter_map(TriggeringEvent::from_event).collect()
        }
        watcher::Event::Deleted(_) => Vec::new(),
    }
}

/// Hands triggers to the reconciler and retries failed lookups
#[derive(Clone)]
pub struct Controller {
    reconciler: Arc<Reconciler>,
    settings: DeliverySettings,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl Controller {
    pub fn new(
        reconciler: Arc<Reconciler>,
        settings: DeliverySettings,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            reconciler,
            settings,
            health,
            logger,
        }
    }

    /// Deliver triggers until the stream ends or shutdown is signalled
    pub async fn run<S>(&self, triggers: S, shutdown: watch::Receiver<bool>)
    where
        S: Stream<Item = TriggeringEvent>,
    {
        triggers
            .take_until(shutdown_requested(shutdown.clone()))
            .for_each_concurrent(self.settings.concurrency, |trigger| {
                let shutdown = shutdown.clone();
                async move { self.deliver(trigger, &shutdown).await }
            })
            .await;
    }

    /// Reconcile one trigger, retrying while the failure is retryable
    pub async fn deliver(&self, trigger: TriggeringEvent, shutdown: &watch::Receiver<bool>) {
        let mut attempt = 1;
        loop {
            match self.reconciler.reconcile(&trigger, shutdown).await {
                Ok(report) => {
                    if report.failed() > 0 {
                        self.health
                            .set_degraded(
                                components::RECONCILER,
                                format!("{} patches failed on node {}", report.failed(), report.node),
                            )
                            .await;
                    } else {
                        self.health.set_healthy(components::RECONCILER).await;
                    }
                    return;
                }
                Err(e) => {
                    let will_retry = e.is_retryable()
                        && attempt < self.settings.lookup_retry_attempts
                        && !*shutdown.borrow();
                    self.logger
                        .log_reconcile_failed(&trigger.to_string(), &e.to_string(), will_retry);

                    if !will_retry {
                        if e.is_retryable() {
                            self.health
                                .set_degraded(components::RECONCILER, e.to_string())
                                .await;
                        }
                        return;
                    }

                    attempt += 1;
                    debug!(trigger = %trigger, attempt, "Retrying reconciliation");
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.lookup_retry_backoff) => {}
                        _ = shutdown_requested(shutdown.clone()) => return,
                    }
                }
            }
        }
    }
}
