//! Host runtime for cache workers
//!
//! `WorkerHost` plays the part of the browser: it installs newly registered
//! workers, keeps them waiting while an older worker still controls clients,
//! promotes them on skip-waiting, and routes fetches to the active worker.
//!
//! `HostHandle` runs a host on its own task and feeds it one event at a
//! time over a channel. Each event's handler is awaited to completion before
//! the next one is taken, and the caller gets the outcome back on a oneshot.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStorage;
use crate::config::{ConfigError, WorkerConfig};
use crate::http::Request;
use crate::network::Network;
use crate::worker::{
    ActivateReport, CacheWorker, EventOutcome, FetchOutcome, InstallReport, LifecycleEvent,
    MessageReply, WorkerState,
};

/// Capacity of the host event queue
const EVENT_QUEUE_SIZE: usize = 32;

/// Errors surfaced by a host handle
#[derive(Debug, Error)]
pub enum HostError {
    /// The host task has stopped
    #[error("Worker host is no longer running")]
    Closed,

    /// The worker configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of registering a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterReport {
    /// Install summary
    pub install: InstallReport,
    /// Activation summary, if the worker was promoted right away
    pub activation: Option<ActivateReport>,
}

/// Point-in-time view of the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    /// Bucket name and state of the active worker
    pub active: Option<(String, WorkerState)>,
    /// Bucket name of the waiting worker
    pub waiting: Option<String>,
    /// Number of open clients
    pub clients: usize,
}

/// Registration state for a single worker scope
pub struct WorkerHost<S, N> {
    storage: Arc<S>,
    network: Arc<N>,
    active: Option<CacheWorker<S, N>>,
    waiting: Option<CacheWorker<S, N>>,
    clients: usize,
}

impl<S: CacheStorage, N: Network> WorkerHost<S, N> {
    /// Creates a host with no registered worker
    pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
        Self {
            storage,
            network,
            active: None,
            waiting: None,
            clients: 0,
        }
    }

    /// Installs a worker for `config` and promotes it if nothing holds it back
    pub async fn register(&mut self, config: WorkerConfig) -> Result<RegisterReport, ConfigError> {
        let mut worker = CacheWorker::new(config, self.storage.clone(), self.network.clone())?;
        let install = worker.install().await;

        if let Some(mut previous) = self.waiting.replace(worker) {
            debug!(bucket = %previous.cache_name(), "Discarding superseded waiting worker");
            previous.mark_redundant();
        }

        let activation = self.try_promote().await;
        Ok(RegisterReport {
            install,
            activation,
        })
    }

    /// Restores a worker installed in an earlier session as the active one
    ///
    /// If the worker's bucket does not exist yet this falls back to a full
    /// registration.
    pub async fn resume(&mut self, config: WorkerConfig) -> Result<Option<RegisterReport>, ConfigError> {
        let mut worker = CacheWorker::new(config, self.storage.clone(), self.network.clone())?;
        let installed = match self.storage.bucket_names().await {
            Ok(names) => names.iter().any(|name| name == worker.cache_name()),
            Err(e) => {
                debug!(error = %e, "Failed to list buckets while resuming");
                false
            }
        };

        if !installed {
            let config = worker.config().clone();
            return self.register(config).await.map(Some);
        }

        info!(bucket = %worker.cache_name(), "Resuming installed worker");
        worker.mark_active();
        if let Some(mut previous) = self.active.replace(worker) {
            previous.mark_redundant();
        }
        Ok(None)
    }

    /// Promotes the waiting worker when allowed
    ///
    /// A waiting worker activates when there is no active worker, when no
    /// clients are open, or when it asked to skip waiting.
    async fn try_promote(&mut self) -> Option<ActivateReport> {
        let waiting = self.waiting.as_ref()?;
        let blocked =
            self.active.is_some() && self.clients > 0 && !waiting.skip_waiting_requested();
        if blocked {
            debug!(bucket = %waiting.cache_name(), clients = self.clients, "Worker waiting");
            return None;
        }

        let mut worker = self.waiting.take()?;
        let report = worker.activate().await;
        if let Some(mut previous) = self.active.replace(worker) {
            previous.mark_redundant();
        }
        Some(report)
    }

    /// Routes a request to the active worker
    ///
    /// Without an active worker nothing is intercepted.
    pub async fn fetch(&self, request: &Request) -> FetchOutcome {
        match &self.active {
            Some(worker) => worker.fetch(request).await,
            None => FetchOutcome::Passthrough,
        }
    }

    /// Posts a page message to the waiting worker, or the active one if none waits
    ///
    /// Returns `None` when no worker is registered.
    pub async fn post_message(&mut self, payload: serde_json::Value) -> Option<MessageReply> {
        let event = LifecycleEvent::Message(payload);
        let outcome = match (&mut self.waiting, &mut self.active) {
            (Some(worker), _) | (None, Some(worker)) => worker.handle(event).await,
            (None, None) => return None,
        };

        self.try_promote().await;
        match outcome {
            EventOutcome::Replied(reply) => Some(reply),
            _ => None,
        }
    }

    /// Records a newly opened client page
    pub fn open_client(&mut self) -> usize {
        self.clients += 1;
        self.clients
    }

    /// Records a closed client page; the last close lets a waiting worker activate
    pub async fn close_client(&mut self) -> Option<ActivateReport> {
        self.clients = self.clients.saturating_sub(1);
        if self.clients == 0 {
            self.try_promote().await
        } else {
            None
        }
    }

    /// Current registration state
    pub fn snapshot(&self) -> HostSnapshot {
        HostSnapshot {
            active: self
                .active
                .as_ref()
                .map(|w| (w.cache_name().to_string(), w.state())),
            waiting: self.waiting.as_ref().map(|w| w.cache_name().to_string()),
            clients: self.clients,
        }
    }
}

/// Events accepted by the host task, each with its reply channel
enum HostEvent {
    Register {
        config: WorkerConfig,
        reply: oneshot::Sender<Result<RegisterReport, ConfigError>>,
    },
    Resume {
        config: WorkerConfig,
        reply: oneshot::Sender<Result<Option<RegisterReport>, ConfigError>>,
    },
    Fetch {
        request: Request,
        reply: oneshot::Sender<FetchOutcome>,
    },
    Message {
        payload: serde_json::Value,
        reply: oneshot::Sender<Option<MessageReply>>,
    },
    ClientOpened {
        reply: oneshot::Sender<usize>,
    },
    ClientClosed {
        reply: oneshot::Sender<Option<ActivateReport>>,
    },
    Snapshot {
        reply: oneshot::Sender<HostSnapshot>,
    },
}

/// Handle to a host running on a background task
pub struct HostHandle {
    sender: mpsc::Sender<HostEvent>,
    task: JoinHandle<()>,
}

impl HostHandle {
    /// Moves the host onto a tokio task and returns a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, N>(mut host: WorkerHost<S, N>) -> Self
    where
        S: CacheStorage + 'static,
        N: Network + 'static,
    {
        let (sender, mut receiver) = mpsc::channel(EVENT_QUEUE_SIZE);

        let task = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                // A dropped reply receiver just means the caller stopped waiting
                match event {
                    HostEvent::Register { config, reply } => {
                        let _ = reply.send(host.register(config).await);
                    }
                    HostEvent::Resume { config, reply } => {
                        let _ = reply.send(host.resume(config).await);
                    }
                    HostEvent::Fetch { request, reply } => {
                        let _ = reply.send(host.fetch(&request).await);
                    }
                    HostEvent::Message { payload, reply } => {
                        let _ = reply.send(host.post_message(payload).await);
                    }
                    HostEvent::ClientOpened { reply } => {
                        let _ = reply.send(host.open_client());
                    }
                    HostEvent::ClientClosed { reply } => {
                        let _ = reply.send(host.close_client().await);
                    }
                    HostEvent::Snapshot { reply } => {
                        let _ = reply.send(host.snapshot());
                    }
                }
            }
            debug!("Worker host stopped");
        });

        Self { sender, task }
    }

    /// Sends an event and waits for its outcome
    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> HostEvent,
    ) -> Result<T, HostError> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(event(reply))
            .await
            .map_err(|_| HostError::Closed)?;
        outcome.await.map_err(|_| HostError::Closed)
    }

    /// Registers and installs a worker
    pub async fn register(&self, config: WorkerConfig) -> Result<RegisterReport, HostError> {
        Ok(self
            .request(|reply| HostEvent::Register { config, reply })
            .await??)
    }

    /// Resumes a previously installed worker
    pub async fn resume(&self, config: WorkerConfig) -> Result<Option<RegisterReport>, HostError> {
        Ok(self
            .request(|reply| HostEvent::Resume { config, reply })
            .await??)
    }

    /// Routes a request through the active worker
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome, HostError> {
        self.request(|reply| HostEvent::Fetch { request, reply }).await
    }

    /// Posts a page message
    pub async fn post_message(
        &self,
        payload: serde_json::Value,
    ) -> Result<Option<MessageReply>, HostError> {
        self.request(|reply| HostEvent::Message { payload, reply })
            .await
    }

    /// Records a newly opened client page
    pub async fn open_client(&self) -> Result<usize, HostError> {
        self.request(|reply| HostEvent::ClientOpened { reply }).await
    }

    /// Records a closed client page
    pub async fn close_client(&self) -> Result<Option<ActivateReport>, HostError> {
        self.request(|reply| HostEvent::ClientClosed { reply }).await
    }

    /// Current registration state
    pub async fn snapshot(&self) -> Result<HostSnapshot, HostError> {
        self.request(|reply| HostEvent::Snapshot { reply }).await
    }

    /// Stops accepting events and waits for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.task.await {
            debug!(error = %e, "Worker host task ended abnormally");
        }
    }
}
