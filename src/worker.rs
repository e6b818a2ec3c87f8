//! Cache worker lifecycle
//!
//! A `CacheWorker` owns one versioned bucket and reacts to the four lifecycle
//! events a host delivers: install, activate, fetch and message. Handlers
//! never fail; every storage or network error is logged and contained. The
//! host must await each handler before treating its event as handled, which
//! is what guarantees that cache writes finish before the worker goes away.

use std::sync::Arc;

use futures::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheStorage};
use crate::config::{ConfigError, WorkerConfig};
use crate::http::{Request, Response};
use crate::network::{FetchError, Network};
use crate::policy;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, install not started
    Parsed,
    /// Install handler running
    Installing,
    /// Installed, waiting for the previous worker to release its clients
    Waiting,
    /// Activate handler running
    Activating,
    /// Controlling clients and serving fetches
    Active,
    /// Replaced by a newer worker
    Redundant,
}

/// Events delivered by the host
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(Request),
    /// Raw JSON payload posted by a page
    Message(serde_json::Value),
}

/// Control messages understood by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Leave the waiting state immediately
    SkipWaiting,
    /// Report the current bucket name
    GetVersion,
}

/// What the worker answered to a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageReply {
    /// Skip-waiting was requested
    SkipWaiting,
    /// Current bucket name
    Version(String),
    /// Message was not understood
    Ignored,
}

/// Where a fetch response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Synthesized because the network was unreachable
    Fallback,
}

/// Result of a fetch event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host handles the request itself
    Passthrough,
    /// Intercepted and answered
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

impl FetchOutcome {
    /// The response, if the request was intercepted
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond { response, .. } => Some(response),
        }
    }

    /// The response source, if the request was intercepted
    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Passthrough => None,
            FetchOutcome::Respond { source, .. } => Some(*source),
        }
    }
}

/// Summary of an install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Bucket that was populated
    pub bucket: String,
    /// Manifest URLs stored successfully
    pub cached: Vec<String>,
    /// Manifest URLs that could not be stored, with the reason
    pub failed: Vec<(String, String)>,
    /// Whether the worker asked to skip waiting
    pub skip_waiting: bool,
}

/// Summary of an activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    /// Bucket kept as current
    pub bucket: String,
    /// Stale buckets removed
    pub deleted: Vec<String>,
    /// Stale buckets that could not be removed
    pub failed: Vec<String>,
}

/// Outcome of dispatching a lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    Replied(MessageReply),
}

/// Why a single manifest asset could not be pre-cached
#[derive(Debug, Error)]
enum AddError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("bad status {0}")]
    Status(u16),

    #[error("{0}")]
    Store(#[from] CacheError),
}

/// A worker bound to one configuration, storage and network
pub struct CacheWorker<S, N> {
    config: WorkerConfig,
    cache_name: String,
    origin: Url,
    assets: Vec<Url>,
    prefixes: Vec<String>,
    storage: Arc<S>,
    network: Arc<N>,
    state: WorkerState,
    skip_waiting: bool,
}

impl<S: CacheStorage, N: Network> CacheWorker<S, N> {
    /// Creates a worker, resolving the manifest and policy once
    pub fn new(config: WorkerConfig, storage: Arc<S>, network: Arc<N>) -> Result<Self, ConfigError> {
        config.validate()?;
        let origin = config.origin_url()?;
        let assets = config.asset_urls()?;
        let prefixes = config.resolved_prefixes();
        Ok(Self {
            cache_name: config.cache_name(),
            config,
            origin,
            assets,
            prefixes,
            storage,
            network,
            state: WorkerState::Parsed,
            skip_waiting: false,
        })
    }

    /// Configuration the worker was built from
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Name of the bucket this worker owns
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Whether the worker asked to leave the waiting state early
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Marks a worker restored from a previous session as active
    pub(crate) fn mark_active(&mut self) {
        self.state = WorkerState::Active;
    }

    /// Marks the worker as replaced
    pub(crate) fn mark_redundant(&mut self) {
        self.state = WorkerState::Redundant;
    }

    /// Dispatches an event to its handler and awaits it
    pub async fn handle(&mut self, event: LifecycleEvent) -> EventOutcome {
        match event {
            LifecycleEvent::Install => EventOutcome::Installed(self.install().await),
            LifecycleEvent::Activate => EventOutcome::Activated(self.activate().await),
            LifecycleEvent::Fetch(request) => EventOutcome::Fetched(self.fetch(&request).await),
            LifecycleEvent::Message(payload) => EventOutcome::Replied(self.message(payload)),
        }
    }

    /// Pre-caches the asset manifest
    ///
    /// Every asset is fetched concurrently and independently; a failure is
    /// logged and recorded in the report but never aborts the install.
    pub async fn install(&mut self) -> InstallReport {
        self.state = WorkerState::Installing;
        info!(bucket = %self.cache_name, assets = self.assets.len(), "Installing");

        if let Err(e) = self.storage.open(&self.cache_name).await {
            warn!(bucket = %self.cache_name, error = %e, "Failed to open cache bucket");
        }

        let this = &*self;
        let attempts: Vec<_> = this
            .assets
            .iter()
            .map(|url| async move {
                let result = this.add(url).await;
                (url, result)
            })
            .collect();

        let mut cached = Vec::new();
        let mut failed = Vec::new();
        for (url, result) in join_all(attempts).await {
            match result {
                Ok(()) => cached.push(url.to_string()),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to pre-cache asset");
                    failed.push((url.to_string(), e.to_string()));
                }
            }
        }

        if self.config.skip_waiting_on_install {
            self.skip_waiting = true;
        }
        self.state = WorkerState::Waiting;
        info!(
            bucket = %self.cache_name,
            cached = cached.len(),
            failed = failed.len(),
            "Install finished"
        );

        InstallReport {
            bucket: self.cache_name.clone(),
            cached,
            failed,
            skip_waiting: self.skip_waiting,
        }
    }

    /// Fetches one manifest URL and stores it
    async fn add(&self, url: &Url) -> Result<(), AddError> {
        let request = Request::get(url.clone());
        let response = self.network.fetch(&request).await?;
        if !policy::is_precacheable(&response) {
            return Err(AddError::Status(response.status));
        }
        self.storage
            .put(&self.cache_name, &request.cache_key(), &response)
            .await?;
        Ok(())
    }

    /// Deletes every bucket other than the current one, then takes control
    pub async fn activate(&mut self) -> ActivateReport {
        self.state = WorkerState::Activating;

        let names = match self.storage.bucket_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list cache buckets");
                Vec::new()
            }
        };

        let storage = &self.storage;
        let current = &self.cache_name;
        let deletions = names
            .into_iter()
            .filter(|name| name != current)
            .map(|name| async move {
                let result = storage.delete_bucket(&name).await;
                (name, result)
            })
            .collect::<Vec<_>>();

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => {
                    debug!(bucket = %name, "Deleted stale cache bucket");
                    deleted.push(name);
                }
                Err(e) => {
                    warn!(bucket = %name, error = %e, "Failed to delete stale cache bucket");
                    failed.push(name);
                }
            }
        }

        self.state = WorkerState::Active;
        info!(bucket = %self.cache_name, deleted = deleted.len(), "Activated and claimed clients");

        ActivateReport {
            bucket: self.cache_name.clone(),
            deleted,
            failed,
        }
    }

    /// Cache-first handling of an intercepted request
    ///
    /// Always resolves: a request the network cannot answer gets the 408
    /// fallback.
    pub async fn fetch(&self, request: &Request) -> FetchOutcome {
        if !policy::should_intercept(request, &self.origin, &self.prefixes) {
            return FetchOutcome::Passthrough;
        }

        let key = request.cache_key();
        match self.storage.lookup(&self.cache_name, &key).await {
            Ok(Some(response)) => {
                debug!(url = %request.url, "Cache hit");
                return FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Cache,
                };
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if policy::is_cacheable_response(&response) {
                    if let Err(e) = self.storage.put(&self.cache_name, &key, &response).await {
                        warn!(url = %request.url, error = %e, "Failed to store response");
                    }
                }
                FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                }
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network request failed, serving fallback");
                FetchOutcome::Respond {
                    response: policy::offline_response(),
                    source: ResponseSource::Fallback,
                }
            }
        }
    }

    /// Handles a page message
    pub fn message(&mut self, payload: serde_json::Value) -> MessageReply {
        match serde_json::from_value::<ControlMessage>(payload) {
            Ok(ControlMessage::SkipWaiting) => {
                debug!(bucket = %self.cache_name, "Skip waiting requested");
                self.skip_waiting = true;
                MessageReply::SkipWaiting
            }
            Ok(ControlMessage::GetVersion) => MessageReply::Version(self.cache_name.clone()),
            Err(e) => {
                debug!(error = %e, "Ignoring unknown message");
                MessageReply::Ignored
            }
        }
    }
}
