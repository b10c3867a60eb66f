//! Registry of loaded data sources

use std::sync::Arc;
use std::time::Duration;

use cx_core::{CancelToken, DataSource, DatasetError, Fetcher, LoadContext, Result};
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DatasetDescription, LoaderConfig};
use crate::sources::create_source;

/// Owner of every data source of a dataset.
///
/// Each inserted source starts loading immediately on the current tokio
/// runtime. Views share sources through `Arc` handles but never write to
/// them. Dropping the registry cancels outstanding loads.
pub struct Registry {
    sources: IndexMap<String, Arc<dyn DataSource>>,
    fetcher: Arc<dyn Fetcher>,
    fetch_timeout: Option<Duration>,
    cancel: CancelToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new(fetcher: Arc<dyn Fetcher>, config: &LoaderConfig) -> Result<Self> {
        Ok(Self {
            sources: IndexMap::new(),
            fetcher,
            fetch_timeout: config.fetch_timeout()?,
            cancel: CancelToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Create and start loading every source of `description`.
    ///
    /// Names already present are skipped so shared sources load once.
    /// Returns the errors of sources that could not be created; the rest
    /// of the batch is unaffected.
    pub fn ingest(&mut self, description: &DatasetDescription) -> Vec<DatasetError> {
        let mut errors = Vec::new();

        for (name, descriptor) in &description.data {
            if self.sources.contains_key(name) {
                debug!("Source '{}' already registered, skipping", name);
                continue;
            }
            match create_source(descriptor, description.urls(descriptor.name())) {
                Ok(source) => {
                    self.insert(name.clone(), source);
                }
                Err(error) => {
                    warn!("Skipping source '{}': {}", name, error);
                    errors.push(error);
                }
            }
        }

        info!("Registry holds {} source(s)", self.sources.len());
        errors
    }

    /// Register `source` under `name` and start its load.
    /// Returns false if the name is taken.
    pub fn insert(&mut self, name: String, source: Arc<dyn DataSource>) -> bool {
        if self.sources.contains_key(&name) {
            return false;
        }

        let ctx = LoadContext::new(self.fetcher.clone())
            .with_cancel(self.cancel.clone())
            .with_timeout(self.fetch_timeout);
        let task_source = source.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(error) = task_source.load(ctx).await {
                debug!("Load task for '{}' ended: {}", task_source.name(), error);
            }
        }));

        self.sources.insert(name, source);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(name).cloned()
    }

    /// Look up a source, failing with a configuration error when absent
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DataSource>> {
        self.get(name)
            .ok_or_else(|| DatasetError::config(format!("unknown data source '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered names, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Ask every in-flight load to stop at its next suspension point
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Wait until every load task has finished
    pub async fn join_all(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(error) = task.await {
                warn!("Load task panicked: {}", error);
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
