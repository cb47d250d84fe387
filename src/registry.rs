//! Transformer registry
//!
//! One handle per backend kind, built on first use and reused for the rest of
//! the session. A failed construction is reported and not cached, so the next
//! request tries again with whatever credentials are configured then.

use crate::config::Config;
use crate::error::Result;
use crate::transform::claude::ClaudeTransformer;
use crate::transform::huggingface::HuggingFaceTransformer;
use crate::transform::{BackendKind, Operation, Transformer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Backend that serves every pinned operation.
pub const PINNED_BACKEND: BackendKind = BackendKind::HuggingFace;

/// Builds transformer handles. Swapped out in tests.
pub trait Connector: Send + Sync {
    fn connect(&self, backend: BackendKind) -> Result<Arc<dyn Transformer>>;
}

/// Connects to the real remote services using credentials from `Config`.
pub struct RemoteConnector {
    config: Config,
}

impl RemoteConnector {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl Connector for RemoteConnector {
    fn connect(&self, backend: BackendKind) -> Result<Arc<dyn Transformer>> {
        let key = self.config.credential(backend);
        debug!(%backend, has_key = key.is_some(), "building transformer");
        let endpoint = self.config.endpoint(backend);
        let handle: Arc<dyn Transformer> = match backend {
            BackendKind::Claude => Arc::new(ClaudeTransformer::new(key, endpoint)?),
            BackendKind::HuggingFace => Arc::new(HuggingFaceTransformer::new(key, endpoint)?),
        };
        Ok(handle)
    }
}

pub struct Registry {
    connector: Box<dyn Connector>,
    handles: HashMap<BackendKind, Arc<dyn Transformer>>,
}

impl Registry {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            handles: HashMap::new(),
        }
    }

    pub fn from_config(config: Config) -> Self {
        Self::new(Box::new(RemoteConnector::new(config)))
    }

    /// Cached handle for `backend`, building it on first use.
    pub fn resolve(&mut self, backend: BackendKind) -> Result<Arc<dyn Transformer>> {
        if let Some(handle) = self.handles.get(&backend) {
            return Ok(Arc::clone(handle));
        }
        let handle = self.connector.connect(backend)?;
        info!(%backend, "transformer ready");
        self.handles.insert(backend, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn is_cached(&self, backend: BackendKind) -> bool {
        self.handles.contains_key(&backend)
    }
}

/// Which backend runs `operation`. Refactors honor the user's choice,
/// everything else goes to the pinned backend.
pub fn backend_for(operation: Operation, selected: BackendKind) -> BackendKind {
    if operation.is_pinned() {
        PINNED_BACKEND
    } else {
        selected
    }
}
