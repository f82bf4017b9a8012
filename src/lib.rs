use std::sync::Arc;

// --- Module Structure ---

// Browser-side core.
pub mod classifier;
pub mod config;
pub mod gate;
pub mod locale;
pub mod models;
pub mod resource;
pub mod session;
pub mod storage;
pub mod transport;

// Development API standing in for the remote backend.
pub mod devserver;

// --- Public Re-exports ---

pub use classifier::{ClassifiedError, ErrorKind, classify};
pub use config::{AppConfig, Env};
pub use gate::{GateRoutes, NavigationGate, Navigator, RecordingNavigator, RenderContext, RenderDecision};
pub use locale::{LocaleResolver, LocaleSettings};
pub use models::{DocumentThread, Identity, Role, ServiceRequest, Ticket};
pub use resource::{
    Filters, ResourceError, ResourceHook, ResourceKind, ResourceSpec, ResourceState,
    cache::QueryCache,
};
pub use session::{Session, SessionPhase, SessionStore};
pub use storage::{CookieJar, FileStore, KeyValueStore, MemoryStore, StorageError, StoreState};
pub use transport::{HttpTransport, MockTransport, Transport, TransportError, TransportState};

/// PortalError
///
/// Failures while wiring a `Portal` from configuration.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),
}

/// Portal
///
/// Unified per-tab state: one session store, one locale resolver, one navigation gate
/// and one query cache, shared by every resource hook created from it. Cheap to clone.
#[derive(Clone)]
pub struct Portal {
    pub config: AppConfig,
    pub transport: TransportState,
    pub cookies: CookieJar,
    pub session: SessionStore,
    pub locale: Arc<LocaleResolver>,
    pub gate: Arc<NavigationGate>,
    pub cache: Arc<QueryCache>,
}

impl Portal {
    /// new
    ///
    /// Assembles the portal over explicit dependencies. Tests pass `MockTransport` and
    /// `MemoryStore` here.
    pub fn new(
        config: AppConfig,
        transport: TransportState,
        store: StoreState,
        cookies: CookieJar,
    ) -> Self {
        let session = SessionStore::new(transport.clone(), config.bootstrap_timeout);
        let locale = Arc::new(LocaleResolver::new(
            LocaleSettings::from_config(&config),
            cookies.clone(),
            store,
        ));
        let gate = Arc::new(NavigationGate::new(GateRoutes::default(), locale.clone()));

        Self {
            config,
            transport,
            cookies,
            session,
            locale,
            gate,
            cache: Arc::new(QueryCache::default()),
        }
    }

    /// connect
    ///
    /// Production wiring: HTTP transport and cookie jar scoped to the API origin, plus
    /// the file-backed preference store.
    pub fn connect(config: AppConfig) -> Result<Self, PortalError> {
        let cookies = CookieJar::new(&config.api_base_url)?;
        let transport = Arc::new(HttpTransport::new(&config, &cookies)?) as TransportState;
        let store = Arc::new(FileStore::new(config.storage_path.clone())) as StoreState;
        Ok(Self::new(config, transport, store, cookies))
    }

    /// start
    ///
    /// First navigation of the tab: synchronizes the locale for `path` and bootstraps
    /// the session concurrently.
    pub async fn start(&self, path: &str) -> (String, Session) {
        tokio::join!(self.locale.sync(path), self.session.bootstrap())
    }

    pub fn resource<T>(&self, spec: ResourceSpec) -> ResourceHook<T>
    where
        T: serde::de::DeserializeOwned + Clone + Send + Sync + 'static,
    {
        ResourceHook::new(
            spec,
            self.session.clone(),
            self.transport.clone(),
            self.cache.clone(),
        )
    }

    pub fn tickets(&self) -> ResourceHook<Ticket> {
        self.resource(ResourceSpec::tickets())
    }

    pub fn requests(&self) -> ResourceHook<ServiceRequest> {
        self.resource(ResourceSpec::requests())
    }

    pub fn document_threads(&self) -> ResourceHook<DocumentThread> {
        self.resource(ResourceSpec::document_threads())
    }
}
