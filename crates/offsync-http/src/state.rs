//! Shared axum state.

use std::sync::Arc;

use offsync_bus::BusProducer;
use offsync_connectivity::{ConnectivityMonitor, PeerLivenessSupervisor};
use offsync_resolver::{ContentRepository, Resolver};
use offsync_store::Store;
use offsync_types::Mode;

pub struct AppState<C: ContentRepository> {
    pub mode: Mode,
    pub store: Store,
    pub resolver: Arc<Resolver<C>>,
    pub producer: Option<Arc<dyn BusProducer>>,
    pub connectivity: Option<Arc<ConnectivityMonitor>>,
    pub peers: Option<Arc<PeerLivenessSupervisor>>,
}

impl<C: ContentRepository> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            producer: self.producer.clone(),
            connectivity: self.connectivity.clone(),
            peers: self.peers.clone(),
        }
    }
}
