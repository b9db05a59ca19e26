//! Server engine: owns the registry, world, generator, light computer, and
//! the live connection map, and wires the listener chain between them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use gridstone_lighting::LightComputer;
use gridstone_net::{ClientMessage, WireError, decode_client_message};
use gridstone_voxel::{
    ChunkListener, ChunkLoader, CompositeListener, VoxelTypeRegistry, VoxelWorld,
};
use gridstone_worldgen::WorldGenerator;

use crate::connection::ClientConnection;
use crate::listener::{ConnectionMap, TransportListener};

/// The authoritative server state.
///
/// Dirty transitions fan out to the light computer (recompute on
/// lights-pending) and the transport listener (push to clients in view).
pub struct ServerEngine {
    registry: Arc<VoxelTypeRegistry>,
    world: Arc<VoxelWorld>,
    generator: Arc<WorldGenerator>,
    light: Arc<LightComputer>,
    connections: ConnectionMap,
    next_connection_id: AtomicU64,
}

impl ServerEngine {
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(VoxelTypeRegistry::new());
        let generator = WorldGenerator::new(&registry);
        let light = LightComputer::new();
        let connections: ConnectionMap = Arc::new(RwLock::new(FxHashMap::default()));

        let listeners: Vec<Arc<dyn ChunkListener>> = vec![
            light.clone(),
            Arc::new(TransportListener::new(
                connections.clone(),
                registry.clone(),
            )),
        ];
        let loader: Arc<dyn ChunkLoader> = generator.clone();
        let world = VoxelWorld::new(
            Some(loader),
            Some(Arc::new(CompositeListener::new(listeners))),
        );

        Arc::new(Self {
            registry,
            world,
            generator,
            light,
            connections,
            next_connection_id: AtomicU64::new(1),
        })
    }

    pub fn world(&self) -> &Arc<VoxelWorld> {
        &self.world
    }

    pub fn registry(&self) -> &Arc<VoxelTypeRegistry> {
        &self.registry
    }

    /// Registers a new client whose outgoing frames go to `outgoing`.
    pub fn add_connection(&self, outgoing: mpsc::UnboundedSender<Vec<u8>>) -> Arc<ClientConnection> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection::new(id, outgoing);
        self.connections.write().insert(id, connection.clone());
        tracing::info!(client = id, "client registered");
        connection
    }

    pub fn remove_connection(&self, id: u64) {
        if self.connections.write().remove(&id).is_some() {
            tracing::info!(client = id, "client removed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Dispatches one decoded client frame. A decode error means the peer
    /// is protocol-broken; the caller closes the connection.
    pub fn handle_payload(
        &self,
        connection: &Arc<ClientConnection>,
        payload: &[u8],
    ) -> Result<(), WireError> {
        match decode_client_message(payload)? {
            ClientMessage::UpdatePosition(update) => {
                connection.update_position(&self.world, &self.registry, update);
                Ok(())
            }
        }
    }

    /// Stops the background workers. Called once at server shutdown.
    pub fn shutdown(&self) {
        self.generator.shutdown();
        self.light.shutdown();
    }
}
