//! Server-side chunk listener: fans chunk invalidations out to every
//! connected client whose view covers the location.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use gridstone_voxel::{ChunkListener, ChunkLocation, VoxelTypeRegistry, VoxelWorld};

use crate::connection::ClientConnection;

/// Shared map of live connections, keyed by connection id.
pub type ConnectionMap = Arc<RwLock<FxHashMap<u64, Arc<ClientConnection>>>>;

/// Pushes invalidated chunks to interested clients. Runs on whichever
/// thread released the dirtying handle, with no chunk locks held.
pub struct TransportListener {
    connections: ConnectionMap,
    registry: Arc<VoxelTypeRegistry>,
}

impl TransportListener {
    pub fn new(connections: ConnectionMap, registry: Arc<VoxelTypeRegistry>) -> Self {
        Self {
            connections,
            registry,
        }
    }
}

impl ChunkListener for TransportListener {
    fn chunk_invalidated(
        &self,
        world: &Arc<VoxelWorld>,
        location: ChunkLocation,
        _lights_pending: bool,
    ) {
        let connections: Vec<Arc<ClientConnection>> =
            self.connections.read().values().cloned().collect();
        for connection in connections {
            connection.push_chunk(world, &self.registry, location);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use gridstone_net::PositionUpdate;
    use gridstone_voxel::MissingChunkPolicy;
    use tokio::sync::mpsc;

    #[test]
    fn test_invalidation_reaches_in_view_clients_only() {
        let registry = Arc::new(VoxelTypeRegistry::new());
        let connections: ConnectionMap = Arc::new(RwLock::new(FxHashMap::default()));
        let listener = Arc::new(TransportListener::new(
            connections.clone(),
            registry.clone(),
        ));
        let world = VoxelWorld::new(None, Some(listener));

        let (near_tx, mut near_rx) = mpsc::unbounded_channel();
        let near = ClientConnection::new(1, near_tx);
        let (far_tx, mut far_rx) = mpsc::unbounded_channel();
        let far = ClientConnection::new(2, far_tx);
        connections.write().insert(1, near.clone());
        connections.write().insert(2, far.clone());

        let at = |p| PositionUpdate {
            position: p,
            yaw: 0.0,
            pitch: 0.0,
            view_radius: 3,
        };
        near.update_position(&world, &registry, at(Vec3::ZERO));
        far.update_position(&world, &registry, at(Vec3::new(1000.0, 0.0, 0.0)));

        // Dirty a chunk next to the near client.
        let mut chunk = world
            .mutable_chunk(ChunkLocation::new(1, 0, 0), MissingChunkPolicy::Create)
            .expect("created");
        chunk.mark_dirty();
        drop(chunk);

        assert!(near_rx.try_recv().is_ok(), "near client gets the push");
        assert!(far_rx.try_recv().is_err(), "far client does not");
    }
}
