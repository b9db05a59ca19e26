//! Per-client connection state: last accepted position, movement-speed
//! validation, view radius, and the set of chunks already delivered.

use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use gridstone_net::{PositionUpdate, encode_set_chunk, encode_set_position};
use gridstone_voxel::{
    CHUNK_SIZE, ChunkLocation, MissingChunkPolicy, VoxelTypeRegistry, VoxelWorld,
};

/// Largest per-axis movement accepted in a single position update.
pub const MAX_POSITION_DELTA: f32 = 0.2;

/// View radii below this are clamped up.
pub const MIN_VIEW_RADIUS: u8 = 3;

struct PositionState {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    view_radius: u8,
    /// False until the first update; the first position is always accepted.
    valid: bool,
}

/// One connected client.
pub struct ClientConnection {
    id: u64,
    state: Mutex<PositionState>,
    sent_chunks: Mutex<FxHashSet<ChunkLocation>>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

impl ClientConnection {
    pub fn new(id: u64, outgoing: mpsc::UnboundedSender<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(PositionState {
                position: Vec3::ZERO,
                yaw: 0.0,
                pitch: 0.0,
                view_radius: MIN_VIEW_RADIUS,
                valid: false,
            }),
            sent_chunks: Mutex::new(FxHashSet::default()),
            outgoing,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The last accepted position, if any update arrived yet.
    pub fn last_position(&self) -> Option<Vec3> {
        let state = self.state.lock();
        state.valid.then_some(state.position)
    }

    /// Applies a client position report.
    ///
    /// A per-axis jump of [`MAX_POSITION_DELTA`] or more keeps the old
    /// position and forces the client back with `SET_POSITION`. Either way
    /// the view sweep runs, delivering any not-yet-sent chunks in range and
    /// queueing generation for missing ones.
    pub fn update_position(
        &self,
        world: &Arc<VoxelWorld>,
        registry: &VoxelTypeRegistry,
        update: PositionUpdate,
    ) {
        tracing::trace!(
            client = self.id,
            position = ?update.position,
            yaw = update.yaw,
            pitch = update.pitch,
            view_radius = update.view_radius,
            "position update"
        );

        let mut state = self.state.lock();
        let mut reset = false;
        if state.valid {
            let delta = update.position - state.position;
            if delta.x.abs() >= MAX_POSITION_DELTA
                || delta.y.abs() >= MAX_POSITION_DELTA
                || delta.z.abs() >= MAX_POSITION_DELTA
            {
                tracing::warn!(client = self.id, "player is moving too fast");
                reset = true;
            }
        }
        if !reset {
            state.position = update.position;
        }
        state.yaw = update.yaw;
        state.pitch = update.pitch;
        state.view_radius = update.view_radius.max(MIN_VIEW_RADIUS);
        state.valid = true;
        let position = state.position;
        let view_radius = state.view_radius;
        drop(state);

        if reset {
            self.send(encode_set_position(position));
        }
        self.send_unloaded_chunks(world, registry, position, view_radius);
    }

    /// Sweeps the view volume in growing shells, sending chunks this client
    /// has not received. Missing chunks are queued for generation; their
    /// arrival reaches the client through the invalidation push.
    fn send_unloaded_chunks(
        &self,
        world: &Arc<VoxelWorld>,
        registry: &VoxelTypeRegistry,
        position: Vec3,
        view_radius: u8,
    ) {
        let center = chunk_center(position);
        let mut sent = self.sent_chunks.lock();
        for r in 0..view_radius as i32 {
            for dz in -r..=r {
                for dy in -r..=r {
                    for dx in -r..=r {
                        let location = center.offset(dx, dy, dz);
                        if sent.contains(&location) {
                            continue;
                        }
                        if let Some(chunk) =
                            world.chunk(location, MissingChunkPolicy::LoadAsync)
                        {
                            tracing::debug!(client = self.id, ?location, "sending chunk");
                            sent.insert(location);
                            let payload = encode_set_chunk(&chunk, registry);
                            drop(chunk);
                            self.send(payload);
                        }
                    }
                }
            }
        }
    }

    /// Pushes one chunk if it lies in this client's view. Used on chunk
    /// invalidation, so an already-sent chunk is re-sent with its new
    /// contents.
    pub fn push_chunk(
        &self,
        world: &Arc<VoxelWorld>,
        registry: &VoxelTypeRegistry,
        location: ChunkLocation,
    ) {
        if !self.view_contains(location) {
            return;
        }
        let Some(chunk) = world.chunk(location, MissingChunkPolicy::None) else {
            return;
        };
        let payload = encode_set_chunk(&chunk, registry);
        drop(chunk);
        tracing::debug!(client = self.id, ?location, "pushing invalidated chunk");
        self.sent_chunks.lock().insert(location);
        self.send(payload);
    }

    /// Whether a chunk location falls inside the client's current view.
    pub fn view_contains(&self, location: ChunkLocation) -> bool {
        let state = self.state.lock();
        if !state.valid {
            return false;
        }
        let center = chunk_center(state.position);
        let radius = state.view_radius as i32;
        (location.x - center.x).abs() < radius
            && (location.y - center.y).abs() < radius
            && (location.z - center.z).abs() < radius
    }

    fn send(&self, payload: Vec<u8>) {
        if self.outgoing.send(payload).is_err() {
            tracing::trace!(client = self.id, "dropping message for closed connection");
        }
    }
}

/// The chunk whose center is nearest to a world-space position.
fn chunk_center(position: Vec3) -> ChunkLocation {
    ChunkLocation::new(
        (position.x / CHUNK_SIZE as f32).round() as i32,
        (position.y / CHUNK_SIZE as f32).round() as i32,
        (position.z / CHUNK_SIZE as f32).round() as i32,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
