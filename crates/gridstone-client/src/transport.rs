//! Client transport: ingests server messages into the local world and
//! coalesces outgoing position updates.
//!
//! The game loop calls [`ClientTransport::update_player_position`] as often
//! as it likes; the send loop flushes at most one `UPDATE_POSITION` per
//! tick, and only when something changed since the last flush.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};

use gridstone_net::{
    FrameError, PositionUpdate, ServerMessage, WireError, decode_server_message,
    encode_update_position, read_frame, write_frame,
};
use gridstone_voxel::{InChunkLocation, MissingChunkPolicy, VoxelTypeRegistry, VoxelWorld};

struct PendingPosition {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    view_radius: u8,
    valid: bool,
    /// True when the pending state differs from the last flushed one.
    changed: bool,
}

/// Client-side protocol state.
pub struct ClientTransport {
    pending: Mutex<PendingPosition>,
    forced_position: Mutex<Option<Vec3>>,
}

impl ClientTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(PendingPosition {
                position: Vec3::ZERO,
                yaw: 0.0,
                pitch: 0.0,
                view_radius: 0,
                valid: false,
                changed: false,
            }),
            forced_position: Mutex::new(None),
        })
    }

    /// Records the player's latest state. A no-op when nothing changed.
    pub fn update_player_position(&self, position: Vec3, yaw: f32, pitch: f32, view_radius: u8) {
        let mut pending = self.pending.lock();
        if pending.valid
            && pending.position == position
            && pending.yaw == yaw
            && pending.pitch == pitch
            && pending.view_radius == view_radius
        {
            return;
        }
        pending.position = position;
        pending.yaw = yaw;
        pending.pitch = pitch;
        pending.view_radius = view_radius;
        pending.valid = true;
        pending.changed = true;
    }

    /// Encodes one `UPDATE_POSITION` if the pending state changed since the
    /// last flush.
    pub fn flush(&self) -> Option<Vec<u8>> {
        let mut pending = self.pending.lock();
        if !pending.valid || !pending.changed {
            return None;
        }
        pending.changed = false;
        Some(encode_update_position(&PositionUpdate {
            position: pending.position,
            yaw: pending.yaw,
            pitch: pending.pitch,
            view_radius: pending.view_radius,
        }))
    }

    /// A server-forced position, if one arrived since the last call. The
    /// game loop applies it to the player entity.
    pub fn take_forced_position(&self) -> Option<Vec3> {
        self.forced_position.lock().take()
    }

    /// Dispatches one received server payload.
    pub fn handle_server_payload(
        &self,
        world: &Arc<VoxelWorld>,
        registry: &VoxelTypeRegistry,
        payload: &[u8],
    ) -> Result<(), WireError> {
        match decode_server_message(payload, registry)? {
            ServerMessage::SetPosition(position) => {
                tracing::info!(?position, "player position set from the server");
                *self.forced_position.lock() = Some(position);
                // Sync the pending state so the stale position is not
                // re-reported on the next tick.
                let mut pending = self.pending.lock();
                pending.position = position;
                pending.changed = false;
            }
            ServerMessage::SetChunk { location, cells } => {
                tracing::debug!(?location, "chunk received");
                // Create never yields an empty handle.
                if let Some(mut chunk) = world.mutable_chunk(location, MissingChunkPolicy::Create) {
                    for (index, cell) in cells.iter().enumerate() {
                        *chunk.at_mut(InChunkLocation::from_linear_index(index)) = cell.clone();
                    }
                    // Dirty on release reaches the mesh invalidator.
                    chunk.mark_dirty();
                }
            }
        }
        Ok(())
    }
}

/// Runs the client frame pumps over any byte stream until the server closes
/// or a protocol error occurs: reads and applies server frames, and flushes
/// one coalesced position update per `tick`.
pub async fn run_session<S>(
    transport: Arc<ClientTransport>,
    world: Arc<VoxelWorld>,
    registry: Arc<VoxelTypeRegistry>,
    stream: S,
    tick: Duration,
) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let sender = transport.clone();
    let writer_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        loop {
            ticker.tick().await;
            if let Some(payload) = sender.flush()
                && write_frame(&mut writer, &payload).await.is_err()
            {
                break;
            }
        }
    });

    let result = loop {
        match read_frame(&mut reader).await {
            Ok(payload) => {
                if let Err(err) = transport.handle_server_payload(&world, &registry, &payload) {
                    tracing::warn!(%err, "malformed server message, closing");
                    break Ok(());
                }
            }
            Err(FrameError::Closed) => {
                tracing::info!("server closed the connection");
                break Ok(());
            }
            Err(err) => break Err(err),
        }
    };
    writer_task.abort();
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
