//! Tagged wire messages.
//!
//! Every message starts with a `u16` tag. Client→server and server→client
//! tags are independent spaces:
//!
//! * client→server: `0 UPDATE_POSITION`
//! * server→client: `0 SET_POSITION`, `1 SET_CHUNK`
//!
//! `SET_CHUNK` carries the chunk location, the session type table (a
//! length-prefixed list of type names fixing the `u16 ↔ name` mapping), and
//! all 16³ voxels in `z,y,x` order as `u16 type_id; u8 light;` followed by
//! the type's payload bytes. Unknown type names resolve to placeholder
//! behaviors on the receiving side; a type id outside the table is a
//! protocol violation.

use glam::Vec3;

use gridstone_voxel::{
    CHUNK_VOLUME, ChunkLocation, ChunkRef, InChunkLocation, MAX_LIGHT_LEVEL, TypeTable,
    VoxelHolder, VoxelTypeRegistry,
};

use crate::wire::{WireError, WireReader, WireWriter};

/// Client→server tag: position + view radius report.
pub const CLIENT_TAG_UPDATE_POSITION: u16 = 0;

/// Server→client tag: forced position reset.
pub const SERVER_TAG_SET_POSITION: u16 = 0;

/// Server→client tag: full chunk payload.
pub const SERVER_TAG_SET_CHUNK: u16 = 1;

/// Longest permitted type-table name.
pub const MAX_TYPE_NAME_LEN: usize = 127;

/// Client position report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionUpdate {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub view_radius: u8,
}

/// Decoded client→server message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientMessage {
    UpdatePosition(PositionUpdate),
}

/// Decoded server→client message.
#[derive(Debug)]
pub enum ServerMessage {
    SetPosition(Vec3),
    SetChunk {
        location: ChunkLocation,
        /// All `CHUNK_VOLUME` cells in `z,y,x` order.
        cells: Vec<VoxelHolder>,
    },
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

pub fn encode_update_position(update: &PositionUpdate) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(2 + 5 * 4 + 1);
    w.put_u16(CLIENT_TAG_UPDATE_POSITION);
    w.put_f32(update.position.x);
    w.put_f32(update.position.y);
    w.put_f32(update.position.z);
    w.put_f32(update.yaw);
    w.put_f32(update.pitch);
    w.put_u8(update.view_radius);
    w.into_inner()
}

pub fn decode_client_message(payload: &[u8]) -> Result<ClientMessage, WireError> {
    let mut r = WireReader::new(payload);
    match r.read_u16()? {
        CLIENT_TAG_UPDATE_POSITION => {
            let position = Vec3::new(r.read_f32()?, r.read_f32()?, r.read_f32()?);
            let yaw = r.read_f32()?;
            let pitch = r.read_f32()?;
            let view_radius = r.read_u8()?;
            Ok(ClientMessage::UpdatePosition(PositionUpdate {
                position,
                yaw,
                pitch,
                view_radius,
            }))
        }
        tag => Err(WireError::UnknownTag(tag)),
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

pub fn encode_set_position(position: Vec3) -> Vec<u8> {
    let mut w = WireWriter::with_capacity(2 + 3 * 4);
    w.put_u16(SERVER_TAG_SET_POSITION);
    w.put_f32(position.x);
    w.put_f32(position.y);
    w.put_f32(position.z);
    w.into_inner()
}

/// Serializes a locked chunk with a fresh type table from the sender's
/// registry.
pub fn encode_set_chunk(chunk: &ChunkRef, registry: &VoxelTypeRegistry) -> Vec<u8> {
    let table = TypeTable::from_registry(registry);
    let location = chunk.location();

    let mut w = WireWriter::with_capacity(2 + 3 * 4 + CHUNK_VOLUME * 3);
    w.put_u16(SERVER_TAG_SET_CHUNK);
    w.put_i32(location.x);
    w.put_i32(location.y);
    w.put_i32(location.z);

    w.put_u16(table.len() as u16);
    for name in table.names() {
        debug_assert!(name.len() <= MAX_TYPE_NAME_LEN);
        w.put_u8(name.len() as u8);
        w.put_bytes(name.as_bytes());
    }

    let mut scratch = Vec::new();
    for index in 0..CHUNK_VOLUME {
        let cell = chunk.at(InChunkLocation::from_linear_index(index));
        let vtype = cell.voxel_type();
        // Every registered type is in the freshly-built table.
        let id = table.id_of(vtype.name()).unwrap_or(0);
        w.put_u16(id);
        w.put_u8(cell.light_level().clamp(0, MAX_LIGHT_LEVEL) as u8);
        scratch.clear();
        vtype.encode_payload(cell.payload(), &mut scratch);
        debug_assert_eq!(scratch.len(), vtype.payload_size());
        w.put_bytes(&scratch);
    }
    w.into_inner()
}

pub fn decode_server_message(
    payload: &[u8],
    registry: &VoxelTypeRegistry,
) -> Result<ServerMessage, WireError> {
    let mut r = WireReader::new(payload);
    match r.read_u16()? {
        SERVER_TAG_SET_POSITION => Ok(ServerMessage::SetPosition(Vec3::new(
            r.read_f32()?,
            r.read_f32()?,
            r.read_f32()?,
        ))),
        SERVER_TAG_SET_CHUNK => {
            let location = ChunkLocation::new(r.read_i32()?, r.read_i32()?, r.read_i32()?);
            let table = decode_type_table(&mut r, registry)?;
            let mut cells = Vec::with_capacity(CHUNK_VOLUME);
            for _ in 0..CHUNK_VOLUME {
                let id = r.read_u16()?;
                let light = (r.read_u8()? as i8).clamp(0, MAX_LIGHT_LEVEL);
                let Some(vtype) = table.type_by_id(id) else {
                    return Err(WireError::BadTypeId {
                        id,
                        table_len: table.len(),
                    });
                };
                let payload_bytes = r.read_bytes(vtype.payload_size())?;
                let payload = vtype.decode_payload(payload_bytes);
                let mut cell = VoxelHolder::empty();
                cell.replace(vtype.clone(), payload, light);
                cells.push(cell);
            }
            Ok(ServerMessage::SetChunk { location, cells })
        }
        tag => Err(WireError::UnknownTag(tag)),
    }
}

/// Reads the per-chunk name table and resolves it against the local
/// registry, creating placeholder types for unknown names.
fn decode_type_table(
    r: &mut WireReader<'_>,
    registry: &VoxelTypeRegistry,
) -> Result<TypeTable, WireError> {
    let count = r.read_u16()?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = r.read_u8()? as usize;
        if len > MAX_TYPE_NAME_LEN {
            return Err(WireError::NameTooLong(len));
        }
        let bytes = r.read_bytes(len)?;
        let name = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidName)?;
        names.push(name.to_string());
    }
    Ok(TypeTable::from_names(names, registry))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gridstone_voxel::{
        MissingChunkPolicy, ShaderKind, SimpleVoxelType, VoxelWorld,
    };
    use std::sync::Arc;

    fn registry_with(names: &[&str]) -> VoxelTypeRegistry {
        let registry = VoxelTypeRegistry::new();
        for name in names {
            registry.add(Arc::new(SimpleVoxelType::new(
                *name,
                format!("assets/textures/{name}.png"),
            )));
        }
        registry
    }

    fn encode_test_chunk(
        registry: &VoxelTypeRegistry,
        fill: &[(InChunkLocation, &str, i8)],
    ) -> Vec<u8> {
        let world = VoxelWorld::new(None, None);
        let location = ChunkLocation::new(0, 0, 0);
        {
            let mut chunk = world
                .mutable_chunk(location, MissingChunkPolicy::Create)
                .expect("created");
            for (local, name, light) in fill {
                let cell = chunk.at_mut(*local);
                cell.set_type(registry.get(name));
                cell.set_light_level(*light);
            }
        }
        let chunk = world
            .chunk(location, MissingChunkPolicy::None)
            .expect("loaded");
        encode_set_chunk(&chunk, registry)
    }

    #[test]
    fn test_update_position_round_trip() {
        let update = PositionUpdate {
            position: Vec3::new(1.5, -2.0, 64.25),
            yaw: 90.0,
            pitch: -15.5,
            view_radius: 5,
        };
        let bytes = encode_update_position(&update);
        assert_eq!(bytes.len(), 2 + 5 * 4 + 1);
        let decoded = decode_client_message(&bytes).unwrap();
        assert_eq!(decoded, ClientMessage::UpdatePosition(update));
    }

    #[test]
    fn test_set_position_round_trip() {
        let registry = registry_with(&[]);
        let bytes = encode_set_position(Vec3::new(0.0, 1.0, 0.0));
        match decode_server_message(&bytes, &registry).unwrap() {
            ServerMessage::SetPosition(p) => assert_eq!(p, Vec3::new(0.0, 1.0, 0.0)),
            other => panic!("expected SetPosition, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut w = WireWriter::new();
        w.put_u16(0x7777);
        let err = decode_client_message(&w.into_inner()).unwrap_err();
        assert!(matches!(err, WireError::UnknownTag(0x7777)));
    }

    #[test]
    fn test_truncated_update_position_rejected() {
        let update = PositionUpdate {
            position: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            view_radius: 3,
        };
        let bytes = encode_update_position(&update);
        let err = decode_client_message(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn test_chunk_round_trip_between_matching_peers() {
        let sender = registry_with(&["grass", "dirt"]);
        let receiver = registry_with(&["grass", "dirt"]);

        let grass_at = InChunkLocation::new(3, 15, 7);
        let bytes = encode_test_chunk(&sender, &[(grass_at, "grass", 11)]);

        match decode_server_message(&bytes, &receiver).unwrap() {
            ServerMessage::SetChunk { location, cells } => {
                assert_eq!(location, ChunkLocation::new(0, 0, 0));
                assert_eq!(cells.len(), CHUNK_VOLUME);
                let cell = &cells[grass_at.linear_index()];
                assert_eq!(cell.voxel_type().name(), "grass");
                assert_eq!(cell.light_level(), 11);
                assert!(cells[0].is_empty());
            }
            other => panic!("expected SetChunk, got {other:?}"),
        }
    }

    #[test]
    fn test_receiver_with_extra_types_decodes_by_name() {
        // The sender's table numbers only its own types; ids are
        // per-session, so a receiver knowing more types must still resolve
        // by name.
        let sender = registry_with(&["grass", "dirt"]);
        let receiver = registry_with(&["grass", "dirt", "stone"]);

        let at = InChunkLocation::new(0, 0, 1);
        let bytes = encode_test_chunk(&sender, &[(at, "grass", 16)]);
        match decode_server_message(&bytes, &receiver).unwrap() {
            ServerMessage::SetChunk { cells, .. } => {
                assert_eq!(cells[at.linear_index()].voxel_type().name(), "grass");
            }
            other => panic!("expected SetChunk, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_becomes_placeholder() {
        let sender = registry_with(&["grass", "dirt", "stone"]);
        let receiver = registry_with(&["grass", "dirt"]);

        let at = InChunkLocation::new(9, 2, 4);
        let bytes = encode_test_chunk(&sender, &[(at, "stone", 0)]);
        match decode_server_message(&bytes, &receiver).unwrap() {
            ServerMessage::SetChunk { cells, .. } => {
                let cell = &cells[at.linear_index()];
                assert_eq!(cell.voxel_type().name(), "stone");
                // Rendered with the fallback texture, not an error.
                assert_eq!(cell.shader_kind(), ShaderKind::Fallback);
            }
            other => panic!("expected SetChunk, got {other:?}"),
        }
        // The placeholder is now part of the receiver's registry.
        assert!(receiver.contains("stone"));
    }

    #[test]
    fn test_type_id_outside_table_rejected() {
        let registry = registry_with(&["grass"]);
        let bytes = encode_test_chunk(&registry, &[]);

        // Corrupt the first voxel's type id (right after tag + location +
        // table). Table: count(2) + "empty"(1+5) + "grass"(1+5).
        let voxels_start = 2 + 12 + 2 + 6 + 6;
        let mut corrupted = bytes.clone();
        corrupted[voxels_start] = 0xFF;
        corrupted[voxels_start + 1] = 0xFF;

        let err = decode_server_message(&corrupted, &registry).unwrap_err();
        assert!(matches!(err, WireError::BadTypeId { id: 0xFFFF, .. }));
    }

    #[test]
    fn test_light_levels_survive_transfer() {
        let registry = registry_with(&["grass"]);
        let a = InChunkLocation::new(0, 0, 0);
        let b = InChunkLocation::new(15, 15, 15);
        let bytes = encode_test_chunk(&registry, &[(a, "grass", 0), (b, "grass", 16)]);
        match decode_server_message(&bytes, &registry).unwrap() {
            ServerMessage::SetChunk { cells, .. } => {
                assert_eq!(cells[a.linear_index()].light_level(), 0);
                assert_eq!(cells[b.linear_index()].light_level(), 16);
            }
            other => panic!("expected SetChunk, got {other:?}"),
        }
    }
}
