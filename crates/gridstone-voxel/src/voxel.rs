//! Polymorphic voxel values with fixed-size inline payloads.
//!
//! Every cell is a [`VoxelHolder`]: a shared handle to a registered
//! [`VoxelType`] behavior, a light level, and up to [`MAX_VOXEL_DATA_SIZE`]
//! bytes of per-instance state interpreted by the type. Cells are stored
//! inline in a chunk's flat array, so the payload budget is fixed and
//! dispatch goes through the type object.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::coords::InChunkLocation;
use crate::handles::{ChunkExtendedMutableRef, ChunkExtendedRef};

/// A voxel light level, in `[0, MAX_LIGHT_LEVEL]`.
pub type LightLevel = i8;

/// Maximum voxel light level.
pub const MAX_LIGHT_LEVEL: LightLevel = 16;

/// Upper bound on per-voxel instance state, in bytes.
pub const MAX_VOXEL_DATA_SIZE: usize = 16;

/// One vertex emitted by [`VoxelType::build_vertex_data`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
}

/// Opaque key the renderer uses to bucket vertex data by shader/texture.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Nothing to draw.
    None,
    /// Textured surface, keyed by texture asset name.
    Texture(Arc<str>),
    /// Placeholder texture for types this peer has never seen.
    Fallback,
}

/// Fixed-capacity per-voxel instance bytes, interpreted by the owning type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoxelPayload {
    len: u8,
    bytes: [u8; MAX_VOXEL_DATA_SIZE],
}

impl VoxelPayload {
    /// A zero-length payload (the common case for simple types).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a payload from raw bytes; `data` must fit the fixed budget.
    pub fn from_slice(data: &[u8]) -> Self {
        debug_assert!(
            data.len() <= MAX_VOXEL_DATA_SIZE,
            "voxel payload of {} bytes exceeds the {MAX_VOXEL_DATA_SIZE}-byte budget",
            data.len()
        );
        let mut bytes = [0u8; MAX_VOXEL_DATA_SIZE];
        let len = data.len().min(MAX_VOXEL_DATA_SIZE);
        bytes[..len].copy_from_slice(&data[..len]);
        Self {
            len: len as u8,
            bytes,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Behavior descriptor for a family of voxels.
///
/// Implementations are registered once in the
/// [`VoxelTypeRegistry`](crate::registry::VoxelTypeRegistry) and shared by
/// every cell of that type. Per-instance state lives in the cell's
/// [`VoxelPayload`]; the type interprets those bytes.
pub trait VoxelType: Send + Sync {
    /// Registry name; also the identity used in wire type tables.
    fn name(&self) -> &str;

    /// Fresh payload for a newly constructed cell of this type.
    fn init_payload(&self) -> VoxelPayload {
        VoxelPayload::empty()
    }

    /// Serialized payload size in bytes. Must match what
    /// [`encode_payload`](Self::encode_payload) writes.
    fn payload_size(&self) -> usize {
        0
    }

    /// Appends the wire form of `payload` to `out`.
    fn encode_payload(&self, _payload: &VoxelPayload, _out: &mut Vec<u8>) {}

    /// Rebuilds a payload from exactly [`payload_size`](Self::payload_size)
    /// wire bytes.
    fn decode_payload(&self, bytes: &[u8]) -> VoxelPayload {
        debug_assert_eq!(bytes.len(), self.payload_size());
        VoxelPayload::from_slice(bytes)
    }

    /// Light emitted by a cell of this type, independent of stored light.
    fn emission(&self, _payload: &VoxelPayload) -> LightLevel {
        0
    }

    /// Whether physics and the outline picker treat this cell as solid.
    fn has_density(&self, payload: &VoxelPayload) -> bool;

    /// Renderer bucket key for this cell.
    fn shader_kind(&self, payload: &VoxelPayload) -> ShaderKind;

    /// Emits geometry for this cell, consulting neighbors through the
    /// extended handle for face culling.
    fn build_vertex_data(
        &self,
        chunk: &ChunkExtendedRef,
        location: InChunkLocation,
        payload: &VoxelPayload,
        out: &mut Vec<VoxelVertex>,
    );

    /// Scheduled per-tick state advancement. Returns `true` if the cell
    /// wants further updates. May record cells whose meshes it invalidated.
    fn update(
        &self,
        _chunk: &mut ChunkExtendedMutableRef,
        _location: InChunkLocation,
        _dt_ms: u64,
        _invalidated: &mut FxHashSet<InChunkLocation>,
    ) -> bool {
        false
    }

    /// Infrequent state advancement (random ticks).
    fn slow_update(
        &self,
        _chunk: &mut ChunkExtendedMutableRef,
        _location: InChunkLocation,
        _invalidated: &mut FxHashSet<InChunkLocation>,
    ) {
    }

    /// Debug representation of a cell of this type.
    fn to_display_string(&self, _payload: &VoxelPayload) -> String {
        self.name().to_string()
    }
}

/// One fully-constructed voxel cell: type handle, light level, and inline
/// payload.
///
/// Cells are never in a partially-initialized state; a default cell is the
/// `empty` type at [`MAX_LIGHT_LEVEL`]. Replacing the type preserves the
/// stored light level.
#[derive(Clone)]
pub struct VoxelHolder {
    vtype: Arc<dyn VoxelType>,
    light: LightLevel,
    payload: VoxelPayload,
}

impl VoxelHolder {
    /// A cell of the given type with a fresh payload and full light.
    pub fn new(vtype: Arc<dyn VoxelType>) -> Self {
        let payload = vtype.init_payload();
        Self {
            vtype,
            light: MAX_LIGHT_LEVEL,
            payload,
        }
    }

    /// A cell of the `empty` type.
    pub fn empty() -> Self {
        Self::new(crate::types::EmptyVoxelType::shared())
    }

    pub fn voxel_type(&self) -> &Arc<dyn VoxelType> {
        &self.vtype
    }

    /// Whether this cell is the `empty` type (unloaded space).
    pub fn is_empty(&self) -> bool {
        self.vtype.name() == crate::types::EMPTY_TYPE_NAME
    }

    /// Replaces the cell's type, resetting the payload but preserving the
    /// stored light level.
    pub fn set_type(&mut self, vtype: Arc<dyn VoxelType>) {
        self.payload = vtype.init_payload();
        self.vtype = vtype;
    }

    /// Replaces type, payload, and light in one step (wire deserialization).
    pub fn replace(&mut self, vtype: Arc<dyn VoxelType>, payload: VoxelPayload, light: LightLevel) {
        self.vtype = vtype;
        self.payload = payload;
        self.light = light;
    }

    pub fn light_level(&self) -> LightLevel {
        self.light
    }

    pub fn set_light_level(&mut self, level: LightLevel) {
        debug_assert!((0..=MAX_LIGHT_LEVEL).contains(&level));
        self.light = level;
    }

    /// Light emitted by the cell's type (not the stored level).
    pub fn type_emission(&self) -> LightLevel {
        self.vtype.emission(&self.payload)
    }

    pub fn payload(&self) -> &VoxelPayload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut VoxelPayload {
        &mut self.payload
    }

    pub fn has_density(&self) -> bool {
        self.vtype.has_density(&self.payload)
    }

    pub fn shader_kind(&self) -> ShaderKind {
        self.vtype.shader_kind(&self.payload)
    }

    pub fn to_display_string(&self) -> String {
        self.vtype.to_display_string(&self.payload)
    }

    pub fn build_vertex_data(
        &self,
        chunk: &ChunkExtendedRef,
        location: InChunkLocation,
        out: &mut Vec<VoxelVertex>,
    ) {
        self.vtype
            .build_vertex_data(chunk, location, &self.payload, out);
    }
}

impl Default for VoxelHolder {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for VoxelHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelHolder")
            .field("type", &self.vtype.name())
            .field("light", &self.light)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimpleVoxelType;

    #[test]
    fn test_default_cell_is_empty_with_full_light() {
        let cell = VoxelHolder::default();
        assert!(cell.is_empty());
        assert_eq!(cell.light_level(), MAX_LIGHT_LEVEL);
        assert!(!cell.has_density());
        assert_eq!(cell.type_emission(), 0);
    }

    #[test]
    fn test_set_type_preserves_light_level() {
        let stone: Arc<dyn VoxelType> =
            Arc::new(SimpleVoxelType::new("stone", "assets/textures/stone.png"));
        let mut cell = VoxelHolder::empty();
        cell.set_light_level(7);
        cell.set_type(stone);
        assert_eq!(cell.light_level(), 7);
        assert_eq!(cell.voxel_type().name(), "stone");
        assert!(!cell.is_empty());
    }

    #[test]
    fn test_type_emission_is_independent_of_stored_light() {
        let lamp: Arc<dyn VoxelType> = Arc::new(
            SimpleVoxelType::new("lamp", "assets/textures/lamp.png").with_emission(12),
        );
        let mut cell = VoxelHolder::new(lamp);
        cell.set_light_level(3);
        assert_eq!(cell.type_emission(), 12);
        assert_eq!(cell.light_level(), 3);
    }

    #[test]
    fn test_payload_budget() {
        let p = VoxelPayload::from_slice(&[1, 2, 3]);
        assert_eq!(p.as_slice(), &[1, 2, 3]);
        assert_eq!(p.len(), 3);
        assert!(VoxelPayload::empty().is_empty());
    }

    #[test]
    fn test_display_string_names_the_type() {
        let cell = VoxelHolder::empty();
        assert_eq!(cell.to_display_string(), "empty");
    }

    /// A voxel whose payload holds a one-byte pulse counter.
    struct PulseVoxelType;

    impl VoxelType for PulseVoxelType {
        fn name(&self) -> &str {
            "pulse"
        }

        fn init_payload(&self) -> VoxelPayload {
            VoxelPayload::from_slice(&[0])
        }

        fn payload_size(&self) -> usize {
            1
        }

        fn encode_payload(&self, payload: &VoxelPayload, out: &mut Vec<u8>) {
            out.extend_from_slice(payload.as_slice());
        }

        fn has_density(&self, _payload: &VoxelPayload) -> bool {
            true
        }

        fn shader_kind(&self, _payload: &VoxelPayload) -> ShaderKind {
            ShaderKind::Fallback
        }

        fn build_vertex_data(
            &self,
            _chunk: &ChunkExtendedRef,
            _location: InChunkLocation,
            _payload: &VoxelPayload,
            _out: &mut Vec<VoxelVertex>,
        ) {
        }

        fn update(
            &self,
            chunk: &mut ChunkExtendedMutableRef,
            location: InChunkLocation,
            _dt_ms: u64,
            invalidated: &mut FxHashSet<InChunkLocation>,
        ) -> bool {
            let cell = chunk.at_mut(location);
            let bytes = cell.payload_mut().as_mut_slice();
            bytes[0] = bytes[0].wrapping_add(1);
            invalidated.insert(location);
            chunk.mark_dirty();
            true
        }
    }

    #[test]
    fn test_update_advances_payload_state_through_the_handle() {
        use crate::coords::ChunkLocation;
        use crate::world::{MissingChunkPolicy, VoxelWorld};

        let pulse: Arc<dyn VoxelType> = Arc::new(PulseVoxelType);
        let world = VoxelWorld::new(None, None);
        let location = ChunkLocation::new(0, 0, 0);
        let cell = InChunkLocation::new(4, 4, 4);

        let mut chunk = world
            .extended_mutable_chunk(location, MissingChunkPolicy::Create)
            .expect("created");
        chunk.at_mut(cell).set_type(pulse.clone());

        let mut invalidated = FxHashSet::default();
        let vtype = chunk.at(cell).voxel_type().clone();
        assert!(vtype.update(&mut chunk, cell, 16, &mut invalidated));
        assert!(vtype.update(&mut chunk, cell, 16, &mut invalidated));

        assert_eq!(chunk.at(cell).payload().as_slice(), &[2]);
        assert!(invalidated.contains(&cell));
    }
}
