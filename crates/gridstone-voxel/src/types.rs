//! Built-in voxel behaviors: the `empty` sentinel, invisible air, simple
//! textured solids, and the `unknown` placeholder for unrecognized wire
//! names.

use std::sync::{Arc, OnceLock};

use crate::coords::InChunkLocation;
use crate::handles::ChunkExtendedRef;
use crate::voxel::{LightLevel, ShaderKind, VoxelHolder, VoxelPayload, VoxelType, VoxelVertex};

/// Registry name of the empty type. `"empty"` is reserved: the registry
/// always resolves it to the shared instance.
pub const EMPTY_TYPE_NAME: &str = "empty";

// ---------------------------------------------------------------------------
// Cube-face geometry shared by the solid types
// ---------------------------------------------------------------------------

/// Corner offsets for the six unit-cube faces, paired with the axis
/// direction whose neighbor decides visibility. Corners wind
/// counter-clockwise seen from outside.
const CUBE_FACES: [((i32, i32, i32), [(f32, f32, f32); 4]); 6] = [
    // +X
    (
        (1, 0, 0),
        [
            (1.0, 0.0, 1.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (1.0, 1.0, 1.0),
        ],
    ),
    // -X
    (
        (-1, 0, 0),
        [
            (0.0, 0.0, 0.0),
            (0.0, 0.0, 1.0),
            (0.0, 1.0, 1.0),
            (0.0, 1.0, 0.0),
        ],
    ),
    // +Y
    (
        (0, 1, 0),
        [
            (0.0, 1.0, 1.0),
            (1.0, 1.0, 1.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
        ],
    ),
    // -Y
    (
        (0, -1, 0),
        [
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 0.0, 1.0),
            (0.0, 0.0, 1.0),
        ],
    ),
    // +Z
    (
        (0, 0, 1),
        [
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.0, 1.0, 1.0),
        ],
    ),
    // -Z
    (
        (0, 0, -1),
        [
            (1.0, 0.0, 0.0),
            (0.0, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (1.0, 1.0, 0.0),
        ],
    ),
];

/// Texture coordinates for the two triangles of a quad, in corner order
/// 0-1-2, 0-2-3.
const FACE_UVS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

/// Emits the faces of a unit cube whose axis neighbor has no density.
fn emit_cube_faces(chunk: &ChunkExtendedRef, location: InChunkLocation, out: &mut Vec<VoxelVertex>) {
    for ((dx, dy, dz), corners) in CUBE_FACES {
        let neighbor = chunk.extended_at(location.x + dx, location.y + dy, location.z + dz);
        if neighbor.has_density() {
            continue;
        }
        for idx in [0, 1, 2, 0, 2, 3] {
            let (cx, cy, cz) = corners[idx];
            let (u, v) = FACE_UVS[idx];
            out.push(VoxelVertex {
                x: location.x as f32 + cx,
                y: location.y as f32 + cy,
                z: location.z as f32 + cz,
                u,
                v,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// EmptyVoxelType
// ---------------------------------------------------------------------------

/// The type of unconstructed cells and out-of-world reads.
///
/// Contract: no density, no emission, no geometry.
pub struct EmptyVoxelType;

impl EmptyVoxelType {
    /// The process-wide shared instance.
    pub fn shared() -> Arc<dyn VoxelType> {
        static INSTANCE: OnceLock<Arc<dyn VoxelType>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(EmptyVoxelType)).clone()
    }
}

impl VoxelType for EmptyVoxelType {
    fn name(&self) -> &str {
        EMPTY_TYPE_NAME
    }

    fn has_density(&self, _payload: &VoxelPayload) -> bool {
        false
    }

    fn shader_kind(&self, _payload: &VoxelPayload) -> ShaderKind {
        ShaderKind::None
    }

    fn build_vertex_data(
        &self,
        _chunk: &ChunkExtendedRef,
        _location: InChunkLocation,
        _payload: &VoxelPayload,
        _out: &mut Vec<VoxelVertex>,
    ) {
    }
}

/// A shared empty cell, returned by reads that reach outside the loaded
/// world. Callers borrow it for the lifetime of a handle at most.
pub fn empty_voxel() -> &'static VoxelHolder {
    static EMPTY: OnceLock<VoxelHolder> = OnceLock::new();
    EMPTY.get_or_init(VoxelHolder::empty)
}

// ---------------------------------------------------------------------------
// AirVoxelType
// ---------------------------------------------------------------------------

/// Breathable air: a registered, non-solid, invisible voxel distinct from
/// the `empty` sentinel so generated space reads as "generated, nothing
/// there" rather than "not loaded".
pub struct AirVoxelType {
    name: String,
}

impl AirVoxelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl VoxelType for AirVoxelType {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_density(&self, _payload: &VoxelPayload) -> bool {
        false
    }

    fn shader_kind(&self, _payload: &VoxelPayload) -> ShaderKind {
        ShaderKind::None
    }

    fn build_vertex_data(
        &self,
        _chunk: &ChunkExtendedRef,
        _location: InChunkLocation,
        _payload: &VoxelPayload,
        _out: &mut Vec<VoxelVertex>,
    ) {
    }
}

// ---------------------------------------------------------------------------
// SimpleVoxelType
// ---------------------------------------------------------------------------

/// A plain textured solid with optional light emission.
pub struct SimpleVoxelType {
    name: String,
    texture: Arc<str>,
    emission: LightLevel,
    has_density: bool,
}

impl SimpleVoxelType {
    pub fn new(name: impl Into<String>, texture: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            texture: texture.into(),
            emission: 0,
            has_density: true,
        }
    }

    /// Sets the light level cells of this type emit.
    pub fn with_emission(mut self, level: LightLevel) -> Self {
        self.emission = level;
        self
    }

    /// Makes cells of this type intangible to physics and the picker.
    pub fn without_density(mut self) -> Self {
        self.has_density = false;
        self
    }
}

impl VoxelType for SimpleVoxelType {
    fn name(&self) -> &str {
        &self.name
    }

    fn emission(&self, _payload: &VoxelPayload) -> LightLevel {
        self.emission
    }

    fn has_density(&self, _payload: &VoxelPayload) -> bool {
        self.has_density
    }

    fn shader_kind(&self, _payload: &VoxelPayload) -> ShaderKind {
        ShaderKind::Texture(self.texture.clone())
    }

    fn build_vertex_data(
        &self,
        chunk: &ChunkExtendedRef,
        location: InChunkLocation,
        _payload: &VoxelPayload,
        out: &mut Vec<VoxelVertex>,
    ) {
        emit_cube_faces(chunk, location, out);
    }
}

// ---------------------------------------------------------------------------
// UnknownVoxelType
// ---------------------------------------------------------------------------

/// Placeholder behavior for a type name this peer has never registered.
///
/// Deserializing a chunk from a peer with extra types must not fail, so the
/// registry creates one of these per unknown name: a solid cube rendered
/// with the fallback texture.
pub struct UnknownVoxelType {
    name: String,
}

impl UnknownVoxelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl VoxelType for UnknownVoxelType {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_density(&self, _payload: &VoxelPayload) -> bool {
        true
    }

    fn shader_kind(&self, _payload: &VoxelPayload) -> ShaderKind {
        ShaderKind::Fallback
    }

    fn build_vertex_data(
        &self,
        chunk: &ChunkExtendedRef,
        location: InChunkLocation,
        _payload: &VoxelPayload,
        out: &mut Vec<VoxelVertex>,
    ) {
        emit_cube_faces(chunk, location, out);
    }

    fn to_display_string(&self, _payload: &VoxelPayload) -> String {
        format!("unknown({})", self.name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
