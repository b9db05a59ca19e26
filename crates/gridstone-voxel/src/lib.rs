//! Chunked concurrent voxel store: coordinates, the polymorphic voxel cell,
//! the type registry with wire-id negotiation, chunk storage, the world map,
//! and the four RAII locking handles.

pub mod chunk;
pub mod coords;
pub mod handles;
pub mod registry;
pub mod types;
pub mod voxel;
pub mod world;

pub use chunk::ChunkCells;
pub use coords::{CHUNK_SIZE, CHUNK_VOLUME, ChunkLocation, InChunkLocation, NEIGHBORS_6, VoxelLocation};
pub use handles::{ChunkExtendedMutableRef, ChunkExtendedRef, ChunkMutableRef, ChunkRef};
pub use registry::{TypeTable, VoxelTypeRegistry};
pub use types::{
    AirVoxelType, EMPTY_TYPE_NAME, EmptyVoxelType, SimpleVoxelType, UnknownVoxelType, empty_voxel,
};
pub use voxel::{
    LightLevel, MAX_LIGHT_LEVEL, MAX_VOXEL_DATA_SIZE, ShaderKind, VoxelHolder, VoxelPayload,
    VoxelType, VoxelVertex,
};
pub use world::{ChunkListener, ChunkLoader, CompositeListener, MissingChunkPolicy, VoxelWorld};
