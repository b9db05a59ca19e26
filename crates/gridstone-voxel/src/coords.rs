//! Voxel coordinate spaces and conversions.
//!
//! Three coordinate spaces exist: world-space voxel locations, chunk
//! locations (world divided by [`CHUNK_SIZE`]), and in-chunk locations (the
//! non-negative remainder). Conversion is floor division, not truncation, so
//! negative world coordinates land in the correct chunk.

/// Side length of a chunk in voxels.
pub const CHUNK_SIZE: i32 = 16;

/// Total number of voxel cells in a chunk (16³).
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// A world-space voxel location (signed, unbounded).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoxelLocation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A chunk-grid location: the world location integer-divided by [`CHUNK_SIZE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkLocation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A location within a chunk; every component is in `[0, CHUNK_SIZE)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InChunkLocation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelLocation {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk containing this voxel (floor division).
    pub fn chunk(self) -> ChunkLocation {
        ChunkLocation {
            x: self.x.div_euclid(CHUNK_SIZE),
            y: self.y.div_euclid(CHUNK_SIZE),
            z: self.z.div_euclid(CHUNK_SIZE),
        }
    }

    /// This voxel's position within its chunk (non-negative remainder).
    pub fn in_chunk(self) -> InChunkLocation {
        InChunkLocation {
            x: self.x.rem_euclid(CHUNK_SIZE),
            y: self.y.rem_euclid(CHUNK_SIZE),
            z: self.z.rem_euclid(CHUNK_SIZE),
        }
    }

    /// Reassembles a world location from its chunk and in-chunk parts.
    ///
    /// Inverse of [`chunk`](Self::chunk) + [`in_chunk`](Self::in_chunk):
    /// `from_parts(l.chunk(), l.in_chunk()) == l` for every `l`.
    pub fn from_parts(chunk: ChunkLocation, local: InChunkLocation) -> Self {
        Self {
            x: chunk.x * CHUNK_SIZE + local.x,
            y: chunk.y * CHUNK_SIZE + local.y,
            z: chunk.z * CHUNK_SIZE + local.z,
        }
    }
}

impl ChunkLocation {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk offset by `(dx, dy, dz)` chunk units.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }
}

impl InChunkLocation {
    /// Constructs an in-chunk location. Components must be in
    /// `[0, CHUNK_SIZE)`; checked in debug builds only.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        debug_assert!(
            (0..CHUNK_SIZE).contains(&x)
                && (0..CHUNK_SIZE).contains(&y)
                && (0..CHUNK_SIZE).contains(&z),
            "in-chunk location out of range: ({x}, {y}, {z})"
        );
        Self { x, y, z }
    }

    /// Linear cell index in `z,y,x` order (x varies fastest).
    pub fn linear_index(self) -> usize {
        ((self.z * CHUNK_SIZE + self.y) * CHUNK_SIZE + self.x) as usize
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    pub fn from_linear_index(index: usize) -> Self {
        debug_assert!(index < CHUNK_VOLUME);
        let index = index as i32;
        Self {
            x: index % CHUNK_SIZE,
            y: (index / CHUNK_SIZE) % CHUNK_SIZE,
            z: index / (CHUNK_SIZE * CHUNK_SIZE),
        }
    }

    /// The in-chunk location offset by one step along an axis, if the result
    /// stays inside the chunk.
    pub fn step(self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        let (x, y, z) = (self.x + dx, self.y + dy, self.z + dz);
        if (0..CHUNK_SIZE).contains(&x) && (0..CHUNK_SIZE).contains(&y) && (0..CHUNK_SIZE).contains(&z)
        {
            Some(Self { x, y, z })
        } else {
            None
        }
    }
}

/// The six axis-aligned neighbor offsets.
pub const NEIGHBORS_6: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
