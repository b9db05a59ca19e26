//! Chunk storage: a flat 16³ cell array behind a reader-writer lock, dirty
//! flags consumed on handle release, and symmetric weak links to the 26
//! neighboring chunks.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::coords::{CHUNK_VOLUME, ChunkLocation, InChunkLocation};
use crate::voxel::VoxelHolder;
use crate::world::VoxelWorld;

/// Index into the 3×3×3 neighbor table for offset `(dx, dy, dz)`, each in
/// `[-1, 1]`.
pub(crate) const fn neighbor_index(dx: i32, dy: i32, dz: i32) -> usize {
    ((dx + 1) + (dy + 1) * 3 + (dz + 1) * 9) as usize
}

/// The center slot of the neighbor table (offset `(0, 0, 0)`).
pub(crate) const CENTER_INDEX: usize = neighbor_index(0, 0, 0);

/// Cell storage and dirty state, guarded by the chunk's lock.
pub struct ChunkCells {
    /// `CHUNK_VOLUME` cells in `z,y,x` order (x fastest).
    cells: Box<[VoxelHolder]>,
    /// Set by mutators; consumed when a mutable handle releases.
    dirty: bool,
    /// Set alongside `dirty` when light recomputation is requested.
    lights_pending: bool,
}

impl ChunkCells {
    fn new() -> Self {
        Self {
            cells: vec![VoxelHolder::empty(); CHUNK_VOLUME].into_boxed_slice(),
            dirty: false,
            lights_pending: false,
        }
    }

    pub fn at(&self, location: InChunkLocation) -> &VoxelHolder {
        &self.cells[location.linear_index()]
    }

    pub fn at_mut(&mut self, location: InChunkLocation) -> &mut VoxelHolder {
        &mut self.cells[location.linear_index()]
    }

    /// Requests a mesh rebuild for this chunk.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Requests a mesh rebuild and a light recomputation.
    pub fn mark_dirty_with_lights(&mut self) {
        self.dirty = true;
        self.lights_pending = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consumes both flags, returning `(dirty, lights_pending)`.
    pub(crate) fn take_dirty(&mut self) -> (bool, bool) {
        let out = (self.dirty, self.lights_pending);
        self.dirty = false;
        self.lights_pending = false;
        out
    }
}

/// A chunk as stored in the world map: location, lock-guarded cells, a weak
/// link back to the owning world, and the neighbor table.
///
/// Neighbor links are symmetric: A links B at offset `d` iff B links A at
/// `-d`. They are only rewired under the world's write lock (chunk create
/// and unload).
pub struct SharedChunk {
    location: ChunkLocation,
    world: Weak<VoxelWorld>,
    cells: Arc<RwLock<ChunkCells>>,
    neighbors: Mutex<[Weak<SharedChunk>; 27]>,
}

impl SharedChunk {
    pub(crate) fn new(world: &Arc<VoxelWorld>, location: ChunkLocation) -> Self {
        Self {
            location,
            world: Arc::downgrade(world),
            cells: Arc::new(RwLock::new(ChunkCells::new())),
            neighbors: Mutex::new(std::array::from_fn(|_| Weak::new())),
        }
    }

    pub fn location(&self) -> ChunkLocation {
        self.location
    }

    pub(crate) fn world(&self) -> Option<Arc<VoxelWorld>> {
        self.world.upgrade()
    }

    pub(crate) fn cells(&self) -> &Arc<RwLock<ChunkCells>> {
        &self.cells
    }

    /// The neighbor at offset `(dx, dy, dz)`, if loaded.
    pub(crate) fn neighbor(&self, dx: i32, dy: i32, dz: i32) -> Option<Arc<SharedChunk>> {
        self.neighbors.lock()[neighbor_index(dx, dy, dz)].upgrade()
    }

    /// All currently-loaded neighbors with their table indices.
    pub(crate) fn present_neighbors(&self) -> Vec<(usize, Arc<SharedChunk>)> {
        let table = self.neighbors.lock();
        table
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != CENTER_INDEX)
            .filter_map(|(idx, weak)| weak.upgrade().map(|chunk| (idx, chunk)))
            .collect()
    }

    /// Wires this chunk into the neighbor tables of every adjacent chunk in
    /// `chunks`, and theirs into this one. Caller holds the world write lock.
    pub(crate) fn link_neighbors(
        self: &Arc<Self>,
        chunks: &FxHashMap<ChunkLocation, Arc<SharedChunk>>,
    ) {
        let mut own: [Weak<SharedChunk>; 27] = std::array::from_fn(|_| Weak::new());
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let Some(other) = chunks.get(&self.location.offset(dx, dy, dz)) else {
                        continue;
                    };
                    other.neighbors.lock()[neighbor_index(-dx, -dy, -dz)] = Arc::downgrade(self);
                    own[neighbor_index(dx, dy, dz)] = Arc::downgrade(other);
                }
            }
        }
        *self.neighbors.lock() = own;
    }

    /// Severs every symmetric neighbor link. Caller holds the world write
    /// lock.
    pub(crate) fn unlink_neighbors(&self) {
        let taken = {
            let mut table = self.neighbors.lock();
            std::mem::replace(&mut *table, std::array::from_fn(|_| Weak::new()))
        };
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    if let Some(other) = taken[neighbor_index(dx, dy, dz)].upgrade() {
                        other.neighbors.lock()[neighbor_index(-dx, -dy, -dz)] = Weak::new();
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::MAX_LIGHT_LEVEL;

    #[test]
    fn test_new_cells_are_empty_and_clean() {
        let cells = ChunkCells::new();
        assert!(!cells.is_dirty());
        let cell = cells.at(InChunkLocation::new(3, 7, 11));
        assert!(cell.is_empty());
        assert_eq!(cell.light_level(), MAX_LIGHT_LEVEL);
    }

    #[test]
    fn test_take_dirty_consumes_both_flags() {
        let mut cells = ChunkCells::new();
        cells.mark_dirty_with_lights();
        assert!(cells.is_dirty());
        assert_eq!(cells.take_dirty(), (true, true));
        assert_eq!(cells.take_dirty(), (false, false));

        cells.mark_dirty();
        assert_eq!(cells.take_dirty(), (true, false));
    }

    #[test]
    fn test_neighbor_index_is_a_bijection() {
        let mut seen = [false; 27];
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let idx = neighbor_index(dx, dy, dz);
                    assert!(!seen[idx], "duplicate index {idx}");
                    seen[idx] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(CENTER_INDEX, 13);
    }

    #[test]
    fn test_cell_writes_round_trip() {
        let mut cells = ChunkCells::new();
        let loc = InChunkLocation::new(15, 0, 15);
        cells.at_mut(loc).set_light_level(4);
        assert_eq!(cells.at(loc).light_level(), 4);
        // Adjacent cell untouched.
        assert_eq!(
            cells.at(InChunkLocation::new(14, 0, 15)).light_level(),
            MAX_LIGHT_LEVEL
        );
    }
}
