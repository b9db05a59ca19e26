//! Scoped chunk reference handles enforcing the locking protocol.
//!
//! Four handle shapes exist, acquired through
//! [`VoxelWorld`](crate::world::VoxelWorld) and released on drop:
//!
//! | Handle | Own lock | Neighbor locks | Mutates |
//! |--------|----------|----------------|---------|
//! | [`ChunkRef`] | shared | none | no |
//! | [`ChunkExtendedRef`] | shared | shared | no |
//! | [`ChunkMutableRef`] | exclusive | none | own chunk |
//! | [`ChunkExtendedMutableRef`] | exclusive | exclusive | 3×3×3 region |
//!
//! Whenever a handle locks more than one chunk, the chunks are locked in
//! lexicographic `(x, y, z)` chunk-location order. Overlapping 3×3×3
//! neighborhoods acquired concurrently therefore always take their common
//! chunks in the same order, which is what makes the protocol deadlock-free.
//! Callers must not hold one handle while acquiring another.
//!
//! On release of a mutable handle the dirty flags are consumed under the
//! lock, every lock is dropped, and only then the world's chunk listener
//! fires — so a listener may re-acquire any handle without deadlocking.

use std::sync::Arc;

use parking_lot::RawRwLock;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};

use crate::chunk::{CENTER_INDEX, ChunkCells, SharedChunk, neighbor_index};
use crate::coords::{CHUNK_SIZE, ChunkLocation, InChunkLocation};
use crate::types::empty_voxel;
use crate::voxel::VoxelHolder;

type CellsReadGuard = ArcRwLockReadGuard<RawRwLock, ChunkCells>;
type CellsWriteGuard = ArcRwLockWriteGuard<RawRwLock, ChunkCells>;

type ReadSlot = (Arc<SharedChunk>, CellsReadGuard);
type WriteSlot = (Arc<SharedChunk>, CellsWriteGuard);

/// Splits an extended in-chunk coordinate into `(chunk offset, corrected
/// in-chunk location)`. Offsets beyond the 3×3×3 neighborhood yield `None`;
/// such reads resolve to the empty voxel.
fn decompose_extended(x: i32, y: i32, z: i32) -> Option<(usize, InChunkLocation)> {
    let (dx, lx) = (x.div_euclid(CHUNK_SIZE), x.rem_euclid(CHUNK_SIZE));
    let (dy, ly) = (y.div_euclid(CHUNK_SIZE), y.rem_euclid(CHUNK_SIZE));
    let (dz, lz) = (z.div_euclid(CHUNK_SIZE), z.rem_euclid(CHUNK_SIZE));
    if !(-1..=1).contains(&dx) || !(-1..=1).contains(&dy) || !(-1..=1).contains(&dz) {
        return None;
    }
    Some((neighbor_index(dx, dy, dz), InChunkLocation::new(lx, ly, lz)))
}

/// Collects the center chunk and its loaded neighbors, ordered for locking.
fn neighborhood_in_lock_order(center: &Arc<SharedChunk>) -> Vec<(usize, Arc<SharedChunk>)> {
    let mut pending: Vec<(ChunkLocation, usize, Arc<SharedChunk>)> = center
        .present_neighbors()
        .into_iter()
        .map(|(idx, chunk)| (chunk.location(), idx, chunk))
        .collect();
    pending.push((center.location(), CENTER_INDEX, center.clone()));
    pending.sort_by_key(|(location, _, _)| *location);
    pending
        .into_iter()
        .map(|(_, idx, chunk)| (idx, chunk))
        .collect()
}

/// Fires the world's chunk listener after a mutable handle has dropped its
/// locks. Declared as the final field of the mutable handles so it drops
/// after their guards.
struct ReleaseNotify {
    chunk: Arc<SharedChunk>,
    dirty: bool,
    lights_pending: bool,
}

impl ReleaseNotify {
    fn new(chunk: Arc<SharedChunk>) -> Self {
        Self {
            chunk,
            dirty: false,
            lights_pending: false,
        }
    }
}

impl Drop for ReleaseNotify {
    fn drop(&mut self) {
        if !self.dirty {
            return;
        }
        let location = self.chunk.location();
        tracing::trace!(?location, lights_pending = self.lights_pending, "chunk invalidated");
        if let Some(world) = self.chunk.world() {
            world.notify_invalidated(location, self.lights_pending);
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkRef
// ---------------------------------------------------------------------------

/// Shared access to a single chunk's cells.
pub struct ChunkRef {
    location: ChunkLocation,
    guard: CellsReadGuard,
}

impl ChunkRef {
    pub(crate) fn new(chunk: Arc<SharedChunk>) -> Self {
        let location = chunk.location();
        let guard = chunk.cells().read_arc();
        Self { location, guard }
    }

    pub fn location(&self) -> ChunkLocation {
        self.location
    }

    pub fn at(&self, location: InChunkLocation) -> &VoxelHolder {
        self.guard.at(location)
    }
}

// ---------------------------------------------------------------------------
// ChunkExtendedRef
// ---------------------------------------------------------------------------

/// Shared access to a chunk and every loaded neighbor, enabling safe
/// cross-boundary reads.
pub struct ChunkExtendedRef {
    location: ChunkLocation,
    slots: [Option<ReadSlot>; 27],
}

impl ChunkExtendedRef {
    pub(crate) fn new(center: Arc<SharedChunk>) -> Self {
        let location = center.location();
        let mut slots: [Option<ReadSlot>; 27] = std::array::from_fn(|_| None);
        for (idx, chunk) in neighborhood_in_lock_order(&center) {
            let guard = chunk.cells().read_arc();
            slots[idx] = Some((chunk, guard));
        }
        Self { location, slots }
    }

    fn center(&self) -> &ReadSlot {
        match &self.slots[CENTER_INDEX] {
            Some(slot) => slot,
            None => unreachable!("the center chunk is always locked"),
        }
    }

    pub fn location(&self) -> ChunkLocation {
        self.location
    }

    pub fn at(&self, location: InChunkLocation) -> &VoxelHolder {
        self.center().1.at(location)
    }

    /// Whether the neighbor at offset `(dx, dy, dz)` is loaded and locked.
    pub fn has_neighbor(&self, dx: i32, dy: i32, dz: i32) -> bool {
        self.slots[neighbor_index(dx, dy, dz)].is_some()
    }

    /// Reads a cell by in-chunk coordinates that may reach outside `[0, 16)`
    /// into a neighbor. Absent neighbors (and offsets beyond the locked
    /// 3×3×3 set) read as the empty voxel. The returned borrow lives no
    /// longer than this handle.
    pub fn extended_at(&self, x: i32, y: i32, z: i32) -> &VoxelHolder {
        match decompose_extended(x, y, z) {
            Some((idx, local)) => match &self.slots[idx] {
                Some((_, guard)) => guard.at(local),
                None => empty_voxel(),
            },
            None => empty_voxel(),
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkMutableRef
// ---------------------------------------------------------------------------

/// Exclusive access to a single chunk's cells.
pub struct ChunkMutableRef {
    guard: CellsWriteGuard,
    release: ReleaseNotify,
}

impl ChunkMutableRef {
    pub(crate) fn new(chunk: Arc<SharedChunk>) -> Self {
        let guard = chunk.cells().write_arc();
        Self {
            guard,
            release: ReleaseNotify::new(chunk),
        }
    }

    pub fn location(&self) -> ChunkLocation {
        self.release.chunk.location()
    }

    pub fn at(&self, location: InChunkLocation) -> &VoxelHolder {
        self.guard.at(location)
    }

    pub fn at_mut(&mut self, location: InChunkLocation) -> &mut VoxelHolder {
        self.guard.at_mut(location)
    }

    /// Requests a mesh rebuild; the listener fires once on release.
    pub fn mark_dirty(&mut self) {
        self.guard.mark_dirty();
    }

    /// Requests a mesh rebuild plus light recomputation on release.
    pub fn mark_dirty_with_lights(&mut self) {
        self.guard.mark_dirty_with_lights();
    }
}

impl Drop for ChunkMutableRef {
    fn drop(&mut self) {
        let (dirty, lights_pending) = self.guard.take_dirty();
        self.release.dirty = dirty;
        self.release.lights_pending = lights_pending;
        // Field order drops `guard` (releasing the lock) before `release`
        // fires the listener.
    }
}

// ---------------------------------------------------------------------------
// ChunkExtendedMutableRef
// ---------------------------------------------------------------------------

/// Exclusive access to a chunk and every loaded neighbor: any cell in the
/// 3×3×3 region may be read or written.
pub struct ChunkExtendedMutableRef {
    slots: [Option<WriteSlot>; 27],
    location: ChunkLocation,
    release: ReleaseNotify,
}

impl ChunkExtendedMutableRef {
    pub(crate) fn new(center: Arc<SharedChunk>) -> Self {
        let location = center.location();
        let release = ReleaseNotify::new(center.clone());
        let mut slots: [Option<WriteSlot>; 27] = std::array::from_fn(|_| None);
        for (idx, chunk) in neighborhood_in_lock_order(&center) {
            let guard = chunk.cells().write_arc();
            slots[idx] = Some((chunk, guard));
        }
        Self {
            slots,
            location,
            release,
        }
    }

    fn center(&self) -> &WriteSlot {
        match &self.slots[CENTER_INDEX] {
            Some(slot) => slot,
            None => unreachable!("the center chunk is always locked"),
        }
    }

    fn center_mut(&mut self) -> &mut WriteSlot {
        match &mut self.slots[CENTER_INDEX] {
            Some(slot) => slot,
            None => unreachable!("the center chunk is always locked"),
        }
    }

    pub fn location(&self) -> ChunkLocation {
        self.location
    }

    pub fn at(&self, location: InChunkLocation) -> &VoxelHolder {
        self.center().1.at(location)
    }

    pub fn at_mut(&mut self, location: InChunkLocation) -> &mut VoxelHolder {
        self.center_mut().1.at_mut(location)
    }

    pub fn has_neighbor(&self, dx: i32, dy: i32, dz: i32) -> bool {
        self.slots[neighbor_index(dx, dy, dz)].is_some()
    }

    /// Reads a cell in the locked 3×3×3 region; see
    /// [`ChunkExtendedRef::extended_at`].
    pub fn extended_at(&self, x: i32, y: i32, z: i32) -> &VoxelHolder {
        match decompose_extended(x, y, z) {
            Some((idx, local)) => match &self.slots[idx] {
                Some((_, guard)) => guard.at(local),
                None => empty_voxel(),
            },
            None => empty_voxel(),
        }
    }

    /// Mutable access to a cell in the locked 3×3×3 region. Returns `None`
    /// when the target chunk is not loaded (writes cannot fall back to the
    /// shared empty cell).
    pub fn extended_at_mut(&mut self, x: i32, y: i32, z: i32) -> Option<&mut VoxelHolder> {
        let (idx, local) = decompose_extended(x, y, z)?;
        match &mut self.slots[idx] {
            Some((_, guard)) => Some(guard.at_mut(local)),
            None => None,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.center_mut().1.mark_dirty();
    }

    pub fn mark_dirty_with_lights(&mut self) {
        self.center_mut().1.mark_dirty_with_lights();
    }
}

impl Drop for ChunkExtendedMutableRef {
    fn drop(&mut self) {
        if let Some((_, guard)) = self.slots[CENTER_INDEX].as_mut() {
            let (dirty, lights_pending) = guard.take_dirty();
            self.release.dirty = dirty;
            self.release.lights_pending = lights_pending;
        }
        // `slots` drops every guard before `release` fires the listener.
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
