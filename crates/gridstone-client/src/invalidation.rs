//! Client-side mesh invalidation.
//!
//! The renderer keeps one mesh per chunk. When a chunk is dirtied, that
//! chunk and its six axis neighbors need remeshing — boundary faces and
//! lighting are read from axis-adjacent cells, never corners, so corner
//! neighbors stay valid.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use gridstone_voxel::{ChunkListener, ChunkLocation, NEIGHBORS_6, VoxelWorld};

/// Collects chunk locations whose meshes are stale. The render loop drains
/// the set once per frame and rebuilds.
pub struct MeshInvalidator {
    invalidated: Mutex<FxHashSet<ChunkLocation>>,
}

impl MeshInvalidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invalidated: Mutex::new(FxHashSet::default()),
        })
    }

    /// Takes the current invalidation set.
    pub fn drain(&self) -> Vec<ChunkLocation> {
        self.invalidated.lock().drain().collect()
    }

    pub fn pending(&self) -> usize {
        self.invalidated.lock().len()
    }
}

impl ChunkListener for MeshInvalidator {
    fn chunk_invalidated(
        &self,
        _world: &Arc<VoxelWorld>,
        location: ChunkLocation,
        _lights_pending: bool,
    ) {
        let mut set = self.invalidated.lock();
        set.insert(location);
        for (dx, dy, dz) in NEIGHBORS_6 {
            set.insert(location.offset(dx, dy, dz));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstone_voxel::{InChunkLocation, MissingChunkPolicy};

    #[test]
    fn test_dirty_chunk_invalidates_self_and_axis_neighbors() {
        let invalidator = MeshInvalidator::new();
        let world = VoxelWorld::new(None, Some(invalidator.clone()));

        let location = ChunkLocation::new(2, 0, -1);
        let mut chunk = world
            .mutable_chunk(location, MissingChunkPolicy::Create)
            .expect("created");
        chunk.at_mut(InChunkLocation::new(0, 0, 0)).set_light_level(5);
        chunk.mark_dirty();
        drop(chunk);

        let mut stale = invalidator.drain();
        stale.sort();
        let mut expected: Vec<ChunkLocation> = NEIGHBORS_6
            .iter()
            .map(|&(dx, dy, dz)| location.offset(dx, dy, dz))
            .chain(std::iter::once(location))
            .collect();
        expected.sort();
        assert_eq!(stale, expected);

        // Corner neighbors are untouched.
        assert!(!stale.contains(&location.offset(1, 1, 0)));
        // Draining empties the set.
        assert_eq!(invalidator.pending(), 0);
    }

    #[test]
    fn test_repeat_invalidations_deduplicate() {
        let invalidator = MeshInvalidator::new();
        let world = VoxelWorld::new(None, Some(invalidator.clone()));
        let location = ChunkLocation::new(0, 0, 0);

        for _ in 0..3 {
            let mut chunk = world
                .mutable_chunk(location, MissingChunkPolicy::Create)
                .expect("created");
            chunk.mark_dirty();
        }
        assert_eq!(invalidator.pending(), 7);
    }
}
