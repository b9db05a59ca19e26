//! The voxel world: a mapping from chunk location to chunk behind the world
//! lock, the missing-chunk acquisition policies, and the loader/listener
//! collaborator slots.
//!
//! Lock discipline: the world lock is never held while a chunk's cell lock
//! is taken on behalf of a caller — handle constructors receive an `Arc` to
//! the chunk after the world lock is released. `unload_chunks` is the one
//! place that takes a chunk lock under the world write lock, to wait out
//! active handles before severing neighbor links.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::chunk::SharedChunk;
use crate::coords::{ChunkLocation, VoxelLocation};
use crate::handles::{ChunkExtendedMutableRef, ChunkExtendedRef, ChunkMutableRef, ChunkRef};
use crate::voxel::VoxelHolder;

/// What a chunk acquisition does when the chunk is not loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingChunkPolicy {
    /// Return no handle.
    None,
    /// Insert an empty chunk and return a handle to it.
    Create,
    /// Create, synchronously run the chunk loader, and return the result.
    Load,
    /// Enqueue an asynchronous load and return no handle.
    LoadAsync,
}

/// Populates freshly-created chunks; the world generator implements this.
pub trait ChunkLoader: Send + Sync {
    /// Synchronously fills `chunk`, which was just created empty.
    fn load(&self, chunk: &mut ChunkMutableRef);

    /// Enqueues a load of `location`; returns immediately.
    fn load_async(&self, world: &Arc<VoxelWorld>, location: ChunkLocation);

    /// Removes a queued load of `location` if it has not started.
    fn cancel_load_async(&self, world: &Arc<VoxelWorld>, location: ChunkLocation);
}

/// Observes chunk dirty transitions.
///
/// Invoked on the thread that released the mutating handle, after every
/// lock has been dropped — implementations may re-acquire any handle.
pub trait ChunkListener: Send + Sync {
    fn chunk_invalidated(
        &self,
        world: &Arc<VoxelWorld>,
        location: ChunkLocation,
        lights_pending: bool,
    );
}

/// Fans one invalidation out to several listeners, in order.
pub struct CompositeListener {
    listeners: Vec<Arc<dyn ChunkListener>>,
}

impl CompositeListener {
    pub fn new(listeners: Vec<Arc<dyn ChunkListener>>) -> Self {
        Self { listeners }
    }
}

impl ChunkListener for CompositeListener {
    fn chunk_invalidated(
        &self,
        world: &Arc<VoxelWorld>,
        location: ChunkLocation,
        lights_pending: bool,
    ) {
        for listener in &self.listeners {
            listener.chunk_invalidated(world, location, lights_pending);
        }
    }
}

/// The chunked voxel store.
pub struct VoxelWorld {
    chunks: RwLock<FxHashMap<ChunkLocation, Arc<SharedChunk>>>,
    loader: Option<Arc<dyn ChunkLoader>>,
    listener: Option<Arc<dyn ChunkListener>>,
}

impl VoxelWorld {
    /// Creates a world with optional loader and listener collaborators.
    pub fn new(
        loader: Option<Arc<dyn ChunkLoader>>,
        listener: Option<Arc<dyn ChunkListener>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            chunks: RwLock::new(FxHashMap::default()),
            loader,
            listener,
        })
    }

    fn get(&self, location: ChunkLocation) -> Option<Arc<SharedChunk>> {
        self.chunks.read().get(&location).cloned()
    }

    /// Inserts an empty chunk if absent. Returns the chunk and whether it
    /// was created by this call.
    fn create_chunk(self: &Arc<Self>, location: ChunkLocation) -> (Arc<SharedChunk>, bool) {
        let mut chunks = self.chunks.write();
        if let Some(existing) = chunks.get(&location) {
            return (existing.clone(), false);
        }
        let chunk = Arc::new(SharedChunk::new(self, location));
        chunk.link_neighbors(&chunks);
        chunks.insert(location, chunk.clone());
        (chunk, true)
    }

    /// Creates the chunk if needed and runs the loader on it once.
    fn create_and_load(self: &Arc<Self>, location: ChunkLocation) -> ChunkMutableRef {
        let (chunk, created) = self.create_chunk(location);
        let mut handle = ChunkMutableRef::new(chunk);
        if created && let Some(loader) = &self.loader {
            loader.load(&mut handle);
        }
        handle
    }

    /// Shared single-chunk handle.
    pub fn chunk(self: &Arc<Self>, location: ChunkLocation, policy: MissingChunkPolicy) -> Option<ChunkRef> {
        if let Some(chunk) = self.get(location) {
            return Some(ChunkRef::new(chunk));
        }
        match policy {
            MissingChunkPolicy::None => None,
            MissingChunkPolicy::Create => Some(ChunkRef::new(self.create_chunk(location).0)),
            MissingChunkPolicy::Load => {
                drop(self.create_and_load(location));
                self.chunk(location, MissingChunkPolicy::None)
            }
            MissingChunkPolicy::LoadAsync => {
                if let Some(loader) = &self.loader {
                    loader.load_async(self, location);
                }
                None
            }
        }
    }

    /// Shared handle over the chunk and its loaded neighbors.
    pub fn extended_chunk(
        self: &Arc<Self>,
        location: ChunkLocation,
        policy: MissingChunkPolicy,
    ) -> Option<ChunkExtendedRef> {
        if let Some(chunk) = self.get(location) {
            return Some(ChunkExtendedRef::new(chunk));
        }
        match policy {
            MissingChunkPolicy::None => None,
            MissingChunkPolicy::Create => Some(ChunkExtendedRef::new(self.create_chunk(location).0)),
            MissingChunkPolicy::Load => {
                drop(self.create_and_load(location));
                self.extended_chunk(location, MissingChunkPolicy::None)
            }
            MissingChunkPolicy::LoadAsync => {
                if let Some(loader) = &self.loader {
                    loader.load_async(self, location);
                }
                None
            }
        }
    }

    /// Exclusive single-chunk handle.
    pub fn mutable_chunk(
        self: &Arc<Self>,
        location: ChunkLocation,
        policy: MissingChunkPolicy,
    ) -> Option<ChunkMutableRef> {
        if let Some(chunk) = self.get(location) {
            return Some(ChunkMutableRef::new(chunk));
        }
        match policy {
            MissingChunkPolicy::None => None,
            MissingChunkPolicy::Create => Some(ChunkMutableRef::new(self.create_chunk(location).0)),
            MissingChunkPolicy::Load => Some(self.create_and_load(location)),
            MissingChunkPolicy::LoadAsync => {
                if let Some(loader) = &self.loader {
                    loader.load_async(self, location);
                }
                None
            }
        }
    }

    /// Exclusive handle over the chunk and its loaded neighbors.
    pub fn extended_mutable_chunk(
        self: &Arc<Self>,
        location: ChunkLocation,
        policy: MissingChunkPolicy,
    ) -> Option<ChunkExtendedMutableRef> {
        if let Some(chunk) = self.get(location) {
            return Some(ChunkExtendedMutableRef::new(chunk));
        }
        match policy {
            MissingChunkPolicy::None => None,
            MissingChunkPolicy::Create => {
                Some(ChunkExtendedMutableRef::new(self.create_chunk(location).0))
            }
            MissingChunkPolicy::Load => {
                drop(self.create_and_load(location));
                self.extended_mutable_chunk(location, MissingChunkPolicy::None)
            }
            MissingChunkPolicy::LoadAsync => {
                if let Some(loader) = &self.loader {
                    loader.load_async(self, location);
                }
                None
            }
        }
    }

    /// Exclusive handle, creating the chunk if absent. The flag reports
    /// whether this call created it — the async generator uses it to avoid
    /// regenerating a chunk that appeared while its job was queued.
    pub fn mutable_chunk_or_create(
        self: &Arc<Self>,
        location: ChunkLocation,
    ) -> (ChunkMutableRef, bool) {
        let (chunk, created) = self.create_chunk(location);
        (ChunkMutableRef::new(chunk), created)
    }

    /// A copy of the voxel at a world location; empty when the chunk is not
    /// loaded.
    pub fn voxel_at(self: &Arc<Self>, location: VoxelLocation) -> VoxelHolder {
        match self.chunk(location.chunk(), MissingChunkPolicy::None) {
            Some(chunk) => chunk.at(location.in_chunk()).clone(),
            None => VoxelHolder::empty(),
        }
    }

    /// Unloads the given chunks: waits out active handles, severs neighbor
    /// links, and drops the map entries. Handles still held elsewhere keep
    /// their chunk alive until released.
    pub fn unload_chunks(&self, locations: &[ChunkLocation]) {
        let mut chunks = self.chunks.write();
        for location in locations {
            if let Some(chunk) = chunks.get(location) {
                {
                    let _cells = chunk.cells().write();
                    chunk.unlink_neighbors();
                }
                chunks.remove(location);
            }
        }
    }

    /// Whether a chunk loader is configured (`Load`/`LoadAsync` policies
    /// degrade to `Create`/`None` without one).
    pub fn has_loader(&self) -> bool {
        self.loader.is_some()
    }

    pub fn is_loaded(&self, location: ChunkLocation) -> bool {
        self.chunks.read().contains_key(&location)
    }

    pub fn loaded_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Fires the listener for a consumed dirty transition. Called by handle
    /// release glue with no locks held.
    pub(crate) fn notify_invalidated(
        self: &Arc<Self>,
        location: ChunkLocation,
        lights_pending: bool,
    ) {
        if let Some(listener) = &self.listener {
            listener.chunk_invalidated(self, location, lights_pending);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
