//! The world generator: registers the built-in terrain types and populates
//! chunks, either synchronously through the
//! [`ChunkLoader`](gridstone_voxel::ChunkLoader) interface or on a single
//! background worker thread.
//!
//! The worker pulls jobs from a deque guarded by a mutex and condition
//! variable. Cancellation removes a queued job by key equality (same world
//! and location); a job already being executed is not interrupted.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use gridstone_voxel::{
    AirVoxelType, CHUNK_SIZE, ChunkLoader, ChunkLocation, ChunkMutableRef, InChunkLocation,
    MAX_LIGHT_LEVEL, SimpleVoxelType, VoxelLocation, VoxelType, VoxelTypeRegistry, VoxelWorld,
};

/// One queued generation request.
struct GenerationJob {
    world: Weak<VoxelWorld>,
    location: ChunkLocation,
}

impl GenerationJob {
    /// Jobs are equal when they target the same world and chunk.
    fn matches(&self, other: &GenerationJob) -> bool {
        self.location == other.location && Weak::ptr_eq(&self.world, &other.world)
    }
}

struct QueueState {
    jobs: VecDeque<GenerationJob>,
    running: bool,
}

struct WorkerShared {
    queue: Mutex<QueueState>,
    condvar: Condvar,
}

/// The terrain rule and the type handles it places.
struct GeneratorRule {
    air: Arc<dyn VoxelType>,
    grass: Arc<dyn VoxelType>,
    dirt: Arc<dyn VoxelType>,
    stone: Arc<dyn VoxelType>,
}

impl GeneratorRule {
    fn new(registry: &VoxelTypeRegistry) -> Self {
        registry.add(Arc::new(AirVoxelType::new("air")));
        registry.add(Arc::new(SimpleVoxelType::new(
            "grass",
            "assets/textures/grass.png",
        )));
        registry.add(Arc::new(SimpleVoxelType::new(
            "dirt",
            "assets/textures/mud.png",
        )));
        registry.add(Arc::new(SimpleVoxelType::new(
            "stone",
            "assets/textures/stone.png",
        )));
        Self {
            air: registry.get("air"),
            grass: registry.get("grass"),
            dirt: registry.get("dirt"),
            stone: registry.get("stone"),
        }
    }

    /// Populates a freshly-created chunk. The rule is a pure function of
    /// world location: sky chunks are air at full light; below ground the
    /// column is stone under dirt under a grass surface at y = −1.
    fn load_into(&self, chunk: &mut ChunkMutableRef) {
        let location = chunk.location();
        tracing::debug!(?location, "generating chunk");

        if location.y >= 0 {
            for z in 0..CHUNK_SIZE {
                for y in 0..CHUNK_SIZE {
                    for x in 0..CHUNK_SIZE {
                        let cell = chunk.at_mut(InChunkLocation::new(x, y, z));
                        cell.set_type(self.air.clone());
                        cell.set_light_level(MAX_LIGHT_LEVEL);
                    }
                }
            }
            chunk.mark_dirty_with_lights();
            return;
        }

        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let local = InChunkLocation::new(x, y, z);
                    let world_location = VoxelLocation::from_parts(location, local);
                    let vtype = if world_location.x == 3
                        && world_location.y == -1
                        && world_location.z == -4
                    {
                        // Lone stone marker poking through the grass surface.
                        &self.stone
                    } else if world_location.y < -3 {
                        &self.stone
                    } else if world_location.y < -1 {
                        &self.dirt
                    } else if world_location.y == -1 {
                        &self.grass
                    } else {
                        &self.air
                    };
                    chunk.at_mut(local).set_type(vtype.clone());
                }
            }
        }
        chunk.mark_dirty();
    }

    /// Executes a queued job: create the chunk and generate into it, unless
    /// it appeared while the job sat in the queue.
    fn run(&self, job: GenerationJob) {
        let Some(world) = job.world.upgrade() else {
            return;
        };
        let (mut chunk, created) = world.mutable_chunk_or_create(job.location);
        if !created {
            tracing::trace!(location = ?job.location, "chunk already present, skipping generation");
            return;
        }
        self.load_into(&mut chunk);
    }
}

/// Asynchronous chunk generator; implements
/// [`ChunkLoader`](gridstone_voxel::ChunkLoader) so a
/// [`VoxelWorld`](gridstone_voxel::VoxelWorld) can own one.
pub struct WorldGenerator {
    rule: Arc<GeneratorRule>,
    shared: Arc<WorkerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorldGenerator {
    /// Registers the built-in terrain types and starts the worker thread.
    pub fn new(registry: &VoxelTypeRegistry) -> Arc<Self> {
        let rule = Arc::new(GeneratorRule::new(registry));
        let shared = Arc::new(WorkerShared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                running: true,
            }),
            condvar: Condvar::new(),
        });

        let thread = {
            let rule = rule.clone();
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("world-generator".into())
                .spawn(move || worker_loop(rule, shared))
                .expect("failed to spawn the world-generator thread")
        };

        Arc::new(Self {
            rule,
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stops the worker thread. Queued jobs are abandoned; the in-flight
    /// job finishes first.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.queue.lock();
            state.running = false;
        }
        self.shared.condvar.notify_all();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }

    /// Queue depth, for diagnostics.
    pub fn pending_jobs(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }
}

impl Drop for WorldGenerator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChunkLoader for WorldGenerator {
    fn load(&self, chunk: &mut ChunkMutableRef) {
        self.rule.load_into(chunk);
    }

    fn load_async(&self, world: &Arc<VoxelWorld>, location: ChunkLocation) {
        let mut state = self.shared.queue.lock();
        state.jobs.push_back(GenerationJob {
            world: Arc::downgrade(world),
            location,
        });
        drop(state);
        self.shared.condvar.notify_one();
    }

    fn cancel_load_async(&self, world: &Arc<VoxelWorld>, location: ChunkLocation) {
        let key = GenerationJob {
            world: Arc::downgrade(world),
            location,
        };
        let mut state = self.shared.queue.lock();
        if let Some(index) = state.jobs.iter().position(|job| job.matches(&key)) {
            state.jobs.remove(index);
            tracing::trace!(?location, "cancelled queued generation job");
        }
    }
}

fn worker_loop(rule: Arc<GeneratorRule>, shared: Arc<WorkerShared>) {
    loop {
        let job = {
            let mut state = shared.queue.lock();
            loop {
                if !state.running {
                    return;
                }
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                shared.condvar.wait(&mut state);
            }
        };
        let location = job.location;
        if std::panic::catch_unwind(AssertUnwindSafe(|| rule.run(job))).is_err() {
            tracing::error!(?location, "generation job panicked");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
