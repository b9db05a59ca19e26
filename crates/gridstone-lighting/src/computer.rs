//! Background light propagation.
//!
//! A single worker thread pulls jobs from a mutex+condvar deque. Each job
//! names a world, a chunk, and an optional cell list (empty list means
//! "recompute every cell"). Propagation keeps one FIFO-with-set queue per
//! chunk; cells spilling across a boundary are moved to the neighboring
//! chunk's queue and processed under that chunk's own extended handle.
//!
//! The diffusion rule: a cell's level is
//! `max(emission, feed from the 6 axis neighbors)`, where the neighbor
//! directly above feeds at full strength (sunlight falls without decay) and
//! every other direction feeds at `level − 1`. Neighbor cells outside the
//! loaded world feed nothing.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};

use gridstone_voxel::{
    CHUNK_SIZE, ChunkExtendedMutableRef, ChunkListener, ChunkLocation, InChunkLocation,
    LightLevel, MAX_LIGHT_LEVEL, MissingChunkPolicy, NEIGHBORS_6, VoxelWorld,
};

/// One queued propagation request.
struct LightJob {
    world: Weak<VoxelWorld>,
    location: ChunkLocation,
    /// Cells to recompute; empty means the whole chunk.
    cells: Vec<InChunkLocation>,
}

struct QueueState {
    jobs: VecDeque<LightJob>,
    running: bool,
}

struct WorkerShared {
    queue: Mutex<QueueState>,
    condvar: Condvar,
}

/// Per-chunk FIFO of pending cells with a backing set to suppress
/// duplicates.
#[derive(Default)]
struct ChunkQueue {
    queue: VecDeque<InChunkLocation>,
    set: FxHashSet<InChunkLocation>,
}

impl ChunkQueue {
    fn push(&mut self, location: InChunkLocation) {
        if self.set.insert(location) {
            self.queue.push_back(location);
        }
    }

    fn pop(&mut self) -> Option<InChunkLocation> {
        let location = self.queue.pop_front()?;
        self.set.remove(&location);
        Some(location)
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Asynchronous light computer. Also a
/// [`ChunkListener`](gridstone_voxel::ChunkListener): wire it into the
/// world's listener chain and every dirty-with-lights transition becomes a
/// recompute job.
pub struct LightComputer {
    shared: Arc<WorkerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LightComputer {
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(WorkerShared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                running: true,
            }),
            condvar: Condvar::new(),
        });

        let thread = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("light-computer".into())
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn the light-computer thread")
        };

        Arc::new(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Enqueues a full-chunk recompute.
    pub fn compute_async(&self, world: &Arc<VoxelWorld>, location: ChunkLocation) {
        self.post(world, location, Vec::new());
    }

    /// Enqueues a recompute of specific cells.
    pub fn compute_async_cells(
        &self,
        world: &Arc<VoxelWorld>,
        location: ChunkLocation,
        cells: Vec<InChunkLocation>,
    ) {
        self.post(world, location, cells);
    }

    fn post(&self, world: &Arc<VoxelWorld>, location: ChunkLocation, cells: Vec<InChunkLocation>) {
        let mut state = self.shared.queue.lock();
        state.jobs.push_back(LightJob {
            world: Arc::downgrade(world),
            location,
            cells,
        });
        drop(state);
        self.shared.condvar.notify_one();
    }

    /// Stops the worker thread, abandoning queued jobs.
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

impl Drop for LightComputer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ChunkListener for LightComputer {
    fn chunk_invalidated(
        &self,
        world: &Arc<VoxelWorld>,
        location: ChunkLocation,
        lights_pending: bool,
    ) {
        if lights_pending {
            self.compute_async(world, location);
        }
    }
}

fn worker_loop(shared: Arc<WorkerShared>) {
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
        if std::panic::catch_unwind(AssertUnwindSafe(|| run_job(&shared, job))).is_err() {
            tracing::error!(?location, "light propagation job panicked");
        }
    }
}

/// Executes one job: seed the primary chunk's queue, then drain per-chunk
/// queues until the propagation front dies out.
fn run_job(shared: &Arc<WorkerShared>, job: LightJob) {
    let Some(world) = job.world.upgrade() else {
        return;
    };

    if !world.is_loaded(job.location) {
        if !world.has_loader() {
            tracing::warn!(location = ?job.location, "light job for an unloaded chunk and no loader, dropping");
            return;
        }
        // Kick the generator and come back to this job later.
        drop(world.extended_mutable_chunk(job.location, MissingChunkPolicy::LoadAsync));
        std::thread::sleep(Duration::from_millis(10));
        let mut state = shared.queue.lock();
        if state.running {
            state.jobs.push_back(job);
        }
        return;
    }

    let mut queues: FxHashMap<ChunkLocation, ChunkQueue> = FxHashMap::default();
    let seed = queues.entry(job.location).or_default();
    if job.cells.is_empty() {
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    seed.push(InChunkLocation::new(x, y, z));
                }
            }
        }
    } else {
        for cell in job.cells {
            seed.push(cell);
        }
    }

    let mut visited: FxHashSet<ChunkLocation> = FxHashSet::default();
    let mut iterations: u64 = 0;

    while let Some(location) = queues
        .iter()
        .find(|(_, queue)| !queue.is_empty())
        .map(|(location, _)| *location)
    {
        let Some(mut queue) = queues.remove(&location) else {
            break;
        };
        let Some(mut chunk) = world.extended_mutable_chunk(location, MissingChunkPolicy::None)
        else {
            // Unloaded mid-propagation; its own generation pass will relight.
            continue;
        };
        visited.insert(location);
        drain_chunk_queue(&mut chunk, &mut queue, &mut queues, &mut iterations);
    }

    tracing::trace!(
        location = ?job.location,
        chunks = visited.len(),
        iterations,
        "light propagation settled"
    );
}

/// Drains one chunk's queue under its extended-mutable handle. Same-chunk
/// neighbors feed back into the local queue; spills land in the owning
/// chunk's queue for a later batch.
fn drain_chunk_queue(
    chunk: &mut ChunkExtendedMutableRef,
    queue: &mut ChunkQueue,
    queues: &mut FxHashMap<ChunkLocation, ChunkQueue>,
    iterations: &mut u64,
) {
    let location = chunk.location();
    while let Some(cell) = queue.pop() {
        *iterations += 1;
        let cur = chunk.at(cell).light_level();
        let emission = chunk.at(cell).type_emission();

        let mut level = emission;
        for (dx, dy, dz) in NEIGHBORS_6 {
            let Some(feed) = neighbor_light(chunk, cell, dx, dy, dz) else {
                continue;
            };
            // The neighbor above feeds at full strength; every other
            // direction decays by one.
            let candidate = if dy == 1 { feed } else { feed - 1 };
            level = level.max(candidate);
        }
        let level = level.clamp(0, MAX_LIGHT_LEVEL);

        if level == cur {
            continue;
        }
        chunk.at_mut(cell).set_light_level(level);
        chunk.mark_dirty();

        for (dx, dy, dz) in NEIGHBORS_6 {
            match cell.step(dx, dy, dz) {
                Some(local) => queue.push(local),
                None => {
                    // Spills into the loaded neighbor's queue only; an
                    // unloaded neighbor relights itself when generated.
                    if chunk.has_neighbor(dx, dy, dz) {
                        let (nx, ny, nz) = (cell.x + dx, cell.y + dy, cell.z + dz);
                        let corrected = InChunkLocation::new(
                            nx.rem_euclid(CHUNK_SIZE),
                            ny.rem_euclid(CHUNK_SIZE),
                            nz.rem_euclid(CHUNK_SIZE),
                        );
                        queues
                            .entry(location.offset(
                                nx.div_euclid(CHUNK_SIZE),
                                ny.div_euclid(CHUNK_SIZE),
                                nz.div_euclid(CHUNK_SIZE),
                            ))
                            .or_default()
                            .push(corrected);
                    }
                }
            }
        }
    }
}

/// The light level feeding from the neighbor one step along `(dx, dy, dz)`,
/// or `None` when that cell lies outside the loaded world.
fn neighbor_light(
    chunk: &ChunkExtendedMutableRef,
    cell: InChunkLocation,
    dx: i32,
    dy: i32,
    dz: i32,
) -> Option<LightLevel> {
    let (nx, ny, nz) = (cell.x + dx, cell.y + dy, cell.z + dz);
    let inside = (0..CHUNK_SIZE).contains(&nx)
        && (0..CHUNK_SIZE).contains(&ny)
        && (0..CHUNK_SIZE).contains(&nz);
    if inside {
        return Some(chunk.at(InChunkLocation::new(nx, ny, nz)).light_level());
    }
    if chunk.has_neighbor(
        nx.div_euclid(CHUNK_SIZE),
        ny.div_euclid(CHUNK_SIZE),
        nz.div_euclid(CHUNK_SIZE),
    ) {
        return Some(chunk.extended_at(nx, ny, nz).light_level());
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gridstone_voxel::{
        CompositeListener, SimpleVoxelType, VoxelLocation, VoxelType, VoxelTypeRegistry,
    };
    use gridstone_worldgen::WorldGenerator;
    use std::time::Instant;

    fn loc(x: i32, y: i32, z: i32) -> ChunkLocation {
        ChunkLocation::new(x, y, z)
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for the worker");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Records renderer-style invalidations (ignores lights-pending ones).
    struct MeshRecorder {
        calls: Mutex<Vec<ChunkLocation>>,
    }

    impl MeshRecorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChunkListener for MeshRecorder {
        fn chunk_invalidated(
            &self,
            _world: &Arc<VoxelWorld>,
            location: ChunkLocation,
            lights_pending: bool,
        ) {
            if !lights_pending {
                self.calls.lock().push(location);
            }
        }
    }

    fn stone() -> Arc<dyn VoxelType> {
        Arc::new(SimpleVoxelType::new("stone", "assets/textures/stone.png"))
    }

    fn lamp() -> Arc<dyn VoxelType> {
        Arc::new(SimpleVoxelType::new("lamp", "assets/textures/lamp.png").with_emission(16))
    }

    /// Fills a chunk with dark stone without marking it dirty.
    fn fill_dark_stone(world: &Arc<VoxelWorld>, location: ChunkLocation) {
        let mut chunk = world
            .mutable_chunk(location, MissingChunkPolicy::Create)
            .expect("created");
        let stone = stone();
        for z in 0..CHUNK_SIZE {
            for y in 0..CHUNK_SIZE {
                for x in 0..CHUNK_SIZE {
                    let cell = chunk.at_mut(InChunkLocation::new(x, y, z));
                    cell.set_type(stone.clone());
                    cell.set_light_level(0);
                }
            }
        }
    }

    #[test]
    fn test_single_emitter_diffusion() {
        let recorder = MeshRecorder::new();
        let world = VoxelWorld::new(None, Some(recorder.clone()));
        let location = loc(0, 0, 0);
        fill_dark_stone(&world, location);
        {
            let mut chunk = world
                .mutable_chunk(location, MissingChunkPolicy::None)
                .expect("loaded");
            chunk.at_mut(InChunkLocation::new(8, 8, 8)).set_type(lamp());
        }

        let computer = LightComputer::new();
        computer.compute_async(&world, location);

        let light_at = |x: i32, y: i32, z: i32| {
            world
                .voxel_at(VoxelLocation::new(x, y, z))
                .light_level()
        };
        wait_for(|| light_at(8, 8, 8) == 16);
        wait_for(|| light_at(9, 8, 8) == 15);

        // Horizontal falloff along the axes: 16 − d, floored at 0.
        for d in 1..8 {
            assert_eq!(light_at(8 + d, 8, 8), 16 - d as i8, "+x at distance {d}");
            assert_eq!(light_at(8 - d, 8, 8), 16 - d as i8, "-x at distance {d}");
            assert_eq!(light_at(8, 8, 8 + d), 16 - d as i8, "+z at distance {d}");
        }
        // Above the lamp the feed decays; below it sunlight-style full feed.
        assert_eq!(light_at(8, 9, 8), 15);
        assert_eq!(light_at(8, 7, 8), 16);

        // The dirty bit was consumed into exactly one mesh invalidation.
        wait_for(|| !recorder.calls.lock().is_empty());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.calls.lock().clone(), vec![location]);
    }

    #[test]
    fn test_rerun_is_a_fixed_point() {
        let recorder = MeshRecorder::new();
        let world = VoxelWorld::new(None, Some(recorder.clone()));
        let location = loc(0, 0, 0);
        fill_dark_stone(&world, location);
        {
            let mut chunk = world
                .mutable_chunk(location, MissingChunkPolicy::None)
                .expect("loaded");
            chunk.at_mut(InChunkLocation::new(3, 3, 3)).set_type(lamp());
        }

        let computer = LightComputer::new();
        computer.compute_async(&world, location);
        wait_for(|| {
            world
                .voxel_at(VoxelLocation::new(4, 3, 3))
                .light_level()
                == 15
        });
        wait_for(|| !recorder.calls.lock().is_empty());
        let first_calls = recorder.calls.lock().len();

        // Re-running on the settled world writes nothing and notifies no one.
        computer.compute_async(&world, location);
        wait_for(|| computer.pending_jobs() == 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.calls.lock().len(), first_calls);
        assert_eq!(
            world.voxel_at(VoxelLocation::new(4, 3, 3)).light_level(),
            15
        );
    }

    #[test]
    fn test_light_crosses_chunk_boundary() {
        let recorder = MeshRecorder::new();
        let world = VoxelWorld::new(None, Some(recorder.clone()));
        fill_dark_stone(&world, loc(0, 0, 0));
        fill_dark_stone(&world, loc(1, 0, 0));
        {
            let mut chunk = world
                .mutable_chunk(loc(0, 0, 0), MissingChunkPolicy::None)
                .expect("loaded");
            chunk
                .at_mut(InChunkLocation::new(15, 8, 8))
                .set_type(lamp());
        }

        let computer = LightComputer::new();
        computer.compute_async(&world, loc(0, 0, 0));

        wait_for(|| {
            world
                .voxel_at(VoxelLocation::new(16, 8, 8))
                .light_level()
                == 15
        });
        assert_eq!(
            world.voxel_at(VoxelLocation::new(17, 8, 8)).light_level(),
            14
        );
        // Both chunks were invalidated for remeshing.
        wait_for(|| {
            let calls = recorder.calls.lock();
            calls.contains(&loc(0, 0, 0)) && calls.contains(&loc(1, 0, 0))
        });
    }

    #[test]
    fn test_unloaded_neighbor_feeds_nothing() {
        let world = VoxelWorld::new(None, None);
        let location = loc(0, 0, 0);
        fill_dark_stone(&world, location);

        let computer = LightComputer::new();
        computer.compute_async(&world, location);
        wait_for(|| computer.pending_jobs() == 0);
        std::thread::sleep(Duration::from_millis(50));

        // Border cells see no incoming light from the void.
        assert_eq!(world.voxel_at(VoxelLocation::new(0, 15, 0)).light_level(), 0);
        assert_eq!(world.voxel_at(VoxelLocation::new(15, 0, 15)).light_level(), 0);
    }

    #[test]
    fn test_job_waits_for_generator() {
        let registry = VoxelTypeRegistry::new();
        let generator = WorldGenerator::new(&registry);
        let world = VoxelWorld::new(Some(generator.clone()), None);

        let computer = LightComputer::new();
        computer.compute_async(&world, loc(4, -1, 4));

        // The job requeues itself until the generator has produced the
        // chunk, then settles.
        wait_for(|| world.is_loaded(loc(4, -1, 4)));
        wait_for(|| computer.pending_jobs() == 0);
        assert_eq!(
            world
                .voxel_at(VoxelLocation::new(4 * 16, -1, 4 * 16))
                .voxel_type()
                .name(),
            "grass"
        );
    }

    #[test]
    fn test_listener_wiring_triggers_recompute() {
        let recorder = MeshRecorder::new();
        let computer = LightComputer::new();
        let listeners: Vec<Arc<dyn ChunkListener>> = vec![computer.clone(), recorder.clone()];
        let world = VoxelWorld::new(None, Some(Arc::new(CompositeListener::new(listeners))));

        let location = loc(0, 0, 0);
        fill_dark_stone(&world, location);
        {
            let mut chunk = world
                .mutable_chunk(location, MissingChunkPolicy::None)
                .expect("loaded");
            chunk.at_mut(InChunkLocation::new(8, 8, 8)).set_type(lamp());
            chunk.mark_dirty_with_lights();
        }

        wait_for(|| {
            world
                .voxel_at(VoxelLocation::new(9, 8, 8))
                .light_level()
                == 15
        });
    }
}
