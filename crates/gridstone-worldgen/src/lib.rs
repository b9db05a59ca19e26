//! Built-in voxel types and the asynchronous chunk generator.

pub mod generator;

pub use generator::WorldGenerator;
