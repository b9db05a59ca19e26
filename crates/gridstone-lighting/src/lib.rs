//! Asynchronous light propagation for the chunked voxel world.

pub mod computer;

pub use computer::LightComputer;
