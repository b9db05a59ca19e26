//! Gridstone client: ingests server chunk pushes into a local world,
//! invalidates mesh caches, and coalesces outgoing position updates.

pub mod invalidation;
pub mod transport;

pub use invalidation::MeshInvalidator;
pub use transport::{ClientTransport, run_session};
