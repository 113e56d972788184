//! Data module: the mesh-store interface
#![warn(missing_docs)]

pub mod mesh;

pub use mesh::{InMemoryMesh, MeshStore};
