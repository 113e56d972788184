#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-coupler
//!
//! mesh-coupler transfers scalar fields between independently meshed and
//! independently partitioned domains. For every target point it finds the
//! source element containing it, possibly on another rank, computes the
//! point's natural coordinates in that element, and interpolates or
//! normalizes field values there.
//!
//! ## Features
//! - Element shape-function maps (linear edge/quad/tet/hex, 27-node hex,
//!   spectral quad/hex) with Newton inverse evaluation and quadrature
//! - A KD-tree over element boxes for local point search
//! - Columnar tuple lists and a crystal router for all-to-all record routing
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - Global and per-group field normalization
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-coupler = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! The mesh itself stays with the caller: anything implementing
//! [`data::mesh::MeshStore`] can serve as source or target.
//!
//! ## Collectives
//!
//! Every [`coupling::Coupler`] operation that exchanges data is collective.
//! All ranks must call it, in the same order; a rank that skips one blocks
//! the others indefinitely.

pub mod algs;
pub mod config;
pub mod coupling;
pub mod data;
pub mod geometry;
pub mod mesh_error;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{CommTag, Communicator, LocalComm, NoComm, Wait};
    pub use crate::algs::crystal::CrystalRouter;
    pub use crate::algs::tuple_list::{Column, TupleList};
    pub use crate::config::CouplerConfig;
    pub use crate::coupling::{
        Coupler, LocateReport, LocatedPointTable, MappedPoint, Method, PointLocation,
    };
    pub use crate::data::mesh::{InMemoryMesh, MeshStore};
    pub use crate::geometry::bbox::BoundingBox;
    pub use crate::geometry::element_map::ElementMap;
    pub use crate::geometry::quadrature::LagrangeCache;
    pub use crate::mesh_error::{CouplerError, EvalError};
    pub use crate::topology::cell_type::CellType;
    pub use crate::topology::entity::EntityHandle;
}
