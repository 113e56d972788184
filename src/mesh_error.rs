//! CouplerError: Unified error type for mesh-coupler public APIs
//!
//! Structural failures (index construction, communication, missing mesh data)
//! are reported through [`CouplerError`]. Local numerical failures of the
//! element maps use the smaller [`EvalError`], which the point locator treats
//! as "try the next candidate element" rather than as a failure of the call.

use crate::topology::cell_type::CellType;
use crate::topology::entity::EntityHandle;
use thiserror::Error;

/// Numerical failure of an element map evaluation.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum EvalError {
    /// Newton iteration did not reach the residual tolerance.
    #[error("inverse map did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
    /// The Jacobian determinant vanished (degenerate element).
    #[error("singular Jacobian (det = {det:e})")]
    SingularJacobian { det: f64 },
    /// A field or coordinate array had the wrong number of entries.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Unified error type for mesh-coupler operations.
#[derive(Debug, Error)]
pub enum CouplerError {
    /// `initialize` was called with no source elements and no tree to reuse.
    #[error("source element set is empty and there is no spatial index to reuse")]
    EmptySourceSet,
    /// The local spatial index could not be built within the allowed attempts.
    #[error("spatial index build failed after {attempts} attempts (last leaf cap {max_per_leaf})")]
    IndexBuildFailed { attempts: usize, max_per_leaf: usize },
    /// The mesh store reported an element type/node count with no element map.
    #[error("unsupported element {handle}: {cell_type:?} with {nodes} nodes")]
    UnsupportedElement {
        handle: EntityHandle,
        cell_type: CellType,
        nodes: usize,
    },
    /// The mesh store has no entity with this handle.
    #[error("entity {0} is not present in the mesh store")]
    MissingEntity(EntityHandle),
    /// A tag was not set on an entity.
    #[error("tag `{tag}` is not set on entity {handle}")]
    MissingTag { tag: String, handle: EntityHandle },
    /// A tag value had an unexpected number of components.
    #[error("tag `{tag}` on entity {handle} has {found} values, expected {expected}")]
    TagLength {
        tag: String,
        handle: EntityHandle,
        expected: usize,
        found: usize,
    },
    /// A row pushed into a tuple list did not match the column widths.
    #[error("tuple row width mismatch: expected ({0:?}), found ({1:?})")]
    WidthMismatch([usize; 4], [usize; 4]),
    /// A column index was out of range for a tuple list.
    #[error("column {column} out of range (width {width})")]
    InvalidColumn { column: usize, width: usize },
    /// A tuple was addressed to a rank outside the communicator.
    #[error("row {row} routed to rank {dest}, but communicator size is {size}")]
    InvalidRoute { row: usize, dest: i64, size: usize },
    /// A packed buffer was malformed.
    #[error("wire format error: {0}")]
    Wire(String),
    /// A point-to-point or collective exchange failed.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Caller-supplied arrays disagree in length.
    #[error("{what}: expected length {expected}, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// An element map evaluation failed where no fallback exists.
    #[error("element evaluation failed: {0}")]
    Evaluation(#[from] EvalError),
    /// Strict callers asked for every point to be located.
    #[error("{count} points could not be located in any source element")]
    NotLocated { count: usize },
    /// Other ranks hit a local error during a collective step; this rank
    /// completed its part but the step's result is incomplete.
    #[error("collective step failed on ranks {ranks:?}")]
    PeerFailure { ranks: Vec<usize> },
}

impl CouplerError {
    /// Convenience constructor for communication failures described by a message.
    pub fn comm(neighbor: usize, message: impl Into<String>) -> Self {
        CouplerError::CommError {
            neighbor,
            source: message.into().into(),
        }
    }
}
