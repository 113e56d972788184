//! Parallel point location, interpolation and normalization.
//!
//! A [`Coupler`] owns the source-side spatial index of one rank, the table of
//! points it has mapped into its own elements, and the located-point table
//! for the points this rank asked about. Every public operation that talks
//! to other ranks is collective: all ranks must call it, in the same order,
//! with compatible arguments.

pub mod bbox_exchange;
pub mod interpolate;
pub mod locate;
pub mod normalize;

pub use bbox_exchange::SourceIndex;
pub use locate::{LocateReport, LocatedPointTable, MappedPoint, PointLocation};
pub use normalize::{MatchingGroups, apply_group_norm_factor, consolidate_tuples, get_matching_entities};

use crate::algs::communicator::{CommTag, Communicator};
use crate::config::CouplerConfig;
use crate::data::mesh::MeshStore;
use crate::geometry::quadrature::LagrangeCache;
use crate::mesh_error::CouplerError;
use crate::topology::entity::EntityHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How field values are taken from the owning element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// One value stored on the element itself.
    Constant,
    /// Shape-function interpolation of per-vertex values (linear elements).
    LinearFe,
    /// Shape-function interpolation of per-vertex values (quadratic elements).
    QuadraticFe,
    /// Tensor Lagrange interpolation of per-element node values.
    Spectral,
}

/// Suffix of the tag holding normalization factors.
pub const NORM_FACTOR_SUFFIX: &str = "_normf";

/// Name of the normalization-factor tag for field `tag`.
pub fn norm_factor_tag(tag: &str) -> String {
    format!("{tag}{NORM_FACTOR_SUFFIX}")
}

/// Tag offsets of the collective phases; each phase uses two consecutive
/// tags, except `CONSOLIDATE` (gather then broadcast) which uses four.
pub(crate) mod phase {
    pub const BOXES: u16 = 0;
    pub const CANDIDATES: u16 = 2;
    pub const RESULTS: u16 = 4;
    pub const REQUESTS: u16 = 6;
    pub const REPLIES: u16 = 8;
    pub const CONSOLIDATE: u16 = 10;
    pub const REDUCE: u16 = 14;
    pub const FACTORS: u16 = 16;
}

/// Locates points of one mesh in the distributed elements of another and
/// transfers field values between them.
pub struct Coupler<'a, C: Communicator> {
    comm: &'a C,
    config: CouplerConfig,
    source: SourceIndex,
    mapped: Vec<MappedPoint>,
    located: LocatedPointTable,
    lagrange: LagrangeCache,
    /// Set each field's whole-mesh normalization factor was written to.
    norm_sets: HashMap<String, EntityHandle>,
}

impl<'a, C: Communicator> Coupler<'a, C> {
    /// Builds the local index over `elements` of `mesh` and exchanges
    /// bounding boxes with every rank. Collective.
    pub fn new<M: MeshStore>(
        comm: &'a C,
        mesh: &M,
        elements: &[EntityHandle],
        config: CouplerConfig,
    ) -> Result<Self, CouplerError> {
        config.validate()?;
        let mut lagrange = LagrangeCache::new();
        if let Some(order) = config.spectral_order {
            lagrange.set_order(order);
        }
        let source = SourceIndex::initialize(
            comm,
            mesh,
            elements,
            &config,
            &mut lagrange,
            CommTag::new(config.comm_tag).offset(phase::BOXES),
        )?;
        Ok(Self {
            comm,
            config,
            source,
            mapped: Vec::new(),
            located: LocatedPointTable::default(),
            lagrange,
            norm_sets: HashMap::new(),
        })
    }

    /// Rebuilds the source index. Collective.
    ///
    /// An empty `elements` slice keeps the current index and only repeats
    /// the box exchange. Located and mapped points are cleared either way.
    pub fn reinitialize<M: MeshStore>(
        &mut self,
        mesh: &M,
        elements: &[EntityHandle],
    ) -> Result<(), CouplerError> {
        let tag = self.tag(phase::BOXES);
        if elements.is_empty() {
            self.source.exchange_boxes(self.comm, tag)?;
        } else {
            self.source = SourceIndex::initialize(
                self.comm,
                mesh,
                elements,
                &self.config,
                &mut self.lagrange,
                tag,
            )?;
        }
        self.clear_located();
        Ok(())
    }

    pub fn comm(&self) -> &'a C {
        self.comm
    }

    pub fn config(&self) -> &CouplerConfig {
        &self.config
    }

    pub fn source(&self) -> &SourceIndex {
        &self.source
    }

    /// Points of other ranks (or this one) mapped into local elements.
    pub fn mapped_points(&self) -> &[MappedPoint] {
        &self.mapped
    }

    /// Result of the last `locate_*` call.
    pub fn located(&self) -> &LocatedPointTable {
        &self.located
    }

    /// Forgets the located and mapped points.
    pub fn clear_located(&mut self) {
        self.mapped.clear();
        self.located = LocatedPointTable::default();
    }

    /// Switches the spectral element order, dropping cached tables of the
    /// previous order. Takes effect on the next (re)initialization.
    pub fn set_spectral_order(&mut self, order: Option<usize>) -> Result<(), CouplerError> {
        let config = CouplerConfig {
            spectral_order: order,
            ..self.config.clone()
        };
        config.validate()?;
        match order {
            Some(n) => {
                self.lagrange.set_order(n);
            }
            None => self.lagrange.clear(),
        }
        self.config = config;
        Ok(())
    }

    fn tag(&self, offset: u16) -> CommTag {
        CommTag::new(self.config.comm_tag).offset(offset)
    }
}
